//! # Dual-Write Synchronizer
//!
//! Best-effort mirroring of committed sales and stock levels to a secondary
//! store.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The primary committed before any mirror call runs. Mirror failures     │
//! │  are therefore warnings by definition: logged, reported in the          │
//! │  DualWriteReport, never thrown back to fail the sale.                   │
//! │                                                                         │
//! │  mirror_sale: idempotent inserts (OR IGNORE) - a retried commit never   │
//! │  duplicates rows in the mirror.                                         │
//! │  mirror_stock: absolute quantity overwrite - the mirror converges on    │
//! │  the primary's value regardless of missed deltas.                       │
//! │                                                                         │
//! │  No reconciliation job lives here; the movement log plus this report    │
//! │  are what a periodic diff-and-republish pass would consume.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use vela_core::{Sale, SaleLineItem};
use vela_db::Database;

// =============================================================================
// Report Types
// =============================================================================

/// Outcome of one half of a dual write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    Committed,
    Failed { reason: String },
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed)
    }
}

/// Explicit two-outcome result of a commit's dual write, so callers and
/// tests can assert on both halves instead of grepping log lines.
#[derive(Debug, Clone, Serialize)]
pub struct DualWriteReport {
    pub primary: WriteOutcome,
    pub secondary: WriteOutcome,
}

// =============================================================================
// Mirror Trait
// =============================================================================

/// Failure of a secondary-store write.
#[derive(Debug, Error)]
#[error("mirror write failed: {0}")]
pub struct MirrorError(pub String);

impl From<vela_db::DbError> for MirrorError {
    fn from(err: vela_db::DbError) -> Self {
        MirrorError(err.to_string())
    }
}

/// The secondary store's write surface.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Mirrors a committed sale and its line items.
    async fn mirror_sale(&self, sale: &Sale, items: &[SaleLineItem]) -> Result<(), MirrorError>;

    /// Overwrites a product's quantity with the primary's current value.
    async fn mirror_stock(&self, product_id: &str, new_quantity: i64) -> Result<(), MirrorError>;
}

// =============================================================================
// SQLite Mirror
// =============================================================================

/// Mirror backed by a second SQLite database sharing the primary schema.
pub struct SqliteMirror {
    db: Database,
}

impl SqliteMirror {
    /// Wraps a secondary database handle.
    pub fn new(db: Database) -> Self {
        SqliteMirror { db }
    }
}

#[async_trait]
impl MirrorStore for SqliteMirror {
    async fn mirror_sale(&self, sale: &Sale, items: &[SaleLineItem]) -> Result<(), MirrorError> {
        debug!(sale_number = %sale.sale_number, "Mirroring sale");

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| MirrorError(e.to_string()))?;

        // OR IGNORE keeps retries idempotent on the unique sale id/number.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sales (
                id, sale_number, store_id, cashier_id, cashier_name, customer_name,
                subtotal_cents, tax_cents, total_cents, payment_method,
                amount_paid_cents, change_cents, payment_reference, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sale_number)
        .bind(&sale.store_id)
        .bind(&sale.cashier_id)
        .bind(&sale.cashier_name)
        .bind(&sale.customer_name)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(sale.amount_paid_cents)
        .bind(sale.change_cents)
        .bind(&sale.payment_reference)
        .bind(sale.status)
        .bind(sale.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| MirrorError(e.to_string()))?;

        for item in items {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO sale_line_items (
                    id, sale_id, product_id, quantity, unit_price_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| MirrorError(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| MirrorError(e.to_string()))?;
        Ok(())
    }

    async fn mirror_stock(&self, product_id: &str, new_quantity: i64) -> Result<(), MirrorError> {
        debug!(product_id = %product_id, new_quantity = %new_quantity, "Mirroring stock level");

        let result = sqlx::query("UPDATE products SET quantity = ?2 WHERE id = ?1")
            .bind(product_id)
            .bind(new_quantity)
            .execute(self.db.pool())
            .await
            .map_err(|e| MirrorError(e.to_string()))?;

        if result.rows_affected() == 0 {
            // The mirror doesn't know this product yet; a reconciliation
            // pass would backfill it. Surface it so the report shows the
            // divergence.
            return Err(MirrorError(format!(
                "product {product_id} not present in mirror"
            )));
        }

        Ok(())
    }
}

/// Mirror that accepts and discards everything. For single-store
/// deployments with no secondary.
#[derive(Debug, Default)]
pub struct NullMirror;

#[async_trait]
impl MirrorStore for NullMirror {
    async fn mirror_sale(&self, _sale: &Sale, _items: &[SaleLineItem]) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn mirror_stock(&self, _product_id: &str, _new_quantity: i64) -> Result<(), MirrorError> {
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
