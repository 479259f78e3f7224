//! # Low-Stock Alert Repository
//!
//! One alert row per product, upserted on every threshold crossing.
//!
//! The core never auto-resolves alerts when stock recovers; resolution is
//! a manual action exposed to the admin surface via [`AlertRepository::mark_resolved`].

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vela_core::LowStockAlert;

const ALERT_COLUMNS: &str =
    "id, product_id, current_quantity, reorder_level, status, created_at, updated_at";

/// Repository for low-stock alert operations.
#[derive(Debug, Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    /// Creates a new AlertRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AlertRepository { pool }
    }

    /// Upserts a pending alert for a product.
    ///
    /// Re-crossing the threshold refreshes the observed quantity and flips
    /// a previously resolved alert back to pending.
    pub async fn upsert_pending(
        &self,
        product_id: &str,
        current_quantity: i64,
        reorder_level: i64,
    ) -> DbResult<()> {
        debug!(
            product_id = %product_id,
            current_quantity = %current_quantity,
            reorder_level = %reorder_level,
            "Upserting low-stock alert"
        );

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO low_stock_alerts (
                id, product_id, current_quantity, reorder_level,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
            ON CONFLICT(product_id) DO UPDATE SET
                current_quantity = excluded.current_quantity,
                reorder_level = excluded.reorder_level,
                status = 'pending',
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(current_quantity)
        .bind(reorder_level)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the alert for a product, if any.
    pub async fn get_by_product(&self, product_id: &str) -> DbResult<Option<LowStockAlert>> {
        let alert = sqlx::query_as::<_, LowStockAlert>(&format!(
            "SELECT {ALERT_COLUMNS} FROM low_stock_alerts WHERE product_id = ?1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(alert)
    }

    /// Lists all pending alerts, most recently touched first.
    pub async fn list_pending(&self) -> DbResult<Vec<LowStockAlert>> {
        let alerts = sqlx::query_as::<_, LowStockAlert>(&format!(
            "SELECT {ALERT_COLUMNS} FROM low_stock_alerts \
             WHERE status = 'pending' ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    /// Marks an alert resolved. Admin-surface action, not called by the core.
    pub async fn mark_resolved(&self, product_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE low_stock_alerts
            SET status = 'resolved', updated_at = ?2
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LowStockAlert", product_id));
        }

        Ok(())
    }
}

// =============================================================================
// Transaction-Scoped Writes
// =============================================================================

/// Upserts a pending alert on the commit transaction's connection.
///
/// Same statement as [`AlertRepository::upsert_pending`]; this variant exists
/// so alert publication can be atomic with the deductions that caused it.
pub async fn upsert_pending_tx(
    conn: &mut SqliteConnection,
    product_id: &str,
    current_quantity: i64,
    reorder_level: i64,
) -> DbResult<()> {
    debug!(
        product_id = %product_id,
        current_quantity = %current_quantity,
        "Upserting low-stock alert (tx)"
    );

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO low_stock_alerts (
            id, product_id, current_quantity, reorder_level,
            status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
        ON CONFLICT(product_id) DO UPDATE SET
            current_quantity = excluded.current_quantity,
            reorder_level = excluded.reorder_level,
            status = 'pending',
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&id)
    .bind(product_id)
    .bind(current_quantity)
    .bind(reorder_level)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::generate_product_id;
    use vela_core::{AlertStatus, Product};

    async fn db_with_product() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: "ABC".to_string(),
            name: "Test".to_string(),
            store_id: None,
            variant_of: None,
            price_cents: 100,
            quantity: 3,
            reorder_level: 5,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_product() {
        let (db, product_id) = db_with_product().await;

        db.alerts().upsert_pending(&product_id, 3, 5).await.unwrap();
        db.alerts().upsert_pending(&product_id, 1, 5).await.unwrap();

        let alert = db
            .alerts()
            .get_by_product(&product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.current_quantity, 1);
        assert_eq!(alert.status, AlertStatus::Pending);

        // Still one row, not two
        assert_eq!(db.alerts().list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolved_alert_reopens_on_next_crossing() {
        let (db, product_id) = db_with_product().await;

        db.alerts().upsert_pending(&product_id, 3, 5).await.unwrap();
        db.alerts().mark_resolved(&product_id).await.unwrap();

        let alert = db
            .alerts()
            .get_by_product(&product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);

        db.alerts().upsert_pending(&product_id, 2, 5).await.unwrap();
        let alert = db
            .alerts()
            .get_by_product(&product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.status, AlertStatus::Pending);
        assert_eq!(alert.current_quantity, 2);
    }
}
