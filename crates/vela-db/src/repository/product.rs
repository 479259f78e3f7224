//! # Product Repository
//!
//! Database operations for products and per-store variants.
//!
//! ## Guarded Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Decrement Strategy                             │
//! │                                                                         │
//! │  ❌ WRONG: read-then-write (races between terminals)                    │
//! │     let qty = SELECT quantity ...;                                      │
//! │     UPDATE products SET quantity = {qty - n} WHERE id = ?               │
//! │                                                                         │
//! │  ✅ CORRECT: conditional update, atomic in SQLite                       │
//! │     UPDATE products SET quantity = quantity - ?2                        │
//! │     WHERE id = ?1 AND quantity >= ?2                                    │
//! │                                                                         │
//! │  rows_affected == 0 means another terminal won the race; the caller     │
//! │  surfaces InsufficientStock instead of overselling.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Variant Cascade
//! A base product's quantity is recomputed as a FULL RE-SUM of its variants
//! (`SELECT SUM(quantity) ... WHERE variant_of = base`), never an increment.
//! Re-running the cascade for the same sale is therefore a no-op.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vela_core::Product;

const PRODUCT_COLUMNS: &str = "id, sku, name, store_id, variant_of, price_cents, \
     quantity, reorder_level, is_active, created_at, updated_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let product = repo.get_by_sku("ABC-S1").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all variants of a base product.
    pub async fn list_variants(&self, base_id: &str) -> DbResult<Vec<Product>> {
        let variants = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE variant_of = ?1 ORDER BY sku"
        ))
        .bind(base_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, store_id, variant_of, price_cents,
                quantity, reorder_level, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.store_id)
        .bind(&product.variant_of)
        .bind(product.price_cents)
        .bind(product.quantity)
        .bind(product.reorder_level)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Receives stock (positive delta) outside of the sale pipeline.
    ///
    /// Used by goods-receipt flows and the seed binary; sales go through
    /// the guarded decrement in [`deduct_quantity_tx`] instead.
    pub async fn receive_stock(&self, id: &str, qty: i64) -> DbResult<()> {
        debug!(id = %id, qty = %qty, "Receiving stock");

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE products SET quantity = quantity + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(qty)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Soft-deactivates a product.
    ///
    /// Historical sales still reference it, so rows are never deleted.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let now = Utc::now();
        let result =
            sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-Scoped Writes
// =============================================================================
// These run on a caller-supplied connection so they join the sale commit
// transaction opened by the pipeline.

/// Conditionally decrements a product's quantity.
///
/// The `AND quantity >= ?2` guard makes the decrement atomic: under
/// concurrent sales exactly enough succeed to exhaust stock, the rest see
/// `Ok(false)` and surface `InsufficientStock`.
///
/// ## Returns
/// * `Ok(true)` - decrement applied
/// * `Ok(false)` - insufficient quantity (or unknown product)
pub async fn deduct_quantity_tx(
    conn: &mut SqliteConnection,
    product_id: &str,
    qty: i64,
) -> DbResult<bool> {
    debug!(product_id = %product_id, qty = %qty, "Deducting stock");

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE products
        SET quantity = quantity - ?2, updated_at = ?3
        WHERE id = ?1 AND quantity >= ?2
        "#,
    )
    .bind(product_id)
    .bind(qty)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reads a product's current quantity on the transaction connection.
pub async fn get_quantity_tx(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    let qty: Option<i64> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;

    qty.ok_or_else(|| DbError::not_found("Product", product_id))
}

/// Recomputes a base product's quantity as the sum of its variants.
///
/// Always a full re-sum, never an increment, so replaying the cascade for
/// the same sale is idempotent.
///
/// ## Returns
/// The base product's new quantity.
pub async fn recompute_base_quantity_tx(
    conn: &mut SqliteConnection,
    base_id: &str,
) -> DbResult<i64> {
    debug!(base_id = %base_id, "Recomputing base quantity from variants");

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE products
        SET quantity = (
                SELECT COALESCE(SUM(quantity), 0)
                FROM products
                WHERE variant_of = ?1
            ),
            updated_at = ?2
        WHERE id = ?1
        "#,
    )
    .bind(base_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", base_id));
    }

    get_quantity_tx(conn, base_id).await
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
