//! # Sale Repository
//!
//! Database operations for sales and their line items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. COMMIT (one transaction, opened by the pipeline)                    │
//! │     └── insert_sale_tx() → Sale { status: Completed }                   │
//! │     └── insert_line_item_tx() × N, in cart order                        │
//! │                                                                         │
//! │  2. THAT'S IT                                                           │
//! │     Sales are immutable: no draft state, no update path, no deletes.    │
//! │     There is no UPDATE statement anywhere in this module.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use vela_core::{Sale, SaleLineItem};

const SALE_COLUMNS: &str = "id, sale_number, store_id, cashier_id, cashier_name, \
     customer_name, subtotal_cents, tax_cents, total_cents, payment_method, \
     amount_paid_cents, change_cents, payment_reference, status, created_at";

/// Repository for sale reads. All writes go through the `*_tx` functions so
/// they join the commit transaction.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets a sale by its business sale number.
    pub async fn get_by_number(&self, sale_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE sale_number = ?1"
        ))
        .bind(sale_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets all line items for a sale, in insertion (cart) order.
    pub async fn get_line_items(&self, sale_id: &str) -> DbResult<Vec<SaleLineItem>> {
        let items = sqlx::query_as::<_, SaleLineItem>(
            r#"
            SELECT id, sale_id, product_id, quantity, unit_price_cents, created_at
            FROM sale_line_items
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Counts committed sales (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-Scoped Writes
// =============================================================================

/// Inserts a completed sale.
///
/// ## Errors
/// * `DbError::UniqueViolation` on a sale_number collision - the pipeline
///   regenerates the number and retries rather than pre-checking.
pub async fn insert_sale_tx(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, sale_number = %sale.sale_number, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
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
    .execute(conn)
    .await?;

    Ok(())
}

/// Inserts a sale line item.
///
/// The unit price is a snapshot taken at sale time; later product price
/// changes never rewrite sale history.
pub async fn insert_line_item_tx(conn: &mut SqliteConnection, item: &SaleLineItem) -> DbResult<()> {
    debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Inserting line item");

    sqlx::query(
        r#"
        INSERT INTO sale_line_items (
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
    .execute(conn)
    .await?;

    Ok(())
}

/// Generates a new sale ID.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new line item ID.
pub fn generate_line_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::generate_product_id;
    use chrono::Utc;
    use vela_core::{PaymentMethod, Product, SaleStatus};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn test_sale(number: &str) -> Sale {
        Sale {
            id: generate_sale_id(),
            sale_number: number.to_string(),
            store_id: "s1".to_string(),
            cashier_id: "u1".to_string(),
            cashier_name: "Ada".to_string(),
            customer_name: None,
            subtotal_cents: 500,
            tax_cents: 0,
            total_cents: 500,
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: 1000,
            change_cents: 500,
            payment_reference: None,
            status: SaleStatus::Completed,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_sale_with_items() {
        let db = test_db().await;
        let now = Utc::now();

        let product = Product {
            id: generate_product_id(),
            sku: "ABC".to_string(),
            name: "Test".to_string(),
            store_id: None,
            variant_of: None,
            price_cents: 250,
            quantity: 10,
            reorder_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();

        let sale = test_sale("SALE-20260824-0001");
        let item = SaleLineItem {
            id: generate_line_item_id(),
            sale_id: sale.id.clone(),
            product_id: product.id.clone(),
            quantity: 2,
            unit_price_cents: 250,
            created_at: now,
        };

        let mut tx = db.begin().await.unwrap();
        insert_sale_tx(&mut tx, &sale).await.unwrap();
        insert_line_item_tx(&mut tx, &item).await.unwrap();
        tx.commit().await.unwrap();

        let fetched = db
            .sales()
            .get_by_number("SALE-20260824-0001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.total_cents, 500);
        assert_eq!(fetched.payment_method, PaymentMethod::Cash);

        let items = db.sales().get_line_items(&sale.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_duplicate_sale_number_rejected() {
        let db = test_db().await;

        let mut tx = db.begin().await.unwrap();
        insert_sale_tx(&mut tx, &test_sale("SALE-20260824-0007"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let err = insert_sale_tx(&mut tx, &test_sale("SALE-20260824-0007"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}
