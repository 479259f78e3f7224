//! # Stock Movement Repository
//!
//! Append-only audit log of quantity changes.
//!
//! There is deliberately no UPDATE or DELETE in this module: the movement
//! log is the source of truth for reconciling the primary store against
//! the mirror, and a rewritable audit trail is no audit trail at all.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use vela_core::StockMovement;

const MOVEMENT_COLUMNS: &str = "id, product_id, store_id, movement_type, quantity_delta, \
     reference, notes, user_id, created_at";

/// Repository for stock movement reads.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Lists movements for one reference (e.g. a sale number), in append order.
    pub async fn list_by_reference(&self, reference: &str) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE reference = ?1 ORDER BY rowid"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Lists movements for one product, newest first.
    pub async fn list_by_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE product_id = ?1 ORDER BY rowid DESC LIMIT ?2"
        ))
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Counts all movements (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-Scoped Writes
// =============================================================================

/// Appends a stock movement row.
///
/// Movements for one sale are appended in cart order because the ledger
/// calls this once per plan item, in plan order, on the same connection.
pub async fn append_movement_tx(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
) -> DbResult<()> {
    debug!(
        product_id = %movement.product_id,
        delta = %movement.quantity_delta,
        reference = %movement.reference,
        "Appending stock movement"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, store_id, movement_type, quantity_delta,
            reference, notes, user_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(&movement.store_id)
    .bind(movement.movement_type)
    .bind(movement.quantity_delta)
    .bind(&movement.reference)
    .bind(&movement.notes)
    .bind(&movement.user_id)
    .bind(movement.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Generates a new movement ID.
pub fn generate_movement_id() -> String {
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
    use vela_core::{MovementType, Product};

    #[tokio::test]
    async fn test_append_and_list_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let product = Product {
            id: generate_product_id(),
            sku: "ABC".to_string(),
            name: "Test".to_string(),
            store_id: None,
            variant_of: None,
            price_cents: 100,
            quantity: 10,
            reorder_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        for delta in [-2_i64, -3] {
            let movement = StockMovement {
                id: generate_movement_id(),
                product_id: product.id.clone(),
                store_id: None,
                movement_type: MovementType::Sale,
                quantity_delta: delta,
                reference: "SALE-20260824-0001".to_string(),
                notes: None,
                user_id: "u1".to_string(),
                created_at: now,
            };
            append_movement_tx(&mut tx, &movement).await.unwrap();
        }
        tx.commit().await.unwrap();

        let movements = db
            .movements()
            .list_by_reference("SALE-20260824-0001")
            .await
            .unwrap();
        assert_eq!(movements.len(), 2);
        // Append order preserved
        assert_eq!(movements[0].quantity_delta, -2);
        assert_eq!(movements[1].quantity_delta, -3);
        assert_eq!(movements[0].movement_type, MovementType::Sale);
    }
}
