//! # Stock Ledger
//!
//! The sole writer of `Product.quantity`.
//!
//! ## Two-Phase Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  reserve_and_validate(lines)      apply_deductions_tx(conn, plan, ...)  │
//! │  ───────────────────────────      ─────────────────────────────────     │
//! │  • reads PRIMARY store only       • guarded decrement per item          │
//! │  • no mutation                    • movement row per item, cart order   │
//! │  • fails fast, before payment     • variant? full re-sum of the base    │
//! │    is touched                     • joins the sale transaction          │
//! │                                                                         │
//! │  The plan is only advisory: concurrency can invalidate it between       │
//! │  phases, and the guarded decrement is what actually prevents            │
//! │  overselling.                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use vela_core::validation::{validate_price_cents, validate_quantity};
use vela_core::{MovementType, StockMovement};
use vela_db::repository::movement::{append_movement_tx, generate_movement_id};
use vela_db::repository::product::{
    deduct_quantity_tx, get_quantity_tx, recompute_base_quantity_tx,
};
use vela_db::Database;

use crate::error::{CheckoutError, CheckoutResult};

// =============================================================================
// Cart and Plan Types
// =============================================================================

/// One line of the terminal's cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    /// Unit price the terminal displayed, in cents. Frozen into the sale.
    pub unit_price_cents: i64,
}

/// A validated, not-yet-applied deduction.
#[derive(Debug, Clone)]
pub struct PlannedDeduction {
    pub product_id: String,
    pub sku: String,
    pub store_id: Option<String>,
    /// Base product to re-sum after deducting, if this is a variant.
    pub variant_of: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub reorder_level: i64,
}

/// Deduction plan for one cart, in cart order.
#[derive(Debug, Clone, Default)]
pub struct DeductionPlan {
    pub items: Vec<PlannedDeduction>,
}

impl DeductionPlan {
    /// Subtotal of the planned lines, in cents.
    pub fn subtotal_cents(&self) -> i64 {
        self.items
            .iter()
            .map(|i| i.unit_price_cents * i.quantity)
            .sum()
    }
}

/// One applied deduction, with the quantity observed after it.
#[derive(Debug, Clone)]
pub struct AppliedDeduction {
    pub product_id: String,
    pub sku: String,
    pub quantity: i64,
    pub new_quantity: i64,
    pub reorder_level: i64,
}

// =============================================================================
// Ledger
// =============================================================================

/// Exclusive writer of product quantities.
pub struct StockLedger {
    db: Database,
}

impl StockLedger {
    /// Creates a ledger over the primary store.
    pub fn new(db: Database) -> Self {
        StockLedger { db }
    }

    /// Validates availability and returns a deduction plan. No mutation.
    ///
    /// Quantities are read from the primary store only - the mirror may lag
    /// and must never influence what we promise a cashier.
    ///
    /// ## Errors
    /// * `InvalidCart` - unknown or inactive product, bad quantity/price
    /// * `InsufficientStock` - any line exceeds current availability
    pub async fn reserve_and_validate(&self, lines: &[CartLine]) -> CheckoutResult<DeductionPlan> {
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            validate_quantity(line.quantity)?;
            validate_price_cents(line.unit_price_cents)?;

            let product = self
                .db
                .products()
                .get_by_id(&line.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| CheckoutError::InvalidCart {
                    reason: format!("unknown or inactive product: {}", line.product_id),
                })?;

            if product.quantity < line.quantity {
                return Err(CheckoutError::InsufficientStock {
                    sku: product.sku,
                    available: product.quantity,
                    requested: line.quantity,
                });
            }

            items.push(PlannedDeduction {
                product_id: product.id,
                sku: product.sku,
                store_id: product.store_id,
                variant_of: product.variant_of,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                reorder_level: product.reorder_level,
            });
        }

        debug!(lines = items.len(), "Deduction plan validated");
        Ok(DeductionPlan { items })
    }

    /// Applies a plan on the commit transaction's connection.
    ///
    /// Per item, in cart order: guarded decrement, movement append, and -
    /// for variants - a full re-sum of the base product. A failed guard
    /// aborts with `InsufficientStock`; the caller's transaction rollback
    /// undoes everything already applied.
    pub async fn apply_deductions_tx(
        &self,
        conn: &mut SqliteConnection,
        plan: &DeductionPlan,
        reference: &str,
        user_id: &str,
    ) -> CheckoutResult<Vec<AppliedDeduction>> {
        let mut applied = Vec::with_capacity(plan.items.len());

        for item in &plan.items {
            applied.push(apply_one(conn, item, reference, user_id).await?);
        }

        Ok(applied)
    }

    /// Applies a plan outside the sale transaction, one item per statement.
    ///
    /// For stores configured with `deduct_in_sale_transaction = false`. A
    /// failure partway does NOT undo earlier items; the caller surfaces the
    /// split as a `PartialStockUpdate` warning.
    ///
    /// ## Returns
    /// `(applied, failed_skus)`
    pub async fn apply_deductions_best_effort(
        &self,
        plan: &DeductionPlan,
        reference: &str,
        user_id: &str,
    ) -> (Vec<AppliedDeduction>, Vec<String>) {
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for item in &plan.items {
            let result = async {
                let mut tx = self.db.begin().await?;
                let one = apply_one(&mut tx, item, reference, user_id).await?;
                tx.commit()
                    .await
                    .map_err(|e| CheckoutError::Db(vela_db::DbError::TransactionFailed(e.to_string())))?;
                Ok::<_, CheckoutError>(one)
            }
            .await;

            match result {
                Ok(one) => applied.push(one),
                Err(err) => {
                    warn!(sku = %item.sku, error = %err, "Best-effort deduction failed");
                    failed.push(item.sku.clone());
                }
            }
        }

        (applied, failed)
    }
}

/// Deduct one item: guarded decrement, movement append, cascade.
async fn apply_one(
    conn: &mut SqliteConnection,
    item: &PlannedDeduction,
    reference: &str,
    user_id: &str,
) -> CheckoutResult<AppliedDeduction> {
    if !deduct_quantity_tx(conn, &item.product_id, item.quantity).await? {
        // Another terminal won the race since the plan was made.
        let available = get_quantity_tx(conn, &item.product_id).await.unwrap_or(0);
        return Err(CheckoutError::InsufficientStock {
            sku: item.sku.clone(),
            available,
            requested: item.quantity,
        });
    }

    let movement = StockMovement {
        id: generate_movement_id(),
        product_id: item.product_id.clone(),
        store_id: item.store_id.clone(),
        movement_type: MovementType::Sale,
        quantity_delta: -item.quantity,
        reference: reference.to_string(),
        notes: None,
        user_id: user_id.to_string(),
        created_at: Utc::now(),
    };
    append_movement_tx(conn, &movement).await?;

    if let Some(base_id) = &item.variant_of {
        recompute_base_quantity_tx(conn, base_id).await?;
    }

    let new_quantity = get_quantity_tx(conn, &item.product_id).await?;

    Ok(AppliedDeduction {
        product_id: item.product_id.clone(),
        sku: item.sku.clone(),
        quantity: item.quantity,
        new_quantity,
        reorder_level: item.reorder_level,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
