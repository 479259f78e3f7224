//! # Alert Publisher
//!
//! Raises low-stock alerts after deductions. One alert row per product,
//! upserted; recovery never clears an alert automatically - resolution is
//! a manual admin action on the alert repository.

use tracing::{info, warn};

use vela_core::Product;
use vela_db::repository::alert::upsert_pending_tx;
use vela_db::Database;

use crate::error::{CheckoutResult, CommitWarning};
use crate::ledger::AppliedDeduction;

/// Publishes low-stock alerts for deductions that crossed the threshold.
pub struct AlertPublisher {
    db: Database,
}

impl AlertPublisher {
    /// Creates a publisher over the primary store.
    pub fn new(db: Database) -> Self {
        AlertPublisher { db }
    }

    /// Upserts alerts on the commit transaction's connection.
    ///
    /// Runs inside the sale transaction so an alert failure aborts the
    /// commit cleanly instead of claiming success with missing alerts.
    pub async fn publish_tx(
        &self,
        conn: &mut sqlx::SqliteConnection,
        applied: &[AppliedDeduction],
    ) -> CheckoutResult<()> {
        for deduction in crossings(applied) {
            info!(
                sku = %deduction.sku,
                new_quantity = %deduction.new_quantity,
                reorder_level = %deduction.reorder_level,
                "Low stock threshold crossed"
            );
            upsert_pending_tx(
                conn,
                &deduction.product_id,
                deduction.new_quantity,
                deduction.reorder_level,
            )
            .await?;
        }
        Ok(())
    }

    /// Upserts alerts on the pool, after the sale already committed.
    ///
    /// Used in the non-transactional deduction mode. Failures are returned
    /// as warnings - the sale is already committed and must not be
    /// retroactively failed.
    pub async fn publish(&self, applied: &[AppliedDeduction]) -> Vec<CommitWarning> {
        let mut warnings = Vec::new();

        for deduction in crossings(applied) {
            info!(
                sku = %deduction.sku,
                new_quantity = %deduction.new_quantity,
                "Low stock threshold crossed"
            );
            if let Err(err) = self
                .db
                .alerts()
                .upsert_pending(
                    &deduction.product_id,
                    deduction.new_quantity,
                    deduction.reorder_level,
                )
                .await
            {
                warn!(sku = %deduction.sku, error = %err, "Alert upsert failed");
                warnings.push(CommitWarning::AlertPublishFailed {
                    product_id: deduction.product_id.clone(),
                    reason: err.to_string(),
                });
            }
        }

        warnings
    }
}

/// The deductions whose new quantity sits at or below the reorder level.
fn crossings(applied: &[AppliedDeduction]) -> impl Iterator<Item = &AppliedDeduction> {
    applied
        .iter()
        .filter(|d| Product::is_low_stock(d.new_quantity, d.reorder_level))
}

// =============================================================================
// Unit Tests
// =============================================================================
