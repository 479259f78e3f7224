//! # Commit Pipeline
//!
//! The sale-completion transaction: one entry point (`complete_sale`) that
//! takes a cart plus tender and either commits everything or nothing.
//!
//! ## Fixed Step Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate cart shape                                                 │
//! │  2. reserve: availability check, no mutation (primary reads only)       │
//! │  3. money: subtotal → tax → total → tender rule → change                │
//! │  4. payment gate: non-cash needs a Verified session for this account    │
//! │  ┌─── one transaction ──────────────────────────────────────────────┐   │
//! │  │ 5. debit account (non-cash, guarded)                             │   │
//! │  │ 6. insert sale + line items (unique sale number, retry on clash) │   │
//! │  │ 7. deduct stock + movements + cascades + low-stock alerts        │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │  8. mirror to secondary (timeout-bounded; failure = warning)            │
//! │  9. cache invalidation ping (fire and forget)                           │
//! │                                                                         │
//! │  Success means steps 1-7 all succeeded. Steps 8-9 run after the         │
//! │  primary committed and can only ever attach warnings.                   │
//! │                                                                         │
//! │  With `deduct_in_sale_transaction = false`, step 7's deductions and     │
//! │  alerts move after the commit and degrade the same way: warnings,       │
//! │  never a retroactive failure.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use vela_core::money::Money;
use vela_core::validation::{validate_cart_size, validate_payment_amount};
use vela_core::{PaymentMethod, Sale, SaleLineItem, SaleStatus};
use vela_db::repository::account::debit_account_tx;
use vela_db::repository::sale::{
    generate_line_item_id, generate_sale_id, insert_line_item_tx, insert_sale_tx,
};
use vela_db::{Database, DbError};

use crate::alerts::AlertPublisher;
use crate::collaborators::{CacheInvalidator, NoopCacheInvalidator, NoopNotifier, Notifier};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult, CommitWarning};
use crate::ledger::{AppliedDeduction, CartLine, DeductionPlan, StockLedger};
use crate::mirror::{DualWriteReport, MirrorError, MirrorStore, NullMirror, WriteOutcome};
use crate::session::{SessionStore, VerificationState};
use crate::verifier::PaymentVerifier;

// =============================================================================
// Request / Receipt
// =============================================================================

/// The terminal operator on whose behalf a sale commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cashier {
    pub id: String,
    pub name: String,
}

/// A complete-sale request from the terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Cart lines, in the order the cashier scanned them.
    pub items: Vec<CartLine>,
    pub payment_method: PaymentMethod,
    /// Tender offered, in cents. Cash: `>= total`. Card/e-wallet: `== total`.
    pub amount_paid_cents: i64,
    pub customer_name: Option<String>,
    /// Required for card and e-wallet tenders.
    pub account_number: Option<String>,
    /// Verified session token from the payment verifier. Required for card
    /// and e-wallet tenders.
    pub session_token: Option<String>,
}

/// What the terminal prints after a successful commit.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub sale_id: String,
    pub sale_number: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub change_cents: i64,
    /// Non-fatal conditions. The sale committed; these flag follow-up work.
    pub warnings: Vec<CommitWarning>,
    pub dual_write: DualWriteReport,
}

// =============================================================================
// Pipeline
// =============================================================================

/// The checkout engine for one store's terminals.
pub struct CheckoutPipeline {
    db: Database,
    config: CheckoutConfig,
    ledger: StockLedger,
    alerts: AlertPublisher,
    verifier: PaymentVerifier,
    sessions: SessionStore,
    mirror: Arc<dyn MirrorStore>,
    cache: Arc<dyn CacheInvalidator>,
}

impl CheckoutPipeline {
    /// Creates a pipeline with no mirror, no cache hookup and a no-op
    /// notifier. Wire real collaborators with the `with_*` builders.
    pub fn new(db: Database, config: CheckoutConfig) -> Self {
        let sessions = SessionStore::with_ttl(config.session_ttl);
        CheckoutPipeline {
            ledger: StockLedger::new(db.clone()),
            alerts: AlertPublisher::new(db.clone()),
            verifier: PaymentVerifier::new(
                db.clone(),
                sessions.clone(),
                Arc::new(NoopNotifier),
                config.clone(),
            ),
            sessions,
            mirror: Arc::new(NullMirror),
            cache: Arc::new(NoopCacheInvalidator),
            db,
            config,
        }
    }

    /// Sets the notifier the payment verifier delivers OTP codes through.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.verifier = PaymentVerifier::new(
            self.db.clone(),
            self.sessions.clone(),
            notifier,
            self.config.clone(),
        );
        self
    }

    /// Sets the secondary mirror store.
    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorStore>) -> Self {
        self.mirror = mirror;
        self
    }

    /// Sets the cache invalidator pinged after each commit.
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// The payment verifier sharing this pipeline's session store.
    pub fn verifier(&self) -> &PaymentVerifier {
        &self.verifier
    }

    /// Commits a sale.
    ///
    /// Atomic on the primary store: on any error, no sale row, no line
    /// item, no movement, no balance change exists. On success the receipt
    /// may still carry warnings for the post-commit, best-effort steps.
    #[instrument(skip(self, request), fields(store_id = %self.config.store_id, cashier = %cashier.id))]
    pub async fn complete_sale(
        &self,
        cashier: &Cashier,
        request: CheckoutRequest,
    ) -> CheckoutResult<CheckoutReceipt> {
        // 1-2. Cart shape, then availability. Neither mutates anything.
        validate_cart_size(request.items.len())?;
        validate_payment_amount(request.amount_paid_cents)?;
        let plan = self.ledger.reserve_and_validate(&request.items).await?;

        // 3. Money, all in integer cents.
        let subtotal = Money::from_cents(plan.subtotal_cents());
        let tax = subtotal.calculate_tax(self.config.tax_rate);
        let total = subtotal + tax;
        let change = self.apply_tender_rule(request.payment_method, request.amount_paid_cents, total)?;

        // 4. Payment gate. Non-cash tenders must arrive pre-verified.
        let account_number = self.check_payment_gate(&request, total.cents()).await?;

        // 5-7. The commit transaction, retried on sale-number collision.
        let (sale, items, applied) = self
            .commit_primary(cashier, &request, &plan, subtotal, tax, total, change, account_number.as_deref())
            .await?;

        let mut warnings = Vec::new();

        // 7b. Deferred deductions for stores that keep write transactions
        // short. The sale is already committed; failures become warnings.
        let applied = match applied {
            Some(applied) => applied,
            None => {
                let (applied, failed) = self
                    .ledger
                    .apply_deductions_best_effort(&plan, &sale.sale_number, &cashier.id)
                    .await;
                if !failed.is_empty() {
                    warn!(sale_number = %sale.sale_number, failed = ?failed, "Partial stock update");
                    warnings.push(CommitWarning::PartialStockUpdate {
                        applied: applied.iter().map(|a| a.sku.clone()).collect(),
                        failed,
                    });
                }
                warnings.extend(self.alerts.publish(&applied).await);
                applied
            }
        };

        // 8. Mirror, bounded by the secondary timeout.
        let secondary = self.mirror_commit(&sale, &items, &plan, &applied).await;
        if let WriteOutcome::Failed { reason } = &secondary {
            warn!(sale_number = %sale.sale_number, reason = %reason, "Secondary write failed");
            warnings.push(CommitWarning::SecondaryWriteFailed {
                reason: reason.clone(),
            });
        }

        // 9. Cache ping, then retire the verification session.
        self.cache.invalidate_products(&touched_products(&plan, &applied)).await;
        if let Some(token) = &request.session_token {
            self.sessions.remove(token).await;
        }

        info!(
            sale_number = %sale.sale_number,
            total_cents = %sale.total_cents,
            warnings = warnings.len(),
            "Sale committed"
        );

        Ok(CheckoutReceipt {
            sale_id: sale.id,
            sale_number: sale.sale_number,
            subtotal_cents: subtotal.cents(),
            tax_cents: tax.cents(),
            total_cents: total.cents(),
            change_cents: change.cents(),
            warnings,
            dual_write: DualWriteReport {
                primary: WriteOutcome::Committed,
                secondary,
            },
        })
    }

    /// Tender rule: cash may overpay (change back), card and e-wallet must
    /// match the total exactly.
    fn apply_tender_rule(
        &self,
        method: PaymentMethod,
        paid_cents: i64,
        total: Money,
    ) -> CheckoutResult<Money> {
        let paid = Money::from_cents(paid_cents);
        let covered = match method {
            PaymentMethod::Cash => paid >= total,
            PaymentMethod::Card | PaymentMethod::Ewallet => paid == total,
        };
        if !covered {
            return Err(CheckoutError::InsufficientPayment {
                required_cents: total.cents(),
                offered_cents: paid_cents,
            });
        }

        Ok(match method {
            PaymentMethod::Cash => paid - total,
            _ => Money::zero(),
        })
    }

    /// Non-cash gate: the request must carry a session Verified for exactly
    /// this account and exactly this total. Returns the account to debit.
    async fn check_payment_gate(
        &self,
        request: &CheckoutRequest,
        total_cents: i64,
    ) -> CheckoutResult<Option<String>> {
        if !request.payment_method.requires_verification() {
            return Ok(None);
        }

        let account_number =
            request
                .account_number
                .as_deref()
                .ok_or_else(|| CheckoutError::InvalidCart {
                    reason: "non-cash tender requires an account number".to_string(),
                })?;
        let token = request
            .session_token
            .as_deref()
            .ok_or_else(|| CheckoutError::PaymentNotVerified {
                reason: "non-cash tender requires a verified session".to_string(),
            })?;

        let session =
            self.sessions
                .get(token)
                .await
                .ok_or_else(|| CheckoutError::PaymentNotVerified {
                    reason: "unknown or expired session".to_string(),
                })?;

        if session.state != VerificationState::Verified
            || session.account_number != account_number
        {
            return Err(CheckoutError::PaymentNotVerified {
                reason: "session is not verified for this account".to_string(),
            });
        }
        if session.amount_cents != total_cents {
            return Err(CheckoutError::PaymentNotVerified {
                reason: "verified amount does not match the sale total".to_string(),
            });
        }

        // Existence check up front so a vanished account reads as
        // AccountNotFound, not as a failed debit.
        self.db
            .accounts()
            .get_by_number(account_number)
            .await?
            .ok_or_else(|| CheckoutError::AccountNotFound {
                account_number: account_number.to_string(),
            })?;

        Ok(Some(account_number.to_string()))
    }

    /// Steps 5-7 in one transaction, retried on sale-number collision.
    ///
    /// Returns the committed sale, its items, and - in transactional
    /// deduction mode - the applied deductions (`None` means the caller
    /// runs deductions post-commit).
    #[allow(clippy::too_many_arguments)]
    async fn commit_primary(
        &self,
        cashier: &Cashier,
        request: &CheckoutRequest,
        plan: &DeductionPlan,
        subtotal: Money,
        tax: Money,
        total: Money,
        change: Money,
        account_number: Option<&str>,
    ) -> CheckoutResult<(Sale, Vec<SaleLineItem>, Option<Vec<AppliedDeduction>>)> {
        for _ in 0..self.config.sale_number_retries {
            let sale = Sale {
                id: generate_sale_id(),
                sale_number: generate_sale_number(),
                store_id: self.config.store_id.clone(),
                cashier_id: cashier.id.clone(),
                cashier_name: cashier.name.clone(),
                customer_name: request.customer_name.clone(),
                subtotal_cents: subtotal.cents(),
                tax_cents: tax.cents(),
                total_cents: total.cents(),
                payment_method: request.payment_method,
                amount_paid_cents: request.amount_paid_cents,
                change_cents: change.cents(),
                payment_reference: account_number.map(String::from),
                status: SaleStatus::Completed,
                created_at: Utc::now(),
            };

            let mut tx = self.db.begin().await?;

            // 5. Guarded debit. The verifier previewed the balance, but
            // this conditional decrement is what actually protects it.
            if let Some(account) = account_number {
                if !debit_account_tx(&mut tx, account, total.cents()).await? {
                    return Err(CheckoutError::InsufficientBalance {
                        account_number: account.to_string(),
                        required_cents: total.cents(),
                    });
                }
            }

            // 6. Sale row; a number collision rolls back and retries with
            // a fresh number rather than pre-checking.
            match insert_sale_tx(&mut tx, &sale).await {
                Ok(()) => {}
                Err(err) if err.is_unique_violation() => {
                    warn!(sale_number = %sale.sale_number, "Sale number collision, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            let mut items = Vec::with_capacity(plan.items.len());
            for planned in &plan.items {
                let item = SaleLineItem {
                    id: generate_line_item_id(),
                    sale_id: sale.id.clone(),
                    product_id: planned.product_id.clone(),
                    quantity: planned.quantity,
                    unit_price_cents: planned.unit_price_cents,
                    created_at: sale.created_at,
                };
                insert_line_item_tx(&mut tx, &item).await?;
                items.push(item);
            }

            // 7. Deductions and alerts join the transaction by default.
            let applied = if self.config.deduct_in_sale_transaction {
                let applied = self
                    .ledger
                    .apply_deductions_tx(&mut tx, plan, &sale.sale_number, &cashier.id)
                    .await?;
                self.alerts.publish_tx(&mut tx, &applied).await?;
                Some(applied)
            } else {
                None
            };

            tx.commit()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

            return Ok((sale, items, applied));
        }

        Err(CheckoutError::Db(DbError::Internal(
            "could not allocate a unique sale number".to_string(),
        )))
    }

    /// Step 8: pushes the committed sale and the new stock levels to the
    /// secondary, bounded by the configured timeout.
    async fn mirror_commit(
        &self,
        sale: &Sale,
        items: &[SaleLineItem],
        plan: &DeductionPlan,
        applied: &[AppliedDeduction],
    ) -> WriteOutcome {
        let push = async {
            self.mirror.mirror_sale(sale, items).await?;

            for deduction in applied {
                self.mirror
                    .mirror_stock(&deduction.product_id, deduction.new_quantity)
                    .await?;
            }

            // Cascaded base products: mirror the re-summed quantity the
            // primary now holds.
            for base_id in cascaded_bases(plan) {
                if let Some(base) = self
                    .db
                    .products()
                    .get_by_id(&base_id)
                    .await
                    .map_err(MirrorError::from)?
                {
                    self.mirror.mirror_stock(&base.id, base.quantity).await?;
                }
            }

            Ok::<(), MirrorError>(())
        };

        match tokio::time::timeout(self.config.secondary_timeout, push).await {
            Ok(Ok(())) => WriteOutcome::Committed,
            Ok(Err(err)) => WriteOutcome::Failed {
                reason: err.to_string(),
            },
            Err(_) => WriteOutcome::Failed {
                reason: format!(
                    "secondary write timed out after {:?}",
                    self.config.secondary_timeout
                ),
            },
        }
    }
}

/// `SALE-YYYYMMDD-NNNN` with a random suffix. Uniqueness is enforced by the
/// database, not by this generator.
fn generate_sale_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("SALE-{}-{suffix:04}", Utc::now().format("%Y%m%d"))
}

/// Base products whose quantity was re-summed by a variant deduction.
fn cascaded_bases(plan: &DeductionPlan) -> Vec<String> {
    let mut bases: Vec<String> = plan
        .items
        .iter()
        .filter_map(|i| i.variant_of.clone())
        .collect();
    bases.sort();
    bases.dedup();
    bases
}

/// Every product a commit touched: the deducted ones plus cascaded bases.
fn touched_products(plan: &DeductionPlan, applied: &[AppliedDeduction]) -> Vec<String> {
    let mut ids: Vec<String> = applied.iter().map(|a| a.product_id.clone()).collect();
    ids.extend(cascaded_bases(plan));
    ids
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::testing::{RecordingInvalidator, RecordingNotifier};
    use crate::mirror::SqliteMirror;
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};
    use std::time::Duration;
    use vela_core::{AccountType, CustomerAccount, Product, TaxRate};
    use vela_db::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_product(
        db: &Database,
        sku: &str,
        price: i64,
        qty: i64,
        reorder: i64,
        base: Option<&str>,
    ) -> String {
        let now = Utc::now();
        let product = Product {
            id: uuid::Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: sku.to_string(),
            store_id: base.map(|_| "s1".to_string()),
            variant_of: base.map(String::from),
            price_cents: price,
            quantity: qty,
            reorder_level: reorder,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        product.id
    }

    async fn insert_account(db: &Database, number: &str, kind: AccountType, balance: i64) {
        let now = Utc::now();
        db.accounts()
            .insert(&CustomerAccount {
                id: uuid::Uuid::new_v4().to_string(),
                account_number: number.to_string(),
                holder_name: "Grace".to_string(),
                account_type: kind,
                balance_cents: balance,
                pin_hash: Some(hex::encode(Sha256::digest(b"1234"))),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    fn cashier() -> Cashier {
        Cashier {
            id: "u1".to_string(),
            name: "Ada".to_string(),
        }
    }

    fn cash_request(product_id: &str, quantity: i64, unit_price: i64, paid: i64) -> CheckoutRequest {
        CheckoutRequest {
            items: vec![CartLine {
                product_id: product_id.to_string(),
                quantity,
                unit_price_cents: unit_price,
            }],
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: paid,
            customer_name: None,
            account_number: None,
            session_token: None,
        }
    }

    /// Mirror whose writes always fail.
    struct FailingMirror;

    #[async_trait]
    impl MirrorStore for FailingMirror {
        async fn mirror_sale(
            &self,
            _sale: &Sale,
            _items: &[SaleLineItem],
        ) -> Result<(), MirrorError> {
            Err(MirrorError("secondary unreachable".to_string()))
        }

        async fn mirror_stock(&self, _id: &str, _qty: i64) -> Result<(), MirrorError> {
            Err(MirrorError("secondary unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cash_sale_happy_path() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        // Two at 2.50, a 10.00 note.
        let receipt = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 1000))
            .await
            .unwrap();

        assert_eq!(receipt.subtotal_cents, 500);
        assert_eq!(receipt.tax_cents, 0);
        assert_eq!(receipt.total_cents, 500);
        assert_eq!(receipt.change_cents, 500);
        assert!(receipt.warnings.is_empty());
        assert!(receipt.sale_number.starts_with("SALE-"));
        assert!(receipt.dual_write.primary.is_committed());
        assert!(receipt.dual_write.secondary.is_committed());

        // Stock down, movement logged, sale readable.
        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 3);

        let movements = db
            .movements()
            .list_by_reference(&receipt.sale_number)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity_delta, -2);

        let sale = db.sales().get_by_id(&receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.change_cents, 500);
        assert_eq!(sale.payment_reference, None);
        let items = db.sales().get_line_items(&receipt.sale_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price_cents, 250);
    }

    #[tokio::test]
    async fn test_tax_applied_to_total() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 1000, 5, 0, None).await;
        let config = CheckoutConfig::new("s1").tax_rate(TaxRate::from_bps(825));
        let pipeline = CheckoutPipeline::new(db, config);

        // 10.00 + 8.25% = 10.83; exact cash.
        let receipt = pipeline
            .complete_sale(&cashier(), cash_request(&id, 1, 1000, 1083))
            .await
            .unwrap();

        assert_eq!(receipt.tax_cents, 83);
        assert_eq!(receipt.total_cents, 1083);
        assert_eq!(receipt.change_cents, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_aborts_everything() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 1, 0, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let err = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 1000))
            .await
            .unwrap_err();

        match err {
            CheckoutError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Nothing committed.
        assert_eq!(db.sales().count().await.unwrap(), 0);
        assert_eq!(db.movements().count().await.unwrap(), 0);
        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 1);
    }

    #[tokio::test]
    async fn test_cash_underpayment_rejected() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let err = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 499))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientPayment { .. }));
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extreme_unit_price_rejected_before_money_math() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let err = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, i64::MAX, i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCart { .. }));
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let db = test_db().await;
        let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"));

        let request = CheckoutRequest {
            items: vec![],
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: 100,
            customer_name: None,
            account_number: None,
            session_token: None,
        };
        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCart { .. }));
    }

    #[tokio::test]
    async fn test_non_cash_requires_exact_tender() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "WALLET-1", AccountType::Ewallet, 10_000).await;
        let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"));

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Ewallet,
            amount_paid_cents: 600, // total is 500
            customer_name: None,
            account_number: Some("WALLET-1".to_string()),
            session_token: Some("whatever".to_string()),
        };
        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientPayment { .. }));
    }

    #[tokio::test]
    async fn test_non_cash_without_verified_session_rejected() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "WALLET-1", AccountType::Ewallet, 10_000).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Ewallet,
            amount_paid_cents: 500,
            customer_name: None,
            account_number: Some("WALLET-1".to_string()),
            session_token: Some("no-such-token".to_string()),
        };
        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotVerified { .. }));

        // No debit happened.
        let account = db.accounts().get_by_number("WALLET-1").await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 10_000);
    }

    #[tokio::test]
    async fn test_ewallet_sale_debits_inside_commit() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "WALLET-1", AccountType::Ewallet, 2_000).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let outcome = pipeline
            .verifier()
            .verify_payment(PaymentMethod::Ewallet, "WALLET-1", 500, Some("1234"))
            .await
            .unwrap();

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id.clone(),
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Ewallet,
            amount_paid_cents: 500,
            customer_name: Some("Grace".to_string()),
            account_number: Some("WALLET-1".to_string()),
            session_token: Some(outcome.session_token.clone()),
        };
        let receipt = pipeline.complete_sale(&cashier(), request).await.unwrap();

        assert_eq!(receipt.change_cents, 0);
        let account = db.accounts().get_by_number("WALLET-1").await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 1_500);

        let sale = db.sales().get_by_id(&receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.payment_reference.as_deref(), Some("WALLET-1"));

        // The session is single-use.
        assert!(pipeline.sessions.get(&outcome.session_token).await.is_none());
    }

    #[tokio::test]
    async fn test_abandoned_session_expires_before_commit() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "WALLET-1", AccountType::Ewallet, 2_000).await;
        let config = CheckoutConfig::new("s1").session_ttl(Duration::ZERO);
        let pipeline = CheckoutPipeline::new(db.clone(), config);

        // Verified, then abandoned past the ttl.
        let outcome = pipeline
            .verifier()
            .verify_payment(PaymentMethod::Ewallet, "WALLET-1", 500, Some("1234"))
            .await
            .unwrap();

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Ewallet,
            amount_paid_cents: 500,
            customer_name: None,
            account_number: Some("WALLET-1".to_string()),
            session_token: Some(outcome.session_token),
        };
        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotVerified { .. }));

        let account = db.accounts().get_by_number("WALLET-1").await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 2_000);
    }

    #[tokio::test]
    async fn test_session_for_other_account_rejected() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "WALLET-1", AccountType::Ewallet, 2_000).await;
        insert_account(&db, "WALLET-2", AccountType::Ewallet, 2_000).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let outcome = pipeline
            .verifier()
            .verify_payment(PaymentMethod::Ewallet, "WALLET-1", 500, Some("1234"))
            .await
            .unwrap();

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Ewallet,
            amount_paid_cents: 500,
            customer_name: None,
            account_number: Some("WALLET-2".to_string()),
            session_token: Some(outcome.session_token),
        };
        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotVerified { .. }));

        let account = db.accounts().get_by_number("WALLET-2").await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 2_000);
    }

    #[tokio::test]
    async fn test_session_amount_must_match_total() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "WALLET-1", AccountType::Ewallet, 2_000).await;
        let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"));

        // Verified for 2.50, cart totals 5.00.
        let outcome = pipeline
            .verifier()
            .verify_payment(PaymentMethod::Ewallet, "WALLET-1", 250, Some("1234"))
            .await
            .unwrap();

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Ewallet,
            amount_paid_cents: 500,
            customer_name: None,
            account_number: Some("WALLET-1".to_string()),
            session_token: Some(outcome.session_token),
        };
        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotVerified { .. }));
    }

    #[tokio::test]
    async fn test_card_sale_full_otp_flow() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        insert_account(&db, "BANK-1", AccountType::Bank, 50_000).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"))
            .with_notifier(notifier.clone());

        let outcome = pipeline
            .verifier()
            .verify_payment(PaymentMethod::Card, "BANK-1", 500, None)
            .await
            .unwrap();

        let request = CheckoutRequest {
            items: vec![CartLine {
                product_id: id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payment_method: PaymentMethod::Card,
            amount_paid_cents: 500,
            customer_name: None,
            account_number: Some("BANK-1".to_string()),
            session_token: Some(outcome.session_token.clone()),
        };

        // Still AwaitingOtp: the commit must refuse.
        let err = pipeline
            .complete_sale(&cashier(), request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotVerified { .. }));

        let code = notifier.last_code().unwrap();
        pipeline
            .verifier()
            .verify_otp(&outcome.session_token, &code)
            .await
            .unwrap();

        let receipt = pipeline.complete_sale(&cashier(), request).await.unwrap();
        assert_eq!(receipt.total_cents, 500);

        let account = db.accounts().get_by_number("BANK-1").await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 49_500);
    }

    #[tokio::test]
    async fn test_variant_sale_cascades_to_base() {
        let db = test_db().await;
        let base = insert_product(&db, "ABC", 250, 8, 0, None).await;
        let v1 = insert_product(&db, "ABC-S1", 250, 3, 0, Some(&base)).await;
        let _v2 = insert_product(&db, "ABC-S2", 250, 5, 0, Some(&base)).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        pipeline
            .complete_sale(&cashier(), cash_request(&v1, 2, 250, 500))
            .await
            .unwrap();

        let variant = db.products().get_by_id(&v1).await.unwrap().unwrap();
        assert_eq!(variant.quantity, 1);
        let base = db.products().get_by_id(&base).await.unwrap().unwrap();
        assert_eq!(base.quantity, 6);
    }

    #[tokio::test]
    async fn test_low_stock_alert_raised_in_commit() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 4, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        // 5 -> 3, reorder level 4: crossing.
        let receipt = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 500))
            .await
            .unwrap();
        assert!(receipt.warnings.is_empty());

        let alert = db.alerts().get_by_product(&id).await.unwrap().unwrap();
        assert_eq!(alert.current_quantity, 3);
    }

    #[tokio::test]
    async fn test_mirror_failure_is_a_warning_not_an_error() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"))
            .with_mirror(Arc::new(FailingMirror));

        let receipt = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 500))
            .await
            .unwrap();

        // The sale succeeded on the primary...
        assert_eq!(db.sales().count().await.unwrap(), 1);
        assert!(receipt.dual_write.primary.is_committed());
        // ...and the mirror failure is visible, not fatal.
        assert!(!receipt.dual_write.secondary.is_committed());
        assert_eq!(receipt.warnings.len(), 1);
        assert_eq!(receipt.warnings[0].code(), "SecondaryWriteFailed");
    }

    #[tokio::test]
    async fn test_mirror_receives_sale_and_stock() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;

        let secondary = test_db().await;
        // The secondary carries the same product at a stale quantity.
        let now = Utc::now();
        secondary
            .products()
            .insert(&Product {
                id: id.clone(),
                sku: "ABC".to_string(),
                name: "ABC".to_string(),
                store_id: None,
                variant_of: None,
                price_cents: 250,
                quantity: 99,
                reorder_level: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"))
            .with_mirror(Arc::new(SqliteMirror::new(secondary.clone())));

        let receipt = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 500))
            .await
            .unwrap();
        assert!(receipt.dual_write.secondary.is_committed());

        let mirrored = secondary
            .sales()
            .get_by_number(&receipt.sale_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mirrored.total_cents, 500);
        let product = secondary.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 3);
    }

    #[tokio::test]
    async fn test_transactional_mode_aborts_on_mid_plan_shortfall() {
        let db = test_db().await;
        // Reserve checks lines independently, so two lines of 3 against a
        // stock of 4 pass the plan but cannot both apply.
        let id = insert_product(&db, "ABC", 100, 4, 0, None).await;
        let pipeline = CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1"));

        let request = CheckoutRequest {
            items: vec![
                CartLine {
                    product_id: id.clone(),
                    quantity: 3,
                    unit_price_cents: 100,
                },
                CartLine {
                    product_id: id.clone(),
                    quantity: 3,
                    unit_price_cents: 100,
                },
            ],
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: 600,
            customer_name: None,
            account_number: None,
            session_token: None,
        };

        let err = pipeline.complete_sale(&cashier(), request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));

        // All-or-nothing: the first line's deduction rolled back too.
        assert_eq!(db.sales().count().await.unwrap(), 0);
        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 4);
    }

    #[tokio::test]
    async fn test_deferred_mode_surfaces_partial_stock_update() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 100, 4, 0, None).await;
        let config = CheckoutConfig::new("s1").deduct_in_sale_transaction(false);
        let pipeline = CheckoutPipeline::new(db.clone(), config);

        let request = CheckoutRequest {
            items: vec![
                CartLine {
                    product_id: id.clone(),
                    quantity: 3,
                    unit_price_cents: 100,
                },
                CartLine {
                    product_id: id.clone(),
                    quantity: 3,
                    unit_price_cents: 100,
                },
            ],
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: 600,
            customer_name: None,
            account_number: None,
            session_token: None,
        };

        // The sale commits; the second deduction fails and is surfaced.
        let receipt = pipeline.complete_sale(&cashier(), request).await.unwrap();
        assert_eq!(db.sales().count().await.unwrap(), 1);

        let partial = receipt
            .warnings
            .iter()
            .find(|w| w.code() == "PartialStockUpdate")
            .expect("partial update surfaced");
        match partial {
            CommitWarning::PartialStockUpdate { applied, failed } => {
                assert_eq!(applied, &vec!["ABC".to_string()]);
                assert_eq!(failed, &vec!["ABC".to_string()]);
            }
            _ => unreachable!(),
        }

        // First line applied and stayed applied.
        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 1);
    }

    #[tokio::test]
    async fn test_cache_pinged_after_commit() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        let invalidator = Arc::new(RecordingInvalidator::default());
        let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"))
            .with_cache(invalidator.clone());

        pipeline
            .complete_sale(&cashier(), cash_request(&id, 1, 250, 250))
            .await
            .unwrap();

        assert_eq!(*invalidator.pinged.lock().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_racing_checkouts_never_oversell() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 3, 0, None).await;
        let pipeline = Arc::new(CheckoutPipeline::new(db.clone(), CheckoutConfig::new("s1")));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let pipeline = Arc::clone(&pipeline);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                pipeline
                    .complete_sale(&cashier(), cash_request(&id, 1, 250, 250))
                    .await
            }));
        }

        let mut committed = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(CheckoutError::InsufficientStock { .. }) => refused += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        // Exactly the available stock sold, never more.
        assert_eq!(committed, 3);
        assert_eq!(refused, 2);
        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 0);
        assert_eq!(db.sales().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_receipt_serializes_for_the_terminal() {
        let db = test_db().await;
        let id = insert_product(&db, "ABC", 250, 5, 0, None).await;
        let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"));

        let receipt = pipeline
            .complete_sale(&cashier(), cash_request(&id, 2, 250, 1000))
            .await
            .unwrap();

        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["total_cents"], 500);
        assert_eq!(json["change_cents"], 500);
        assert_eq!(json["dual_write"]["secondary"]["outcome"], "committed");
        assert!(json["sale_number"].as_str().unwrap().starts_with("SALE-"));
    }
}
