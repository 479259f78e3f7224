//! # Payment Verifier
//!
//! Per-checkout authorization state machine for non-cash tenders.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  verify_payment(card)    ──► AwaitingOtp ──verify_otp──► Verified       │
//! │  verify_payment(ewallet) ──────────────────────────────► Verified       │
//! │                                                                         │
//! │  Both paths check, in order:                                            │
//! │    1. account exists            → AccountNotFound                       │
//! │    2. balance covers the amount → InsufficientBalance                   │
//! │    3. method-specific secret    → InvalidPin / wrong OTP                │
//! │                                                                         │
//! │  The balance check comes BEFORE the PIN step: a customer with an        │
//! │  empty wallet learns that without typing their PIN.                     │
//! │                                                                         │
//! │  Nothing here mutates balances. The debit happens inside the commit     │
//! │  transaction, and only against a Verified session.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use vela_core::validation::{validate_account_number, validate_pin};
use vela_core::{AccountType, CustomerAccount, PaymentMethod};
use vela_db::Database;

use crate::collaborators::Notifier;
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::session::{SessionStore, VerificationState};

// =============================================================================
// Outcome
// =============================================================================

/// How far verification has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    /// Card flow: a code was issued; call `verify_otp` next.
    AwaitingOtp,
    /// Authorization complete; the session token is ready for commit.
    Verified,
}

/// Result of `verify_payment`, handed back to the terminal.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    /// Token the terminal must echo to `verify_otp` and `complete_sale`.
    pub session_token: String,
    pub status: VerifyStatus,
    /// E-wallet only: balance the account would hold after the debit.
    /// A preview; nothing has been charged yet.
    pub balance_after_cents: Option<i64>,
    /// Dev-only passthrough of an undeliverable OTP. Always `None` unless
    /// `expose_undelivered_otp` is enabled AND delivery failed.
    pub debug_otp: Option<String>,
}

// =============================================================================
// Verifier
// =============================================================================

/// Authorizes card and e-wallet tenders before the pipeline commits.
pub struct PaymentVerifier {
    db: Database,
    sessions: SessionStore,
    notifier: Arc<dyn Notifier>,
    config: CheckoutConfig,
}

impl PaymentVerifier {
    /// Creates a verifier sharing the given session store with the pipeline.
    pub fn new(
        db: Database,
        sessions: SessionStore,
        notifier: Arc<dyn Notifier>,
        config: CheckoutConfig,
    ) -> Self {
        PaymentVerifier {
            db,
            sessions,
            notifier,
            config,
        }
    }

    /// Starts verification for a non-cash tender.
    ///
    /// E-wallet succeeds straight to `Verified` (PIN checked here); card
    /// issues a one-time code and parks the session in `AwaitingOtp`.
    pub async fn verify_payment(
        &self,
        method: PaymentMethod,
        account_number: &str,
        amount_cents: i64,
        pin: Option<&str>,
    ) -> CheckoutResult<VerifyOutcome> {
        if !method.requires_verification() {
            return Err(CheckoutError::InvalidCart {
                reason: "cash tenders do not use payment verification".to_string(),
            });
        }

        validate_account_number(account_number)?;

        let account = self
            .db
            .accounts()
            .get_by_number(account_number)
            .await?
            .ok_or_else(|| CheckoutError::AccountNotFound {
                account_number: account_number.to_string(),
            })?;

        // Balance sufficiency comes before any secret check.
        if account.balance_cents < amount_cents {
            return Err(CheckoutError::InsufficientBalance {
                account_number: account_number.to_string(),
                required_cents: amount_cents,
            });
        }

        match method {
            PaymentMethod::Ewallet => {
                self.verify_ewallet(&account, amount_cents, pin).await
            }
            PaymentMethod::Card => self.verify_card(&account, amount_cents).await,
            PaymentMethod::Cash => unreachable!("handled above"),
        }
    }

    async fn verify_ewallet(
        &self,
        account: &CustomerAccount,
        amount_cents: i64,
        pin: Option<&str>,
    ) -> CheckoutResult<VerifyOutcome> {
        if account.account_type != AccountType::Ewallet {
            return Err(CheckoutError::PaymentNotVerified {
                reason: format!("account {} is not an e-wallet", account.account_number),
            });
        }

        let pin = pin.ok_or(CheckoutError::InvalidPin)?;
        validate_pin(pin).map_err(|_| CheckoutError::InvalidPin)?;

        let pin_hash = account
            .pin_hash
            .as_deref()
            .ok_or(CheckoutError::InvalidPin)?;
        if hex::encode(Sha256::digest(pin.as_bytes())) != pin_hash {
            warn!(account = %account.account_number, "E-wallet PIN mismatch");
            return Err(CheckoutError::InvalidPin);
        }

        let token = self
            .sessions
            .create(
                &account.account_number,
                amount_cents,
                VerificationState::Verified,
            )
            .await;

        info!(account = %account.account_number, "E-wallet tender verified");

        Ok(VerifyOutcome {
            session_token: token,
            status: VerifyStatus::Verified,
            balance_after_cents: Some(account.balance_cents - amount_cents),
            debug_otp: None,
        })
    }

    async fn verify_card(
        &self,
        account: &CustomerAccount,
        amount_cents: i64,
    ) -> CheckoutResult<VerifyOutcome> {
        if account.account_type != AccountType::Bank {
            return Err(CheckoutError::PaymentNotVerified {
                reason: format!(
                    "account {} is not a bank account",
                    account.account_number
                ),
            });
        }

        let code = generate_otp_code();

        let token = self
            .sessions
            .create(
                &account.account_number,
                amount_cents,
                VerificationState::AwaitingOtp {
                    code: code.clone(),
                    issued_at: Utc::now(),
                    attempts: 0,
                },
            )
            .await;

        let delivered = self
            .notifier
            .send_message(
                &account.account_number,
                "Your verification code",
                &format!("Use code {code} to confirm your card payment."),
            )
            .await;

        let debug_otp = if delivered {
            debug!(account = %account.account_number, "OTP delivered");
            None
        } else {
            // Delivery failure never blocks the flow. The code is only
            // handed back under the dev-mode switch.
            warn!(account = %account.account_number, "OTP delivery failed");
            self.config.expose_undelivered_otp.then_some(code)
        };

        Ok(VerifyOutcome {
            session_token: token,
            status: VerifyStatus::AwaitingOtp,
            balance_after_cents: None,
            debug_otp,
        })
    }

    /// Confirms the one-time code for a card session.
    ///
    /// Codes expire after `otp_ttl` and allow `max_otp_attempts` failed
    /// tries; past either limit the session is dead and verification must
    /// restart from `verify_payment`.
    pub async fn verify_otp(&self, token: &str, code: &str) -> CheckoutResult<()> {
        let session =
            self.sessions
                .get(token)
                .await
                .ok_or_else(|| CheckoutError::PaymentNotVerified {
                    reason: "unknown or expired session".to_string(),
                })?;

        let (expected, issued_at, attempts) = match &session.state {
            VerificationState::AwaitingOtp {
                code,
                issued_at,
                attempts,
            } => (code.clone(), *issued_at, *attempts),
            VerificationState::Verified => return Ok(()),
        };

        let age = Utc::now().signed_duration_since(issued_at);
        if age.num_seconds() >= self.config.otp_ttl.as_secs() as i64 {
            self.sessions.remove(token).await;
            return Err(CheckoutError::PaymentNotVerified {
                reason: "verification code expired".to_string(),
            });
        }

        if attempts >= self.config.max_otp_attempts {
            self.sessions.remove(token).await;
            return Err(CheckoutError::PaymentNotVerified {
                reason: "too many failed attempts".to_string(),
            });
        }

        if code != expected {
            self.sessions
                .with_session_mut(token, |s| {
                    if let VerificationState::AwaitingOtp { attempts, .. } = &mut s.state {
                        *attempts += 1;
                    }
                })
                .await;
            return Err(CheckoutError::PaymentNotVerified {
                reason: "incorrect verification code".to_string(),
            });
        }

        self.sessions
            .with_session_mut(token, |s| s.state = VerificationState::Verified)
            .await;

        info!(account = %session.account_number, "Card tender verified");
        Ok(())
    }

    /// Whether the token is Verified for exactly this account. The commit
    /// pipeline's gate for non-cash sales.
    pub async fn is_verified(&self, token: &str, account_number: &str) -> bool {
        self.sessions.is_verified_for(token, account_number).await
    }

    /// The shared session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// A 6-digit one-time code.
fn generate_otp_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::testing::{FailingNotifier, RecordingNotifier};
    use crate::collaborators::NoopNotifier;
    use std::time::Duration;
    use vela_db::{Database, DbConfig};

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let now = Utc::now();
        for (number, account_type, balance, pin) in [
            ("BANK-1001", AccountType::Bank, 50_000_i64, None),
            ("WALLET-2001", AccountType::Ewallet, 2_000, Some("1234")),
            ("WALLET-2002", AccountType::Ewallet, 500, Some("1234")),
        ] {
            let account = CustomerAccount {
                id: uuid::Uuid::new_v4().to_string(),
                account_number: number.to_string(),
                holder_name: "Test".to_string(),
                account_type,
                balance_cents: balance,
                pin_hash: pin.map(|p| hex::encode(Sha256::digest(p.as_bytes()))),
                created_at: now,
                updated_at: now,
            };
            db.accounts().insert(&account).await.unwrap();
        }

        db
    }

    fn verifier_with(db: Database, notifier: Arc<dyn Notifier>, config: CheckoutConfig) -> PaymentVerifier {
        PaymentVerifier::new(db, SessionStore::new(), notifier, config)
    }

    #[tokio::test]
    async fn test_ewallet_happy_path_previews_balance() {
        let db = test_db().await;
        let verifier = verifier_with(db.clone(), Arc::new(NoopNotifier), CheckoutConfig::new("s1"));

        let outcome = verifier
            .verify_payment(PaymentMethod::Ewallet, "WALLET-2001", 1500, Some("1234"))
            .await
            .unwrap();

        assert_eq!(outcome.status, VerifyStatus::Verified);
        assert_eq!(outcome.balance_after_cents, Some(500));
        assert!(verifier.is_verified(&outcome.session_token, "WALLET-2001").await);

        // Preview only: nothing was debited.
        let account = db.accounts().get_by_number("WALLET-2001").await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 2_000);
    }

    #[tokio::test]
    async fn test_balance_checked_before_pin() {
        let db = test_db().await;
        let verifier = verifier_with(db, Arc::new(NoopNotifier), CheckoutConfig::new("s1"));

        // Balance 5.00, cart total 10.00: fails InsufficientBalance even
        // with no PIN supplied at all.
        let err = verifier
            .verify_payment(PaymentMethod::Ewallet, "WALLET-2002", 1000, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_ewallet_pin_mismatch() {
        let db = test_db().await;
        let verifier = verifier_with(db, Arc::new(NoopNotifier), CheckoutConfig::new("s1"));

        let err = verifier
            .verify_payment(PaymentMethod::Ewallet, "WALLET-2001", 100, Some("9999"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPin));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let db = test_db().await;
        let verifier = verifier_with(db, Arc::new(NoopNotifier), CheckoutConfig::new("s1"));

        let err = verifier
            .verify_payment(PaymentMethod::Card, "NOPE-0000", 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::AccountNotFound { .. }));
    }

    #[tokio::test]
    async fn test_card_otp_round_trip() {
        let db = test_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let verifier = verifier_with(db, notifier.clone(), CheckoutConfig::new("s1"));

        let outcome = verifier
            .verify_payment(PaymentMethod::Card, "BANK-1001", 1000, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, VerifyStatus::AwaitingOtp);
        assert!(outcome.debug_otp.is_none());
        assert!(!verifier.is_verified(&outcome.session_token, "BANK-1001").await);

        let code = notifier.last_code().unwrap();

        // Wrong code first: refused, still not verified.
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(verifier.verify_otp(&outcome.session_token, wrong).await.is_err());
        assert!(!verifier.is_verified(&outcome.session_token, "BANK-1001").await);

        verifier.verify_otp(&outcome.session_token, &code).await.unwrap();
        assert!(verifier.is_verified(&outcome.session_token, "BANK-1001").await);
    }

    #[tokio::test]
    async fn test_otp_attempt_budget() {
        let db = test_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = CheckoutConfig::new("s1").max_otp_attempts(2);
        let verifier = verifier_with(db, notifier.clone(), config);

        let outcome = verifier
            .verify_payment(PaymentMethod::Card, "BANK-1001", 1000, None)
            .await
            .unwrap();
        let code = notifier.last_code().unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..2 {
            assert!(verifier.verify_otp(&outcome.session_token, wrong).await.is_err());
        }
        // Budget exhausted: even the right code is refused and the
        // session is gone.
        assert!(verifier.verify_otp(&outcome.session_token, &code).await.is_err());
        assert!(verifier.sessions().get(&outcome.session_token).await.is_none());
    }

    #[tokio::test]
    async fn test_otp_expiry() {
        let db = test_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = CheckoutConfig::new("s1").otp_ttl(Duration::from_secs(0));
        let verifier = verifier_with(db, notifier.clone(), config);

        let outcome = verifier
            .verify_payment(PaymentMethod::Card, "BANK-1001", 1000, None)
            .await
            .unwrap();
        let code = notifier.last_code().unwrap();

        let err = verifier
            .verify_otp(&outcome.session_token, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotVerified { .. }));
    }

    #[tokio::test]
    async fn test_undelivered_otp_hidden_by_default() {
        let db = test_db().await;
        let verifier = verifier_with(db, Arc::new(FailingNotifier), CheckoutConfig::new("s1"));

        let outcome = verifier
            .verify_payment(PaymentMethod::Card, "BANK-1001", 1000, None)
            .await
            .unwrap();
        assert!(outcome.debug_otp.is_none());
    }

    #[tokio::test]
    async fn test_undelivered_otp_exposed_in_dev_mode() {
        let db = test_db().await;
        let config = CheckoutConfig::new("s1").expose_undelivered_otp(true);
        let verifier = verifier_with(db, Arc::new(FailingNotifier), config);

        let outcome = verifier
            .verify_payment(PaymentMethod::Card, "BANK-1001", 1000, None)
            .await
            .unwrap();

        let code = outcome.debug_otp.expect("dev mode returns the code");
        verifier.verify_otp(&outcome.session_token, &code).await.unwrap();
        assert!(verifier.is_verified(&outcome.session_token, "BANK-1001").await);
    }
}
