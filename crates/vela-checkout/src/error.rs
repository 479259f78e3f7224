//! # Checkout Error Taxonomy
//!
//! The errors and warnings a terminal can see from the commit pipeline.
//!
//! ## Two Failure Classes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ERRORS (CheckoutError)              WARNINGS (CommitWarning)           │
//! │  ──────────────────────              ────────────────────────           │
//! │  Abort before/with the primary       Attached to a SUCCESSFUL           │
//! │  commit; nothing was sold.           response; the primary committed.   │
//! │                                                                         │
//! │  InvalidCart                         PartialStockUpdate                 │
//! │  InsufficientStock                   SecondaryWriteFailed               │
//! │  InsufficientPayment                 AlertPublishFailed                 │
//! │  AccountNotFound                                                        │
//! │  InsufficientBalance                 The cashier must never be told a   │
//! │  InvalidPin                          sale failed when the primary       │
//! │  PaymentNotVerified                  record committed.                  │
//! │  Db (primary-store failure)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use vela_core::ValidationError;
use vela_db::DbError;

// =============================================================================
// Checkout Error
// =============================================================================

/// Errors that abort a checkout. None of these leaves a committed sale behind.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Cart failed structural validation (empty, bad quantity, unknown or
    /// inactive product).
    #[error("Invalid cart: {reason}")]
    InvalidCart { reason: String },

    /// Requested quantity exceeds what the primary store holds.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Tender does not satisfy the payment rule for its method
    /// (cash: `paid >= total`; card/e-wallet: `paid == total`).
    #[error("Insufficient payment: required {required_cents} cents, offered {offered_cents}")]
    InsufficientPayment {
        required_cents: i64,
        offered_cents: i64,
    },

    /// No customer account with that number.
    #[error("Account not found: {account_number}")]
    AccountNotFound { account_number: String },

    /// Account balance cannot cover the amount.
    #[error("Insufficient balance on {account_number}: required {required_cents} cents")]
    InsufficientBalance {
        account_number: String,
        required_cents: i64,
    },

    /// E-wallet PIN did not match the stored hash.
    #[error("Invalid PIN")]
    InvalidPin,

    /// Non-cash sale attempted without a Verified session for the supplied
    /// account, or the OTP step failed (wrong code, expired, attempts
    /// exhausted).
    #[error("Payment not verified: {reason}")]
    PaymentNotVerified { reason: String },

    /// Primary-store failure. Fatal: the checkout aborts.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        CheckoutError::InvalidCart {
            reason: err.to_string(),
        }
    }
}

impl CheckoutError {
    /// Stable error kind for the terminal protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::InvalidCart { .. } => "InvalidCart",
            CheckoutError::InsufficientStock { .. } => "InsufficientStock",
            CheckoutError::InsufficientPayment { .. } => "InsufficientPayment",
            CheckoutError::AccountNotFound { .. } => "AccountNotFound",
            CheckoutError::InsufficientBalance { .. } => "InsufficientBalance",
            CheckoutError::InvalidPin => "InvalidPin",
            CheckoutError::PaymentNotVerified { .. } => "PaymentNotVerified",
            CheckoutError::Db(_) => "StoreError",
        }
    }
}

/// Result type for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

// =============================================================================
// Commit Warnings
// =============================================================================

/// Non-fatal conditions attached to a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code")]
pub enum CommitWarning {
    /// Some deductions applied and some failed while running outside the
    /// sale transaction. The movement log plus this warning give
    /// reconciliation everything it needs; the mismatch is never silent.
    PartialStockUpdate {
        applied: Vec<String>,
        failed: Vec<String>,
    },

    /// The secondary mirror write failed or timed out. The primary record
    /// is intact; a later diff-and-republish pass can repair the mirror.
    SecondaryWriteFailed { reason: String },

    /// A low-stock alert upsert failed while running outside the sale
    /// transaction.
    AlertPublishFailed { product_id: String, reason: String },
}

impl CommitWarning {
    /// Stable warning code for the terminal protocol.
    pub fn code(&self) -> &'static str {
        match self {
            CommitWarning::PartialStockUpdate { .. } => "PartialStockUpdate",
            CommitWarning::SecondaryWriteFailed { .. } => "SecondaryWriteFailed",
            CommitWarning::AlertPublishFailed { .. } => "AlertPublishFailed",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
