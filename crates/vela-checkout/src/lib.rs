//! # vela-checkout: Sale-Completion Engine for Vela POS
//!
//! The transaction pipeline that turns a cart plus tender into a committed,
//! immutable sale: availability checks, money math, payment verification,
//! the atomic commit, and the best-effort tail (mirror, cache, alerts).
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      vela-checkout (THIS CRATE)                         │
//! │                                                                         │
//! │  terminal ──► PaymentVerifier ──► SessionStore ◄── CheckoutPipeline     │
//! │  (card/e-wallet first)  (verifier.rs)  (session.rs)   (pipeline.rs)     │
//! │                                                            │            │
//! │               ┌────────────────────────────────────────────┤            │
//! │               ▼                    ▼                       ▼            │
//! │          StockLedger         AlertPublisher          MirrorStore        │
//! │          (ledger.rs)          (alerts.rs)            (mirror.rs)        │
//! │               │                    │                       │            │
//! │               ▼                    ▼                       ▼            │
//! │           vela-db (primary SQLite)                  secondary store     │
//! │                                                                         │
//! │  Hard rules the whole crate is built around:                            │
//! │   - the primary commit is atomic: sale, items, debit, deductions        │
//! │   - quantities and balances only move through guarded decrements        │
//! │   - everything after the commit can only attach warnings                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vela_checkout::{CheckoutConfig, CheckoutPipeline, CheckoutRequest, Cashier};
//! use vela_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("vela.db")).await?;
//! let pipeline = CheckoutPipeline::new(db, CheckoutConfig::new("s1"));
//!
//! // Card / e-wallet tenders verify first:
//! let outcome = pipeline.verifier()
//!     .verify_payment(method, "WALLET-2001", total_cents, Some("1234"))
//!     .await?;
//!
//! let receipt = pipeline.complete_sale(&cashier, request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod ledger;
pub mod mirror;
pub mod pipeline;
pub mod session;
pub mod verifier;

// =============================================================================
// Re-exports
// =============================================================================

pub use collaborators::{CacheInvalidator, NoopCacheInvalidator, NoopNotifier, Notifier};
pub use config::CheckoutConfig;
pub use error::{CheckoutError, CheckoutResult, CommitWarning};
pub use ledger::{CartLine, StockLedger};
pub use mirror::{DualWriteReport, MirrorError, MirrorStore, NullMirror, SqliteMirror, WriteOutcome};
pub use pipeline::{Cashier, CheckoutPipeline, CheckoutReceipt, CheckoutRequest};
pub use session::{CheckoutSession, SessionStore, VerificationState, DEFAULT_SESSION_TTL};
pub use verifier::{PaymentVerifier, VerifyOutcome, VerifyStatus};
