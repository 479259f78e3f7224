//! # vela-core: Pure Business Logic for Vela POS
//!
//! The heart of the sale-completion pipeline: domain types, money math and
//! validation rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vela POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                  POS Terminal (external)                        │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ checkout request                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               vela-checkout (pipeline, verifier, ledger)        │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ vela-core (THIS CRATE) ★                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌────────────┐  │    │
//! │  │   │   types   │  │   money   │  │   error   │  │ validation │  │    │
//! │  │   │  Product  │  │   Money   │  │Validation │  │   rules    │  │    │
//! │  │   │   Sale    │  │  TaxCalc  │  │           │  │            │  │    │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └────────────┘  │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                    vela-db (Database Layer)                     │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: deterministic, side-effect free
//! 2. **Integer Money**: all monetary values are cents (i64)
//! 3. **Explicit Errors**: typed enums, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::ValidationError;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum cart lines in a single checkout request.
///
/// ## Business Reason
/// Prevents runaway carts and keeps the commit transaction bounded.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity on a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum unit price on a single cart line, in cents (1,000,000.00).
///
/// ## Business Reason
/// The unit price is terminal-supplied and frozen into the sale, so it
/// must be bounded before any arithmetic: with this cap,
/// `MAX_UNIT_PRICE_CENTS × MAX_LINE_QUANTITY × MAX_CART_LINES` is still
/// under 10^13 cents, far inside i64.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;
