//! # Domain Types
//!
//! Core domain types for the Vela POS sale-completion pipeline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐      │
//! │  │    Product      │   │      Sale       │   │  StockMovement   │      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────  │      │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  append-only     │      │
//! │  │  sku (business) │   │  sale_number    │   │  signed delta    │      │
//! │  │  variant_of     │   │  totals (cents) │   │  audit trail     │      │
//! │  │  quantity       │   │  tender         │   └──────────────────┘      │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │ CustomerAccount │   │  LowStockAlert  │                             │
//! │  │  balance, pin   │   │  one per product│                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID (sku, sale_number, account_number) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1 bp = 0.01%; 825 bps = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if the tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// The tender presented by the customer.
///
/// Cash needs no verification beyond amount sufficiency; card and e-wallet
/// must pass the payment verifier before the sale can commit.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Bank card, authorized via one-time code.
    Card,
    /// E-wallet, authorized via PIN.
    Ewallet,
}

impl PaymentMethod {
    /// Whether this tender requires the payment verifier.
    #[inline]
    pub const fn requires_verification(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Status of a sale. Sales are created directly in `Completed`; there is no
/// draft or void lifecycle in this core.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
}

/// A committed sale. Immutable once inserted.
///
/// Invariants: `total_cents = subtotal_cents + tax_cents`;
/// `amount_paid_cents >= total_cents` for cash and `== total_cents` otherwise.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    /// Business identifier: `SALE-YYYYMMDD-NNNN`, unique by DB constraint.
    pub sale_number: String,
    pub store_id: String,
    pub cashier_id: String,
    pub cashier_name: String,
    pub customer_name: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub amount_paid_cents: i64,
    pub change_cents: i64,
    /// External reference (verifier session token, card auth, etc.).
    pub payment_reference: Option<String>,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Returns the change due as Money.
    #[inline]
    pub fn change(&self) -> Money {
        Money::from_cents(self.change_cents)
    }
}

// =============================================================================
// Sale Line Item
// =============================================================================

/// A line item in a committed sale.
///
/// The unit price is frozen at sale time; later product price changes never
/// rewrite sale history.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLineItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Quantity sold (> 0).
    pub quantity: i64,
    /// Unit price in cents at time of sale (>= 0).
    pub unit_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleLineItem {
    /// Line total before tax (unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A sellable product, either a base record or a per-store variant.
///
/// ## Base / Variant Aggregation
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  base  "ABC"    store_id = NULL  variant_of = NULL   quantity = 8      │
/// │    ├── "ABC-S1" store_id = "s1"  variant_of = <ABC>  quantity = 3      │
/// │    └── "ABC-S2" store_id = "s2"  variant_of = <ABC>  quantity = 5      │
/// │                                                                         │
/// │  Invariant: base.quantity == Σ variants.quantity after every cascade.  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
/// The `variant_of` FK replaces SKU-suffix parsing; the `BASE-S<n>` naming is
/// a display convention only.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    /// Stock Keeping Unit - business identifier, unique.
    pub sku: String,
    pub name: String,
    /// NULL for base/aggregate records shared by variants.
    pub store_id: Option<String>,
    /// Base product this variant belongs to; NULL for base records.
    pub variant_of: Option<String>,
    pub price_cents: i64,
    /// Current stock level (>= 0, enforced by the stock ledger + DB CHECK).
    pub quantity: i64,
    /// Threshold at which a low-stock alert is raised; 0 disables alerts.
    pub reorder_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Whether this product is a per-store variant of a base record.
    #[inline]
    pub fn is_variant(&self) -> bool {
        self.variant_of.is_some()
    }

    /// Whether the new quantity crosses the low-stock threshold.
    #[inline]
    pub fn is_low_stock(quantity: i64, reorder_level: i64) -> bool {
        reorder_level > 0 && quantity <= reorder_level
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Cause of a stock movement.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Deduction caused by a committed sale.
    Sale,
    /// Goods received from a supplier.
    Receipt,
    /// Manual correction.
    Adjustment,
}

/// An immutable audit-log entry recording a signed quantity change.
///
/// Rows are appended only, never updated or deleted. For one sale, rows are
/// appended in cart order with the sale number as `reference`.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub store_id: Option<String>,
    pub movement_type: MovementType,
    /// Signed delta: negative for sales, positive for receipts.
    pub quantity_delta: i64,
    /// What caused the movement (sale number, receipt id, ...).
    pub reference: String,
    pub notes: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Customer Account
// =============================================================================

/// Kind of customer account.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Bank account backing card payments.
    Bank,
    /// E-wallet, protected by a PIN.
    Ewallet,
}

/// A customer account debitable during checkout.
///
/// Balance is mutated only by the payment debit inside the commit pipeline,
/// via a guarded conditional decrement.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub id: String,
    pub account_number: String,
    pub holder_name: String,
    pub account_type: AccountType,
    pub balance_cents: i64,
    /// SHA-256 hex of the PIN; e-wallet accounts only.
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerAccount {
    /// Returns the balance as Money.
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }
}

// =============================================================================
// Low Stock Alert
// =============================================================================

/// Alert lifecycle. The core only creates/updates `Pending` alerts;
/// resolution is a manual admin action.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Resolved,
}

/// A low-stock alert, keyed by product (one row per product, upserted).
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub id: String,
    pub product_id: String,
    /// Quantity observed when the alert was last raised.
    pub current_quantity: i64,
    pub reorder_level: i64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
