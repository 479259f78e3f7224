//! # Checkout Configuration
//!
//! Tunables for the commit pipeline and payment verifier. Follows the same
//! builder shape as `vela_db::DbConfig`.

use std::time::Duration;

use vela_core::TaxRate;

/// Configuration for the checkout engine.
///
/// ## Example
/// ```rust,ignore
/// let config = CheckoutConfig::new("s1")
///     .tax_rate(TaxRate::from_bps(825))
///     .deduct_in_sale_transaction(true);
/// ```
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Store this terminal sells for.
    pub store_id: String,

    /// Tax rate applied to every cart subtotal.
    /// Default: zero
    pub tax_rate: TaxRate,

    /// Whether stock deductions join the sale insert transaction.
    ///
    /// `true` (default): sale, line items and deductions commit or roll
    /// back together; an out-of-stock race aborts the whole checkout.
    ///
    /// `false`: deductions run after the sale commits, each in its own
    /// statement; partial failures surface as a `PartialStockUpdate`
    /// warning. For stores that cannot hold long write transactions.
    pub deduct_in_sale_transaction: bool,

    /// Dev-only: when OTP delivery fails, return the code in the verify
    /// outcome instead of requiring redelivery.
    /// Default: false. Never enable in production.
    pub expose_undelivered_otp: bool,

    /// How long an issued OTP stays valid.
    /// Default: 5 minutes
    pub otp_ttl: Duration,

    /// Failed OTP attempts allowed before the session must restart.
    /// Default: 5
    pub max_otp_attempts: u32,

    /// How long a verification session stays redeemable, Verified ones
    /// included. Abandoned sessions are reaped past this.
    /// Default: 15 minutes
    pub session_ttl: Duration,

    /// Timeout for each secondary-mirror call. Expiry is a warning, never
    /// a failed sale.
    /// Default: 2 seconds
    pub secondary_timeout: Duration,

    /// Sale-number regeneration attempts on unique-constraint collision.
    /// Default: 5
    pub sale_number_retries: u32,
}

impl CheckoutConfig {
    /// Creates a configuration for the given store with defaults.
    pub fn new(store_id: impl Into<String>) -> Self {
        CheckoutConfig {
            store_id: store_id.into(),
            tax_rate: TaxRate::zero(),
            deduct_in_sale_transaction: true,
            expose_undelivered_otp: false,
            otp_ttl: Duration::from_secs(300),
            max_otp_attempts: 5,
            session_ttl: crate::session::DEFAULT_SESSION_TTL,
            secondary_timeout: Duration::from_secs(2),
            sale_number_retries: 5,
        }
    }

    /// Sets the tax rate.
    pub fn tax_rate(mut self, rate: TaxRate) -> Self {
        self.tax_rate = rate;
        self
    }

    /// Sets whether deductions join the sale transaction.
    pub fn deduct_in_sale_transaction(mut self, join: bool) -> Self {
        self.deduct_in_sale_transaction = join;
        self
    }

    /// Enables the dev-only undelivered-OTP passthrough.
    pub fn expose_undelivered_otp(mut self, expose: bool) -> Self {
        self.expose_undelivered_otp = expose;
        self
    }

    /// Sets the OTP time-to-live.
    pub fn otp_ttl(mut self, ttl: Duration) -> Self {
        self.otp_ttl = ttl;
        self
    }

    /// Sets the failed-OTP attempt budget.
    pub fn max_otp_attempts(mut self, attempts: u32) -> Self {
        self.max_otp_attempts = attempts;
        self
    }

    /// Sets the verification-session time-to-live.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sets the secondary-mirror call timeout.
    pub fn secondary_timeout(mut self, timeout: Duration) -> Self {
        self.secondary_timeout = timeout;
        self
    }
}
