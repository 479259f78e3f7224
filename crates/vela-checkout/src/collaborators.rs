//! # External Collaborator Contracts
//!
//! Trait seams for services the checkout core consumes but does not own:
//! message delivery (OTP codes) and cache invalidation. Both are
//! best-effort from the pipeline's point of view; neither can abort a sale.

use async_trait::async_trait;
use tracing::debug;

// =============================================================================
// Notification
// =============================================================================

/// Delivers short messages to a customer (OTP codes during card checkout).
///
/// Returns `true` on delivery. A `false` never aborts the flow: the
/// verifier logs it and, in dev configurations only, passes the code back
/// to the terminal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, address: &str, subject: &str, body: &str) -> bool;
}

/// Notifier that drops every message. For deployments without a delivery
/// channel and for tests that don't care about OTP transport.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_message(&self, address: &str, subject: &str, _body: &str) -> bool {
        debug!(address = %address, subject = %subject, "NoopNotifier: dropping message");
        true
    }
}

// =============================================================================
// Cache Invalidation
// =============================================================================

/// Fire-and-forget ping telling surrounding systems to drop product/listing
/// snapshots after a commit.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_products(&self, product_ids: &[String]);
}

/// Cache invalidator that does nothing.
#[derive(Debug, Default)]
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate_products(&self, product_ids: &[String]) {
        debug!(count = product_ids.len(), "NoopCacheInvalidator: ignoring ping");
    }
}

// =============================================================================
// Test Doubles
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every message so tests can read the delivered OTP.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_message(&self, address: &str, subject: &str, body: &str) -> bool {
            self.sent.lock().unwrap().push((
                address.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            true
        }
    }

    impl RecordingNotifier {
        /// Extracts the 6-digit code from the last delivered message.
        pub fn last_code(&self) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            let (_, _, body) = sent.last()?;
            let code: String = body.chars().filter(|c| c.is_ascii_digit()).collect();
            (code.len() == 6).then_some(code)
        }
    }

    /// Notifier whose delivery always fails.
    #[derive(Debug, Default)]
    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_message(&self, _address: &str, _subject: &str, _body: &str) -> bool {
            false
        }
    }

    /// Records invalidation pings.
    #[derive(Debug, Default)]
    pub struct RecordingInvalidator {
        pub pinged: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CacheInvalidator for RecordingInvalidator {
        async fn invalidate_products(&self, product_ids: &[String]) {
            self.pinged.lock().unwrap().extend_from_slice(product_ids);
        }
    }
}
