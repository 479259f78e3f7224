//! # Checkout Sessions
//!
//! Explicit per-checkout verification state, keyed by a server-issued token.
//!
//! ## Why Explicit Sessions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pending OTP state must not live in ambient/global session storage:     │
//! │  two terminals verifying at once would trample each other.              │
//! │                                                                         │
//! │  verify_payment ──► token ──► terminal holds it ──► verify_otp(token)   │
//! │                                        │                                │
//! │                                        └─► complete_sale(token)         │
//! │                                                                         │
//! │  The token is the only handle; the store is a RwLock'd map owned by     │
//! │  the verifier, shared with the pipeline.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// How long any session may live, Verified ones included. An abandoned
/// checkout must not leave a redeemable authorization behind.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Verification progress of one checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationState {
    /// Card flow: a one-time code was issued and must be echoed back.
    AwaitingOtp {
        code: String,
        issued_at: DateTime<Utc>,
        attempts: u32,
    },
    /// Authorization complete; the pipeline may debit and commit.
    Verified,
}

/// One in-flight checkout's verification state.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub token: String,
    /// The exact account this session authorizes. The pipeline refuses to
    /// debit any other account under this token.
    pub account_number: String,
    /// Amount the authorization covers, in cents.
    pub amount_cents: i64,
    pub state: VerificationState,
    pub created_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Whether the session has outlived the store's ttl.
    fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        age.num_seconds() >= ttl.as_secs() as i64
    }
}

/// Shared, concurrency-safe session store.
///
/// Cloning is cheap; all clones see the same map. Every lookup treats
/// sessions past the ttl as gone, and `create` sweeps them out of the
/// map so abandoned checkouts cannot accumulate.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, CheckoutSession>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    /// Creates an empty store with the default ttl.
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Creates an empty store whose sessions expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        SessionStore {
            sessions: Arc::default(),
            ttl,
        }
    }

    /// Creates a session and returns its token.
    ///
    /// Also reaps any session past the ttl; no background task needed.
    pub async fn create(
        &self,
        account_number: &str,
        amount_cents: i64,
        state: VerificationState,
    ) -> String {
        let token = Uuid::new_v4().to_string();
        let session = CheckoutSession {
            token: token.clone(),
            account_number: account_number.to_string(),
            amount_cents,
            state,
            created_at: Utc::now(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired(self.ttl));
        sessions.insert(token.clone(), session);
        token
    }

    /// Returns a snapshot of a live session. Expired tokens read as gone.
    pub async fn get(&self, token: &str) -> Option<CheckoutSession> {
        self.sessions
            .read()
            .await
            .get(token)
            .filter(|s| !s.is_expired(self.ttl))
            .cloned()
    }

    /// Mutates a live session under the write lock.
    ///
    /// Returns `None` if the token is unknown or expired.
    pub async fn with_session_mut<F, R>(&self, token: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut CheckoutSession) -> R,
    {
        let ttl = self.ttl;
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(token).filter(|s| !s.is_expired(ttl)).map(f)
    }

    /// Removes a session (after commit, or when it expires).
    pub async fn remove(&self, token: &str) -> Option<CheckoutSession> {
        self.sessions.write().await.remove(token)
    }

    /// Drops every session past the ttl. Returns how many were reaped.
    ///
    /// `create` already sweeps on each call; this is for callers that
    /// want an explicit purge point.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl));
        before - sessions.len()
    }

    /// Whether the session is live and Verified for exactly this account.
    pub async fn is_verified_for(&self, token: &str, account_number: &str) -> bool {
        match self.sessions.read().await.get(token) {
            Some(session) => {
                session.state == VerificationState::Verified
                    && session.account_number == account_number
                    && !session.is_expired(self.ttl)
            }
            None => false,
        }
    }

    /// Number of live sessions (diagnostics).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_verify() {
        let store = SessionStore::new();
        let token = store
            .create("ACC-1001", 1000, VerificationState::Verified)
            .await;

        assert!(store.is_verified_for(&token, "ACC-1001").await);
        // Exact-account guarantee: same token, different account
        assert!(!store.is_verified_for(&token, "ACC-9999").await);
        assert!(!store.is_verified_for("no-such-token", "ACC-1001").await);
    }

    #[tokio::test]
    async fn test_awaiting_otp_is_not_verified() {
        let store = SessionStore::new();
        let token = store
            .create(
                "ACC-1001",
                1000,
                VerificationState::AwaitingOtp {
                    code: "123456".to_string(),
                    issued_at: Utc::now(),
                    attempts: 0,
                },
            )
            .await;

        assert!(!store.is_verified_for(&token, "ACC-1001").await);

        store
            .with_session_mut(&token, |s| s.state = VerificationState::Verified)
            .await
            .unwrap();
        assert!(store.is_verified_for(&token, "ACC-1001").await);
    }

    #[tokio::test]
    async fn test_expired_verified_session_is_not_redeemable() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        let token = store
            .create("ACC-1001", 1000, VerificationState::Verified)
            .await;

        // Verified or not, a session past the ttl reads as gone.
        assert!(!store.is_verified_for(&token, "ACC-1001").await);
        assert!(store.get(&token).await.is_none());
        assert!(store
            .with_session_mut(&token, |s| s.state = VerificationState::Verified)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_create_reaps_abandoned_sessions() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        store
            .create("ACC-1001", 1000, VerificationState::Verified)
            .await;
        store
            .create("ACC-1002", 1000, VerificationState::Verified)
            .await;

        // The second create swept the first, already-expired entry.
        assert_eq!(store.len().await, 1);
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new();
        let token = store
            .create("ACC-1001", 1000, VerificationState::Verified)
            .await;

        assert!(store.remove(&token).await.is_some());
        assert!(store.get(&token).await.is_none());
        assert!(store.is_empty().await);
    }
}
