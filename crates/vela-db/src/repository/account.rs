//! # Customer Account Repository
//!
//! Customer accounts backing card and e-wallet tenders.
//!
//! Balance is contended state: multiple terminals can race a debit against
//! the same account, so the decrement carries the same `AND balance >= ?`
//! guard the product quantity uses. The `balance_cents >= 0` CHECK
//! constraint backstops it.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vela_core::CustomerAccount;

const ACCOUNT_COLUMNS: &str = "id, account_number, holder_name, account_type, \
     balance_cents, pin_hash, created_at, updated_at";

/// Repository for customer account operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Gets an account by its business account number.
    pub async fn get_by_number(&self, account_number: &str) -> DbResult<Option<CustomerAccount>> {
        let account = sqlx::query_as::<_, CustomerAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM customer_accounts WHERE account_number = ?1"
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Inserts a new account.
    pub async fn insert(&self, account: &CustomerAccount) -> DbResult<()> {
        debug!(account_number = %account.account_number, "Inserting customer account");

        sqlx::query(
            r#"
            INSERT INTO customer_accounts (
                id, account_number, holder_name, account_type,
                balance_cents, pin_hash, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&account.id)
        .bind(&account.account_number)
        .bind(&account.holder_name)
        .bind(account.account_type)
        .bind(account.balance_cents)
        .bind(&account.pin_hash)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Credits an account (top-up flows outside the checkout core).
    pub async fn credit(&self, account_number: &str, amount_cents: i64) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE customer_accounts
            SET balance_cents = balance_cents + ?2, updated_at = ?3
            WHERE account_number = ?1
            "#,
        )
        .bind(account_number)
        .bind(amount_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CustomerAccount", account_number));
        }

        Ok(())
    }
}

// =============================================================================
// Transaction-Scoped Writes
// =============================================================================

/// Conditionally debits an account inside the commit transaction.
///
/// ## Returns
/// * `Ok(true)` - debit applied
/// * `Ok(false)` - insufficient balance (or unknown account)
pub async fn debit_account_tx(
    conn: &mut SqliteConnection,
    account_number: &str,
    amount_cents: i64,
) -> DbResult<bool> {
    debug!(account_number = %account_number, amount = %amount_cents, "Debiting account");

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE customer_accounts
        SET balance_cents = balance_cents - ?2, updated_at = ?3
        WHERE account_number = ?1 AND balance_cents >= ?2
        "#,
    )
    .bind(account_number)
    .bind(amount_cents)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Generates a new account ID.
pub fn generate_account_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
