//! Capabilities the gateway consumes from the account database.
//!
//! - [`CredentialValidator`]: resolves a bearer token to its owning account
//! - [`BalanceStore`]: reads and atomically decrements an account's credits
//! - [`UsageLog`]: append-only record of metered calls
//!
//! The gateway never mutates credentials. See [`sqlite::SqliteStore`] and
//! [`rest::RestStore`] for the two backends.

pub mod rest;
pub mod sqlite;

use std::future::Future;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// Result of a successful credential lookup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApiCredential {
    pub account_id: String,
    pub is_active: bool,
}

/// Current credit position of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Balance {
    pub credits: i64,
    /// Plan ceiling the credits are topped up to
    pub credit_limit: i64,
}

/// One metered proxied call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UsageRecord {
    pub account_id: String,
    /// Upstream path suffix, e.g. `pdf/convert/to/json`
    pub endpoint: String,
    pub credits_used: i64,
    /// Unix timestamp (seconds)
    pub created_at: i64,
}

impl UsageRecord {
    pub fn now(account_id: &str, endpoint: &str, credits_used: i64) -> Self {
        Self {
            account_id: account_id.to_string(),
            endpoint: endpoint.to_string(),
            credits_used,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store returned malformed data: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Resolves an opaque bearer token to the account that owns it.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait CredentialValidator: Send + Sync {
    /// Look up a token. `Ok(None)` means no credential matches.
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<ApiCredential>, StoreError>> + Send;
}

/// Per-account credit balances.
pub trait BalanceStore: Send + Sync {
    /// Read the current balance. `Ok(None)` means the account has no balance row.
    fn balance(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Option<Balance>, StoreError>> + Send;

    /// Atomically subtract `amount` if the balance covers it.
    /// Returns `true` if the credits were taken, `false` if the balance was too low
    /// (the balance is then left unchanged and never goes negative).
    fn decrement(
        &self,
        account_id: &str,
        amount: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Append-only usage audit log.
pub trait UsageLog: Send + Sync {
    fn append(&self, record: &UsageRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Most recent records for an account, newest first.
    fn recent(
        &self,
        account_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<UsageRecord>, StoreError>> + Send;
}
