//! Token store access.
//!
//! The gateway only ever reads from the token store: a lookup answers which
//! records match a `(subject_id, token)` pair exactly. Two backends exist,
//! direct PostgreSQL and a PostgREST-compatible HTTP API.
//!
//! # Security
//!
//! - Lookups are parameterized; the table name is validated at config load
//! - Token values are held as `SecretString` and never logged

mod postgres_tokens;
mod rest_tokens;

pub use postgres_tokens::PostgresTokenStore;
pub use rest_tokens::RestTokenStore;

use crate::config::{Config, TokenStoreConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Maximum records requested per lookup.
///
/// One match is the contract; a second is enough to detect a violation.
pub const LOOKUP_LIMIT: i64 = 2;

/// Token store errors.
///
/// Kept distinct from "no match" so operators can tell an outage from a
/// revoked token, even though both deny the request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store unavailable: {0}")]
    Unavailable(String),

    #[error("token store lookup timed out")]
    Timeout,

    #[error("token store returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Short status label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Timeout => "timeout",
            StoreError::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::InvalidResponse(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// A currently-valid credential as persisted by the issuer.
#[derive(Clone)]
pub struct TokenRecord {
    pub subject_id: String,
    pub token: SecretString,
    pub created_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn new(subject_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            token: SecretString::from(token.into()),
            created_at: None,
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("subject_id", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Read-only view of the external token store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Records whose subject id and token both equal the inputs exactly.
    ///
    /// Returns at most [`LOOKUP_LIMIT`] records.
    async fn find_matching(
        &self,
        subject_id: &str,
        token: &str,
    ) -> Result<Vec<TokenRecord>, StoreError>;

    /// Cheap connectivity check used at startup.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logs and metrics.
    fn backend(&self) -> &'static str;
}

/// Build the token store selected by configuration.
///
/// # Errors
///
/// Returns `StoreError::Unavailable` if the Postgres pool or HTTP client
/// cannot be created.
pub async fn connect_token_store(config: &Config) -> Result<Arc<dyn TokenStore>, StoreError> {
    match &config.token_store {
        TokenStoreConfig::Postgres { database_url } => {
            let store =
                PostgresTokenStore::connect(database_url, &config.token_table, config.store_timeout)
                    .await?;
            Ok(Arc::new(store))
        }
        TokenStoreConfig::Rest { base_url, api_key } => {
            let store = RestTokenStore::new(
                base_url,
                api_key.clone(),
                &config.token_table,
                config.store_timeout,
            )?;
            Ok(Arc::new(store))
        }
    }
}

/// Mock token store for testing.
pub mod mock {
    use super::*;
    use common::secret::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory token store with failure and latency injection.
    pub struct MockTokenStore {
        /// Records served by `find_matching`.
        records: Vec<TokenRecord>,
        /// Number of lookups made.
        call_count: AtomicUsize,
        /// Whether lookups fail with `StoreError::Unavailable`.
        return_error: bool,
        /// Delay applied before answering.
        delay: Option<Duration>,
    }

    impl MockTokenStore {
        /// Create an empty store (every lookup misses).
        pub fn empty() -> Self {
            Self::with_records(Vec::new())
        }

        /// Create a store holding the given records.
        pub fn with_records(records: Vec<TokenRecord>) -> Self {
            Self {
                records,
                call_count: AtomicUsize::new(0),
                return_error: false,
                delay: None,
            }
        }

        /// Create a store whose lookups always fail.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::empty()
            }
        }

        /// Delay every answer, for timeout tests.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Get the number of lookups made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Number of records held.
        pub fn len(&self) -> usize {
            self.records.len()
        }

        /// Whether the store holds no records.
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl TokenStore for MockTokenStore {
        async fn find_matching(
            &self,
            subject_id: &str,
            token: &str,
        ) -> Result<Vec<TokenRecord>, StoreError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.return_error {
                return Err(StoreError::Unavailable(
                    "Mock token store error".to_string(),
                ));
            }

            Ok(self
                .records
                .iter()
                .filter(|r| r.subject_id == subject_id && r.token.expose_secret() == token)
                .take(LOOKUP_LIMIT as usize)
                .cloned()
                .collect())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            if self.return_error {
                return Err(StoreError::Unavailable(
                    "Mock token store error".to_string(),
                ));
            }
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "mock"
        }
    }
}
