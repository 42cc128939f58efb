//! PostgreSQL-backed token store.

use super::{StoreError, TokenRecord, TokenStore, LOOKUP_LIMIT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::instrument;

/// Row shape returned by the lookup query.
#[derive(sqlx::FromRow)]
struct TokenRow {
    user_id: String,
    token: String,
    created_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        TokenRecord {
            subject_id: row.user_id,
            token: SecretString::from(row.token),
            created_at: row.created_at,
        }
    }
}

/// Token store reading directly from a Postgres table.
pub struct PostgresTokenStore {
    pool: PgPool,
    lookup_sql: String,
}

impl PostgresTokenStore {
    /// Connect a pool and build the store.
    ///
    /// `table` must already be validated as a plain identifier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be reached.
    pub async fn connect(
        database_url: &SecretString,
        table: &str,
        lookup_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let url = add_statement_timeout(database_url.expose_secret(), lookup_timeout);

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .acquire_timeout(lookup_timeout)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&url)
            .await?;

        Ok(Self::from_pool(pool, table))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, table: &str) -> Self {
        // user_id may be an integer or uuid column; compare as text
        let lookup_sql = format!(
            "SELECT user_id::text AS user_id, token, created_at \
             FROM {table} \
             WHERE user_id::text = $1 AND token = $2 \
             LIMIT $3"
        );
        Self { pool, lookup_sql }
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    #[instrument(skip_all, name = "gw.store.postgres.find_matching")]
    async fn find_matching(
        &self,
        subject_id: &str,
        token: &str,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let rows: Vec<TokenRow> = sqlx::query_as(&self.lookup_sql)
            .bind(subject_id)
            .bind(token)
            .bind(LOOKUP_LIMIT)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TokenRecord::from).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Adds a server-side statement_timeout to the database URL so a stuck
/// query is cancelled in the database, not only abandoned by the client.
fn add_statement_timeout(url: &str, timeout: Duration) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}ms",
        url,
        separator,
        timeout.as_millis().max(1)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_statement_timeout_without_query() {
        let url = add_statement_timeout("postgres://localhost/db", Duration::from_millis(2000));
        assert_eq!(
            url,
            "postgres://localhost/db?options=-c%20statement_timeout%3D2000ms"
        );
    }

    #[test]
    fn test_add_statement_timeout_with_query() {
        let url = add_statement_timeout(
            "postgres://localhost/db?sslmode=require",
            Duration::from_millis(750),
        );
        assert_eq!(
            url,
            "postgres://localhost/db?sslmode=require&options=-c%20statement_timeout%3D750ms"
        );
    }

    #[tokio::test]
    async fn test_lookup_sql_uses_configured_table() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let store = PostgresTokenStore::from_pool(pool, "api_tokens");

        assert!(store.lookup_sql.contains("FROM api_tokens"));
        assert!(store.lookup_sql.contains("$1"));
        assert!(store.lookup_sql.contains("$2"));
        assert_eq!(store.backend(), "postgres");
    }
}
