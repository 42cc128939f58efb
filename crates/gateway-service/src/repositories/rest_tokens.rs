//! PostgREST-compatible token store (e.g. Supabase).
//!
//! Issues `GET {base}/rest/v1/{table}` with `eq.` filters on `user_id` and
//! `token`. The API key travels both as `apikey` and as a bearer credential.

use super::{StoreError, TokenRecord, TokenStore, LOOKUP_LIMIT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

/// Row shape returned by PostgREST. `user_id` may be text or numeric.
#[derive(Deserialize)]
struct TokenRow {
    user_id: serde_json::Value,
    token: String,
    #[serde(default)]
    created_at: Option<String>,
}

impl TokenRow {
    fn into_record(self) -> Result<TokenRecord, StoreError> {
        let subject_id = match self.user_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(StoreError::InvalidResponse(format!(
                    "unexpected user_id type: {}",
                    json_type_name(&other)
                )));
            }
        };

        let created_at = self
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(TokenRecord {
            subject_id,
            token: SecretString::from(self.token),
            created_at,
        })
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Token store backed by a PostgREST HTTP API.
pub struct RestTokenStore {
    client: Client,
    table_url: String,
    api_key: SecretString,
}

impl RestTokenStore {
    /// Create a REST store for `{base_url}/rest/v1/{table}`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the HTTP client fails to build.
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        table: &str,
        lookup_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(lookup_timeout)
            .connect_timeout(lookup_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key,
        })
    }

    fn get(&self) -> reqwest::RequestBuilder {
        self.client
            .get(&self.table_url)
            .header("apikey", self.api_key.expose_secret())
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header(ACCEPT, "application/json")
    }
}

#[async_trait]
impl TokenStore for RestTokenStore {
    #[instrument(skip_all, name = "gw.store.rest.find_matching")]
    async fn find_matching(
        &self,
        subject_id: &str,
        token: &str,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let response = self
            .get()
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{subject_id}")),
                ("token", format!("eq.{token}")),
                ("limit", LOOKUP_LIMIT.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "token store responded with HTTP {}",
                status.as_u16()
            )));
        }

        let bytes = response.bytes().await?;
        let rows: Vec<TokenRow> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::InvalidResponse(format!("undecodable body: {e}")))?;

        rows.into_iter().map(TokenRow::into_record).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .get()
            .query(&[("select", "user_id"), ("limit", "0")])
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "token store responded with HTTP {}",
                response.status().as_u16()
            )))
        }
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}
