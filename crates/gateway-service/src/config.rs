//! Auth gateway configuration.
//!
//! Configuration is loaded once from environment variables at startup and
//! passed explicitly into the token validator and forwarding proxy. All
//! sensitive fields are redacted in Debug output.

use common::jwt::{SigningAlgorithm, DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default listen port for the gateway.
pub const DEFAULT_PORT: u16 = 4000;

/// Default bind address for the health/metrics listener.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default claim carrying the subject id.
pub const DEFAULT_SUBJECT_CLAIM: &str = "id";

/// Default table holding currently-valid tokens.
pub const DEFAULT_TOKEN_TABLE: &str = "tokens";

/// Default token store lookup timeout in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

/// Default upstream call timeout in milliseconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 25_000;

/// Default overall per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Default maximum buffered request body (10 MiB).
pub const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Which external store holds the currently-valid tokens.
#[derive(Clone)]
pub enum TokenStoreConfig {
    /// Direct PostgreSQL access through a connection pool.
    Postgres {
        /// PostgreSQL connection URL (may embed a password).
        database_url: SecretString,
    },

    /// PostgREST-compatible HTTP API (e.g. Supabase).
    Rest {
        /// Project base URL, without the `/rest/v1` suffix.
        base_url: String,

        /// API key sent as `apikey` and bearer credential.
        api_key: SecretString,
    },
}

impl TokenStoreConfig {
    /// Short backend name for logs and metrics.
    pub fn backend(&self) -> &'static str {
        match self {
            TokenStoreConfig::Postgres { .. } => "postgres",
            TokenStoreConfig::Rest { .. } => "rest",
        }
    }
}

impl fmt::Debug for TokenStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStoreConfig::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"[REDACTED]")
                .finish(),
            TokenStoreConfig::Rest { base_url, .. } => f
                .debug_struct("Rest")
                .field("base_url", base_url)
                .field("api_key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Auth gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Upstream API every authorized request is forwarded to.
    pub upstream_base_url: Url,

    /// Symmetric key used to verify token signatures.
    pub jwt_secret: SecretString,

    /// The only signing algorithm tokens may use.
    pub jwt_algorithm: SigningAlgorithm,

    /// Clock skew tolerance for the `iat` claim.
    pub jwt_clock_skew_seconds: i64,

    /// Claim carrying the subject id (default: "id").
    pub subject_claim: String,

    /// Gateway listen address (default: "0.0.0.0:4000").
    pub bind_address: String,

    /// Health and metrics listen address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// External store of currently-valid tokens.
    pub token_store: TokenStoreConfig,

    /// Table (or REST resource) holding token records.
    pub token_table: String,

    /// Timeout for a single token store lookup.
    pub store_timeout: Duration,

    /// Timeout for a single upstream call, independent of `store_timeout`.
    pub upstream_timeout: Duration,

    /// Overall per-request budget, hooks included.
    pub request_timeout: Duration,

    /// Maximum request body the gateway will buffer before forwarding.
    pub max_request_body_bytes: usize,

    /// Header set on outbound requests to the authenticated subject id.
    pub upstream_subject_header: Option<String>,

    /// Graceful shutdown drain period.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("upstream_base_url", &self.upstream_base_url.as_str())
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("subject_claim", &self.subject_claim)
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("token_store", &self.token_store)
            .field("token_table", &self.token_table)
            .field("store_timeout", &self.store_timeout)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_request_body_bytes", &self.max_request_body_bytes)
            .field("upstream_subject_header", &self.upstream_subject_header)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid upstream base URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("Invalid JWT configuration: {0}")]
    InvalidJwt(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid token store configuration: {0}")]
    InvalidTokenStore(String),

    #[error("Invalid listen address configuration: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid request body limit: {0}")]
    InvalidBodyLimit(String),

    #[error("Invalid upstream subject header: {0}")]
    InvalidSubjectHeader(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        // The gateway must never accept traffic without a target
        let upstream_raw = non_empty(vars, "API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("API_BASE_URL".to_string()))?;
        let upstream_base_url = parse_upstream_url(upstream_raw)?;

        let jwt_secret = non_empty(vars, "JWT_SECRET")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;

        let jwt_algorithm = match vars.get("JWT_ALGORITHM") {
            Some(value) => value
                .parse::<SigningAlgorithm>()
                .map_err(|e| ConfigError::InvalidJwt(e.to_string()))?,
            None => SigningAlgorithm::default(),
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let subject_claim = match vars.get("SUBJECT_CLAIM") {
            Some(claim) if claim.trim().is_empty() => {
                return Err(ConfigError::InvalidJwt(
                    "SUBJECT_CLAIM must not be empty".to_string(),
                ));
            }
            Some(claim) => claim.trim().to_string(),
            None => DEFAULT_SUBJECT_CLAIM.to_string(),
        };

        // BIND_ADDRESS wins over PORT when both are set
        let bind_address = match vars.get("BIND_ADDRESS") {
            Some(address) => address.clone(),
            None => {
                let port = match vars.get("PORT") {
                    Some(value_str) => value_str.parse::<u16>().map_err(|e| {
                        ConfigError::InvalidBindAddress(format!(
                            "PORT must be a valid port number, got '{}': {}",
                            value_str, e
                        ))
                    })?,
                    None => DEFAULT_PORT,
                };
                format!("0.0.0.0:{}", port)
            }
        };

        let health_bind_address = vars
            .get("HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let token_store = parse_token_store(vars)?;

        let token_table = vars
            .get("TOKEN_TABLE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOKEN_TABLE.to_string());
        if !is_plain_identifier(&token_table) {
            return Err(ConfigError::InvalidTokenStore(format!(
                "TOKEN_TABLE must be a plain identifier, got '{}'",
                token_table
            )));
        }

        let store_timeout = Duration::from_millis(parse_positive(
            vars,
            "STORE_TIMEOUT_MS",
            DEFAULT_STORE_TIMEOUT_MS,
            ConfigError::InvalidTimeout,
        )?);

        let upstream_timeout = Duration::from_millis(parse_positive(
            vars,
            "UPSTREAM_TIMEOUT_MS",
            DEFAULT_UPSTREAM_TIMEOUT_MS,
            ConfigError::InvalidTimeout,
        )?);

        let request_timeout = Duration::from_secs(parse_positive(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?);

        // The store lookup and the upstream wait share the request budget
        if store_timeout + upstream_timeout >= request_timeout {
            return Err(ConfigError::InvalidTimeout(format!(
                "STORE_TIMEOUT_MS ({}) + UPSTREAM_TIMEOUT_MS ({}) must be below REQUEST_TIMEOUT_SECONDS ({}s)",
                store_timeout.as_millis(),
                upstream_timeout.as_millis(),
                request_timeout.as_secs()
            )));
        }

        let max_request_body_bytes = parse_positive(
            vars,
            "MAX_REQUEST_BODY_BYTES",
            DEFAULT_MAX_REQUEST_BODY_BYTES as u64,
            ConfigError::InvalidBodyLimit,
        )?;
        let max_request_body_bytes = usize::try_from(max_request_body_bytes).map_err(|_| {
            ConfigError::InvalidBodyLimit(format!(
                "MAX_REQUEST_BODY_BYTES is too large for this platform: {}",
                max_request_body_bytes
            ))
        })?;

        let upstream_subject_header = match non_empty(vars, "UPSTREAM_SUBJECT_HEADER") {
            Some(name) => {
                let name = name.trim().to_ascii_lowercase();
                if axum::http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                    return Err(ConfigError::InvalidSubjectHeader(format!(
                        "'{}' is not a valid header name",
                        name
                    )));
                }
                Some(name)
            }
            None => None,
        };

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.parse::<u64>().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        Ok(Config {
            upstream_base_url,
            jwt_secret,
            jwt_algorithm,
            jwt_clock_skew_seconds,
            subject_claim,
            bind_address,
            health_bind_address,
            token_store,
            token_table,
            store_timeout,
            upstream_timeout,
            request_timeout,
            max_request_body_bytes,
            upstream_subject_header,
            drain_seconds,
        })
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

fn parse_upstream_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        ConfigError::InvalidUpstreamUrl(format!("API_BASE_URL '{}' is not a URL: {}", raw, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidUpstreamUrl(format!(
            "API_BASE_URL must be an absolute http(s) URL, got '{}'",
            raw
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::InvalidUpstreamUrl(
            "API_BASE_URL must not carry a query string or fragment".to_string(),
        ));
    }

    Ok(url)
}

fn parse_token_store(vars: &HashMap<String, String>) -> Result<TokenStoreConfig, ConfigError> {
    if let Some(database_url) = non_empty(vars, "DATABASE_URL") {
        return Ok(TokenStoreConfig::Postgres {
            database_url: SecretString::from(database_url),
        });
    }

    match (
        non_empty(vars, "PUBLIC_SUPABASE_URL"),
        non_empty(vars, "PUBLIC_SUPABASE_ANON_KEY"),
    ) {
        (Some(base_url), Some(api_key)) => {
            Url::parse(base_url).map_err(|e| {
                ConfigError::InvalidTokenStore(format!(
                    "PUBLIC_SUPABASE_URL '{}' is not a URL: {}",
                    base_url, e
                ))
            })?;
            Ok(TokenStoreConfig::Rest {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: SecretString::from(api_key),
            })
        }
        (Some(_), None) => Err(ConfigError::MissingEnvVar(
            "PUBLIC_SUPABASE_ANON_KEY".to_string(),
        )),
        _ => Err(ConfigError::MissingEnvVar(
            "DATABASE_URL or PUBLIC_SUPABASE_URL".to_string(),
        )),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
    err: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        err(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(err(format!("{} must be greater than 0", key)));
    }

    Ok(value)
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*`.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
