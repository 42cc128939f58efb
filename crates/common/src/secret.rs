//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used by the gateway for the JWT signing
//! secret, the token store credentials and bearer tokens held in memory.
//!
//! `SecretString` implements `Debug` with redaction, so a struct deriving
//! `Debug` that holds one is safe to log. The value is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StoreCredentials {
//!     url: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = StoreCredentials {
//!     url: "https://project.supabase.co".to_string(),
//!     api_key: SecretString::from("anon-key"),
//! };
//!
//! // Debug output shows the url but not the key
//! println!("{:?}", creds);
//!
//! // Reading the key requires an explicit call
//! let key: &str = creds.api_key.expose_secret();
//! ```
//!
//! # Gateway usage
//!
//! Use `SecretString` for:
//! - The HMAC signing secret (`JWT_SECRET`)
//! - Database URLs that embed passwords
//! - REST store API keys
//! - Presented bearer tokens once they leave the request headers

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
