//! Upstream forwarding.
//!
//! The outbound request keeps the inbound method, path, query, end-to-end
//! headers and body; only the origin changes. The upstream response is
//! streamed back without buffering, decompression or redirect following.

use crate::config::Config;
use crate::models::{RequestContext, ResponseContext};
use crate::observability::metrics::record_upstream_request;
use crate::proxy::headers::{outbound_request_headers, relayed_response_headers};
use crate::proxy::hooks::ProxyHooks;
use crate::proxy::ProxyError;
use axum::body::Body;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Connect timeout for upstream connections.
const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Relays requests to a single upstream base URL.
pub struct ForwardingProxy {
    client: Client,
    upstream_base: String,
    upstream_timeout: Duration,
    hooks: ProxyHooks,
}

impl ForwardingProxy {
    /// Create a proxy for the configured upstream.
    ///
    /// # Errors
    ///
    /// Returns the client build error if TLS initialization fails.
    pub fn new(config: &Config, hooks: ProxyHooks) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SECS))
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            upstream_base: config
                .upstream_base_url
                .as_str()
                .trim_end_matches('/')
                .to_string(),
            upstream_timeout: config.upstream_timeout,
            hooks,
        })
    }

    /// Upstream URL for a request: base + path + `?query`.
    pub fn target_url(&self, ctx: &RequestContext) -> String {
        format!("{}{}", self.upstream_base, ctx.path_and_query())
    }

    /// Forward one request and return the upstream response.
    ///
    /// The upstream timeout covers connecting and receiving the response
    /// head. The body then streams until the upstream finishes or the client
    /// goes away.
    ///
    /// # Errors
    ///
    /// - `ProxyError::Timeout` if the upstream does not answer in time
    /// - `ProxyError::Unavailable` for connection and protocol failures
    #[instrument(skip_all, name = "gw.proxy.forward", fields(method = %ctx.method))]
    pub async fn forward(&self, mut ctx: RequestContext) -> Result<ResponseContext, ProxyError> {
        // Filter first so a client `Connection` header cannot remove
        // anything a hook adds
        ctx.headers = outbound_request_headers(&ctx.headers);
        self.hooks.apply_pre_send(&mut ctx);

        let url = self.target_url(&ctx);
        let request = self
            .client
            .request(ctx.method.clone(), url)
            .headers(ctx.headers)
            .body(ctx.body);

        let start = Instant::now();
        let response = match tokio::time::timeout(self.upstream_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = map_reqwest_error(&e);
                record_upstream_request(error_label(&err), start.elapsed());
                tracing::warn!(
                    target: "gw.proxy.forwarder",
                    error = %e,
                    connect = e.is_connect(),
                    "Upstream request failed"
                );
                return Err(err);
            }
            Err(_) => {
                record_upstream_request("timeout", start.elapsed());
                tracing::warn!(
                    target: "gw.proxy.forwarder",
                    timeout_ms = self.upstream_timeout.as_millis() as u64,
                    "Upstream did not respond in time"
                );
                return Err(ProxyError::Timeout);
            }
        };

        let status = response.status();
        record_upstream_request(status.as_str(), start.elapsed());
        tracing::debug!(
            target: "gw.proxy.forwarder",
            status = status.as_u16(),
            "Upstream responded"
        );

        let mut relayed = ResponseContext {
            status,
            headers: relayed_response_headers(response.headers()),
            body: Body::from_stream(response.bytes_stream()),
        };
        self.hooks.apply_post_receive(&mut relayed);

        Ok(relayed)
    }
}

fn map_reqwest_error(err: &reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        ProxyError::Timeout
    } else {
        ProxyError::Unavailable(err.to_string())
    }
}

fn error_label(err: &ProxyError) -> &'static str {
    match err {
        ProxyError::Timeout => "timeout",
        ProxyError::Unavailable(_) => "unavailable",
        ProxyError::PayloadTooLarge => "too_large",
        ProxyError::RequestBody(_) => "request_body",
    }
}
