//! Request and response hooks.
//!
//! Hooks are plain synchronous functions run inside the request's timeout
//! budget. An absent hook leaves the value untouched.

use crate::models::{RequestContext, ResponseContext};
use axum::http::{HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;

/// Runs on the outbound request before it is sent upstream.
pub type PreSendHook = Arc<dyn Fn(&mut RequestContext) + Send + Sync>;

/// Runs on the upstream response before it is relayed to the client.
pub type PostReceiveHook = Arc<dyn Fn(&mut ResponseContext) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProxyHooks {
    pre_send: Option<PreSendHook>,
    post_receive: Option<PostReceiveHook>,
}

impl ProxyHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-send hook. Runs after any hook already registered.
    pub fn with_pre_send(mut self, hook: PreSendHook) -> Self {
        let combined: PreSendHook = match self.pre_send.take() {
            Some(first) => Arc::new(move |ctx: &mut RequestContext| {
                first(ctx);
                hook(ctx);
            }),
            None => hook,
        };
        self.pre_send = Some(combined);
        self
    }

    /// Add a post-receive hook. Runs after any hook already registered.
    pub fn with_post_receive(mut self, hook: PostReceiveHook) -> Self {
        let combined: PostReceiveHook = match self.post_receive.take() {
            Some(first) => Arc::new(move |ctx: &mut ResponseContext| {
                first(ctx);
                hook(ctx);
            }),
            None => hook,
        };
        self.post_receive = Some(combined);
        self
    }

    /// Combine two hook sets; `self` runs first.
    pub fn then(self, next: ProxyHooks) -> Self {
        let mut combined = self;
        if let Some(hook) = next.pre_send {
            combined = combined.with_pre_send(hook);
        }
        if let Some(hook) = next.post_receive {
            combined = combined.with_post_receive(hook);
        }
        combined
    }

    pub fn apply_pre_send(&self, ctx: &mut RequestContext) {
        if let Some(hook) = &self.pre_send {
            hook(ctx);
        }
    }

    pub fn apply_post_receive(&self, ctx: &mut ResponseContext) {
        if let Some(hook) = &self.post_receive {
            hook(ctx);
        }
    }
}

impl fmt::Debug for ProxyHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHooks")
            .field("pre_send", &self.pre_send.is_some())
            .field("post_receive", &self.post_receive.is_some())
            .finish()
    }
}

/// Pre-send hook that sets `name` to the authenticated subject id.
///
/// Any client-supplied value for the header is removed first, so the
/// upstream can trust it. Requests without an identity only lose the header.
pub fn subject_header_hook(name: HeaderName) -> PreSendHook {
    Arc::new(move |ctx: &mut RequestContext| {
        ctx.headers.remove(&name);

        let Some(identity) = &ctx.identity else {
            return;
        };

        match HeaderValue::from_str(&identity.subject_id) {
            Ok(value) => {
                ctx.headers.insert(name.clone(), value);
            }
            Err(_) => {
                tracing::warn!(
                    target: "gw.proxy.hooks",
                    header = %name,
                    "Subject id is not a valid header value, header omitted"
                );
            }
        }
    })
}
