//! Per-request glue between a backend and the session handler.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::apps::{AppRegistry, RegistryError};
use crate::context::{Content, Finalize};
use crate::http::StatusCode;
use crate::origin::OriginPolicy;

use super::{SessionConfig, SessionHandler, SessionOptions};

/// Feeds one context per inbound request to the session handler and
/// finalizes the result into the backend's native response.
///
/// The engine carries no request-forgery tokens of its own and the bridge
/// adds none; cross-origin acceptance is governed entirely by the
/// [`OriginPolicy`] the handler receives in its [`SessionConfig`]. Backends
/// that do ship ambient request-forgery protection must exempt the session
/// endpoint, since the long-poll client never holds a backend token.
pub struct Bridge<H> {
    handler: Arc<H>,
}

impl<H> Clone for Bridge<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> fmt::Debug for Bridge<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

impl<H: SessionHandler> Bridge<H> {
    /// Wraps an already-built handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Builds a bridge for embedding into a caller-owned server.
    ///
    /// The caller controls hosting, so an unusable default CDN degrades to
    /// locally served assets with a warning instead of failing. No scheduler
    /// is provisioned; embedders own their execution environment.
    ///
    /// # Errors
    ///
    /// [`RegistryError`] when the applications input is invalid.
    pub fn from_options<F>(options: SessionOptions, make_handler: F) -> Result<Self, RegistryError>
    where
        F: FnOnce(SessionConfig) -> H,
    {
        let registry = AppRegistry::resolve(options.applications)?;
        let config = SessionConfig {
            registry: Arc::new(registry),
            cdn: options.cdn.or_local(),
            session_expiry: options.session_expiry,
            cleanup_interval: options.cleanup_interval,
            origins: OriginPolicy::from_parts(options.allowed_origins, options.check_origin),
            scheduler: None,
        };
        Ok(Self::new(make_handler(config)))
    }

    /// Runs the session handler against one context and finalizes it.
    ///
    /// A handler panic is confined to this request: the context answers a
    /// plain-text 500 and the connection loop carries on. The context is
    /// discarded afterwards either way, so no partially-mutated state can
    /// leak into another request.
    pub fn dispatch<C: Finalize>(&self, mut ctx: C) -> C::Response {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.handle_request(&mut ctx)));
        if let Err(panic) = outcome {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            error!(backend = ctx.backend_name(), %reason, "session handler panicked");

            ctx.set_status(StatusCode::InternalServerError);
            ctx.set_header("content-type", "text/plain; charset=utf-8");
            ctx.set_content(Content::Text("Internal Server Error".to_owned()));
        }
        ctx.finalize()
    }
}
