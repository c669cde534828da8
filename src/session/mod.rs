//! The session layer seam.
//!
//! The session handler (session lifecycle, message framing, origin checks)
//! is an external collaborator written once against
//! [`HttpContext`](crate::context::HttpContext). This module owns everything
//! handed to it: the [`SessionConfig`] wiring resolved at startup, the
//! [`Bridge`] that feeds it one context per request, and the [`Cdn`] asset
//! mode.

pub mod bridge;
pub mod cdn;

pub use bridge::Bridge;
pub use cdn::{Cdn, CdnError};

use std::sync::Arc;
use std::time::Duration;

use crate::apps::{AppRegistry, Applications};
use crate::context::HttpContext;
use crate::origin::{OriginPolicy, OriginPredicate};
use crate::scheduler::SchedulerHandle;

/// The external session-handling collaborator.
///
/// Implementations own session creation, expiry, and message framing over
/// HTTP long-polling. They may block: the serving loops keep handlers off
/// the async workers. A panic is confined to the triggering request by the
/// bridge.
pub trait SessionHandler: Send + Sync + 'static {
    /// Handles one inbound request through the uniform context contract.
    fn handle_request(&self, ctx: &mut dyn HttpContext);
}

/// Wiring resolved by the bootstrap (or by [`Bridge::from_options`]) and
/// handed to the handler factory exactly once, before serving starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Immutable name-to-entry table, shared read-only across requests.
    pub registry: Arc<AppRegistry>,
    /// Resolved asset-delivery mode.
    pub cdn: Cdn,
    /// Idle time after which a session expires. `None` leaves the handler's
    /// own default in force.
    pub session_expiry: Option<Duration>,
    /// How often expired sessions are reaped. `None` as above.
    pub cleanup_interval: Option<Duration>,
    /// Cross-origin acceptance policy.
    pub origins: OriginPolicy,
    /// Enqueue side of the cooperative scheduler. Present exactly when the
    /// registry holds cooperative or stepped entries.
    pub scheduler: Option<SchedulerHandle>,
}

/// Options for building a [`Bridge`] outside the bootstrap.
///
/// Covers the same surface the bootstrap resolves itself, minus everything
/// that only makes sense when this crate owns the server: port, host,
/// execution mode, and engine options.
pub struct SessionOptions {
    pub(crate) applications: Applications,
    pub(crate) cdn: Cdn,
    pub(crate) session_expiry: Option<Duration>,
    pub(crate) cleanup_interval: Option<Duration>,
    pub(crate) allowed_origins: Vec<String>,
    pub(crate) check_origin: Option<OriginPredicate>,
}

impl SessionOptions {
    /// Options with the default posture: CDN on, no extra allowed origins,
    /// handler-default expiry.
    pub fn new(applications: impl Into<Applications>) -> Self {
        Self {
            applications: applications.into(),
            cdn: Cdn::Default,
            session_expiry: None,
            cleanup_interval: None,
            allowed_origins: Vec::new(),
            check_origin: None,
        }
    }

    /// Sets the asset-delivery mode. `false` disables the CDN, a string is
    /// an explicit base URL.
    pub fn cdn(mut self, cdn: impl Into<Cdn>) -> Self {
        self.cdn = cdn.into();
        self
    }

    /// Overrides the handler's session expiry.
    pub fn session_expiry(mut self, expiry: Duration) -> Self {
        self.session_expiry = Some(expiry);
        self
    }

    /// Overrides the handler's cleanup interval.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Allows one cross-origin pattern (`*` and `?` wildcards).
    pub fn allow_origin(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_origins.push(pattern.into());
        self
    }

    /// Installs a custom origin predicate, consulted after the patterns.
    pub fn check_origin<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.check_origin = Some(Arc::new(predicate));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::AppEntry;

    #[test]
    fn options_default_to_cdn_on() {
        let options = SessionOptions::new(AppEntry::synchronous(|| {}));
        assert_eq!(options.cdn, Cdn::Default);
        assert!(options.allowed_origins.is_empty());
        assert!(options.session_expiry.is_none());
    }

    #[test]
    fn builder_methods_accumulate() {
        let options = SessionOptions::new(AppEntry::synchronous(|| {}))
            .cdn(false)
            .session_expiry(Duration::from_secs(600))
            .cleanup_interval(Duration::from_secs(120))
            .allow_origin("https://*.example.com")
            .allow_origin("https://demo.test")
            .check_origin(|origin| origin.ends_with(".internal"));

        assert_eq!(options.cdn, Cdn::Disabled);
        assert_eq!(options.session_expiry, Some(Duration::from_secs(600)));
        assert_eq!(options.cleanup_interval, Some(Duration::from_secs(120)));
        assert_eq!(options.allowed_origins.len(), 2);
        assert!(options.check_origin.is_some());
    }
}
