//! # gantry
//!
//! A backend-agnostic HTTP context contract and server bootstrap for
//! long-polling session apps.
//!
//! Session handlers are written once against the [`HttpContext`] trait and
//! served by any conforming backend. The built-in backend binds a listener,
//! routes the session endpoint next to a static asset tree, and runs in one
//! of two execution modes: a tokio event loop (the default) or
//! thread-per-connection, selected at startup through the
//! `GANTRY_THREADED_SERVER` environment variable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gantry::{AppEntry, Content, HttpContext, ServerConfig, SessionHandler};
//!
//! struct Echo;
//!
//! impl SessionHandler for Echo {
//!     fn handle_request(&self, ctx: &mut dyn HttpContext) {
//!         let reply = format!("hello from a {} request", ctx.method());
//!         ctx.set_content(Content::from(reply));
//!     }
//! }
//!
//! fn main() -> Result<(), gantry::ServerError> {
//!     let config = ServerConfig::new(AppEntry::synchronous(|| {}))
//!         .port(8080)
//!         .cdn(false);
//!     gantry::start_server(config, |_config| Echo)
//! }
//! ```

pub mod apps;
pub mod assets;
pub mod context;
pub mod http;
pub mod origin;
pub mod scheduler;
pub mod server;
pub mod session;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use apps::{AppEntry, AppRegistry, Applications};
pub use context::{Content, ContextError, Finalize, HttpContext, ServerContext};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use origin::OriginPolicy;
pub use server::{ConfigError, ExecutionMode, ServerConfig, ServerError, start_server};
pub use session::{Bridge, Cdn, SessionConfig, SessionHandler, SessionOptions};
