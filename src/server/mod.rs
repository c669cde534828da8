//! Server bootstrap: a staged state machine from raw configuration to a
//! serving process.
//!
//! [`ServerConfig`] holds raw caller input. [`ServerConfig::configure`] binds
//! the listener (port 0 selects a free port), validates the CDN mode, and
//! fixes the engine settings, producing a [`Configured`] value whose bound
//! address is already discoverable. [`Configured::wire`] resolves the
//! application registry and origin policy, provisions the scheduler channel
//! when any app needs it, and assembles the route table and session bridge
//! into a [`Wired`] server. [`Wired::serve`] picks the execution mode and
//! runs until the process exits.
//!
//! Two execution modes exist. The default event loop serves every connection
//! on one tokio runtime that also drives cooperative apps. Threaded mode,
//! opted into through [`MODE_ENV_VAR`], serves each connection on its own OS
//! thread and starts at most one background scheduler thread. Everything
//! fatal happens before serving starts; once a loop runs, a failure is
//! confined to the request that caused it.

mod dispatch;
mod event;
mod routes;
mod threaded;

pub use routes::{RouteTable, RouteTarget};

use std::collections::BTreeMap;
use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::apps::{AppRegistry, Applications, RegistryError};
use crate::assets::StaticFiles;
use crate::origin::{OriginPolicy, OriginPredicate};
use crate::scheduler::{self, JobQueue, SchedulerError};
use crate::session::{Bridge, Cdn, CdnError, SessionConfig, SessionHandler};

use dispatch::Dispatcher;

/// Environment variable selecting the execution mode.
///
/// Truthy values (`1`, `true`, `yes`, `on`, case-insensitive) select threaded
/// mode; anything else, including unset, selects the event loop.
pub const MODE_ENV_VAR: &str = "GANTRY_THREADED_SERVER";

/// Default cap on one buffered request, head and body together (8 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Fatal configuration failures, all raised before any serving thread exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cdn(#[from] CdnError),

    #[error("setting `{key}` is fixed by the bootstrap and cannot be supplied as an option")]
    ReservedSetting { key: String },

    #[error("invalid value for option `{key}`: expected {expected}")]
    InvalidOption { key: String, expected: &'static str },

    #[error(transparent)]
    Apps(#[from] RegistryError),
}

/// Errors produced once configuration has been accepted.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// How the wired server executes requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One async runtime serves connections and drives cooperative apps.
    EventLoop,
    /// Thread-per-connection serving plus at most one scheduler thread.
    Threaded,
}

impl ExecutionMode {
    /// Resolves the mode from [`MODE_ENV_VAR`].
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if is_truthy(v) => Self::Threaded,
            _ => Self::EventLoop,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Host-header validation applied before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPolicy {
    /// Accept any `Host` header. The bootstrap pins this variant; session
    /// security rests on the origin policy, not on host names.
    AllowAll,
    /// Accept only the listed host names, compared case-insensitively and
    /// without the port.
    AllowList(Vec<String>),
}

impl HostPolicy {
    /// `true` when a request carrying `host` may be served.
    pub fn permits(&self, host: Option<&str>) -> bool {
        match self {
            Self::AllowAll => true,
            Self::AllowList(allowed) => {
                let Some(host) = host else { return false };
                let name = match host.rsplit_once(':') {
                    Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
                    _ => host,
                };
                allowed.iter().any(|entry| entry.eq_ignore_ascii_case(name))
            }
        }
    }
}

/// Resolved engine settings applied to the serving loops.
///
/// Four settings are owned by the bootstrap and rejected when supplied
/// through the options map: `debug` (a first-class [`ServerConfig::debug`]
/// switch), `host_policy` (pinned permissive), `routes` (the fixed two-entry
/// table), and `secret_key` (generated fresh per bootstrap).
/// `max_request_bytes` and `keep_alive` stay caller-tunable.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Raises per-request access logs from debug to info level.
    pub debug: bool,
    /// Host-header validation; always [`HostPolicy::AllowAll`] out of the
    /// bootstrap.
    pub host_policy: HostPolicy,
    /// Fresh random token; consumers that sign session state read it here.
    pub secret_key: String,
    /// Reject a request once its buffered size exceeds this many bytes.
    pub max_request_bytes: usize,
    /// Honor HTTP/1.1 persistent connections.
    pub keep_alive: bool,
}

impl ServerSettings {
    /// Option keys owned by the bootstrap.
    pub const RESERVED: [&'static str; 4] = ["debug", "host_policy", "routes", "secret_key"];

    fn resolve(debug: bool, options: &BTreeMap<String, Value>) -> Result<Self, ConfigError> {
        let mut settings = Self {
            debug,
            host_policy: HostPolicy::AllowAll,
            secret_key: secret_token(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            keep_alive: true,
        };

        for (key, value) in options {
            if Self::RESERVED.contains(&key.as_str()) {
                return Err(ConfigError::ReservedSetting { key: key.clone() });
            }
            match key.as_str() {
                "max_request_bytes" => {
                    settings.max_request_bytes = value
                        .as_u64()
                        .filter(|&n| n > 0)
                        .ok_or_else(|| ConfigError::InvalidOption {
                            key: key.clone(),
                            expected: "a positive integer",
                        })? as usize;
                }
                "keep_alive" => {
                    settings.keep_alive =
                        value.as_bool().ok_or_else(|| ConfigError::InvalidOption {
                            key: key.clone(),
                            expected: "a boolean",
                        })?;
                }
                _ => warn!(key = %key, "unknown server option ignored"),
            }
        }

        Ok(settings)
    }
}

// 32 alphanumeric characters from the thread-local generator.
fn secret_token() -> String {
    std::iter::repeat_with(fastrand::alphanumeric).take(32).collect()
}

/// Raw caller configuration; the unconfigured bootstrap state.
///
/// # Examples
///
/// ```rust,no_run
/// use gantry::apps::AppEntry;
/// use gantry::server::ServerConfig;
///
/// let config = ServerConfig::new(AppEntry::synchronous(|| {}))
///     .host("0.0.0.0")
///     .port(0)
///     .cdn(false)
///     .allow_origin("https://*.example.com");
/// ```
pub struct ServerConfig {
    applications: Applications,
    port: u16,
    host: String,
    cdn: Cdn,
    allowed_origins: Vec<String>,
    check_origin: Option<OriginPredicate>,
    session_expiry: Option<Duration>,
    cleanup_interval: Option<Duration>,
    debug: bool,
    static_root: PathBuf,
    options: BTreeMap<String, Value>,
}

impl ServerConfig {
    /// Configuration with defaults: `localhost:8080`, CDN on, local assets
    /// under `./static`, no extra origins.
    ///
    /// `applications` accepts a single entry, a `(name, entry)` list (see
    /// [`Applications::named`]), or a map.
    pub fn new(applications: impl Into<Applications>) -> Self {
        Self {
            applications: applications.into(),
            port: 8080,
            host: "localhost".to_owned(),
            cdn: Cdn::Default,
            allowed_origins: Vec::new(),
            check_origin: None,
            session_expiry: None,
            cleanup_interval: None,
            debug: false,
            static_root: PathBuf::from("./static"),
            options: BTreeMap::new(),
        }
    }

    /// TCP port to bind. Port 0 asks the OS for a free one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Host or address to bind. Empty means every interface.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Asset-delivery mode. `false` disables the CDN, a string is an
    /// explicit base URL.
    pub fn cdn(mut self, cdn: impl Into<Cdn>) -> Self {
        self.cdn = cdn.into();
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

    /// Overrides the session handler's idle expiry.
    pub fn session_expiry(mut self, expiry: Duration) -> Self {
        self.session_expiry = Some(expiry);
        self
    }

    /// Overrides the session handler's cleanup interval.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Raises access logging to info level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Directory served by the static asset route.
    pub fn static_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.static_root = root.into();
        self
    }

    /// Passes one engine option through to settings resolution.
    ///
    /// Known keys are `max_request_bytes` and `keep_alive`. Unknown keys are
    /// logged and ignored at [`configure`](Self::configure) time; reserved
    /// keys are rejected there.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Resolves the configuration and binds the listener.
    ///
    /// The chosen address is available through [`Configured::local_addr`]
    /// before serving starts, so two concurrent bootstraps asking for port 0
    /// can never race each other for the same port.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] is fatal and arrives before a single serving
    /// thread exists: an unbindable address, an unusable default CDN, a
    /// reserved or invalid option.
    pub fn configure(self) -> Result<Configured, ConfigError> {
        let host = if self.host.is_empty() {
            "0.0.0.0".to_owned()
        } else {
            self.host
        };
        let requested = format!("{host}:{port}", port = self.port);

        let listener =
            TcpListener::bind((host.as_str(), self.port)).map_err(|source| ConfigError::Bind {
                addr: requested.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ConfigError::Bind {
            addr: requested,
            source,
        })?;

        let cdn = self.cdn.ensure_usable()?;
        let settings = ServerSettings::resolve(self.debug, &self.options)?;

        info!(address = %local_addr, debug = settings.debug, "server configured");

        Ok(Configured {
            listener,
            local_addr,
            cdn,
            settings,
            applications: self.applications,
            allowed_origins: self.allowed_origins,
            check_origin: self.check_origin,
            session_expiry: self.session_expiry,
            cleanup_interval: self.cleanup_interval,
            static_root: self.static_root,
        })
    }
}

/// Bootstrap state after [`ServerConfig::configure`]: the listener is bound
/// and the engine settings are fixed.
pub struct Configured {
    listener: TcpListener,
    local_addr: SocketAddr,
    cdn: Cdn,
    settings: ServerSettings,
    applications: Applications,
    allowed_origins: Vec<String>,
    check_origin: Option<OriginPredicate>,
    session_expiry: Option<Duration>,
    cleanup_interval: Option<Duration>,
    static_root: PathBuf,
}

impl Configured {
    /// The concrete bound address, exact even when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The resolved engine settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Wires routing and the session layer.
    ///
    /// The scheduler channel is created exactly when some registry entry is
    /// cooperative or stepped; its enqueue handle reaches the session handler
    /// inside the [`SessionConfig`]. `make_handler` runs once, before any
    /// serving thread exists.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Apps`] when the applications input is invalid.
    pub fn wire<H, F>(self, make_handler: F) -> Result<Wired<H>, ConfigError>
    where
        H: SessionHandler,
        F: FnOnce(SessionConfig) -> H,
    {
        let registry = Arc::new(AppRegistry::resolve(self.applications)?);
        let (scheduler, jobs) = registry
            .requires_event_loop()
            .then(scheduler::channel)
            .unzip();

        info!(
            apps = registry.len(),
            cooperative = scheduler.is_some(),
            "application registry wired"
        );

        let config = SessionConfig {
            registry,
            cdn: self.cdn,
            session_expiry: self.session_expiry,
            cleanup_interval: self.cleanup_interval,
            origins: OriginPolicy::from_parts(self.allowed_origins, self.check_origin),
            scheduler,
        };
        let bridge = Bridge::new(make_handler(config));

        let dispatcher = Dispatcher::new(
            bridge,
            RouteTable::standard(),
            StaticFiles::new(self.static_root),
            self.settings,
        );

        Ok(Wired {
            listener: self.listener,
            local_addr: self.local_addr,
            dispatcher: Arc::new(dispatcher),
            jobs,
        })
    }
}

// The applications table and the origin predicate hold bare functions.
impl fmt::Debug for Configured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configured")
            .field("local_addr", &self.local_addr)
            .field("cdn", &self.cdn)
            .field("settings", &self.settings)
            .field("static_root", &self.static_root)
            .finish_non_exhaustive()
    }
}

/// Fully wired server, ready to enter the terminal serving state.
pub struct Wired<H> {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher<H>>,
    jobs: Option<JobQueue>,
}

impl<H: SessionHandler> Wired<H> {
    /// The concrete bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until process exit in the mode selected by [`MODE_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Only startup failures return; the loops themselves run forever and
    /// survive per-connection errors.
    pub fn serve(self) -> Result<(), ServerError> {
        self.serve_with_mode(ExecutionMode::from_env())
    }

    /// Serves until process exit in an explicit mode.
    ///
    /// In threaded mode the scheduler queue, when present, is handed to one
    /// detached background thread started here, before the first accept;
    /// request threads never resume cooperative apps themselves. In
    /// event-loop mode the queue becomes a task on the serving runtime.
    pub fn serve_with_mode(self, mode: ExecutionMode) -> Result<(), ServerError> {
        match mode {
            ExecutionMode::EventLoop => event::serve(self.listener, self.dispatcher, self.jobs),
            ExecutionMode::Threaded => {
                if let Some(queue) = self.jobs {
                    scheduler::spawn_background(queue)?;
                }
                threaded::serve(self.listener, self.dispatcher)
            }
        }
    }
}

impl<H> fmt::Debug for Wired<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wired")
            .field("local_addr", &self.local_addr)
            .field("scheduler", &self.jobs.is_some())
            .finish_non_exhaustive()
    }
}

/// Runs the whole bootstrap and serves until the process exits.
///
/// Convenience over the staged API ([`ServerConfig::configure`], then
/// [`Configured::wire`], then [`Wired::serve`]), which additionally exposes
/// the bound address between steps.
///
/// # Errors
///
/// Configuration failures surface here before serving; afterwards only a
/// broken listener can end the loop.
pub fn start_server<H, F>(config: ServerConfig, make_handler: F) -> Result<(), ServerError>
where
    H: SessionHandler,
    F: FnOnce(SessionConfig) -> H,
{
    let wired = config.configure()?.wire(make_handler)?;
    wired.serve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{AppEntry, DEFAULT_APP_NAME};
    use crate::context::{Content, HttpContext};
    use crate::http::StatusCode;
    use crate::scheduler::SCHEDULER_THREAD_NAME;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullHandler;

    impl SessionHandler for NullHandler {
        fn handle_request(&self, _ctx: &mut dyn HttpContext) {}
    }

    struct DemoHandler {
        config: SessionConfig,
        calls: Arc<AtomicUsize>,
    }

    impl SessionHandler for DemoHandler {
        fn handle_request(&self, ctx: &mut dyn HttpContext) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let app = ctx.url_parameter_or("app", DEFAULT_APP_NAME).to_owned();
            if !self.config.registry.contains(&app) {
                ctx.set_status(StatusCode::NotFound);
                ctx.set_content(Content::from("no such app"));
                return;
            }
            match ctx.json_body() {
                Some(message) => {
                    let reply = json!({ "app": app, "echo": message });
                    ctx.set_json(&reply).unwrap();
                }
                None => ctx.set_content(Content::from(format!("session:{app}"))),
            }
        }
    }

    fn demo_apps() -> Applications {
        Applications::named([("demo", AppEntry::synchronous(|| {}))])
    }

    fn base_config() -> ServerConfig {
        ServerConfig::new(demo_apps())
            .host("127.0.0.1")
            .port(0)
            .cdn(false)
    }

    fn serve_fixture(
        mode: ExecutionMode,
        apps: Applications,
        root: &std::path::Path,
        options: &[(&str, Value)],
    ) -> (SocketAddr, Arc<AtomicUsize>, SessionConfig) {
        let mut config = ServerConfig::new(apps)
            .host("127.0.0.1")
            .port(0)
            .cdn(false)
            .static_root(root);
        for (key, value) in options {
            config = config.option(*key, value.clone());
        }

        let configured = config.configure().unwrap();
        let addr = configured.local_addr();

        let calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = Arc::clone(&calls);
        let mut captured = None;
        let wired = configured
            .wire(|config| {
                captured = Some(config.clone());
                DemoHandler {
                    config,
                    calls: handler_calls,
                }
            })
            .unwrap();

        std::thread::spawn(move || {
            let _ = wired.serve_with_mode(mode);
        });

        (addr, calls, captured.unwrap())
    }

    fn http_request(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn port_zero_selects_a_concrete_free_port() {
        let configured = base_config().configure().unwrap();
        assert_ne!(configured.local_addr().port(), 0);
    }

    #[test]
    fn concurrent_auto_selected_ports_never_collide() {
        let a = base_config().configure().unwrap();
        let b = base_config().configure().unwrap();
        assert_ne!(a.local_addr(), b.local_addr());
    }

    #[test]
    fn empty_host_means_every_interface() {
        let configured = ServerConfig::new(demo_apps())
            .host("")
            .port(0)
            .cdn(false)
            .configure()
            .unwrap();
        assert!(configured.local_addr().ip().is_unspecified());
    }

    #[test]
    fn bind_failures_carry_the_requested_address() {
        let err = ServerConfig::new(demo_apps())
            .host("not-resolvable.invalid")
            .port(0)
            .cdn(false)
            .configure()
            .unwrap_err();
        match err {
            ConfigError::Bind { addr, .. } => assert!(addr.contains("not-resolvable.invalid")),
            other => panic!("expected a bind error, got {other:?}"),
        }
    }

    #[test]
    fn reserved_settings_cannot_be_overridden() {
        for key in ServerSettings::RESERVED {
            let err = base_config().option(key, json!(true)).configure().unwrap_err();
            assert!(matches!(err, ConfigError::ReservedSetting { .. }), "{key}");
        }
    }

    #[test]
    fn engine_options_tune_the_settings() {
        let configured = base_config()
            .option("max_request_bytes", json!(1024))
            .option("keep_alive", json!(false))
            .configure()
            .unwrap();
        assert_eq!(configured.settings().max_request_bytes, 1024);
        assert!(!configured.settings().keep_alive);
    }

    #[test]
    fn invalid_option_values_are_fatal() {
        let err = base_config()
            .option("max_request_bytes", json!("lots"))
            .configure()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));

        let err = base_config()
            .option("keep_alive", json!(1))
            .configure()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
    }

    #[test]
    fn unknown_options_are_ignored() {
        let configured = base_config()
            .option("shiny_new_toggle", json!(true))
            .configure()
            .unwrap();
        assert_eq!(
            configured.settings().max_request_bytes,
            DEFAULT_MAX_REQUEST_BYTES
        );
    }

    #[test]
    fn bootstrap_owns_debug_host_policy_and_secret() {
        let configured = base_config().debug(true).configure().unwrap();
        let settings = configured.settings();
        assert!(settings.debug);
        assert_eq!(settings.host_policy, HostPolicy::AllowAll);
        assert_eq!(settings.secret_key.len(), 32);
        assert!(settings.secret_key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(settings.keep_alive);
    }

    #[test]
    fn each_bootstrap_gets_its_own_secret() {
        let a = base_config().configure().unwrap();
        let b = base_config().configure().unwrap();
        assert_ne!(a.settings().secret_key, b.settings().secret_key);
    }

    #[test]
    fn host_policy_matches_names_without_ports() {
        let policy = HostPolicy::AllowList(vec!["app.test".to_owned()]);
        assert!(policy.permits(Some("app.test")));
        assert!(policy.permits(Some("APP.TEST:8080")));
        assert!(!policy.permits(Some("evil.test")));
        assert!(!policy.permits(None));
        assert!(HostPolicy::AllowAll.permits(None));
    }

    #[test]
    fn mode_toggle_parses_boolean_like_values() {
        for value in ["1", "true", "TRUE", "Yes", " on "] {
            assert_eq!(
                ExecutionMode::from_value(Some(value)),
                ExecutionMode::Threaded,
                "{value}"
            );
        }
        for value in ["0", "false", "off", "", "maybe"] {
            assert_eq!(
                ExecutionMode::from_value(Some(value)),
                ExecutionMode::EventLoop,
                "{value}"
            );
        }
        assert_eq!(ExecutionMode::from_value(None), ExecutionMode::EventLoop);
    }

    #[test]
    fn duplicate_app_names_fail_at_wire_time() {
        let apps = Applications::named([
            ("a", AppEntry::synchronous(|| {})),
            ("a", AppEntry::synchronous(|| {})),
        ]);
        let configured = ServerConfig::new(apps)
            .host("127.0.0.1")
            .port(0)
            .cdn(false)
            .configure()
            .unwrap();
        let err = configured.wire(|_| NullHandler).unwrap_err();
        assert!(matches!(err, ConfigError::Apps(_)));
    }

    #[test]
    fn synchronous_registries_provision_no_scheduler() {
        let configured = base_config().configure().unwrap();
        let mut captured = None;
        let _wired = configured
            .wire(|config| {
                captured = Some(config.clone());
                NullHandler
            })
            .unwrap();
        assert!(captured.unwrap().scheduler.is_none());
    }

    #[test]
    fn event_loop_serves_sessions_and_assets() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("app.css"), "body{}").unwrap();
        let (addr, calls, _config) =
            serve_fixture(ExecutionMode::EventLoop, demo_apps(), root.path(), &[]);

        let response = http_request(
            addr,
            "GET /?app=demo HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("session:demo"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let response = http_request(
            addr,
            "GET /app.css HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("text/css"));
        assert!(response.ends_with("body{}"));

        let response = http_request(
            addr,
            "GET /missing.js HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 404"));

        // Asset paths never reached the session handler.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_loop_echoes_json_bodies() {
        let root = tempfile::tempdir().unwrap();
        let (addr, _calls, _config) =
            serve_fixture(ExecutionMode::EventLoop, demo_apps(), root.path(), &[]);

        let body = r#"{"msg":"hello"}"#;
        let raw = format!(
            "POST /?app=demo HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let response = http_request(addr, &raw);
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("application/json"));
        assert!(response.contains(r#""echo":{"msg":"hello"}"#));
    }

    #[test]
    fn event_loop_answers_pipelined_keep_alive_requests() {
        let root = tempfile::tempdir().unwrap();
        let (addr, calls, _config) =
            serve_fixture(ExecutionMode::EventLoop, demo_apps(), root.path(), &[]);

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let pipelined = "GET /?app=demo HTTP/1.1\r\nHost: x\r\n\r\n\
                         GET /?app=demo HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        stream.write_all(pipelined.as_bytes()).unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2, "{response}");
        assert_eq!(response.matches("session:demo").count(), 2);
        assert!(response.contains("Connection: keep-alive"));
        assert!(response.contains("Connection: close"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn oversized_requests_get_413() {
        let root = tempfile::tempdir().unwrap();
        let (addr, _calls, _config) = serve_fixture(
            ExecutionMode::EventLoop,
            demo_apps(),
            root.path(),
            &[("max_request_bytes", json!(64))],
        );

        let body = "x".repeat(100);
        let raw = format!(
            "POST /?app=demo HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let response = http_request(addr, &raw);
        assert!(response.starts_with("HTTP/1.1 413"), "{response}");
    }

    #[test]
    fn malformed_requests_get_400() {
        let root = tempfile::tempdir().unwrap();
        let (addr, _calls, _config) =
            serve_fixture(ExecutionMode::EventLoop, demo_apps(), root.path(), &[]);

        let response = http_request(addr, "garbage\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 400"), "{response}");
    }

    #[test]
    fn threaded_serves_sessions_with_a_scheduler_thread() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("app.js"), "console.log(1)").unwrap();
        let apps = Applications::named([
            ("demo", AppEntry::synchronous(|| {})),
            ("live", AppEntry::cooperative(|| async {})),
        ]);
        let (addr, calls, config) =
            serve_fixture(ExecutionMode::Threaded, apps, root.path(), &[]);

        let response = http_request(
            addr,
            "GET /?app=live HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("session:live"));

        let response = http_request(
            addr,
            "GET /app.js HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Cooperative work resumes on the one named scheduler thread.
        let scheduler = config
            .scheduler
            .expect("cooperative registry provisions a scheduler");
        let (tx, rx) = std::sync::mpsc::channel();
        scheduler
            .spawn(async move {
                let _ = tx.send(std::thread::current().name().map(str::to_owned));
            })
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(SCHEDULER_THREAD_NAME));
    }

    #[test]
    fn threaded_mode_without_async_apps_serves_plainly() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("app.js"), "void 0;").unwrap();
        let (addr, calls, config) =
            serve_fixture(ExecutionMode::Threaded, demo_apps(), root.path(), &[]);
        assert!(config.scheduler.is_none());

        let response = http_request(
            addr,
            "GET /?app=demo HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("session:demo"));

        let response = http_request(
            addr,
            "GET /app.js HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("void 0;"));

        // Asset paths never reached the session handler.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
