//! Application registry: named entry points resolved once at startup.
//!
//! Callers hand the bootstrap a single entry point, a named list, or a map;
//! [`AppRegistry::resolve`] flattens all three into one immutable name → entry
//! table shared read-only across every request. Each [`AppEntry`] carries its
//! execution model as a tag decided at registration time, so mode selection
//! at startup is a simple scan instead of runtime reflection.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

/// Name a single unnamed application registers under.
pub const DEFAULT_APP_NAME: &str = "index";

/// Future produced by a cooperative entry point.
pub type AppFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Type-erased synchronous entry point.
pub type SyncFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Type-erased cooperative entry point: each call yields a fresh future.
pub type CooperativeFn = Arc<dyn Fn() -> AppFuture + Send + Sync + 'static>;

/// Type-erased stepped entry point: each call yields a fresh step iterator.
pub type SteppedFn =
    Arc<dyn Fn() -> Box<dyn Iterator<Item = ()> + Send + 'static> + Send + Sync + 'static>;

/// One registered application entry point, tagged by execution model.
///
/// `Synchronous` entries run to completion on the serving thread.
/// `Cooperative` and `Stepped` entries suspend, so they must resume on the
/// scheduler's event loop; their presence in a registry is what makes the
/// bootstrap provision one.
#[derive(Clone)]
pub enum AppEntry {
    /// Plain blocking function.
    Synchronous(SyncFn),
    /// Coroutine-based app producing a future per session.
    Cooperative(CooperativeFn),
    /// App written as a lazy sequence of work steps, resumed step by step.
    Stepped(SteppedFn),
}

impl AppEntry {
    /// Wraps a blocking function.
    pub fn synchronous<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::Synchronous(Arc::new(run))
    }

    /// Wraps an async function; each invocation produces one boxed future.
    pub fn cooperative<F, Fut>(run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let factory: CooperativeFn = Arc::new(move || Box::pin(run()));
        Self::Cooperative(factory)
    }

    /// Wraps a step-iterator factory.
    pub fn stepped<F, I>(run: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: Iterator<Item = ()> + Send + 'static,
    {
        let factory: SteppedFn = Arc::new(move || Box::new(run()));
        Self::Stepped(factory)
    }

    /// `true` when this entry cannot run without the cooperative scheduler.
    pub fn needs_event_loop(&self) -> bool {
        !matches!(self, Self::Synchronous(_))
    }

    /// Tag name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Synchronous(_) => "synchronous",
            Self::Cooperative(_) => "cooperative",
            Self::Stepped(_) => "stepped",
        }
    }
}

impl fmt::Debug for AppEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppEntry::{}", self.kind())
    }
}

/// The three input shapes accepted at startup.
#[derive(Debug)]
pub enum Applications {
    /// One unnamed app, registered as [`DEFAULT_APP_NAME`].
    Single(AppEntry),
    /// Named apps in registration order.
    List(Vec<(String, AppEntry)>),
    /// Named apps.
    Map(HashMap<String, AppEntry>),
}

impl Applications {
    /// Builds the list form from any iterator of `(name, entry)` pairs.
    pub fn named<I, S>(apps: I) -> Self
    where
        I: IntoIterator<Item = (S, AppEntry)>,
        S: Into<String>,
    {
        Self::List(
            apps.into_iter()
                .map(|(name, entry)| (name.into(), entry))
                .collect(),
        )
    }
}

impl From<AppEntry> for Applications {
    fn from(entry: AppEntry) -> Self {
        Self::Single(entry)
    }
}

impl From<Vec<(String, AppEntry)>> for Applications {
    fn from(entries: Vec<(String, AppEntry)>) -> Self {
        Self::List(entries)
    }
}

impl From<HashMap<String, AppEntry>> for Applications {
    fn from(map: HashMap<String, AppEntry>) -> Self {
        Self::Map(map)
    }
}

/// Errors raised while resolving the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate application name: {name}")]
    DuplicateName { name: String },
}

/// Immutable name → entry table, resolved once and shared across requests.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: HashMap<String, AppEntry>,
}

impl AppRegistry {
    /// Flattens any accepted input shape into the registry.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateName`] when a list registers the same name
    /// twice.
    pub fn resolve(input: impl Into<Applications>) -> Result<Self, RegistryError> {
        let mut apps = HashMap::new();
        match input.into() {
            Applications::Single(entry) => {
                apps.insert(DEFAULT_APP_NAME.to_owned(), entry);
            }
            Applications::List(entries) => {
                for (name, entry) in entries {
                    if apps.contains_key(&name) {
                        return Err(RegistryError::DuplicateName { name });
                    }
                    apps.insert(name, entry);
                }
            }
            Applications::Map(map) => apps = map,
        }
        debug!(count = apps.len(), "application registry resolved");
        Ok(Self { apps })
    }

    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Option<&AppEntry> {
        self.apps.get(name)
    }

    /// `true` if an app with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.apps.contains_key(name)
    }

    /// Iterates registered names in arbitrary order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    /// Number of registered apps.
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// `true` when at least one entry needs the cooperative scheduler.
    pub fn requires_event_loop(&self) -> bool {
        self.apps.values().any(AppEntry::needs_event_loop)
    }
}
