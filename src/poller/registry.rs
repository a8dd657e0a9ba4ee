//! Poller type registry.
//!
//! # Responsibilities
//! - Map a poll-type name to a transport strategy
//! - Build one shared (global) context per type when an engine starts
//! - Build a per-target context from the shared one
//! - Substitute the default type for unknown names
//!
//! # Design Decisions
//! - The registry is an explicit object, built once at startup and shared
//!   read-only via `Arc`, so tests and multiple engines stay isolated
//! - Each poll type keeps statically typed contexts; the engine only sees the
//!   small `GlobalContext` / `TargetContext` capability interfaces

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::poller::types::{EngineSettings, PollResponse, TargetConfig};

/// Static metadata about this process, available to every poll type.
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub hostname: String,
    pub user_agent: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        let name = env!("CARGO_PKG_NAME").to_string();
        let version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            user_agent: format!("{}/{}", name, version),
            name,
            version,
            hostname: String::new(),
        }
    }
}

/// Process-wide transport settings handed to `global_init`.
#[derive(Debug, Clone, Copy)]
pub struct GlobalSettings {
    pub timeout: Duration,
    pub no_keep_alive: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            no_keep_alive: false,
        }
    }
}

/// Arguments of one poll.
#[derive(Debug, Clone, Copy)]
pub struct PollRequest<'a> {
    pub address: &'a str,
    pub host: Option<&'a str>,
    pub poll_id: u64,
}

/// A pluggable transport strategy.
pub trait PollerType: Send + Sync + 'static {
    /// Context shared by every target of an engine (e.g. a pooled client).
    type Global: Send + Sync + 'static;
    /// Context owned by a single target.
    type Target: Send + Sync + 'static;

    /// Runs once per engine start.
    fn global_init(&self, settings: &GlobalSettings, app: &AppInfo) -> Self::Global;

    /// Runs once per target. Implementations that need different settings
    /// than the shared context derive a copy; they never mutate `global`.
    fn init(&self, target: &TargetConfig, engine: &EngineSettings, global: &Self::Global) -> Self::Target;

    /// Performs exactly one synchronous round-trip.
    fn poll<'a>(
        &'a self,
        ctx: &'a Self::Target,
        request: PollRequest<'a>,
    ) -> impl Future<Output = PollResponse> + Send + 'a;
}

/// Shared context of one poll type, able to derive target contexts.
pub trait GlobalContext: Send + Sync {
    fn init(&self, target: &TargetConfig, engine: &EngineSettings) -> Arc<dyn TargetContext>;
}

/// Per-target context, able to poll.
pub trait TargetContext: Send + Sync {
    fn poll<'a>(&'a self, request: PollRequest<'a>) -> BoxFuture<'a, PollResponse>;
}

trait RegisteredType: Send + Sync {
    fn global_init(&self, settings: &GlobalSettings, app: &AppInfo) -> Arc<dyn GlobalContext>;
}

struct Registered<P>(Arc<P>);

impl<P: PollerType> RegisteredType for Registered<P> {
    fn global_init(&self, settings: &GlobalSettings, app: &AppInfo) -> Arc<dyn GlobalContext> {
        Arc::new(Global {
            poller: self.0.clone(),
            ctx: self.0.global_init(settings, app),
        })
    }
}

struct Global<P: PollerType> {
    poller: Arc<P>,
    ctx: P::Global,
}

impl<P: PollerType> GlobalContext for Global<P> {
    fn init(&self, target: &TargetConfig, engine: &EngineSettings) -> Arc<dyn TargetContext> {
        Arc::new(Target {
            poller: self.poller.clone(),
            ctx: self.poller.init(target, engine, &self.ctx),
        })
    }
}

struct Target<P: PollerType> {
    poller: Arc<P>,
    ctx: P::Target,
}

impl<P: PollerType> TargetContext for Target<P> {
    fn poll<'a>(&'a self, request: PollRequest<'a>) -> BoxFuture<'a, PollResponse> {
        Box::pin(self.poller.poll(&self.ctx, request))
    }
}

/// Table of poll types keyed by name.
pub struct PollerRegistry {
    types: HashMap<String, Arc<dyn RegisteredType>>,
    default_type: String,
}

impl PollerRegistry {
    /// Create an empty registry falling back to `default_type`.
    pub fn new(default_type: impl Into<String>) -> Self {
        Self {
            types: HashMap::new(),
            default_type: default_type.into(),
        }
    }

    /// Create a registry holding the built-in `http` and `noop` types.
    pub fn with_builtin(default_type: impl Into<String>) -> Self {
        let mut registry = Self::new(default_type);
        registry.register(crate::poller::http::HTTP_POLLER_TYPE, crate::poller::http::HttpPoller);
        registry.register(crate::poller::noop::NOOP_POLLER_TYPE, crate::poller::noop::NoopPoller);
        registry
    }

    /// Register (or replace) a poll type.
    pub fn register<P: PollerType>(&mut self, name: impl Into<String>, poller: P) {
        self.types.insert(name.into(), Arc::new(Registered(Arc::new(poller))));
    }

    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Names of all registered types.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run every type's global init once.
    pub fn global_contexts(&self, settings: &GlobalSettings, app: &AppInfo) -> GlobalContexts {
        let contexts = self
            .types
            .iter()
            .map(|(name, ty)| (name.clone(), ty.global_init(settings, app)))
            .collect();
        GlobalContexts {
            contexts,
            default_type: self.default_type.clone(),
        }
    }
}

impl std::fmt::Debug for PollerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerRegistry")
            .field("types", &self.names())
            .field("default_type", &self.default_type)
            .finish()
    }
}

/// Global contexts of every registered type for one engine.
pub struct GlobalContexts {
    contexts: HashMap<String, Arc<dyn GlobalContext>>,
    default_type: String,
}

impl GlobalContexts {
    /// Look up a poll type, falling back to the default on a miss.
    ///
    /// Returns the name actually used, or `None` when even the default is
    /// not registered.
    pub fn resolve(&self, poll_type: &str) -> Option<(&str, &Arc<dyn GlobalContext>)> {
        if let Some((name, ctx)) = self.contexts.get_key_value(poll_type) {
            return Some((name.as_str(), ctx));
        }
        if !poll_type.is_empty() {
            tracing::warn!(
                poll_type = %poll_type,
                default = %self.default_type,
                "Poll type not found, using default"
            );
        }
        self.contexts
            .get_key_value(&self.default_type)
            .map(|(name, ctx)| (name.as_str(), ctx))
    }
}
