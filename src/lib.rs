//! CDN health monitor control plane.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod poller;
pub mod session;

pub use config::schema::AppConfig;
pub use lifecycle::Shutdown;
pub use poller::{PollerEngine, PollerRegistry};
