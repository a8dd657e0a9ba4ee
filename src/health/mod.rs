//! Target health tracking.
//!
//! # Data Flow
//! ```text
//! PollerEngine target task
//!     → HealthHandler::handle (handler.rs)
//!     → TargetHealth::observe (state.rs)
//!     → done signalled back to the target task
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - One handler per engine, so cache and peer health never mix

pub mod handler;
pub mod state;

pub use handler::HealthHandler;
pub use state::{Availability, TargetHealth, Thresholds};
