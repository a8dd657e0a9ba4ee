//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Engines → Manager → Monitor-config poller (supervised)
//!
//! Supervision (supervisor.rs):
//!     Task panics/exits → restart with backoff → budget exhausted → shutdown
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → every loop exits at its next select
//! ```
//!
//! # Design Decisions
//! - One broadcast channel reaches every long-running task
//! - A supervised task that cannot be kept alive takes the process down

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
pub use supervisor::{RestartPolicy, Supervisor, SupervisorError, TaskFailure};
