//! Poll result handler contract.

use std::future::Future;

use tokio::sync::oneshot;

use crate::poller::types::PollOutcome;

/// Consumer of poll outcomes.
///
/// The engine runs `handle` on its own task and blocks the target's loop
/// until `done` fires, so a target never has two polls in flight.
/// Implementations must send on `done` exactly once, even when they fail
/// internally. Dropping `done` unsent is tolerated by the engine but logged.
pub trait Handler<K>: Send + Sync + 'static {
    fn handle(&self, outcome: PollOutcome<K>, done: oneshot::Sender<()>) -> impl Future<Output = ()> + Send;
}
