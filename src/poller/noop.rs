//! Poll type that never touches the network.

use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::poller::registry::{AppInfo, GlobalSettings, PollRequest, PollerType};
use crate::poller::types::{EngineSettings, PollResponse, TargetConfig};

pub const NOOP_POLLER_TYPE: &str = "noop";

/// Succeeds immediately with an empty body.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPoller;

impl PollerType for NoopPoller {
    type Global = ();
    type Target = ();

    fn global_init(&self, _settings: &GlobalSettings, _app: &AppInfo) {}

    fn init(&self, _target: &TargetConfig, _engine: &EngineSettings, _global: &()) {}

    async fn poll<'a>(&'a self, _ctx: &'a (), request: PollRequest<'a>) -> PollResponse {
        tracing::trace!(address = %request.address, poll_id = request.poll_id, "noop poll");
        PollResponse {
            body: Some(Bytes::new()),
            completed_at: SystemTime::now(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }
}
