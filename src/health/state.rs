//! Target availability state machine.
//!
//! # State Transitions
//! ```text
//! Unknown → Available:      consecutive successes >= available threshold
//! Unknown → Unavailable:    consecutive failures >= unavailable threshold
//! Available → Unavailable:  consecutive failures >= unavailable threshold
//! Unavailable → Available:  consecutive successes >= available threshold
//! ```
//!
//! Counters reset on every transition.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::poller::{AddressFamily, PollOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

/// Consecutive results needed to change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub available: u32,
    pub unavailable: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            available: 1,
            unavailable: 2,
        }
    }
}

/// Latest known health of one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetHealth {
    pub state: Availability,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub last_poll_id: u64,
    pub last_family: Option<AddressFamily>,
    pub last_elapsed: Duration,
    pub last_completed_at: Option<SystemTime>,
    pub last_error: Option<String>,
    pub last_body_len: usize,
}

impl TargetHealth {
    /// Fold one poll outcome in. Returns the new state on a transition.
    pub fn observe<K>(&mut self, outcome: &PollOutcome<K>, thresholds: Thresholds) -> Option<Availability> {
        self.last_poll_id = outcome.poll_id;
        self.last_family = Some(outcome.family);
        self.last_elapsed = outcome.elapsed;
        self.last_completed_at = Some(outcome.completed_at);
        self.last_error = outcome.error.as_ref().map(|e| e.to_string());
        self.last_body_len = outcome.body.as_ref().map_or(0, |b| b.len());

        if outcome.is_success() {
            self.mark_success(thresholds.available)
        } else {
            self.mark_failure(thresholds.unavailable)
        }
    }

    fn mark_success(&mut self, threshold: u32) -> Option<Availability> {
        self.consecutive_failures = 0;
        if self.state == Availability::Available {
            return None;
        }
        self.consecutive_successes += 1;
        if self.consecutive_successes >= threshold.max(1) {
            self.consecutive_successes = 0;
            self.state = Availability::Available;
            return Some(self.state);
        }
        None
    }

    fn mark_failure(&mut self, threshold: u32) -> Option<Availability> {
        self.consecutive_successes = 0;
        if self.state == Availability::Unavailable {
            return None;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= threshold.max(1) {
            self.consecutive_failures = 0;
            self.state = Availability::Unavailable;
            return Some(self.state);
        }
        None
    }
}
