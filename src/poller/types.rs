//! Poll target and engine configuration types.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::hash::Hash;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::poller::PollError;

/// Anything usable as a stable target ID (cache name, peer name, ...).
pub trait TargetKey: Clone + Ord + Hash + Display + Send + Sync + 'static {}

impl<T> TargetKey for T where T: Clone + Ord + Hash + Display + Send + Sync + 'static {}

/// Which address families a poller is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingProtocol {
    Ipv4Only,
    Ipv6Only,
    /// Alternate between the two families on successive ticks.
    #[default]
    Both,
}

impl FromStr for PollingProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4only" | "ipv4_only" => Ok(Self::Ipv4Only),
            "ipv6only" | "ipv6_only" => Ok(Self::Ipv6Only),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown polling protocol '{}'", other)),
        }
    }
}

/// Address family a single poll went out over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn flipped(self) -> Self {
        match self {
            AddressFamily::V4 => AddressFamily::V6,
            AddressFamily::V6 => AddressFamily::V4,
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "ipv4"),
            AddressFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Everything needed to poll one target. Compared by value to detect changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetConfig {
    /// Primary (IPv4) poll address.
    pub address: String,
    /// Secondary (IPv6) poll address; empty when the target has none.
    pub address_v6: String,
    /// Value for the `Host` header, if it should differ from the address.
    pub host: Option<String>,
    pub timeout: Duration,
    /// Format of the polled payload, passed through to the handler.
    pub format: String,
    /// Registered poll-type name.
    pub poll_type: String,
}

impl TargetConfig {
    pub fn address_for(&self, family: AddressFamily) -> &str {
        match family {
            AddressFamily::V4 => &self.address,
            AddressFamily::V6 => &self.address_v6,
        }
    }
}

/// Settings shared by every target of one engine. Any change forces all
/// targets to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub interval: Duration,
    pub no_keep_alive: bool,
    pub protocol: PollingProtocol,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6),
            no_keep_alive: false,
            protocol: PollingProtocol::Both,
        }
    }
}

/// One configuration snapshot for a poller engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig<K: Ord> {
    pub settings: EngineSettings,
    pub targets: BTreeMap<K, TargetConfig>,
}

impl<K: Ord> Default for EngineConfig<K> {
    fn default() -> Self {
        Self {
            settings: EngineSettings::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl<K: Ord> EngineConfig<K> {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            targets: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, id: K, target: TargetConfig) -> Self {
        self.targets.insert(id, target);
        self
    }
}

/// What a poll function hands back after exactly one round-trip.
#[derive(Debug)]
pub struct PollResponse {
    pub body: Option<Bytes>,
    pub completed_at: SystemTime,
    pub elapsed: Duration,
    pub error: Option<PollError>,
}

/// The outcome of one poll, as delivered to a handler.
#[derive(Debug)]
pub struct PollOutcome<K> {
    pub id: K,
    pub poll_id: u64,
    pub format: String,
    pub family: AddressFamily,
    pub body: Option<Bytes>,
    pub completed_at: SystemTime,
    pub elapsed: Duration,
    pub error: Option<PollError>,
}

impl<K> PollOutcome<K> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
