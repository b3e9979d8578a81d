//! Tracker Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Exposure Service address (the virtual network gateway)
pub const DEFAULT_API_URL: &str = "http://192.168.127.1:80";

/// Guest address on the virtual network that exposed ports forward to
pub const HOST_SWITCH_IP: &str = "192.168.127.2";

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for the tracker and its Exposure Service client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the Exposure Service
    pub base_url: String,
    /// Switch-side address used as the `remote` of every exposure
    pub switch_ip: String,
    /// Deadline for a single remote call
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl TrackerConfig {
    /// Config for the given service URL with default switch IP and timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn switch_ip(mut self, switch_ip: impl Into<String>) -> Self {
        self.switch_ip = switch_ip.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            switch_ip: HOST_SWITCH_IP.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
