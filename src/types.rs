//! Port Binding Types
//!
//! Host-side bindings grouped by protocol key, in the shape container
//! runtimes report them (`{"80/tcp": [{"HostIp": "...", "HostPort": "80"}]}`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Host address used when a binding leaves `HostIp` empty (all interfaces)
pub const ANY_HOST_IP: &str = "0.0.0.0";

/// A single host-side binding of a container port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    /// Host IP the port is bound on
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    /// Host port (kept as a string, as runtimes report it)
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

impl PortBinding {
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port: host_port.into(),
        }
    }

    /// `ip:port` on the host, used as the `local` side of an exposure
    pub fn local_addr(&self) -> String {
        let ip = if self.host_ip.is_empty() {
            ANY_HOST_IP
        } else {
            &self.host_ip
        };
        format!("{}:{}", ip, self.host_port)
    }

    /// `switch_ip:port` on the virtual network; the port is never remapped
    pub fn remote_addr(&self, switch_ip: &str) -> String {
        format!("{}:{}", switch_ip, self.host_port)
    }
}

impl std::fmt::Display for PortBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.local_addr())
    }
}

/// Protocol key (e.g. "80/tcp") -> bindings, iterated in key order
pub type PortMap = BTreeMap<String, Vec<PortBinding>>;

/// Transport protocol named by a port key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Protocol named by a "port/proto" key. A bare port means tcp.
    pub fn from_port_key(key: &str) -> Option<Self> {
        match key.split_once('/') {
            None => Some(Protocol::Tcp),
            Some((_, proto)) => match proto.to_ascii_lowercase().as_str() {
                "tcp" => Some(Protocol::Tcp),
                "udp" => Some(Protocol::Udp),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Total number of bindings across all keys
pub fn binding_count(ports: &PortMap) -> usize {
    ports.values().map(Vec::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        let binding = PortBinding::new("127.0.0.1", "80");

        assert_eq!(binding.local_addr(), "127.0.0.1:80");
        assert_eq!(binding.remote_addr("192.168.127.2"), "192.168.127.2:80");
        assert_eq!(binding.to_string(), "127.0.0.1:80");
    }

    #[test]
    fn test_empty_host_ip_binds_all_interfaces() {
        let binding = PortBinding::new("", "8080");
        assert_eq!(binding.local_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_protocol_from_port_key() {
        assert_eq!(Protocol::from_port_key("80/tcp"), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_port_key("53/UDP"), Some(Protocol::Udp));
        assert_eq!(Protocol::from_port_key("443"), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_port_key("9/sctp"), None);
    }

    #[test]
    fn test_port_map_uses_runtime_field_names() {
        let json = r#"{"80/tcp":[{"HostIp":"127.0.0.1","HostPort":"8080"},{"HostPort":"8081"}]}"#;
        let ports: PortMap = serde_json::from_str(json).unwrap();

        assert_eq!(binding_count(&ports), 2);
        assert_eq!(ports["80/tcp"][0], PortBinding::new("127.0.0.1", "8080"));
        assert_eq!(ports["80/tcp"][1], PortBinding::new("", "8081"));

        let back = serde_json::to_string(&ports).unwrap();
        assert!(back.contains("\"HostIp\":\"127.0.0.1\""));
    }
}
