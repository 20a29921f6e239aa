//! Listener configuration: where to bind and how the receive loop behaves.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ListenerConfig {
    /// Bind address; all interfaces when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,

    /// UDP port. `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wire protocol (ipfix, syslog).
    #[serde(default = "default_protocol")]
    #[validate(custom(function = validation::validate_protocol))]
    pub protocol: String,

    /// Wait for one datagram before re-checking the stop signal.
    #[serde(default = "default_recv_timeout")]
    #[validate(range(min = 1, max = 60000))]
    pub recv_timeout_ms: u64,

    /// Requested OS receive buffer in bytes; "8MiB" style sizes accepted.
    #[serde(default = "default_recv_buffer_size", deserialize_with = "deserialize_size")]
    #[validate(range(min = 4096, max = 2147483647))]
    pub recv_buffer_size: usize,

    /// Upper bound on waiting for the receive loop to exit.
    #[serde(default = "default_stop_timeout")]
    #[validate(range(min = 1, max = 60000))]
    pub stop_timeout_ms: u64,
}

/// The listener settings that can change without rebinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTunables {
    pub recv_timeout: Duration,
    pub recv_buffer_size: usize,
    pub stop_timeout: Duration,
}

impl ListenerConfig {
    pub fn tunables(&self) -> ListenerTunables {
        ListenerTunables {
            recv_timeout: Duration::from_millis(self.recv_timeout_ms),
            recv_buffer_size: self.recv_buffer_size,
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }

    /// Whether moving from `self` to `other` needs a new socket.
    pub fn requires_rebind(&self, other: &ListenerConfig) -> bool {
        self.address != other.address || self.port != other.port || self.protocol != other.protocol
    }
}

fn default_port() -> u16 {
    4739
}

fn default_protocol() -> String {
    "ipfix".into()
}

fn default_recv_timeout() -> u64 {
    500
}

fn default_recv_buffer_size() -> usize {
    16 * 1024 * 1024
}

fn default_stop_timeout() -> u64 {
    2000
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            protocol: default_protocol(),
            recv_timeout_ms: default_recv_timeout(),
            recv_buffer_size: default_recv_buffer_size(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Accepts plain byte counts or sizes such as "512KiB" and "8MiB".
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_size(input: &str) -> Result<usize, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|e| format!("invalid size {input:?}: {e}"))?;
    let multiplier = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("unknown size unit {other:?}")),
    };
    Ok((number * multiplier) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("512KiB"), Ok(512 * 1024));
        assert_eq!(parse_size(" 8 MiB "), Ok(8 * 1024 * 1024));
        assert_eq!(parse_size("1.5kb"), Ok(1536));
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("MiB").is_err());
    }

    #[test]
    fn protocol_change_needs_rebind() {
        let base = ListenerConfig::default();
        let tuned = ListenerConfig {
            recv_timeout_ms: 100,
            ..base.clone()
        };
        assert!(!base.requires_rebind(&tuned));

        let syslog = ListenerConfig {
            protocol: "syslog".into(),
            ..base.clone()
        };
        assert!(base.requires_rebind(&syslog));
    }

    #[test]
    fn invalid_protocol_is_rejected() {
        let config = ListenerConfig {
            protocol: "sflow".into(),
            ..ListenerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
