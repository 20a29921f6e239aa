//! Decoded records and the packet decoder seam.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use driftnet_core::Connection;

use crate::error::DecodeError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    Ipfix {
        observation_domain: u32,
        template_id: u16,
        /// Seconds since the epoch, from the message header.
        export_time: u32,
        sequence: u32,
    },
    Syslog,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub source: SocketAddr,
    pub received_at: DateTime<Utc>,
    pub origin: RecordOrigin,
    pub values: Vec<Value>,
}

impl Record {
    /// First value whose element is named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|v| v.name() == name)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        for value in &self.values {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

/// Everything one datagram produced. Failures never discard the records
/// that decoded before them.
#[derive(Debug, Default)]
pub struct PacketOutcome {
    pub records: Vec<Record>,
    pub failures: Vec<DecodeError>,
}

impl PacketOutcome {
    pub fn failed(error: DecodeError) -> Self {
        Self {
            records: Vec::new(),
            failures: vec![error],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub trait PacketDecoder: Send + Sync {
    /// Protocol name as used in configuration.
    fn protocol(&self) -> &'static str;

    fn decode(&self, connection: &Connection) -> PacketOutcome;
}
