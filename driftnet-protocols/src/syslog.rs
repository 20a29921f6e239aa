//! Syslog datagrams: an optional `<PRI>` header and a free-form message.
//!
//! Each datagram becomes one record with facility, severity and message
//! values. The elements live in a private enterprise namespace so they
//! never collide with IPFIX identities.

use std::sync::Arc;

use driftnet_core::Connection;

use crate::ie::{ElementId, InformationElement, Semantics};
use crate::record::{PacketDecoder, PacketOutcome, Record, RecordOrigin};
use crate::value::{Payload, Value};

pub const SYSLOG_ENTERPRISE: u32 = u32::MAX;
pub const FACILITY: ElementId = ElementId::new(SYSLOG_ENTERPRISE, 1);
pub const SEVERITY: ElementId = ElementId::new(SYSLOG_ENTERPRISE, 2);
pub const MESSAGE: ElementId = ElementId::new(SYSLOG_ENTERPRISE, 3);

/// user.notice, assumed when a datagram carries no priority.
pub const DEFAULT_PRIORITY: u8 = 13;
const MAX_PRIORITY: u16 = 191;

/// Splits `<PRI>` off the front. Anything that is not a well-formed
/// priority of one to three digits is left in the message.
pub fn split_priority(buf: &[u8]) -> (Option<u8>, &[u8]) {
    let Some(rest) = buf.strip_prefix(b"<") else {
        return (None, buf);
    };
    let Some(close) = rest.iter().take(4).position(|&b| b == b'>') else {
        return (None, buf);
    };
    let digits = &rest[..close];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return (None, buf);
    }
    let pri = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    if pri > MAX_PRIORITY {
        return (None, buf);
    }
    (Some(pri as u8), &rest[close + 1..])
}

#[derive(Debug, Clone)]
pub struct SyslogDecoder {
    facility: Arc<InformationElement>,
    severity: Arc<InformationElement>,
    message: Arc<InformationElement>,
}

impl Default for SyslogDecoder {
    fn default() -> Self {
        Self {
            facility: Arc::new(InformationElement::new("facility", FACILITY, Semantics::Identifier, 1, 1)),
            severity: Arc::new(InformationElement::new("severity", SEVERITY, Semantics::Identifier, 1, 1)),
            message: Arc::new(InformationElement::new("message", MESSAGE, Semantics::Default, 0, u16::MAX)),
        }
    }
}

impl SyslogDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketDecoder for SyslogDecoder {
    fn protocol(&self) -> &'static str {
        "syslog"
    }

    fn decode(&self, connection: &Connection) -> PacketOutcome {
        let (priority, body) = split_priority(connection.payload());
        let priority = priority.unwrap_or(DEFAULT_PRIORITY);
        let text = String::from_utf8_lossy(body);
        let text = text.trim_end_matches(['\n', '\r', '\0']);

        let record = Record {
            source: connection.source(),
            received_at: connection.received_at(),
            origin: RecordOrigin::Syslog,
            values: vec![
                Value::new(Arc::clone(&self.facility), Payload::Unsigned8(priority / 8)),
                Value::new(Arc::clone(&self.severity), Payload::Unsigned8(priority % 8)),
                Value::new(Arc::clone(&self.message), Payload::String(text.to_owned())),
            ],
        };
        PacketOutcome {
            records: vec![record],
            failures: Vec::new(),
        }
    }
}
