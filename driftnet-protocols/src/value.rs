//! ## driftnet-protocols::value
//! **Closed set of decoded field values**
//!
//! [`Payload`] is a closed enum. Supporting a new Information
//! Element is a registry addition; adding a `Payload` variant is a breaking
//! change that must be carried through [`Payload::accept`] and every
//! [`PayloadVisitor`] implementation.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::Bytes;

use crate::ie::{ElementId, InformationElement, Semantics};

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Unsigned8(u8),
    Unsigned16(u16),
    Unsigned32(u32),
    Unsigned64(u64),
    Signed8(i8),
    Signed16(i16),
    Signed32(i32),
    Signed64(i64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    MacAddress([u8; 6]),
    Ipv4Address(Ipv4Addr),
    Ipv6Address(Ipv6Addr),
    OctetArray(Bytes),
    String(String),
    List(Vec<Value>),
}

/// Exhaustive consumer of a [`Payload`]. Every method is required.
pub trait PayloadVisitor {
    type Output;

    fn visit_unsigned(&mut self, value: u64, bits: u8) -> Self::Output;
    fn visit_signed(&mut self, value: i64, bits: u8) -> Self::Output;
    fn visit_float(&mut self, value: f64, bits: u8) -> Self::Output;
    fn visit_boolean(&mut self, value: bool) -> Self::Output;
    fn visit_mac(&mut self, value: &[u8; 6]) -> Self::Output;
    fn visit_ipv4(&mut self, value: Ipv4Addr) -> Self::Output;
    fn visit_ipv6(&mut self, value: Ipv6Addr) -> Self::Output;
    fn visit_octets(&mut self, value: &[u8]) -> Self::Output;
    fn visit_string(&mut self, value: &str) -> Self::Output;
    fn visit_list(&mut self, values: &[Value]) -> Self::Output;
}

impl Payload {
    pub fn accept<V: PayloadVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Self::Unsigned8(v) => visitor.visit_unsigned(u64::from(*v), 8),
            Self::Unsigned16(v) => visitor.visit_unsigned(u64::from(*v), 16),
            Self::Unsigned32(v) => visitor.visit_unsigned(u64::from(*v), 32),
            Self::Unsigned64(v) => visitor.visit_unsigned(*v, 64),
            Self::Signed8(v) => visitor.visit_signed(i64::from(*v), 8),
            Self::Signed16(v) => visitor.visit_signed(i64::from(*v), 16),
            Self::Signed32(v) => visitor.visit_signed(i64::from(*v), 32),
            Self::Signed64(v) => visitor.visit_signed(*v, 64),
            Self::Float32(v) => visitor.visit_float(f64::from(*v), 32),
            Self::Float64(v) => visitor.visit_float(*v, 64),
            Self::Boolean(v) => visitor.visit_boolean(*v),
            Self::MacAddress(v) => visitor.visit_mac(v),
            Self::Ipv4Address(v) => visitor.visit_ipv4(*v),
            Self::Ipv6Address(v) => visitor.visit_ipv6(*v),
            Self::OctetArray(v) => visitor.visit_octets(v),
            Self::String(v) => visitor.visit_string(v),
            Self::List(v) => visitor.visit_list(v),
        }
    }

    /// Any unsigned width widened to `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned8(v) => Some(u64::from(*v)),
            Self::Unsigned16(v) => Some(u64::from(*v)),
            Self::Unsigned32(v) => Some(u64::from(*v)),
            Self::Unsigned64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ipv4Address(v) => Some(IpAddr::V4(*v)),
            Self::Ipv6Address(v) => Some(IpAddr::V6(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.accept(&mut TextRenderer))
    }
}

/// Renders payloads for logs: octets as hex, MACs colon-separated, lists
/// bracketed.
pub struct TextRenderer;

impl PayloadVisitor for TextRenderer {
    type Output = String;

    fn visit_unsigned(&mut self, value: u64, _bits: u8) -> String {
        value.to_string()
    }

    fn visit_signed(&mut self, value: i64, _bits: u8) -> String {
        value.to_string()
    }

    fn visit_float(&mut self, value: f64, _bits: u8) -> String {
        value.to_string()
    }

    fn visit_boolean(&mut self, value: bool) -> String {
        value.to_string()
    }

    fn visit_mac(&mut self, value: &[u8; 6]) -> String {
        value
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    fn visit_ipv4(&mut self, value: Ipv4Addr) -> String {
        value.to_string()
    }

    fn visit_ipv6(&mut self, value: Ipv6Addr) -> String {
        value.to_string()
    }

    fn visit_octets(&mut self, value: &[u8]) -> String {
        format!("0x{}", hex::encode(value))
    }

    fn visit_string(&mut self, value: &str) -> String {
        format!("{value:?}")
    }

    fn visit_list(&mut self, values: &[Value]) -> String {
        let items = values
            .iter()
            .map(|v| v.payload().accept(self))
            .collect::<Vec<_>>();
        format!("[{}]", items.join(", "))
    }
}

/// A decoded field: the element it belongs to plus its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    element: Arc<InformationElement>,
    payload: Payload,
}

impl Value {
    pub fn new(element: Arc<InformationElement>, payload: Payload) -> Self {
        Self { element, payload }
    }

    pub fn element(&self) -> &InformationElement {
        &self.element
    }

    pub fn id(&self) -> ElementId {
        self.element.id()
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn semantics(&self) -> Semantics {
        self.element.semantics()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name(), self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts leaves, recursing into lists.
    struct LeafCounter;

    impl PayloadVisitor for LeafCounter {
        type Output = usize;

        fn visit_unsigned(&mut self, _: u64, _: u8) -> usize {
            1
        }
        fn visit_signed(&mut self, _: i64, _: u8) -> usize {
            1
        }
        fn visit_float(&mut self, _: f64, _: u8) -> usize {
            1
        }
        fn visit_boolean(&mut self, _: bool) -> usize {
            1
        }
        fn visit_mac(&mut self, _: &[u8; 6]) -> usize {
            1
        }
        fn visit_ipv4(&mut self, _: Ipv4Addr) -> usize {
            1
        }
        fn visit_ipv6(&mut self, _: Ipv6Addr) -> usize {
            1
        }
        fn visit_octets(&mut self, _: &[u8]) -> usize {
            1
        }
        fn visit_string(&mut self, _: &str) -> usize {
            1
        }
        fn visit_list(&mut self, values: &[Value]) -> usize {
            values.iter().map(|v| v.payload().accept(self)).sum()
        }
    }

    fn element(name: &str, id: u16) -> Arc<InformationElement> {
        Arc::new(InformationElement::new(
            name,
            ElementId::iana(id),
            Semantics::Default,
            0,
            u16::MAX,
        ))
    }

    #[test]
    fn renders_payloads_for_logs() {
        assert_eq!(Payload::Unsigned16(443).to_string(), "443");
        assert_eq!(
            Payload::MacAddress([0x00, 0x1b, 0x21, 0x3c, 0x4d, 0x5e]).to_string(),
            "00:1b:21:3c:4d:5e"
        );
        assert_eq!(
            Payload::OctetArray(Bytes::from_static(&[0xde, 0xad])).to_string(),
            "0xdead"
        );
        assert_eq!(Payload::String("eth0".into()).to_string(), "\"eth0\"");
    }

    #[test]
    fn visitor_walks_nested_lists() {
        let port = element("sourceTransportPort", 7);
        let list = Payload::List(vec![
            Value::new(port.clone(), Payload::Unsigned16(80)),
            Value::new(port.clone(), Payload::Unsigned16(443)),
            Value::new(
                element("basicList", 291),
                Payload::List(vec![Value::new(port, Payload::Unsigned16(22))]),
            ),
        ]);
        assert_eq!(list.accept(&mut LeafCounter), 3);
        assert_eq!(list.to_string(), "[80, 443, [22]]");
    }

    #[test]
    fn value_display_includes_name() {
        let value = Value::new(
            element("sourceIPv4Address", 8),
            Payload::Ipv4Address(Ipv4Addr::new(192, 0, 2, 1)),
        );
        assert_eq!(value.to_string(), "sourceIPv4Address=192.0.2.1");
        assert_eq!(value.payload().as_ip(), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))));
    }
}
