//! ## driftnet-protocols::registry
//! Maps `(enterprise, field id)` to a [`FieldDecoder`].
//!
//! The registry is populated once at bootstrap and read-only afterwards.
//! Lookups for unregistered elements resolve to an [`OpaqueDecoder`] so an
//! unknown vendor field never aborts its record.

use std::collections::HashMap;
use std::sync::Arc;

use crate::decoder::{FieldDecoder, OpaqueDecoder, TypedDecoder, ValueKind};
use crate::ie::{ElementId, Semantics};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    decoders: HashMap<ElementId, Arc<dyn FieldDecoder>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the IANA elements in [`STANDARD_ELEMENTS`].
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for &(id, name, kind, semantics) in STANDARD_ELEMENTS {
            registry.register(Arc::new(TypedDecoder::new(
                name,
                ElementId::iana(id),
                kind,
                semantics,
            )));
        }
        registry
    }

    /// Adds a decoder under its element's identity, returning any decoder it
    /// replaced.
    pub fn register(&mut self, decoder: Arc<dyn FieldDecoder>) -> Option<Arc<dyn FieldDecoder>> {
        let id = decoder.element().id();
        self.decoders.insert(id, decoder)
    }

    pub fn with(mut self, decoder: Arc<dyn FieldDecoder>) -> Self {
        self.register(decoder);
        self
    }

    pub fn get(&self, id: ElementId) -> Option<&Arc<dyn FieldDecoder>> {
        self.decoders.get(&id)
    }

    pub fn resolve(&self, id: ElementId) -> Arc<dyn FieldDecoder> {
        match self.decoders.get(&id) {
            Some(decoder) => Arc::clone(decoder),
            None => Arc::new(OpaqueDecoder::new(id)),
        }
    }

    pub fn is_registered(&self, id: ElementId) -> bool {
        self.decoders.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

/// A representative subset of the IANA IPFIX registry. Timestamps are kept
/// as plain unsigned integers.
pub const STANDARD_ELEMENTS: &[(u16, &str, ValueKind, Semantics)] = &[
    (1, "octetDeltaCount", ValueKind::Unsigned64, Semantics::DeltaCounter),
    (2, "packetDeltaCount", ValueKind::Unsigned64, Semantics::DeltaCounter),
    (4, "protocolIdentifier", ValueKind::Unsigned8, Semantics::Identifier),
    (5, "ipClassOfService", ValueKind::Unsigned8, Semantics::Identifier),
    (6, "tcpControlBits", ValueKind::Unsigned16, Semantics::Flags),
    (7, "sourceTransportPort", ValueKind::Unsigned16, Semantics::Identifier),
    (8, "sourceIPv4Address", ValueKind::Ipv4Address, Semantics::Default),
    (9, "sourceIPv4PrefixLength", ValueKind::Unsigned8, Semantics::Default),
    (10, "ingressInterface", ValueKind::Unsigned32, Semantics::Identifier),
    (11, "destinationTransportPort", ValueKind::Unsigned16, Semantics::Identifier),
    (12, "destinationIPv4Address", ValueKind::Ipv4Address, Semantics::Default),
    (13, "destinationIPv4PrefixLength", ValueKind::Unsigned8, Semantics::Default),
    (14, "egressInterface", ValueKind::Unsigned32, Semantics::Identifier),
    (15, "ipNextHopIPv4Address", ValueKind::Ipv4Address, Semantics::Default),
    (16, "bgpSourceAsNumber", ValueKind::Unsigned32, Semantics::Identifier),
    (17, "bgpDestinationAsNumber", ValueKind::Unsigned32, Semantics::Identifier),
    (21, "flowEndSysUpTime", ValueKind::Unsigned32, Semantics::Default),
    (22, "flowStartSysUpTime", ValueKind::Unsigned32, Semantics::Default),
    (27, "sourceIPv6Address", ValueKind::Ipv6Address, Semantics::Default),
    (28, "destinationIPv6Address", ValueKind::Ipv6Address, Semantics::Default),
    (32, "icmpTypeCodeIPv4", ValueKind::Unsigned16, Semantics::Identifier),
    (34, "samplingInterval", ValueKind::Unsigned32, Semantics::Quantity),
    (56, "sourceMacAddress", ValueKind::MacAddress, Semantics::Default),
    (58, "vlanId", ValueKind::Unsigned16, Semantics::Identifier),
    (60, "ipVersion", ValueKind::Unsigned8, Semantics::Identifier),
    (61, "flowDirection", ValueKind::Unsigned8, Semantics::Identifier),
    (62, "ipNextHopIPv6Address", ValueKind::Ipv6Address, Semantics::Default),
    (80, "destinationMacAddress", ValueKind::MacAddress, Semantics::Default),
    (82, "interfaceName", ValueKind::String, Semantics::Default),
    (85, "octetTotalCount", ValueKind::Unsigned64, Semantics::TotalCounter),
    (86, "packetTotalCount", ValueKind::Unsigned64, Semantics::TotalCounter),
    (96, "applicationName", ValueKind::String, Semantics::Default),
    (136, "flowEndReason", ValueKind::Unsigned8, Semantics::Identifier),
    (150, "flowStartSeconds", ValueKind::Unsigned32, Semantics::Default),
    (151, "flowEndSeconds", ValueKind::Unsigned32, Semantics::Default),
    (152, "flowStartMilliseconds", ValueKind::Unsigned64, Semantics::Default),
    (153, "flowEndMilliseconds", ValueKind::Unsigned64, Semantics::Default),
    (176, "icmpTypeIPv4", ValueKind::Unsigned8, Semantics::Identifier),
    (177, "icmpCodeIPv4", ValueKind::Unsigned8, Semantics::Identifier),
    (210, "paddingOctets", ValueKind::OctetArray, Semantics::Default),
    (233, "firewallEvent", ValueKind::Unsigned8, Semantics::Identifier),
    (276, "dataRecordsReliability", ValueKind::Boolean, Semantics::Default),
    (291, "basicList", ValueKind::BasicList, Semantics::List),
    (320, "absoluteError", ValueKind::Float64, Semantics::Quantity),
    (434, "mibObjectValueInteger", ValueKind::Signed32, Semantics::Quantity),
];
