//! ## driftnet-protocols::decoder
//! **Field decoders with strict length contracts**
//!
//! A [`FieldDecoder`] is bound to one [`InformationElement`] and turns an
//! exact byte window into a [`Value`]. The length contract is enforced in
//! [`FieldDecoder::decode`] before `parse` ever sees the bytes, so a window
//! outside `[min, max]` can never produce a partially valid value.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::Bytes;

use crate::cursor::Cursor;
use crate::error::{DecodeError, DecodeErrorKind, FieldError};
use crate::ie::{ElementId, InformationElement, Semantics};
use crate::registry::Registry;
use crate::template::{decode_field, read_field_specifier, FieldLength};
use crate::value::{Payload, Value};

/// Lists may nest this many levels below a record field.
pub const MAX_LIST_DEPTH: usize = 8;

/// What a decoder sees besides its bytes: the registry for nested elements
/// and how deep inside lists it is running.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    registry: &'a Registry,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    /// Context for a field of a top-level record.
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Context for the elements of a list, or `None` once that would pass
    /// [`MAX_LIST_DEPTH`].
    pub fn nested(&self) -> Option<Self> {
        let depth = self.depth + 1;
        (depth <= MAX_LIST_DEPTH).then_some(Self {
            registry: self.registry,
            depth,
        })
    }
}

pub trait FieldDecoder: Send + Sync + fmt::Debug {
    fn element(&self) -> &Arc<InformationElement>;

    /// Maps `bytes` to a payload. `offset` is the absolute position of
    /// `bytes[0]` in the packet, for nested errors. Callers go through
    /// [`FieldDecoder::decode_in`], which has already checked the length.
    fn parse(&self, bytes: &[u8], offset: usize, ctx: &DecodeContext<'_>) -> Result<Payload, FieldError>;

    fn decode_in(&self, bytes: &[u8], offset: usize, ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
        let element = self.element();
        if !element.accepts_length(bytes.len()) {
            return Err(DecodeError::new(
                Some(element.id()),
                offset,
                bytes.len(),
                DecodeErrorKind::LengthOutOfRange {
                    min: element.min_length(),
                    max: element.max_length(),
                },
            ));
        }

        let payload = self.parse(bytes, offset, ctx).map_err(|err| match err {
            FieldError::Malformed(reason) => {
                DecodeError::malformed(Some(element.id()), offset, bytes.len(), reason)
            }
            FieldError::Nested(inner) => inner,
        })?;

        Ok(Value::new(Arc::clone(element), payload))
    }

    /// Decodes `bytes` as a top-level field.
    fn decode(&self, bytes: &[u8], offset: usize, registry: &Registry) -> Result<Value, DecodeError> {
        self.decode_in(bytes, offset, &DecodeContext::new(registry))
    }
}

/// Built-in abstract data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Unsigned8,
    Unsigned16,
    Unsigned32,
    Unsigned64,
    Signed8,
    Signed16,
    Signed32,
    Signed64,
    Float32,
    Float64,
    Boolean,
    MacAddress,
    Ipv4Address,
    Ipv6Address,
    OctetArray,
    String,
    BasicList,
}

impl ValueKind {
    /// Accepted encoded lengths. Integers allow reduced-size encoding.
    pub const fn length_range(self) -> (u16, u16) {
        match self {
            Self::Unsigned8 | Self::Signed8 => (1, 1),
            Self::Unsigned16 | Self::Signed16 => (1, 2),
            Self::Unsigned32 | Self::Signed32 => (1, 4),
            Self::Unsigned64 | Self::Signed64 => (1, 8),
            Self::Float32 => (4, 4),
            Self::Float64 => (4, 8),
            Self::Boolean => (1, 1),
            Self::MacAddress => (6, 6),
            Self::Ipv4Address => (4, 4),
            Self::Ipv6Address => (16, 16),
            Self::OctetArray | Self::String => (0, u16::MAX),
            // semantic (1) + field id (2) + element length (2)
            Self::BasicList => (5, u16::MAX),
        }
    }
}

/// Decoder for any [`ValueKind`].
#[derive(Debug, Clone)]
pub struct TypedDecoder {
    element: Arc<InformationElement>,
    kind: ValueKind,
}

impl TypedDecoder {
    pub fn new(name: impl Into<String>, id: ElementId, kind: ValueKind, semantics: Semantics) -> Self {
        let (min, max) = kind.length_range();
        Self {
            element: Arc::new(InformationElement::new(name, id, semantics, min, max)),
            kind,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

fn be_unsigned(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn be_signed(bytes: &[u8]) -> Result<i64, FieldError> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(FieldError::malformed("signed integer must be 1 to 8 bytes"));
    }
    let shift = 64 - 8 * bytes.len() as u32;
    // Sign-extend reduced-size encodings.
    Ok(((be_unsigned(bytes) << shift) as i64) >> shift)
}

fn exact<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], FieldError> {
    <[u8; N]>::try_from(bytes)
        .map_err(|_| FieldError::malformed(format!("{what} needs exactly {N} bytes")))
}

impl FieldDecoder for TypedDecoder {
    fn element(&self) -> &Arc<InformationElement> {
        &self.element
    }

    fn parse(&self, bytes: &[u8], offset: usize, ctx: &DecodeContext<'_>) -> Result<Payload, FieldError> {
        // Narrowing casts below are lossless: `decode` bounded the width.
        let payload = match self.kind {
            ValueKind::Unsigned8 => Payload::Unsigned8(be_unsigned(bytes) as u8),
            ValueKind::Unsigned16 => Payload::Unsigned16(be_unsigned(bytes) as u16),
            ValueKind::Unsigned32 => Payload::Unsigned32(be_unsigned(bytes) as u32),
            ValueKind::Unsigned64 => Payload::Unsigned64(be_unsigned(bytes)),
            ValueKind::Signed8 => Payload::Signed8(be_signed(bytes)? as i8),
            ValueKind::Signed16 => Payload::Signed16(be_signed(bytes)? as i16),
            ValueKind::Signed32 => Payload::Signed32(be_signed(bytes)? as i32),
            ValueKind::Signed64 => Payload::Signed64(be_signed(bytes)?),
            ValueKind::Float32 => Payload::Float32(f32::from_be_bytes(exact(bytes, "float32")?)),
            ValueKind::Float64 => match bytes.len() {
                4 => Payload::Float64(f64::from(f32::from_be_bytes(exact(bytes, "float64")?))),
                _ => Payload::Float64(f64::from_be_bytes(exact(bytes, "float64")?)),
            },
            ValueKind::Boolean => match bytes {
                [1] => Payload::Boolean(true),
                [2] => Payload::Boolean(false),
                _ => return Err(FieldError::malformed("boolean must be encoded as 1 or 2")),
            },
            ValueKind::MacAddress => Payload::MacAddress(exact(bytes, "MAC address")?),
            ValueKind::Ipv4Address => {
                Payload::Ipv4Address(Ipv4Addr::from(exact::<4>(bytes, "IPv4 address")?))
            }
            ValueKind::Ipv6Address => {
                Payload::Ipv6Address(Ipv6Addr::from(exact::<16>(bytes, "IPv6 address")?))
            }
            ValueKind::OctetArray => Payload::OctetArray(Bytes::copy_from_slice(bytes)),
            ValueKind::String => match std::str::from_utf8(bytes) {
                Ok(text) => Payload::String(text.to_owned()),
                Err(e) => return Err(FieldError::malformed(format!("invalid UTF-8: {e}"))),
            },
            ValueKind::BasicList => self.parse_basic_list(bytes, offset, ctx)?,
        };
        Ok(payload)
    }
}

impl TypedDecoder {
    /// RFC 6313 basicList: semantic, one field specifier, then elements of
    /// that field back to back until the window is consumed.
    fn parse_basic_list(
        &self,
        bytes: &[u8],
        offset: usize,
        ctx: &DecodeContext<'_>,
    ) -> Result<Payload, FieldError> {
        let inner = ctx.nested().ok_or_else(|| {
            FieldError::malformed(format!("lists nested deeper than {MAX_LIST_DEPTH} levels"))
        })?;
        let own_id = Some(self.element.id());
        let mut cursor = Cursor::with_offset(bytes, offset);

        let _semantic = cursor
            .read_u8()
            .map_err(|u| DecodeError::underrun(own_id, u))?;
        let spec = read_field_specifier(&mut cursor).map_err(|u| DecodeError::underrun(own_id, u))?;

        if spec.length == FieldLength::Fixed(0) && !cursor.is_empty() {
            return Err(FieldError::malformed("basicList of zero-length elements"));
        }

        let decoder = ctx.registry().resolve(spec.element);
        let mut values = Vec::new();
        while !cursor.is_empty() {
            values.push(decode_field(decoder.as_ref(), spec.length, &mut cursor, &inner)?);
        }
        Ok(Payload::List(values))
    }
}

/// Fallback for unregistered elements: the whole window as octets.
#[derive(Debug, Clone)]
pub struct OpaqueDecoder {
    element: Arc<InformationElement>,
}

impl OpaqueDecoder {
    pub fn new(id: ElementId) -> Self {
        Self {
            element: Arc::new(InformationElement::opaque(id)),
        }
    }
}

impl FieldDecoder for OpaqueDecoder {
    fn element(&self) -> &Arc<InformationElement> {
        &self.element
    }

    fn parse(&self, bytes: &[u8], _offset: usize, _ctx: &DecodeContext<'_>) -> Result<Payload, FieldError> {
        Ok(Payload::OctetArray(Bytes::copy_from_slice(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_KINDS: [ValueKind; 17] = [
        ValueKind::Unsigned8,
        ValueKind::Unsigned16,
        ValueKind::Unsigned32,
        ValueKind::Unsigned64,
        ValueKind::Signed8,
        ValueKind::Signed16,
        ValueKind::Signed32,
        ValueKind::Signed64,
        ValueKind::Float32,
        ValueKind::Float64,
        ValueKind::Boolean,
        ValueKind::MacAddress,
        ValueKind::Ipv4Address,
        ValueKind::Ipv6Address,
        ValueKind::OctetArray,
        ValueKind::String,
        ValueKind::BasicList,
    ];

    fn decoder(kind: ValueKind) -> TypedDecoder {
        TypedDecoder::new("test", ElementId::new(9, 1), kind, Semantics::Default)
    }

    fn decode(kind: ValueKind, bytes: &[u8]) -> Result<Value, DecodeError> {
        decoder(kind).decode(bytes, 0, &Registry::new())
    }

    #[test]
    fn ipv6_decodes_directly() {
        let addr: Ipv6Addr = "2001:0db8:0000:0000:0000:ff00:0042:8329".parse().unwrap();
        let value = decode(ValueKind::Ipv6Address, &addr.octets()).unwrap();
        assert_eq!(value.payload(), &Payload::Ipv6Address(addr));
    }

    #[test]
    fn ipv6_rejects_15_and_17_bytes() {
        let addr: Ipv6Addr = "2001:db8::ff00:42:8329".parse().unwrap();
        let mut long = addr.octets().to_vec();
        long.push(0);

        for bytes in [&addr.octets()[..15], &long[..]] {
            let err = decode(ValueKind::Ipv6Address, bytes).unwrap_err();
            assert_eq!(err.kind, DecodeErrorKind::LengthOutOfRange { min: 16, max: 16 });
            assert_eq!(err.length, bytes.len());
        }
    }

    #[test]
    fn reduced_size_unsigned() {
        let value = decode(ValueKind::Unsigned64, &[0x01, 0x00]).unwrap();
        assert_eq!(value.payload(), &Payload::Unsigned64(256));

        let value = decode(ValueKind::Unsigned32, &[0xff, 0xff, 0xff, 0xff]).unwrap();
        assert_eq!(value.payload(), &Payload::Unsigned32(u32::MAX));
    }

    #[test]
    fn reduced_size_signed_is_sign_extended() {
        let value = decode(ValueKind::Signed32, &[0xff, 0xfe]).unwrap();
        assert_eq!(value.payload(), &Payload::Signed32(-2));

        let value = decode(ValueKind::Signed64, &[0x7f]).unwrap();
        assert_eq!(value.payload(), &Payload::Signed64(127));
    }

    #[test]
    fn float64_accepts_single_precision_encoding() {
        let value = decode(ValueKind::Float64, &1.5f32.to_be_bytes()).unwrap();
        assert_eq!(value.payload(), &Payload::Float64(1.5));

        let value = decode(ValueKind::Float64, &(-0.25f64).to_be_bytes()).unwrap();
        assert_eq!(value.payload(), &Payload::Float64(-0.25));
    }

    #[test]
    fn boolean_encoding() {
        assert_eq!(decode(ValueKind::Boolean, &[1]).unwrap().payload(), &Payload::Boolean(true));
        assert_eq!(decode(ValueKind::Boolean, &[2]).unwrap().payload(), &Payload::Boolean(false));

        let err = decode(ValueKind::Boolean, &[0]).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::Malformed(_)));
    }

    #[test]
    fn invalid_utf8_string_is_malformed() {
        let err = decoder(ValueKind::String)
            .decode(&[0x66, 0xff, 0x6f], 40, &Registry::new())
            .unwrap_err();
        assert_eq!(err.offset, 40);
        assert_eq!(err.length, 3);
        assert_eq!(err.element, Some(ElementId::new(9, 1)));
        assert!(matches!(err.kind, DecodeErrorKind::Malformed(_)));
    }

    #[test]
    fn opaque_keeps_exact_bytes() {
        let value = OpaqueDecoder::new(ElementId::new(29305, 7))
            .decode(&[1, 2, 3], 0, &Registry::new())
            .unwrap();
        assert!(value.element().is_opaque());
        assert_eq!(value.payload(), &Payload::OctetArray(Bytes::from_static(&[1, 2, 3])));
    }

    #[test]
    fn basic_list_of_ports() {
        let registry = Registry::standard();
        let list = registry.resolve(ElementId::iana(291));
        // semantic allOf(3), sourceTransportPort(7), length 2, then 80 and 443
        let bytes = [0x03, 0x00, 0x07, 0x00, 0x02, 0x00, 0x50, 0x01, 0xbb];
        let value = list.decode(&bytes, 0, &registry).unwrap();

        let Payload::List(items) = value.payload() else {
            panic!("expected a list, got {:?}", value.payload());
        };
        let ports: Vec<_> = items.iter().filter_map(|v| v.payload().as_u64()).collect();
        assert_eq!(ports, vec![80, 443]);
        assert_eq!(items[0].name(), "sourceTransportPort");
    }

    #[test]
    fn basic_list_truncated_element_reports_absolute_offset() {
        let registry = Registry::standard();
        let list = registry.resolve(ElementId::iana(291));
        let bytes = [0x03, 0x00, 0x07, 0x00, 0x02, 0x00, 0x50, 0x01];
        let err = list.decode(&bytes, 100, &registry).unwrap_err();

        assert_eq!(err.element, Some(ElementId::iana(7)));
        assert_eq!(err.offset, 107);
        assert!(matches!(err.kind, DecodeErrorKind::Underrun { available: 1 }));
    }

    /// `levels` basicLists, each the single variable-length element of the
    /// one around it, with a list of one port at the bottom.
    fn nested_lists(levels: usize) -> Vec<u8> {
        let mut bytes = vec![0x03, 0x00, 0x07, 0x00, 0x02, 0x00, 0x50];
        for _ in 1..levels {
            // allOf, basicList(291), variable length
            let mut outer = vec![0x03, 0x01, 0x23, 0xff, 0xff];
            match u8::try_from(bytes.len()) {
                Ok(len) if len < 255 => outer.push(len),
                _ => {
                    outer.push(255);
                    outer.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                }
            }
            outer.extend_from_slice(&bytes);
            bytes = outer;
        }
        bytes
    }

    fn depth_of(value: &Value) -> usize {
        match value.payload() {
            Payload::List(items) => 1 + items.iter().map(depth_of).max().unwrap_or(0),
            _ => 0,
        }
    }

    #[test]
    fn lists_nest_up_to_the_limit() {
        let registry = Registry::standard();
        let list = registry.resolve(ElementId::iana(291));

        let value = list.decode(&nested_lists(MAX_LIST_DEPTH), 0, &registry).unwrap();
        assert_eq!(depth_of(&value), MAX_LIST_DEPTH);

        let err = list
            .decode(&nested_lists(MAX_LIST_DEPTH + 1), 0, &registry)
            .unwrap_err();
        assert_eq!(err.element, Some(ElementId::iana(291)));
        assert!(matches!(err.kind, DecodeErrorKind::Malformed(_)), "{err}");
    }

    #[test]
    fn deeply_nested_list_fails_without_exhausting_the_stack() {
        let registry = Registry::standard();
        let bytes = nested_lists(8000);
        assert!(bytes.len() <= usize::from(u16::MAX));

        // Same stack budget as a dispatcher worker.
        let worker = std::thread::Builder::new()
            .name("driftnet-worker-test".into())
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let list = registry.resolve(ElementId::iana(291));
                list.decode(&bytes, 0, &registry).map(|_| ())
            })
            .unwrap();

        let err = worker.join().expect("decoding must not abort the worker").unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::Malformed(_)), "{err}");
    }

    proptest! {
        #[test]
        fn declared_width_never_fails_on_length(kind_idx in 0usize..ALL_KINDS.len(), seed in any::<u64>()) {
            let kind = ALL_KINDS[kind_idx];
            let (min, max) = kind.length_range();
            prop_assume!(min == max);
            let bytes: Vec<u8> = (0..max as usize).map(|i| (seed >> (i % 8 * 8)) as u8).collect();

            if let Err(err) = decode(kind, &bytes) {
                prop_assert!(!matches!(err.kind, DecodeErrorKind::LengthOutOfRange { .. }), "unexpected LengthOutOfRange: {err}");
            }
        }

        #[test]
        fn out_of_range_length_always_fails(kind_idx in 0usize..ALL_KINDS.len(), len in 0usize..40) {
            let kind = ALL_KINDS[kind_idx];
            let (min, max) = kind.length_range();
            prop_assume!(len < min as usize || len > max as usize);

            let err = decode(kind, &vec![0u8; len]).unwrap_err();
            prop_assert_eq!(err.kind, DecodeErrorKind::LengthOutOfRange { min, max });
            prop_assert_eq!(err.length, len);
        }

        #[test]
        fn decoding_is_deterministic(kind_idx in 0usize..ALL_KINDS.len(), bytes in proptest::collection::vec(any::<u8>(), 0..24)) {
            let kind = ALL_KINDS[kind_idx];
            let first = decode(kind, &bytes);
            let second = decode(kind, &bytes);
            match (first, second) {
                (Ok(a), Ok(b)) => {
                    // NaN payloads are the one case where equality cannot hold.
                    let nan = matches!(a.payload(), Payload::Float32(f) if f.is_nan())
                        || matches!(a.payload(), Payload::Float64(f) if f.is_nan());
                    prop_assert!(nan || a == b);
                }
                (Err(a), Err(b)) => prop_assert_eq!(a, b),
                _ => prop_assert!(false, "outcome changed between runs"),
            }
        }
    }
}
