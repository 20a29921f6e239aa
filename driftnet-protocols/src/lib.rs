//! # driftnet-protocols
//!
//! Binary decoding of telemetry datagrams.
//!
//! ### Key Submodules:
//! - `cursor`: bounds-checked reads with absolute offsets
//! - `ie`, `value`: element descriptors and the closed [`Payload`] model
//! - `decoder`, `registry`: per-element [`FieldDecoder`]s keyed by
//!   `(enterprise, field id)`, with an opaque fallback
//! - `template`: template-driven record decoding
//! - `ipfix`, `syslog`: [`PacketDecoder`]s for the supported wire formats

pub mod cursor;
pub mod decoder;
pub mod error;
pub mod ie;
pub mod ipfix;
pub mod record;
pub mod registry;
pub mod syslog;
pub mod template;
pub mod value;

pub use cursor::{Cursor, Underrun};
pub use decoder::{DecodeContext, FieldDecoder, OpaqueDecoder, TypedDecoder, ValueKind, MAX_LIST_DEPTH};
pub use error::{DecodeError, DecodeErrorKind, FieldError, MessageError, TemplateRejected};
pub use ie::{ElementId, InformationElement, Semantics};
pub use ipfix::{IpfixDecoder, TemplateCache, TemplateLimits};
pub use record::{PacketDecoder, PacketOutcome, Record, RecordOrigin};
pub use registry::Registry;
pub use syslog::SyslogDecoder;
pub use template::{decode_record, BoundTemplate, FieldLength, FieldSpec, Template};
pub use value::{Payload, PayloadVisitor, Value};
