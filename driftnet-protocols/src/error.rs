//! Decode errors with positional context.

use thiserror::Error;

use crate::cursor::Underrun;
use crate::ie::ElementId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("length outside declared range [{min}, {max}]")]
    LengthOutOfRange { min: u16, max: u16 },

    #[error("buffer underrun, {available} bytes available")]
    Underrun { available: usize },

    #[error("malformed value: {0}")]
    Malformed(String),

    #[error("no template {template_id} known for this exporter")]
    MissingTemplate { template_id: u16 },

    /// The input is well framed but would cost more than the decoder allows.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl DecodeErrorKind {
    /// Stable metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LengthOutOfRange { .. } => "length_out_of_range",
            Self::Underrun { .. } => "underrun",
            Self::Malformed(_) => "malformed",
            Self::MissingTemplate { .. } => "missing_template",
            Self::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

/// A failed field, record or message, located within the packet.
///
/// `element` is `None` when the failure is in message framing rather than in
/// a specific field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset} (length {length}){}", describe_element(.element))]
pub struct DecodeError {
    pub element: Option<ElementId>,
    pub offset: usize,
    pub length: usize,
    pub kind: DecodeErrorKind,
}

fn describe_element(element: &Option<ElementId>) -> String {
    match element {
        Some(id) => format!(" in element {id}"),
        None => String::new(),
    }
}

impl DecodeError {
    pub fn new(element: Option<ElementId>, offset: usize, length: usize, kind: DecodeErrorKind) -> Self {
        Self {
            element,
            offset,
            length,
            kind,
        }
    }

    pub fn underrun(element: Option<ElementId>, underrun: Underrun) -> Self {
        Self::new(
            element,
            underrun.offset,
            underrun.needed,
            DecodeErrorKind::Underrun {
                available: underrun.available,
            },
        )
    }

    pub fn limit_exceeded(offset: usize, length: usize, reason: impl Into<String>) -> Self {
        Self::new(None, offset, length, DecodeErrorKind::LimitExceeded(reason.into()))
    }

    pub fn malformed(
        element: Option<ElementId>,
        offset: usize,
        length: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(element, offset, length, DecodeErrorKind::Malformed(reason.into()))
    }
}

/// Failure reported by a [`FieldDecoder`](crate::decoder::FieldDecoder)
/// before positional context is attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0}")]
    Malformed(String),

    /// Failure inside a nested structure that already carries its position.
    #[error(transparent)]
    Nested(#[from] DecodeError),
}

impl FieldError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Why a [`TemplateCache`](crate::ipfix::TemplateCache) refused a definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateRejected {
    #[error("exporter already has {limit} templates cached")]
    ExporterFull { limit: usize },

    #[error("template of {fields} fields exceeds the cache capacity of {limit} fields")]
    TooLarge { fields: usize, limit: usize },
}

/// IPFIX message header failures. These reject the whole datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("truncated message header: {0}")]
    Truncated(#[from] Underrun),

    #[error("unsupported IPFIX version {0}")]
    Version(u16),

    #[error("header declares {declared} bytes but the datagram holds {actual}")]
    Length { declared: usize, actual: usize },
}

impl From<MessageError> for DecodeError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::Truncated(underrun) => DecodeError::underrun(None, underrun),
            MessageError::Version(_) => DecodeError::malformed(None, 0, 2, err.to_string()),
            MessageError::Length { declared, .. } => {
                DecodeError::malformed(None, 2, declared, err.to_string())
            }
        }
    }
}
