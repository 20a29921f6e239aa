//! ## driftnet-protocols::template
//! **Templates and record decoding**
//!
//! A template is the ordered list of field specifiers describing a data
//! record. [`decode_record`] walks it over a cursor bounded to the enclosing
//! set: either every field decodes and the cursor advances past the record,
//! or the whole record fails and the cursor is left where it was.

use std::sync::Arc;

use crate::cursor::{Cursor, Underrun};
use crate::decoder::{DecodeContext, FieldDecoder};
use crate::error::DecodeError;
use crate::ie::ElementId;
use crate::registry::Registry;
use crate::value::Value;

/// Field length marking a variable-length encoding.
pub const VARIABLE_LENGTH: u16 = 0xFFFF;

const ENTERPRISE_BIT: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLength {
    Fixed(u16),
    /// Length prefix in the record: one byte, or `255` then two bytes.
    Variable,
}

impl From<u16> for FieldLength {
    fn from(raw: u16) -> Self {
        match raw {
            VARIABLE_LENGTH => Self::Variable,
            n => Self::Fixed(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub element: ElementId,
    pub length: FieldLength,
}

impl FieldSpec {
    pub fn new(element: ElementId, length: impl Into<FieldLength>) -> Self {
        Self {
            element,
            length: length.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    /// Non-zero for options templates; the first `scope_field_count`
    /// fields are scope fields.
    pub scope_field_count: u16,
    pub fields: Vec<FieldSpec>,
}

impl Template {
    pub fn new(id: u16, fields: Vec<FieldSpec>) -> Self {
        Self {
            id,
            scope_field_count: 0,
            fields,
        }
    }

    pub fn is_options(&self) -> bool {
        self.scope_field_count > 0
    }

    /// Smallest possible encoded record; variable fields count their
    /// one-byte prefix.
    pub fn min_record_length(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.length {
                FieldLength::Fixed(n) => n as usize,
                FieldLength::Variable => 1,
            })
            .sum()
    }
}

/// Reads a field specifier: id (high bit flags an enterprise number),
/// length, optional enterprise number.
pub(crate) fn read_field_specifier(cursor: &mut Cursor<'_>) -> Result<FieldSpec, Underrun> {
    let raw_id = cursor.read_u16()?;
    let length = cursor.read_u16()?;
    let element = if raw_id & ENTERPRISE_BIT != 0 {
        ElementId::new(cursor.read_u32()?, raw_id & !ENTERPRISE_BIT)
    } else {
        ElementId::iana(raw_id)
    };
    Ok(FieldSpec::new(element, length))
}

fn read_variable_length(cursor: &mut Cursor<'_>) -> Result<usize, Underrun> {
    match cursor.read_u8()? {
        255 => cursor.read_u16().map(usize::from),
        n => Ok(usize::from(n)),
    }
}

/// Decodes one field and advances the cursor by exactly its encoded size.
pub(crate) fn decode_field(
    decoder: &dyn FieldDecoder,
    length: FieldLength,
    cursor: &mut Cursor<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<Value, DecodeError> {
    let element = decoder.element().id();
    let len = match length {
        FieldLength::Fixed(n) => usize::from(n),
        FieldLength::Variable => {
            read_variable_length(cursor).map_err(|u| DecodeError::underrun(Some(element), u))?
        }
    };
    let offset = cursor.offset();
    let bytes = cursor
        .take(len)
        .map_err(|u| DecodeError::underrun(Some(element), u))?;
    decoder.decode_in(bytes, offset, ctx)
}

fn decode_fields(
    fields: &[FieldSpec],
    decoders: &[Arc<dyn FieldDecoder>],
    cursor: &mut Cursor<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<Vec<Value>, DecodeError> {
    let mut walk = *cursor;
    let mut values = Vec::with_capacity(fields.len());
    for (field, decoder) in fields.iter().zip(decoders) {
        values.push(decode_field(decoder.as_ref(), field.length, &mut walk, ctx)?);
    }
    *cursor = walk;
    Ok(values)
}

/// Decodes one data record described by `template`.
pub fn decode_record(
    registry: &Registry,
    template: &Template,
    cursor: &mut Cursor<'_>,
) -> Result<Vec<Value>, DecodeError> {
    let decoders: Vec<_> = template
        .fields
        .iter()
        .map(|field| registry.resolve(field.element))
        .collect();
    decode_fields(&template.fields, &decoders, cursor, &DecodeContext::new(registry))
}

/// A template with one decoder looked up per field, so decoding its records
/// does not go back to the registry. Unknown elements share one opaque
/// descriptor per field for the life of the template.
#[derive(Debug)]
pub struct BoundTemplate {
    template: Template,
    decoders: Vec<Arc<dyn FieldDecoder>>,
}

impl BoundTemplate {
    pub fn bind(template: Template, registry: &Registry) -> Self {
        let decoders = template
            .fields
            .iter()
            .map(|field| registry.resolve(field.element))
            .collect();
        Self { template, decoders }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn field_count(&self) -> usize {
        self.template.fields.len()
    }

    /// Same contract as [`decode_record`]. `registry` is only consulted for
    /// the elements of lists.
    pub fn decode(&self, registry: &Registry, cursor: &mut Cursor<'_>) -> Result<Vec<Value>, DecodeError> {
        decode_fields(&self.template.fields, &self.decoders, cursor, &DecodeContext::new(registry))
    }
}
