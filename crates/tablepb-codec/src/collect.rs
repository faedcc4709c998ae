//! Ready-made [`FieldCallback`]s that keep callback field values in
//! growable collections.

use crate::callback::{Element, ElementWriter, FieldCallback, Scalar};
use crate::descriptor::FieldDescriptor;
use crate::error::{CodecError, Result};

fn kind_mismatch(field: &FieldDescriptor) -> CodecError {
    CodecError::KindMismatch {
        field: field.name,
        kind: field.kind.name(),
    }
}

/// Numbers of a repeated scalar field.
///
/// Encodes packed when the field is marked packed, one tagged value per
/// element otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarList {
    pub values: Vec<Scalar>,
}

impl ScalarList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = impl Into<Scalar>>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl FieldCallback for ScalarList {
    fn decode_element(&mut self, field: &FieldDescriptor, element: Element<'_, '_>) -> Result<()> {
        match element {
            Element::Scalar(value) => {
                self.values.push(value);
                Ok(())
            }
            Element::Delimited(_) => Err(kind_mismatch(field)),
        }
    }

    fn encode_elements(&mut self, field: &FieldDescriptor, writer: &mut ElementWriter<'_, '_>) -> Result<()> {
        if field.packed {
            return writer.write_packed(&self.values);
        }
        for value in &self.values {
            writer.write_scalar(*value)?;
        }
        Ok(())
    }
}

/// Payloads of a repeated bytes field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BytesList {
    pub items: Vec<Vec<u8>>,
}

impl FieldCallback for BytesList {
    fn decode_element(&mut self, field: &FieldDescriptor, element: Element<'_, '_>) -> Result<()> {
        match element {
            Element::Delimited(mut payload) => {
                self.items.push(payload.to_vec()?);
                Ok(())
            }
            Element::Scalar(_) => Err(kind_mismatch(field)),
        }
    }

    fn encode_elements(&mut self, _field: &FieldDescriptor, writer: &mut ElementWriter<'_, '_>) -> Result<()> {
        for item in &self.items {
            writer.write_bytes(item)?;
        }
        Ok(())
    }
}

/// Values of a repeated string field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList {
    pub items: Vec<String>,
}

impl FieldCallback for StringList {
    fn decode_element(&mut self, field: &FieldDescriptor, element: Element<'_, '_>) -> Result<()> {
        match element {
            Element::Delimited(mut payload) => {
                self.items.push(payload.to_string()?);
                Ok(())
            }
            Element::Scalar(_) => Err(kind_mismatch(field)),
        }
    }

    fn encode_elements(&mut self, _field: &FieldDescriptor, writer: &mut ElementWriter<'_, '_>) -> Result<()> {
        for item in &self.items {
            writer.write_str(item)?;
        }
        Ok(())
    }
}
