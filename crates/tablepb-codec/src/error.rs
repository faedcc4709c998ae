use tablepb_stream::StreamError;
use tablepb_wire::{WireError, WireType};

/// Errors that can occur while encoding or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A wire primitive or the underlying stream failed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A known field arrived with a wire type its kind cannot carry.
    #[error("field {field}: wire type {actual} does not match expected {expected}")]
    WireTypeMismatch {
        field: &'static str,
        expected: WireType,
        actual: WireType,
    },

    /// Submessage nesting passed the configured limit.
    #[error("message nesting exceeds maximum depth {max}")]
    MessageTooDeep { max: usize },

    /// A static repeated field holds, or would hold, more than its capacity.
    #[error("field {field}: array capacity {capacity} exceeded")]
    ArrayFull {
        field: &'static str,
        capacity: usize,
    },

    /// A required field was not present in the decoded message.
    #[error("required field {field} missing from message {message}")]
    MissingRequiredField {
        message: &'static str,
        field: &'static str,
    },

    /// An unknown field's wire type gives no way to find its end.
    #[error("cannot skip field {number} with wire type {wire_type}")]
    UnknownFieldSkipFailure { number: u32, wire_type: WireType },

    /// An unknown field was met while unknown fields are rejected.
    #[error("unknown field {number} in message {message}")]
    UnknownField { message: &'static str, number: u32 },

    /// A string or bytes value does not fit its storage.
    #[error("field {field}: value of {len} bytes exceeds capacity {capacity}")]
    CapacityExceeded {
        field: &'static str,
        len: usize,
        capacity: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("field {field}: string is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// A submessage encoded to a different length in the writing pass than
    /// in the sizing pass.
    #[error("{field}: encoded size changed between passes ({expected} then {actual} bytes)")]
    SizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A descriptor (or the block it describes) is inconsistent.
    #[error("{field}: invalid descriptor ({reason})")]
    InvalidDescriptor {
        field: &'static str,
        reason: &'static str,
    },

    /// A message view was asked for a tag the descriptor does not have.
    #[error("message {message} has no field {tag}")]
    NoSuchField { message: &'static str, tag: u32 },

    /// A message view accessor does not fit the field.
    #[error("field {field}: accessor does not apply to a {kind} field")]
    KindMismatch {
        field: &'static str,
        kind: &'static str,
    },

    /// A message view index is past the populated elements.
    #[error("field {field}: index {index} out of range (count {count})")]
    IndexOutOfRange {
        field: &'static str,
        index: usize,
        count: usize,
    },
}

impl From<StreamError> for CodecError {
    fn from(err: StreamError) -> Self {
        Self::Wire(WireError::Stream(err))
    }
}

/// Coarse classification of a [`CodecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    MalformedVarint,
    LengthMismatch,
    InvalidTag,
    WireTypeMismatch,
    MessageTooDeep,
    ArrayFull,
    MissingRequiredField,
    UnknownFieldSkipFailure,
    UnknownField,
    CapacityExceeded,
    InvalidUtf8,
    SizeMismatch,
    InvalidDescriptor,
    Usage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::MalformedVarint => "malformed_varint",
            Self::LengthMismatch => "length_mismatch",
            Self::InvalidTag => "invalid_tag",
            Self::WireTypeMismatch => "wire_type_mismatch",
            Self::MessageTooDeep => "message_too_deep",
            Self::ArrayFull => "array_full",
            Self::MissingRequiredField => "missing_required_field",
            Self::UnknownFieldSkipFailure => "unknown_field_skip_failure",
            Self::UnknownField => "unknown_field",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::SizeMismatch => "size_mismatch",
            Self::InvalidDescriptor => "invalid_descriptor",
            Self::Usage => "usage",
        }
    }
}

impl CodecError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidDescriptor { field, reason }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Wire(err) => match err {
                WireError::Stream(_) | WireError::Io(_) | WireError::ConnectionClosed => {
                    ErrorKind::Io
                }
                WireError::MalformedVarint => ErrorKind::MalformedVarint,
                WireError::LengthMismatch { .. } | WireError::FrameTooLarge { .. } => {
                    ErrorKind::LengthMismatch
                }
                WireError::InvalidWireType(_) | WireError::InvalidFieldNumber(_) => {
                    ErrorKind::InvalidTag
                }
                WireError::UnskippableWireType(_) => ErrorKind::UnknownFieldSkipFailure,
            },
            Self::WireTypeMismatch { .. } => ErrorKind::WireTypeMismatch,
            Self::MessageTooDeep { .. } => ErrorKind::MessageTooDeep,
            Self::ArrayFull { .. } => ErrorKind::ArrayFull,
            Self::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Self::UnknownFieldSkipFailure { .. } => ErrorKind::UnknownFieldSkipFailure,
            Self::UnknownField { .. } => ErrorKind::UnknownField,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InvalidUtf8 { .. } => ErrorKind::InvalidUtf8,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::InvalidDescriptor { .. } => ErrorKind::InvalidDescriptor,
            Self::NoSuchField { .. } | Self::KindMismatch { .. } | Self::IndexOutOfRange { .. } => {
                ErrorKind::Usage
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
