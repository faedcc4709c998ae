/// Default limit on submessage nesting.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Controls decoder behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Deepest submessage nesting accepted; the top-level message is depth 0.
    pub max_depth: usize,
    /// When true, fields missing from the descriptor fail with
    /// `CodecError::UnknownField` instead of being skipped.
    pub strict_unknown_fields: bool,
    /// When true, known fields arriving with an unexpected wire type are
    /// skipped instead of failing with `CodecError::WireTypeMismatch`.
    pub skip_mismatched_wire_types: bool,
    /// When true, string fields must hold valid UTF-8.
    pub validate_utf8: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            strict_unknown_fields: false,
            skip_mismatched_wire_types: false,
            validate_utf8: true,
        }
    }
}

/// Controls encoder behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeConfig {
    /// Deepest submessage nesting written; the top-level message is depth 0.
    pub max_depth: usize,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
