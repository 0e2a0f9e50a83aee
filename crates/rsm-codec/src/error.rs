//! Error types for session encoding and decoding.

/// Error raised while turning session state into bytes.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A value outside the supported attribute union was offered for encoding.
    #[error("unsupported attribute value type: {type_name}")]
    UnsupportedType { type_name: String },

    /// Nesting is deeper than the decoder accepts, so the value would not round-trip.
    #[error("attribute value nested deeper than {max} levels")]
    DepthExceeded { max: usize },

    /// Writing to the output buffer failed.
    #[error("failed to write encoded value: {0}")]
    Write(String),
}

impl EncodeError {
    pub(crate) fn unsupported(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}

/// Error raised while reading a stored session blob.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The blob ended before all session fields were read.
    #[error("session data is truncated")]
    Truncated,

    /// A field held a wire value of the wrong kind.
    #[error("unexpected wire value for {field}: {found}")]
    BadTag { field: String, found: String },

    /// The blob is not valid MessagePack.
    #[error("malformed session data: {0}")]
    Malformed(String),

    /// The blob nests values deeper than the decoder accepts.
    #[error("session data nested too deeply")]
    DepthExceeded,
}

impl DecodeError {
    pub(crate) fn bad_tag(field: impl Into<String>, found: &rmpv::Value) -> Self {
        Self::BadTag {
            field: field.into(),
            found: wire_kind(found).to_string(),
        }
    }
}

/// Short name for the kind of a wire value, used in error messages.
pub(crate) fn wire_kind(value: &rmpv::Value) -> &'static str {
    match value {
        rmpv::Value::Nil => "nil",
        rmpv::Value::Boolean(_) => "boolean",
        rmpv::Value::Integer(_) => "integer",
        rmpv::Value::F32(_) => "f32",
        rmpv::Value::F64(_) => "f64",
        rmpv::Value::String(_) => "string",
        rmpv::Value::Binary(_) => "binary",
        rmpv::Value::Array(_) => "array",
        rmpv::Value::Map(_) => "map",
        rmpv::Value::Ext(_, _) => "extension",
    }
}

/// Map a MessagePack read failure onto the codec's error taxonomy.
pub(crate) fn from_read_error(err: rmpv::decode::Error) -> DecodeError {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(ref io) | rmpv::decode::Error::InvalidDataRead(ref io)
            if io.kind() == std::io::ErrorKind::UnexpectedEof =>
        {
            DecodeError::Truncated
        }
        rmpv::decode::Error::DepthLimitExceeded => DecodeError::DepthExceeded,
        other => DecodeError::Malformed(other.to_string()),
    }
}
