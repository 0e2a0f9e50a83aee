//! Session record serialization and the attribute fingerprint.

use std::collections::BTreeMap;

use rmpv::Value;
use sha2::{Digest, Sha256};

use crate::error::{DecodeError, EncodeError, from_read_error};
use crate::value::{AttributeValue, decode_field, encode_canonical, encode_value};

/// Session attributes keyed by name.
///
/// Sorted keys keep the encoded form, and therefore the hash, independent of
/// insertion order.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Platform-agnostic persisted form of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSession {
    /// Creation time, milliseconds since the epoch.
    pub creation_time: i64,
    /// Time of the previous request's start, milliseconds since the epoch.
    pub last_accessed_time: i64,
    /// Idle lifetime in seconds.
    pub max_inactive_interval: i32,
    pub is_new: bool,
    pub is_valid: bool,
    /// Start time of the current request, milliseconds since the epoch.
    pub this_accessed_time: i64,
    pub id: String,
    pub principal_name: Option<String>,
    pub principal_roles: Option<Vec<String>>,
    pub attributes: Attributes,
}

impl PersistedSession {
    /// Create an empty record with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Bookkeeping stored alongside a session but never exposed as session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Attribute fingerprint at the last successful persist.
    pub attr_hash: i64,
}

impl SessionMetadata {
    pub fn new(attr_hash: i64) -> Self {
        Self { attr_hash }
    }
}

/// Compute the change-detection fingerprint of an attribute map.
///
/// The attributes are encoded alone, digested with SHA-256 and the low 64 bits
/// of the big-endian digest are taken as a signed integer. This is not a
/// security digest.
pub fn attributes_hash(attributes: &Attributes) -> Result<i64, EncodeError> {
    let mut buf = Vec::new();
    write(&mut buf, &encode_attributes(attributes, encode_canonical)?)?;

    let digest = Sha256::digest(&buf);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[digest.len() - 8..]);
    Ok(i64::from_be_bytes(low))
}

/// Serialize a session record and its metadata.
pub fn serialize(
    session: &PersistedSession,
    metadata: &SessionMetadata,
) -> Result<Vec<u8>, EncodeError> {
    let principal_roles = match &session.principal_roles {
        Some(roles) => Value::Array(roles.iter().map(|r| Value::from(r.as_str())).collect()),
        None => Value::Nil,
    };

    let fields = [
        Value::from(metadata.attr_hash),
        Value::from(session.creation_time),
        Value::from(session.last_accessed_time),
        Value::from(session.max_inactive_interval),
        Value::Boolean(session.is_new),
        Value::Boolean(session.is_valid),
        Value::from(session.this_accessed_time),
        Value::from(session.id.as_str()),
        session
            .principal_name
            .as_deref()
            .map_or(Value::Nil, Value::from),
        principal_roles,
        encode_attributes(&session.attributes, encode_value)?,
    ];

    let mut buf = Vec::with_capacity(64);
    for field in &fields {
        write(&mut buf, field)?;
    }
    Ok(buf)
}

/// Deserialize bytes written by [`serialize`].
///
/// Trailing bytes after the last field are ignored.
pub fn deserialize(data: &[u8]) -> Result<(PersistedSession, SessionMetadata), DecodeError> {
    let mut reader = FieldReader { rest: data };

    let metadata = SessionMetadata {
        attr_hash: reader.int("attr_hash")?,
    };

    let creation_time = reader.int("creation_time")?;
    let last_accessed_time = reader.int("last_accessed_time")?;
    let max_inactive_interval = {
        let raw = reader.int("max_inactive_interval")?;
        i32::try_from(raw).map_err(|_| DecodeError::BadTag {
            field: "max_inactive_interval".to_string(),
            found: format!("integer {raw} outside i32"),
        })?
    };
    let is_new = reader.bool("is_new")?;
    let is_valid = reader.bool("is_valid")?;
    let this_accessed_time = reader.int("this_accessed_time")?;

    let id = reader
        .optional_string("id")?
        .ok_or_else(|| DecodeError::BadTag {
            field: "id".to_string(),
            found: "nil".to_string(),
        })?;
    let principal_name = reader.optional_string("principal_name")?;
    let principal_roles = reader.optional_roles()?;
    let attributes = reader.attributes()?;

    Ok((
        PersistedSession {
            creation_time,
            last_accessed_time,
            max_inactive_interval,
            is_new,
            is_valid,
            this_accessed_time,
            id,
            principal_name,
            principal_roles,
            attributes,
        },
        metadata,
    ))
}

fn encode_attributes(
    attributes: &Attributes,
    encode: fn(&AttributeValue) -> Result<Value, EncodeError>,
) -> Result<Value, EncodeError> {
    let entries = attributes
        .iter()
        .map(|(k, v)| Ok((Value::from(k.as_str()), encode(v)?)))
        .collect::<Result<Vec<_>, EncodeError>>()?;
    Ok(Value::Map(entries))
}

fn write(buf: &mut Vec<u8>, value: &Value) -> Result<(), EncodeError> {
    rmpv::encode::write_value(buf, value).map_err(|e| EncodeError::Write(e.to_string()))
}

/// Sequential reader over the positional session fields.
struct FieldReader<'a> {
    rest: &'a [u8],
}

impl FieldReader<'_> {
    fn next(&mut self) -> Result<Value, DecodeError> {
        rmpv::decode::read_value(&mut self.rest).map_err(from_read_error)
    }

    fn int(&mut self, field: &str) -> Result<i64, DecodeError> {
        let value = self.next()?;
        value.as_i64().ok_or_else(|| DecodeError::bad_tag(field, &value))
    }

    fn bool(&mut self, field: &str) -> Result<bool, DecodeError> {
        let value = self.next()?;
        value.as_bool().ok_or_else(|| DecodeError::bad_tag(field, &value))
    }

    fn optional_string(&mut self, field: &str) -> Result<Option<String>, DecodeError> {
        match decode_field(field, self.next()?)? {
            AttributeValue::Nil => Ok(None),
            AttributeValue::String(s) => Ok(Some(s)),
            other => Err(DecodeError::BadTag {
                field: field.to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    fn optional_roles(&mut self) -> Result<Option<Vec<String>>, DecodeError> {
        const FIELD: &str = "principal_roles";

        match decode_field(FIELD, self.next()?)? {
            AttributeValue::Nil => Ok(None),
            AttributeValue::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    AttributeValue::String(s) => Ok(s),
                    other => Err(DecodeError::BadTag {
                        field: FIELD.to_string(),
                        found: format!("{} role", other.kind()),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => Err(DecodeError::BadTag {
                field: FIELD.to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    fn attributes(&mut self) -> Result<Attributes, DecodeError> {
        const FIELD: &str = "attributes";

        match decode_field(FIELD, self.next()?)? {
            AttributeValue::Nil => Ok(Attributes::new()),
            AttributeValue::Mapping(entries) => entries
                .into_iter()
                .map(|(k, v)| match k {
                    AttributeValue::String(name) => Ok((name, v)),
                    other => Err(DecodeError::BadTag {
                        field: FIELD.to_string(),
                        found: format!("{} key", other.kind()),
                    }),
                })
                .collect(),
            other => Err(DecodeError::BadTag {
                field: FIELD.to_string(),
                found: other.kind().to_string(),
            }),
        }
    }
}
