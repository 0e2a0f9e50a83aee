//! Attribute values and their MessagePack representation.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use rmpv::Value;
use uuid::Uuid;

use crate::error::{DecodeError, EncodeError, wire_kind};

/// MessagePack extension type code reserved for UUIDs.
pub const UUID_EXT_TYPE: i8 = 0x01;

/// Deepest container nesting accepted on encode.
///
/// Kept below the decoder's own depth limit so every encoded value can be read back.
pub const MAX_NESTING_DEPTH: usize = 512;

/// A session attribute value.
///
/// This is a closed union: anything that cannot be expressed with these
/// variants cannot be stored in a session. Integral numbers of every width are
/// widened to `Int` and come back as `Int` regardless of their original width.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Nil,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Uuid(Uuid),
    /// Ordered list of values.
    ///
    /// An empty sequence carries no element type, so it always decodes as an
    /// untyped empty sequence.
    Sequence(Vec<AttributeValue>),
    /// Key/value pairs. Entry order is kept on the wire but ignored by
    /// equality and by the attribute hash.
    Mapping(Vec<(AttributeValue, AttributeValue)>),
}

impl AttributeValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, AttributeValue::Nil)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            AttributeValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a mapping entry by key.
    pub fn get(&self, key: &AttributeValue) -> Option<&AttributeValue> {
        match self {
            AttributeValue::Mapping(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Short kind name, used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Nil => "nil",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::String(_) => "string",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Uuid(_) => "uuid",
            AttributeValue::Sequence(_) => "sequence",
            AttributeValue::Mapping(_) => "mapping",
        }
    }

    /// Convert a dynamically typed value.
    ///
    /// Accepts the primitive types the session store knows about, plus
    /// already-built `AttributeValue`s. Anything else is rejected with
    /// [`EncodeError::UnsupportedType`]; callers choose whether to abort or
    /// substitute `Nil`.
    pub fn from_any(value: &dyn Any) -> Result<Self, EncodeError> {
        macro_rules! widen {
            ($($ty:ty),*) => {
                $(
                    if let Some(v) = value.downcast_ref::<$ty>() {
                        return Ok(AttributeValue::Int(i64::from(*v)));
                    }
                )*
            };
        }
        widen!(i8, i16, i32, i64, u8, u16, u32);

        if let Some(v) = value.downcast_ref::<u64>() {
            return AttributeValue::try_from(*v);
        }
        if let Some(v) = value.downcast_ref::<f64>() {
            return Ok(AttributeValue::Float(*v));
        }
        if let Some(v) = value.downcast_ref::<f32>() {
            return Ok(AttributeValue::Float(f64::from(*v)));
        }
        if let Some(v) = value.downcast_ref::<bool>() {
            return Ok(AttributeValue::Bool(*v));
        }
        if let Some(v) = value.downcast_ref::<String>() {
            return Ok(AttributeValue::String(v.clone()));
        }
        if let Some(v) = value.downcast_ref::<&'static str>() {
            return Ok(AttributeValue::String((*v).to_string()));
        }
        if let Some(v) = value.downcast_ref::<Uuid>() {
            return Ok(AttributeValue::Uuid(*v));
        }
        if let Some(v) = value.downcast_ref::<Vec<String>>() {
            return Ok(v.iter().cloned().collect());
        }
        if let Some(v) = value.downcast_ref::<Vec<Uuid>>() {
            return Ok(v.iter().copied().collect());
        }
        if let Some(v) = value.downcast_ref::<AttributeValue>() {
            return Ok(v.clone());
        }
        if let Some(v) = value.downcast_ref::<serde_json::Value>() {
            return AttributeValue::try_from(v.clone());
        }

        Err(EncodeError::unsupported(format!("{:?}", value.type_id())))
    }

    /// Render as JSON for display.
    ///
    /// UUIDs become strings and mapping keys are stringified, so this is not
    /// an inverse of the `serde_json::Value` conversion.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            AttributeValue::Nil => Json::Null,
            AttributeValue::Int(n) => Json::from(*n),
            AttributeValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number)
            }
            AttributeValue::String(s) => Json::String(s.clone()),
            AttributeValue::Bool(b) => Json::Bool(*b),
            AttributeValue::Uuid(u) => Json::String(u.to_string()),
            AttributeValue::Sequence(items) => {
                Json::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Mapping(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            AttributeValue::String(s) => s.clone(),
                            other => other.to_json().to_string(),
                        };
                        (key, v.to_json())
                    })
                    .collect(),
            ),
        }
    }
}

/// Value equality: floats compare by bit pattern, so `NaN` equals itself and
/// `0.0` differs from `-0.0`; mappings compare as unordered collections of
/// entries.
impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttributeValue::Nil, AttributeValue::Nil) => true,
            (AttributeValue::Int(a), AttributeValue::Int(b)) => a == b,
            (AttributeValue::Float(a), AttributeValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttributeValue::String(a), AttributeValue::String(b)) => a == b,
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
            (AttributeValue::Uuid(a), AttributeValue::Uuid(b)) => a == b,
            (AttributeValue::Sequence(a), AttributeValue::Sequence(b)) => a == b,
            (AttributeValue::Mapping(a), AttributeValue::Mapping(b)) => same_entries(a, b),
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

/// Multiset comparison; each entry of `b` may match at most one entry of `a`.
fn same_entries(
    a: &[(AttributeValue, AttributeValue)],
    b: &[(AttributeValue, AttributeValue)],
) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut matched = vec![false; b.len()];
    a.iter().all(|entry| {
        let found = b
            .iter()
            .zip(matched.iter())
            .position(|(candidate, taken)| !*taken && candidate == entry);
        match found {
            Some(i) => {
                matched[i] = true;
                true
            }
            None => false,
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(v: $ty) -> Self {
                    AttributeValue::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl TryFrom<u64> for AttributeValue {
    type Error = EncodeError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v)
            .map(AttributeValue::Int)
            .map_err(|_| EncodeError::unsupported("u64 above i64::MAX"))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        AttributeValue::Float(f64::from(v))
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<Uuid> for AttributeValue {
    fn from(v: Uuid) -> Self {
        AttributeValue::Uuid(v)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttributeValue::Nil, Into::into)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(v: Vec<T>) -> Self {
        AttributeValue::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AttributeValue>> FromIterator<T> for AttributeValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        AttributeValue::Sequence(iter.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<AttributeValue>, V: Into<AttributeValue>> From<BTreeMap<K, V>> for AttributeValue {
    fn from(map: BTreeMap<K, V>) -> Self {
        AttributeValue::Mapping(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<AttributeValue>, V: Into<AttributeValue>> From<HashMap<K, V>> for AttributeValue {
    fn from(map: HashMap<K, V>) -> Self {
        AttributeValue::Mapping(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl TryFrom<serde_json::Value> for AttributeValue {
    type Error = EncodeError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;

        Ok(match json {
            Json::Null => AttributeValue::Nil,
            Json::Bool(b) => AttributeValue::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    AttributeValue::try_from(u)?
                } else if let Some(f) = n.as_f64() {
                    AttributeValue::Float(f)
                } else {
                    return Err(EncodeError::unsupported(format!("json number {n}")));
                }
            }
            Json::String(s) => AttributeValue::String(s),
            Json::Array(items) => AttributeValue::Sequence(
                items
                    .into_iter()
                    .map(AttributeValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => AttributeValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| Ok((AttributeValue::String(k), AttributeValue::try_from(v)?)))
                    .collect::<Result<_, EncodeError>>()?,
            ),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Convert an attribute value into its MessagePack representation.
pub fn encode_value(value: &AttributeValue) -> Result<Value, EncodeError> {
    encode_at_depth(value, 0, false)
}

/// Like [`encode_value`], but with every mapping's entries sorted by their
/// encoded bytes, so values that compare equal encode identically.
pub(crate) fn encode_canonical(value: &AttributeValue) -> Result<Value, EncodeError> {
    encode_at_depth(value, 0, true)
}

fn encode_at_depth(
    value: &AttributeValue,
    depth: usize,
    canonical: bool,
) -> Result<Value, EncodeError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(EncodeError::DepthExceeded {
            max: MAX_NESTING_DEPTH,
        });
    }

    Ok(match value {
        AttributeValue::Nil => Value::Nil,
        AttributeValue::Int(n) => Value::from(*n),
        AttributeValue::Float(f) => Value::F64(*f),
        AttributeValue::String(s) => Value::from(s.as_str()),
        AttributeValue::Bool(b) => Value::Boolean(*b),
        AttributeValue::Uuid(u) => Value::Ext(UUID_EXT_TYPE, uuid_to_bytes(u).to_vec()),
        AttributeValue::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|item| encode_at_depth(item, depth + 1, canonical))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::Mapping(entries) => {
            let encoded = entries
                .iter()
                .map(|(k, v)| {
                    Ok((
                        encode_at_depth(k, depth + 1, canonical)?,
                        encode_at_depth(v, depth + 1, canonical)?,
                    ))
                })
                .collect::<Result<Vec<_>, EncodeError>>()?;

            if canonical {
                Value::Map(sorted_entries(encoded)?)
            } else {
                Value::Map(encoded)
            }
        }
    })
}

/// Order map entries by their key bytes, then value bytes.
fn sorted_entries(entries: Vec<(Value, Value)>) -> Result<Vec<(Value, Value)>, EncodeError> {
    let mut keyed = entries
        .into_iter()
        .map(|(k, v)| {
            let mut bytes = Vec::new();
            for part in [&k, &v] {
                rmpv::encode::write_value(&mut bytes, part)
                    .map_err(|e| EncodeError::Write(e.to_string()))?;
            }
            Ok((bytes, (k, v)))
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
}

/// Convert a MessagePack value back into an attribute value.
///
/// Every integer comes back as `Int`; `f32` is widened to `Float`. Binary
/// payloads, unknown extension types and integers beyond the `i64` range are
/// rejected.
pub fn decode_value(value: Value) -> Result<AttributeValue, DecodeError> {
    decode_field("attribute", value)
}

pub(crate) fn decode_field(field: &str, value: Value) -> Result<AttributeValue, DecodeError> {
    Ok(match value {
        Value::Nil => AttributeValue::Nil,
        Value::Boolean(b) => AttributeValue::Bool(b),
        Value::Integer(ref n) => match n.as_i64() {
            Some(n) => AttributeValue::Int(n),
            None => return Err(DecodeError::bad_tag(field, &value)),
        },
        Value::F32(f) => AttributeValue::Float(f64::from(f)),
        Value::F64(f) => AttributeValue::Float(f),
        Value::String(s) => match s.into_str() {
            Some(s) => AttributeValue::String(s),
            None => {
                return Err(DecodeError::BadTag {
                    field: field.to_string(),
                    found: "non-utf8 string".to_string(),
                });
            }
        },
        Value::Ext(UUID_EXT_TYPE, ref data) => match uuid_from_bytes(data) {
            Some(u) => AttributeValue::Uuid(u),
            None => {
                return Err(DecodeError::BadTag {
                    field: field.to_string(),
                    found: format!("uuid extension of {} bytes", data.len()),
                });
            }
        },
        Value::Array(items) => AttributeValue::Sequence(
            items
                .into_iter()
                .map(|item| decode_field(field, item))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => AttributeValue::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| Ok((decode_field(field, k)?, decode_field(field, v)?)))
                .collect::<Result<_, DecodeError>>()?,
        ),
        other @ (Value::Binary(_) | Value::Ext(_, _)) => {
            tracing::debug!(field, kind = wire_kind(&other), "Unsupported wire value");
            return Err(DecodeError::bad_tag(field, &other));
        }
    })
}

/// High 64 bits then low 64 bits, both big-endian.
fn uuid_to_bytes(uuid: &Uuid) -> [u8; 16] {
    let (hi, lo) = uuid.as_u64_pair();
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&hi.to_be_bytes());
    out[8..].copy_from_slice(&lo.to_be_bytes());
    out
}

fn uuid_from_bytes(data: &[u8]) -> Option<Uuid> {
    let bytes: [u8; 16] = data.try_into().ok()?;
    let hi = u64::from_be_bytes(bytes[..8].try_into().ok()?);
    let lo = u64::from_be_bytes(bytes[8..].try_into().ok()?);
    Some(Uuid::from_u64_pair(hi, lo))
}
