//! Binary codec for replicated session state.
//!
//! Sessions are written as a fixed, positional sequence of MessagePack values
//! (no field names) so that blobs written by older writers stay readable:
//!
//! ```text
//! [attr_hash][creation_time][last_accessed_time][max_inactive_interval]
//! [is_new][is_valid][this_accessed_time][id][principal_name]
//! [principal_roles][attributes]
//! ```
//!
//! Attribute values are restricted to the closed [`AttributeValue`] union.
//! UUIDs travel as a 16-byte MessagePack extension (type [`UUID_EXT_TYPE`]) so
//! they stay distinguishable from strings and byte blobs.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsm_codec::{PersistedSession, SessionMetadata, serialize, deserialize};
//!
//! let session = PersistedSession::new("abc123");
//! let bytes = serialize(&session, &SessionMetadata::new(-10))?;
//! let (decoded, metadata) = deserialize(&bytes)?;
//! assert_eq!(metadata.attr_hash, -10);
//! ```

mod error;
mod session;
mod value;

pub use error::{DecodeError, EncodeError};
pub use session::{
    Attributes, PersistedSession, SessionMetadata, attributes_hash, deserialize, serialize,
};
pub use value::{AttributeValue, MAX_NESTING_DEPTH, UUID_EXT_TYPE, decode_value, encode_value};
