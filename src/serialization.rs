//! Payload serialization through an explicit type registry.
//!
//! Every stored payload carries a type tag. The [`TypeRegistry`] maps each
//! tag to the encode/decode pair of one concrete Rust type, so decoding never
//! resolves types by name at runtime: an unknown tag is a decode fault.
//!
//! Payload bytes are JSON (serde_json). Snapshots are wrapped in a
//! [`SnapshotEnvelope`] that records the metadata next to the payload.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors raised while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Unknown type tag: {0}")]
    UnknownTypeTag(String),

    #[error("Type tag {tag} is registered for a different type")]
    TypeMismatch { tag: String },

    #[error("Type tag {0} registered twice")]
    DuplicateTypeTag(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid timestamp: {0} microseconds")]
    InvalidTimestamp(i64),
}

type ErasedValue = Arc<dyn Any + Send + Sync>;
type EncodeFn = fn(&(dyn Any + Send + Sync)) -> Option<serde_json::Result<Vec<u8>>>;
type DecodeFn = fn(&[u8]) -> serde_json::Result<ErasedValue>;

/// A domain object together with its registered type tag.
#[derive(Clone)]
pub struct Payload {
    type_tag: String,
    value: ErasedValue,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(type_tag: impl Into<String>, value: T) -> Self {
        Self {
            type_tag: type_tag.into(),
            value: Arc::new(value),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Borrow the value as `T`, or `None` if it holds another type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

struct Registration {
    type_id: TypeId,
    encode: EncodeFn,
    decode: DecodeFn,
}

fn encode_as<T: Serialize + Any>(value: &(dyn Any + Send + Sync)) -> Option<serde_json::Result<Vec<u8>>> {
    value.downcast_ref::<T>().map(serde_json::to_vec)
}

fn decode_as<T: DeserializeOwned + Any + Send + Sync>(bytes: &[u8]) -> serde_json::Result<ErasedValue> {
    let value: T = serde_json::from_slice(bytes)?;
    Ok(Arc::new(value))
}

/// Maps type tags to concrete payload types.
#[derive(Default)]
pub struct TypeRegistry {
    entries: HashMap<String, Registration>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `tag`. A tag can only be registered once.
    pub fn register<T>(&mut self, tag: impl Into<String>) -> Result<&mut Self, SerializationError>
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let tag = tag.into();
        if self.entries.contains_key(&tag) {
            return Err(SerializationError::DuplicateTypeTag(tag));
        }
        self.entries.insert(
            tag,
            Registration {
                type_id: TypeId::of::<T>(),
                encode: encode_as::<T>,
                decode: decode_as::<T>,
            },
        );
        Ok(self)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    fn registration(&self, tag: &str) -> Result<&Registration, SerializationError> {
        self.entries
            .get(tag)
            .ok_or_else(|| SerializationError::UnknownTypeTag(tag.to_string()))
    }

    /// Serialize a payload's value with the codec of its tag.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>, SerializationError> {
        let registration = self.registration(payload.type_tag())?;
        if (*payload.value).type_id() != registration.type_id {
            return Err(SerializationError::TypeMismatch {
                tag: payload.type_tag.clone(),
            });
        }
        match (registration.encode)(payload.value.as_ref()) {
            Some(result) => Ok(result?),
            None => Err(SerializationError::TypeMismatch {
                tag: payload.type_tag.clone(),
            }),
        }
    }

    /// Rebuild a payload from its tag and stored bytes.
    pub fn decode(&self, type_tag: &str, bytes: &[u8]) -> Result<Payload, SerializationError> {
        let registration = self.registration(type_tag)?;
        let value = (registration.decode)(bytes)?;
        Ok(Payload {
            type_tag: type_tag.to_string(),
            value,
        })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.entries.keys().collect();
        tags.sort();
        f.debug_struct("TypeRegistry").field("tags", &tags).finish()
    }
}

/// Serialized form of a snapshot: metadata plus the encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub persistence_id: String,
    pub sequence_nr: u64,
    /// Save time in microseconds since the Unix epoch.
    pub timestamp: i64,
    pub type_tag: String,
    /// Payload bytes, base64 encoded.
    pub payload: String,
}

impl SnapshotEnvelope {
    pub fn new(
        persistence_id: &str,
        sequence_nr: u64,
        timestamp: DateTime<Utc>,
        type_tag: &str,
        payload: &[u8],
    ) -> Self {
        Self {
            persistence_id: persistence_id.to_string(),
            sequence_nr,
            timestamp: timestamp.timestamp_micros(),
            type_tag: type_tag.to_string(),
            payload: BASE64.encode(payload),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn payload_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(BASE64.decode(&self.payload)?)
    }

    pub fn timestamp(&self) -> Result<DateTime<Utc>, SerializationError> {
        timestamp_from_micros(self.timestamp)
    }
}

/// Convert stored microseconds back to a UTC timestamp.
pub fn timestamp_from_micros(micros: i64) -> Result<DateTime<Utc>, SerializationError> {
    DateTime::from_timestamp_micros(micros).ok_or(SerializationError::InvalidTimestamp(micros))
}
