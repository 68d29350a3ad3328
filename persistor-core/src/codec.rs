/*!
Codecs that turn entity state and whole stores into bytes.

Two layers use them. A [`Codec`] encodes an entire
[`DataEntitiesContainer`](crate::DataEntitiesContainer) for a backend, and a
[`PayloadFormat`] encodes a single entity's state into the [`Payload`] stored
inside that container.
*/

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{PersistError, Result};

/// Encoding of one entity's state as held by a [`DataEntity`](crate::DataEntity)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// JSON text
    Text(String),
    /// MessagePack bytes
    Binary(Vec<u8>),
}

impl Payload {
    /// Size of the encoded state in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> PayloadFormat {
        match self {
            Payload::Text(_) => PayloadFormat::Text,
            Payload::Binary(_) => PayloadFormat::Binary,
        }
    }

    /// Decode into a fresh `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Payload::Text(text) => JsonCodec.decode(text.as_bytes()),
            Payload::Binary(bytes) => MessagePackCodec.decode(bytes),
        }
    }
}

/// The payload encoding a backend accepts
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    Text,
    Binary,
}

impl PayloadFormat {
    /// Encode `value` into a payload of this format
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Payload> {
        match self {
            PayloadFormat::Text => JsonCodec.encode_text(value).map(Payload::Text),
            PayloadFormat::Binary => MessagePackCodec.encode(value).map(Payload::Binary),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PayloadFormat::Text => "text",
            PayloadFormat::Binary => "binary",
        }
    }
}

/// Restore `target` from `payload` without replacing the instance.
///
/// The payload is decoded into a complete `T` first and only then written
/// into `target`, so a failed decode leaves `target` untouched. The saved
/// state replaces the current one wholesale: map entries or enum variants
/// set after the save do not survive. Fields absent from an older record
/// need `#[serde(default)]` on the type.
pub fn overwrite_in_place<T>(target: &mut T, payload: &Payload) -> Result<()>
where
    T: DeserializeOwned,
{
    *target = payload.decode::<T>()?;
    Ok(())
}

/// Serialization abstraction for whole stores
///
/// Backends are generic over a codec, so the methods may stay generic and
/// the trait need not be object safe.
pub trait Codec {
    /// Serialize a value to bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// The payload format entity state should use alongside this codec
    fn format(&self) -> PayloadFormat;

    /// Get the name of the codec
    fn name(&self) -> &str;
}

/// Cleartext JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_text<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| PersistError::codec::<T, _>("encode", e))
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.encode_text(value).map(String::into_bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| PersistError::codec::<T, _>("decode", e))
    }

    fn format(&self) -> PayloadFormat {
        PayloadFormat::Text
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Compact binary codec (MessagePack with named fields)
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl MessagePackCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for MessagePackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| PersistError::codec::<T, _>("encode", e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| PersistError::codec::<T, _>("decode", e))
    }

    fn format(&self) -> PayloadFormat {
        PayloadFormat::Binary
    }

    fn name(&self) -> &str {
        "msgpack"
    }
}
