/*!
Error types for the Persistor core engine.
*/

use thiserror::Error;

/// Result type used throughout the Persistor core.
pub type Result<T> = std::result::Result<T, PersistError>;

/// Boxed underlying cause carried by codec failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during save, load and purge operations.
///
/// A key that has never been written is not an error: backends report it as
/// `Ok(None)` and the container as [`LoadOutcome::NotFound`](crate::LoadOutcome).
#[derive(Error, Debug)]
pub enum PersistError {
    /// The container was used without a backend attached
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization or deserialization of a specific type failed
    #[error("Codec error: failed to {action} `{type_name}`: {source}")]
    Codec {
        action: &'static str,
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    /// Decryption failed: wrong key, truncated or tampered data
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Stored data exists but is not in a format this build understands
    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl PersistError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a codec error for type `T`
    pub fn codec<T: ?Sized, E>(action: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Codec {
            action,
            type_name: std::any::type_name::<T>(),
            source: source.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Whether this error is the fatal "no backend attached" condition
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether this error came from a failed decryption
    pub fn is_crypto(&self) -> bool {
        matches!(self, Self::Crypto(_))
    }
}
