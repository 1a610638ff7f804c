//! # Cache Error Types
//!
//! Error types for cache operations. Write paths surface these to callers;
//! read paths catch them internally and degrade to a cache miss.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persistent storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A bridge capability returned an error.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Configuration failed validation.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// A network fetch failed.
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// The service was used before `initialize()` or after `dispose()`.
    #[error("Cache not initialized")]
    NotInitialized,

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns `true` if this error came from the storage backend.
    pub fn is_storage(&self) -> bool {
        matches!(self, CacheError::Storage(_) | CacheError::Bridge(_))
    }

    /// Returns `true` if this error came from payload (de)serialization.
    pub fn is_serialization(&self) -> bool {
        matches!(self, CacheError::Serialization(_))
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
