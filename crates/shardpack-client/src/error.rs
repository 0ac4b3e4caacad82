//! Error types for Shardpack client operations.
//!
//! This module defines the errors that can occur while routing, accumulating,
//! or deaggregating records. Codec failures from `shardpack-core` are wrapped
//! rather than flattened so callers can still match on them.
//!
//! ## Error Handling Strategy
//!
//! - **Caller errors**: `Core(OversizedEntry | InvalidPartitionKey | ...)`, `ConfigError`
//! - **Topology errors**: `Topology`, `NoDestination` (refresh and retry)
//! - **Envelope errors**: `Serialization`
//!
//! Malformed aggregated records never surface here: the deaggregator passes
//! them through unchanged.
//!
//! ## Examples
//!
//! ```ignore
//! use shardpack_client::ClientError;
//! use shardpack_core::Error;
//!
//! match router.add("user-1", data, None).await {
//!     Ok(Some(full)) => transmit(full).await?,
//!     Ok(None) => {}
//!     Err(ClientError::Core(Error::OversizedEntry { size, max, .. })) => {
//!         eprintln!("record of {} bytes can never fit into {}", size, max);
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for Shardpack client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Encoding, validation, or decoding failed in the codec.
    ///
    /// Automatically converted from `shardpack_core::Error` via `#[from]`.
    #[error(transparent)]
    Core(#[from] shardpack_core::Error),

    /// The topology provider failed to list shards.
    ///
    /// ## Causes
    /// - Stream doesn't exist
    /// - Provider transport failure
    ///
    /// ## Resolution
    /// - Check the stream name
    /// - Retry; the router keeps its previous shard table on failure
    #[error("Topology error for stream '{stream}': {message}")]
    Topology { stream: String, message: String },

    /// No open shard's hash range contains the record's hash.
    ///
    /// This happens when the shard table is empty or has gaps, usually while a
    /// resharding is in progress.
    #[error("No shard covers hash key {0}")]
    NoDestination(u128),

    /// Invalid client configuration.
    ///
    /// ## Causes
    /// - Required builder fields missing (stream name, topology provider)
    /// - Zero refresh threshold
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An event envelope couldn't be parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Build a `Topology` error from any displayable provider error.
    pub fn topology(stream: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ClientError::Topology {
            stream: stream.into(),
            message: err.to_string(),
        }
    }
}
