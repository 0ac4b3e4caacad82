//! Error Types for Shardpack
//!
//! This module defines all error types that can occur while building or reading
//! aggregated physical records.
//!
//! ## Error Categories
//!
//! ### Encoding Errors
//! - `OversizedEntry`: A single user record can never fit in a physical record,
//!   not even an empty one. The caller must reject or split the input.
//! - `InvalidConfiguration`: The requested size ceiling exceeds the transport limit
//!   or is no larger than the framing overhead.
//!
//! ### Input Validation Errors
//! - `InvalidPartitionKey`: Empty or longer than 256 characters
//! - `InvalidExplicitHashKey`: Not a decimal integer in `0..=2^128-1`
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: Bytes don't start with the aggregation magic (`f3 89 9a c2`)
//! - `Truncated`: Too short to hold a body and an MD5 trailer
//! - `DigestMismatch`: MD5 of the body doesn't match the trailer
//! - `Decode`: The body isn't a valid `AggregatedRecord` message
//! - `InvalidKeyIndex`: An entry points past the end of a key table
//!
//! ## Usage
//! All fallible functions return `Result<T>`, aliased to `Result<T, Error>`,
//! so errors propagate with `?`.
//!
//! ```ignore
//! use shardpack_core::{Error, PhysicalRecord, Result};
//!
//! fn pack(record: &mut PhysicalRecord, key: &str, data: Bytes) -> Result<bool> {
//!     match record.try_add(key, data, None) {
//!         Err(Error::OversizedEntry { size, max, .. }) => {
//!             eprintln!("record of {} bytes can never fit into {}", size, max);
//!             Ok(false)
//!         }
//!         other => other,
//!     }
//! }
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "Input record (PK={partition_key}, EHK={explicit_hash_key:?}, SizeBytes={size}) \
         too big to fit inside a single aggregated record of {max} bytes"
    )]
    OversizedEntry {
        partition_key: String,
        explicit_hash_key: Option<String>,
        /// Framed size of a physical record holding only this entry
        size: usize,
        max: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid partition key: {0}")]
    InvalidPartitionKey(String),

    #[error("Invalid explicit hash key: {0}")]
    InvalidExplicitHashKey(String),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Truncated record: {0} bytes")]
    Truncated(usize),

    #[error("MD5 digest mismatch")]
    DigestMismatch,

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid {table} index {index} (table has {len} entries)")]
    InvalidKeyIndex {
        table: &'static str,
        index: u64,
        len: usize,
    },
}

impl Error {
    /// Whether this error means the bytes are not a well-formed aggregated record.
    ///
    /// Readers treat these as plain, non-aggregated data instead of failing.
    pub fn is_malformed_record(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic | Error::Truncated(_) | Error::DigestMismatch | Error::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
