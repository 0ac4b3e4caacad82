//! Shardpack Core - Aggregated Record Format
//!
//! This crate packs many small user records into one bounded-size physical
//! record and reads them back out. It is byte-compatible with the KPL
//! aggregation format.
//!
//! ## Modules
//! - [`keys`]: `KeyTable`, the interning table behind the partition key and
//!   explicit hash key tables
//! - [`physical`]: `PhysicalRecord`, the encoder with exact size prediction
//! - [`decode`]: strict decoding of framed bytes into user records
//! - [`hash_key`]: key validation and the partition-key-to-hash mapping
//! - [`varint`]: varint sizing used by the size predictor
//!
//! ## Example
//! ```ignore
//! use bytes::Bytes;
//! use shardpack_core::{decode_physical, PhysicalRecord};
//!
//! let mut record = PhysicalRecord::new(1024 * 1024)?;
//! record.try_add("user-1", Bytes::from_static(b"click"), None)?;
//! record.try_add("user-2", Bytes::from_static(b"view"), None)?;
//!
//! let raw = record.to_bytes();
//! let decoded = decode_physical(raw, true)?.into_user_records()?;
//! assert_eq!(decoded.len(), 2);
//! ```

pub mod decode;
pub mod error;
pub mod hash_key;
pub mod keys;
pub mod physical;
pub mod record;
pub mod varint;

pub use decode::{decode_physical, has_magic, DecodedRecord};
pub use error::{Error, Result};
pub use hash_key::{
    explicit_hash_key_for, parse_explicit_hash_key, partition_key_hash, validate_partition_key,
};
pub use keys::KeyTable;
pub use physical::PhysicalRecord;
pub use record::{RecordContents, UserRecord};

/// Prefix of every aggregated record.
pub const MAGIC: [u8; 4] = [0xF3, 0x89, 0x9A, 0xC2];

/// Length of the MD5 trailer.
pub const DIGEST_LEN: usize = 16;

/// Framing bytes around the body (magic + digest).
pub const AGGREGATION_OVERHEAD: usize = MAGIC.len() + DIGEST_LEN;

/// Largest record the stream accepts (1 MiB).
pub const MAX_BYTES_PER_RECORD: usize = 1024 * 1024;

pub const PARTITION_KEY_MIN_LENGTH: usize = 1;
pub const PARTITION_KEY_MAX_LENGTH: usize = 256;
