//! User Record Data Structure
//!
//! This module defines `UserRecord` - the logical unit a producer hands to the
//! packer and a consumer gets back out of a physical record.
//!
//! ## Structure
//! - **partition_key**: Routes the record to a shard; always present
//! - **explicit_hash_key**: Optional decimal 128-bit hash overriding the partition key hash
//! - **data**: The payload (arbitrary bytes)
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for the payload so records can be sliced out of a decoded
//!   body without copying
//! - Keys are `String`: the wire format stores them as protobuf `string` fields
//! - The payload type is fixed at the API boundary; callers encode text themselves
//!
//! ## Example
//! ```ignore
//! let record = UserRecord::new("user123", None, Bytes::from(r#"{"action": "click"}"#));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single logical record before aggregation or after deaggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Partition key
    pub partition_key: String,

    /// Optional explicit hash key (decimal string)
    pub explicit_hash_key: Option<String>,

    /// Payload
    pub data: Bytes,
}

impl UserRecord {
    pub fn new(
        partition_key: impl Into<String>,
        explicit_hash_key: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            explicit_hash_key,
            data: data.into(),
        }
    }
}

/// What a producer sends for one finished physical record.
///
/// `partition_key` and `explicit_hash_key` come from the first user record
/// packed into it; both are `None` for an empty record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContents {
    pub partition_key: Option<String>,
    pub explicit_hash_key: Option<String>,
    pub data: Bytes,
}
