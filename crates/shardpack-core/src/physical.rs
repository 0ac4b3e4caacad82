//! Physical Record Encoder - Packing User Records into One Aggregated Record
//!
//! This module implements `PhysicalRecord`, which interns keys, appends user
//! records, and tracks the exact serialized size of the result so a packer can
//! tell when the record is full without ever serializing it.
//!
//! ## Wire Layout
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────┬──────────────┐
//! │ magic (4)    │ AggregatedRecord body (protobuf)     │ MD5(body)    │
//! │ f3 89 9a c2  │ pk table, ehk table, records         │ (16 bytes)   │
//! └──────────────┴──────────────────────────────────────┴──────────────┘
//! ```
//!
//! ## Size Prediction
//!
//! Adding a user record grows the body by:
//! - `1 + varint(len(pk)) + len(pk)` if the partition key is new to the table
//! - `1 + varint(len(ehk)) + len(ehk)` if there is an explicit hash key and it is new
//! - `1 + varint(inner) + inner` for the record message itself, where `inner` is
//!   `1 + varint(pk_index)`, plus `1 + varint(ehk_index)` with an explicit hash
//!   key, plus `1 + varint(len(data)) + len(data)`
//!
//! Every `1` is a single-byte protobuf field tag. The running total always equals
//! the prost-encoded body length.
//!
//! ## Thread Safety
//!
//! PhysicalRecord is NOT thread-safe. It is owned by a single accumulator; a
//! completed record is handed to listeners as an independent clone.

use bytes::{BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};
use prost::Message;
use shardpack_proto::{AggregatedRecord, Record};
use tracing::trace;

use crate::decode::DecodedRecord;
use crate::hash_key::{parse_explicit_hash_key, validate_partition_key};
use crate::keys::KeyTable;
use crate::record::{RecordContents, UserRecord};
use crate::{varint, Error, Result, AGGREGATION_OVERHEAD, DIGEST_LEN, MAGIC, MAX_BYTES_PER_RECORD};

/// One aggregated record under construction.
#[derive(Debug, Clone)]
pub struct PhysicalRecord {
    /// Protobuf body built so far
    body: AggregatedRecord,

    /// Interned partition keys (mirrors `body.partition_key_table`)
    partition_keys: KeyTable,

    /// Interned explicit hash keys (mirrors `body.explicit_hash_key_table`)
    explicit_hash_keys: KeyTable,

    /// Exact encoded length of `body`
    body_size: usize,

    /// Partition key of the first user record
    partition_key: Option<String>,

    /// Explicit hash key of the first user record
    explicit_hash_key: Option<String>,

    /// Ceiling on the framed size
    max_size: usize,
}

impl Default for PhysicalRecord {
    fn default() -> Self {
        Self::empty(MAX_BYTES_PER_RECORD)
    }
}

impl PhysicalRecord {
    /// Create an empty record whose framed size may not exceed `max_size`.
    ///
    /// Fails with `InvalidConfiguration` if `max_size` is above the 1 MiB
    /// per-record transport limit or leaves no room past the framing.
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size > MAX_BYTES_PER_RECORD {
            return Err(Error::InvalidConfiguration(format!(
                "max_size {} exceeds maximum value {}",
                max_size, MAX_BYTES_PER_RECORD
            )));
        }
        if max_size <= AGGREGATION_OVERHEAD {
            return Err(Error::InvalidConfiguration(format!(
                "max_size {} leaves no room for records",
                max_size
            )));
        }
        Ok(Self::empty(max_size))
    }

    fn empty(max_size: usize) -> Self {
        Self {
            body: AggregatedRecord::default(),
            partition_keys: KeyTable::new(),
            explicit_hash_keys: KeyTable::new(),
            body_size: 0,
            partition_key: None,
            explicit_hash_key: None,
            max_size,
        }
    }

    /// Framed size in bytes: magic + body + digest.
    pub fn size_bytes(&self) -> usize {
        MAGIC.len() + self.body_size + DIGEST_LEN
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of user records packed so far.
    pub fn len(&self) -> usize {
        self.body.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.records.is_empty()
    }

    /// Partition key for the whole physical record (first user record's key).
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    /// Explicit hash key for the whole physical record (first user record's key).
    pub fn explicit_hash_key(&self) -> Option<&str> {
        self.explicit_hash_key.as_deref()
    }

    /// Bytes the body would grow by if this user record were added now.
    ///
    /// Doesn't touch the key tables.
    pub fn predict_size(
        &self,
        partition_key: &str,
        data_len: usize,
        explicit_hash_key: Option<&str>,
    ) -> usize {
        marginal_size(
            &self.partition_keys,
            &self.explicit_hash_keys,
            partition_key,
            data_len,
            explicit_hash_key,
        )
    }

    /// Add a user record if it fits.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: the record was added
    /// - `Ok(false)`: this physical record is full; nothing changed
    ///
    /// # Errors
    ///
    /// - `OversizedEntry`: the user record wouldn't fit even into an empty
    ///   physical record; nothing changed
    /// - `InvalidPartitionKey` / `InvalidExplicitHashKey`: bad input
    pub fn try_add(
        &mut self,
        partition_key: &str,
        data: Bytes,
        explicit_hash_key: Option<&str>,
    ) -> Result<bool> {
        validate_partition_key(partition_key)?;
        if let Some(ehk) = explicit_hash_key {
            parse_explicit_hash_key(ehk)?;
        }

        let empty = KeyTable::new();
        let standalone = AGGREGATION_OVERHEAD
            + marginal_size(&empty, &empty, partition_key, data.len(), explicit_hash_key);
        if standalone > self.max_size {
            return Err(Error::OversizedEntry {
                partition_key: partition_key.to_string(),
                explicit_hash_key: explicit_hash_key.map(str::to_string),
                size: standalone,
                max: self.max_size,
            });
        }

        let size_of_new_record = self.predict_size(partition_key, data.len(), explicit_hash_key);
        if self.size_bytes() + size_of_new_record > self.max_size {
            trace!(
                record_count = self.len(),
                size_bytes = self.size_bytes(),
                size_of_new_record,
                max_size = self.max_size,
                "Physical record full"
            );
            return Ok(false);
        }

        let (pk_is_new, partition_key_index) = self.partition_keys.insert(partition_key);
        if pk_is_new {
            self.body.partition_key_table.push(partition_key.to_string());
        }

        let explicit_hash_key_index = explicit_hash_key.map(|ehk| {
            let (ehk_is_new, index) = self.explicit_hash_keys.insert(ehk);
            if ehk_is_new {
                self.body.explicit_hash_key_table.push(ehk.to_string());
            }
            index
        });

        self.body.records.push(Record {
            partition_key_index,
            explicit_hash_key_index,
            data,
            tags: Vec::new(),
        });
        self.body_size += size_of_new_record;

        if self.body.records.len() == 1 {
            self.partition_key = Some(partition_key.to_string());
            self.explicit_hash_key = explicit_hash_key.map(str::to_string);
        }

        debug_assert_eq!(self.body.encoded_len(), self.body_size);
        Ok(true)
    }

    /// Serialize to the framed wire format. Has no side effects.
    pub fn to_bytes(&self) -> Bytes {
        let body = self.body.encode_to_vec();
        let digest = Md5::digest(&body);

        let mut out = BytesMut::with_capacity(MAGIC.len() + body.len() + DIGEST_LEN);
        out.put_slice(&MAGIC);
        out.put_slice(&body);
        out.put_slice(&digest);
        out.freeze()
    }

    /// Envelope keys plus framed bytes, ready for a put-record call.
    pub fn contents(&self) -> RecordContents {
        RecordContents {
            partition_key: self.partition_key.clone(),
            explicit_hash_key: self.explicit_hash_key.clone(),
            data: self.to_bytes(),
        }
    }

    /// The user records packed so far, in insertion order.
    pub fn user_records(&self) -> Result<Vec<UserRecord>> {
        DecodedRecord::from_body(self.body.clone()).into_user_records()
    }

    /// Reset to an empty record with the same size ceiling.
    pub fn clear(&mut self) {
        *self = Self::empty(self.max_size);
    }

    /// Move the contents out, leaving an empty record with the same ceiling.
    pub fn take(&mut self) -> PhysicalRecord {
        std::mem::replace(self, Self::empty(self.max_size))
    }
}

/// Body growth for one user record given the current key tables.
fn marginal_size(
    partition_keys: &KeyTable,
    explicit_hash_keys: &KeyTable,
    partition_key: &str,
    data_len: usize,
    explicit_hash_key: Option<&str>,
) -> usize {
    let mut message_size = 0;

    // New entry in the partition key table
    if !partition_keys.contains(partition_key) {
        message_size += length_delimited_len(partition_key.len());
    }

    // New entry in the explicit hash key table
    if let Some(ehk) = explicit_hash_key {
        if !explicit_hash_keys.contains(ehk) {
            message_size += length_delimited_len(ehk.len());
        }
    }

    let mut inner_record_size = 1 + varint::encoded_len(partition_keys.potential_index(partition_key));
    if let Some(ehk) = explicit_hash_key {
        inner_record_size += 1 + varint::encoded_len(explicit_hash_keys.potential_index(ehk));
    }
    inner_record_size += length_delimited_len(data_len);

    message_size + length_delimited_len(inner_record_size)
}

/// Tag byte + varint length prefix + payload.
fn length_delimited_len(len: usize) -> usize {
    1 + varint::encoded_len(len as u64) + len
}
