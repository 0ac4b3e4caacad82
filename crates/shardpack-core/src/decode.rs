//! Physical Record Decoder - Reading Aggregated Records Back
//!
//! This module implements the strict decode path: it takes the raw bytes of one
//! physical record and either returns the parsed body or says exactly why the
//! bytes are not a valid aggregated record.
//!
//! ## Validation Process
//! 1. Check the bytes start with the magic prefix (`f3 89 9a c2`)
//! 2. Check there is room for a non-empty body plus the 16-byte MD5 trailer
//! 3. Verify MD5(body) against the trailer (can be switched off)
//! 4. Parse the body as an `AggregatedRecord`
//!
//! Entries are resolved against the key tables lazily, one at a time, so a bad
//! index in entry 7 doesn't prevent entries 0..7 from being read.
//!
//! ## Example
//! ```ignore
//! use shardpack_core::decode::decode_physical;
//!
//! let decoded = decode_physical(raw, true)?;
//! for record in decoded.iter() {
//!     let record = record?;
//!     println!("{} -> {} bytes", record.partition_key, record.data.len());
//! }
//! ```

use bytes::Bytes;
use md5::{Digest, Md5};
use prost::Message;
use shardpack_proto::{AggregatedRecord, Record};

use crate::record::UserRecord;
use crate::{Error, Result, DIGEST_LEN, MAGIC};

/// Cheap prefix check: do these bytes look like an aggregated record?
pub fn has_magic(raw: &[u8]) -> bool {
    raw.starts_with(&MAGIC)
}

/// Validate and parse one physical record.
///
/// # Arguments
///
/// * `raw` - The complete framed record (magic + body + digest)
/// * `verify_digest` - Whether to check the MD5 trailer
///
/// # Errors
///
/// `InvalidMagic`, `Truncated`, `DigestMismatch` or `Decode`. All of them
/// report `true` from [`Error::is_malformed_record`].
pub fn decode_physical(raw: Bytes, verify_digest: bool) -> Result<DecodedRecord> {
    if !has_magic(&raw) {
        return Err(Error::InvalidMagic);
    }

    if raw.len() - MAGIC.len() <= DIGEST_LEN {
        return Err(Error::Truncated(raw.len()));
    }

    let digest_start = raw.len() - DIGEST_LEN;
    let body = raw.slice(MAGIC.len()..digest_start);

    if verify_digest {
        let computed = Md5::digest(&body);
        if computed.as_slice() != &raw[digest_start..] {
            return Err(Error::DigestMismatch);
        }
    }

    let body = AggregatedRecord::decode(body)?;
    Ok(DecodedRecord::from_body(body))
}

/// A parsed aggregated body whose entries haven't been resolved yet.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    body: AggregatedRecord,
}

impl DecodedRecord {
    pub fn from_body(body: AggregatedRecord) -> Self {
        Self { body }
    }

    /// Number of entries in the body.
    pub fn len(&self) -> usize {
        self.body.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.records.is_empty()
    }

    pub fn partition_key_table(&self) -> &[String] {
        &self.body.partition_key_table
    }

    pub fn explicit_hash_key_table(&self) -> &[String] {
        &self.body.explicit_hash_key_table
    }

    /// Raw entries, with key indices unresolved.
    pub fn entries(&self) -> &[Record] {
        &self.body.records
    }

    /// Resolve entry `index` against the key tables.
    ///
    /// Returns `None` past the last entry, and `Err(InvalidKeyIndex)` if the
    /// entry refers to a key that isn't in its table.
    pub fn user_record(&self, index: usize) -> Option<Result<UserRecord>> {
        self.body.records.get(index).map(|entry| self.resolve(entry))
    }

    /// Resolve every entry in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<UserRecord>> + '_ {
        self.body.records.iter().map(|entry| self.resolve(entry))
    }

    /// Resolve every entry, failing on the first bad index.
    pub fn into_user_records(self) -> Result<Vec<UserRecord>> {
        self.iter().collect()
    }

    fn resolve(&self, entry: &Record) -> Result<UserRecord> {
        let partition_key = lookup(
            &self.body.partition_key_table,
            entry.partition_key_index,
            "partition key",
        )?;

        let explicit_hash_key = match entry.explicit_hash_key_index {
            Some(index) => Some(lookup(
                &self.body.explicit_hash_key_table,
                index,
                "explicit hash key",
            )?),
            None => None,
        };

        Ok(UserRecord {
            partition_key: partition_key.to_string(),
            explicit_hash_key: explicit_hash_key.map(str::to_string),
            data: entry.data.clone(),
        })
    }
}

fn lookup<'a>(table: &'a [String], index: u64, name: &'static str) -> Result<&'a str> {
    usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i))
        .map(String::as_str)
        .ok_or(Error::InvalidKeyIndex {
            table: name,
            index,
            len: table.len(),
        })
}
