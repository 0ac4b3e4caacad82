//! PutRecords Batch Collection
//!
//! Finished physical records are usually shipped with a multi-record put call,
//! which has its own limits on top of the per-record 1 MiB ceiling. This module
//! collects physical records into request-sized batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  Accumulator / Router    │ emits PhysicalRecord
//! └──────┬───────────────────┘
//!        │ contents()
//!        ▼
//! ┌──────────────────────────────┐
//! │  PutRecordsBatch             │
//! │  - entries: Vec<Entry>       │
//! │  - size_bytes: usize         │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ full at 500 entries
//!        ├─→ full at 5 MiB (data + partition keys)
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  drain() → one put request   │
//! └──────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! PutRecordsBatch is NOT thread-safe. Wrap it in a Mutex to share it between
//! listeners.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardpack_core::{PhysicalRecord, RecordContents};
use tracing::{debug, trace};

/// Most entries a single put request accepts.
pub const MAX_RECORDS_PER_REQUEST: usize = 500;

/// Most bytes (payloads plus partition keys) a single put request accepts.
pub const MAX_BYTES_PER_REQUEST: usize = 5 * 1024 * 1024;

/// One entry of a put request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRecordsEntry {
    pub partition_key: String,
    pub explicit_hash_key: Option<String>,
    pub data: Bytes,
}

impl PutRecordsEntry {
    /// Bytes this entry counts against the request limit.
    pub fn size_bytes(&self) -> usize {
        self.partition_key.len() + self.data.len()
    }
}

impl TryFrom<RecordContents> for PutRecordsEntry {
    type Error = RecordContents;

    /// Fails (returning the input) for an empty record, which has no partition key.
    fn try_from(contents: RecordContents) -> Result<Self, Self::Error> {
        match contents.partition_key {
            Some(partition_key) => Ok(Self {
                partition_key,
                explicit_hash_key: contents.explicit_hash_key,
                data: contents.data,
            }),
            None => Err(contents),
        }
    }
}

/// Buffer of entries for one put request.
///
/// # Examples
///
/// ```ignore
/// let mut batch = PutRecordsBatch::new();
///
/// if !batch.try_push(&physical) {
///     send(batch.drain()).await?;
///     batch.try_push(&physical);
/// }
/// ```
#[derive(Debug)]
pub struct PutRecordsBatch {
    /// Buffered entries
    entries: Vec<PutRecordsEntry>,

    /// Sum of entry sizes
    size_bytes: usize,

    /// Maximum number of entries
    max_records: usize,

    /// Maximum total size in bytes
    max_bytes: usize,
}

impl Default for PutRecordsBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl PutRecordsBatch {
    /// Create a batch with the standard request limits.
    pub fn new() -> Self {
        Self::with_limits(MAX_RECORDS_PER_REQUEST, MAX_BYTES_PER_REQUEST)
    }

    /// Create a batch with custom limits.
    ///
    /// # Arguments
    ///
    /// * `max_records` - Entry count limit
    /// * `max_bytes` - Size limit in bytes
    pub fn with_limits(max_records: usize, max_bytes: usize) -> Self {
        Self {
            entries: Vec::new(),
            size_bytes: 0,
            max_records,
            max_bytes,
        }
    }

    /// Add a finished physical record.
    ///
    /// # Returns
    ///
    /// `true` if it was added (empty records are skipped and count as added),
    /// `false` if the batch is full. A full batch is left unchanged.
    pub fn try_push(&mut self, record: &PhysicalRecord) -> bool {
        match PutRecordsEntry::try_from(record.contents()) {
            Ok(entry) => self.try_push_entry(entry),
            Err(_) => true,
        }
    }

    /// Add a prepared entry. Same semantics as [`try_push`](Self::try_push).
    pub fn try_push_entry(&mut self, entry: PutRecordsEntry) -> bool {
        let entry_size = entry.size_bytes();

        if self.entries.len() >= self.max_records {
            trace!(
                record_count = self.entries.len(),
                max_records = self.max_records,
                "Batch full: record count"
            );
            return false;
        }

        if self.size_bytes + entry_size > self.max_bytes {
            trace!(
                size_bytes = self.size_bytes,
                entry_size,
                max_bytes = self.max_bytes,
                "Batch full: bytes"
            );
            return false;
        }

        self.size_bytes += entry_size;
        self.entries.push(entry);
        trace!(
            record_count = self.entries.len(),
            size_bytes = self.size_bytes,
            "Appended entry to batch"
        );
        true
    }

    /// Take all entries and reset.
    pub fn drain(&mut self) -> Vec<PutRecordsEntry> {
        let entries = std::mem::take(&mut self.entries);
        self.size_bytes = 0;
        debug!(record_count = entries.len(), "Drained put batch");
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, len: usize) -> PutRecordsEntry {
        PutRecordsEntry {
            partition_key: key.to_string(),
            explicit_hash_key: None,
            data: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn test_entry_size() {
        // key (3) + data (5) = 8
        assert_eq!(entry("key", 5).size_bytes(), 8);
    }

    #[test]
    fn test_push_physical_record() {
        let mut record = PhysicalRecord::default();
        record.try_add("pk", Bytes::from_static(b"value"), Some("7")).unwrap();

        let mut batch = PutRecordsBatch::new();
        assert!(batch.try_push(&record));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.size_bytes(), 2 + record.size_bytes());

        let entries = batch.drain();
        assert_eq!(entries[0].partition_key, "pk");
        assert_eq!(entries[0].explicit_hash_key.as_deref(), Some("7"));
        assert_eq!(entries[0].data, record.to_bytes());
        assert!(batch.is_empty());
        assert_eq!(batch.size_bytes(), 0);
    }

    #[test]
    fn test_empty_record_is_skipped() {
        let mut batch = PutRecordsBatch::new();
        assert!(batch.try_push(&PhysicalRecord::default()));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_full_on_count() {
        let mut batch = PutRecordsBatch::with_limits(2, 1024);
        assert!(batch.try_push_entry(entry("a", 1)));
        assert!(batch.try_push_entry(entry("b", 1)));
        assert!(!batch.try_push_entry(entry("c", 1)));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_full_on_bytes() {
        let mut batch = PutRecordsBatch::with_limits(100, 50);
        assert!(batch.try_push_entry(entry("a", 20)));
        assert!(batch.try_push_entry(entry("b", 20)));
        assert!(!batch.try_push_entry(entry("c", 20)));
        assert_eq!(batch.size_bytes(), 42);
    }

    #[test]
    fn test_standard_limits() {
        let mut batch = PutRecordsBatch::new();
        for i in 0..MAX_RECORDS_PER_REQUEST {
            assert!(batch.try_push_entry(entry(&i.to_string(), 1)));
        }
        assert!(!batch.try_push_entry(entry("overflow", 1)));

        batch.drain();
        // Four 1 MiB payloads plus 1-byte keys leave just under 1 MiB free
        for i in 0..4 {
            assert!(batch.try_push_entry(entry(&i.to_string(), 1024 * 1024)));
        }
        assert!(!batch.try_push_entry(entry("x", 1024 * 1024)));
        assert!(batch.try_push_entry(entry("x", 1024 * 1024 - 5)));
        assert_eq!(batch.size_bytes(), MAX_BYTES_PER_REQUEST);
    }
}
