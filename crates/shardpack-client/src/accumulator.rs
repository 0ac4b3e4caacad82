//! Accumulator - Packing Policy and Completion Listeners
//!
//! An `Accumulator` owns one physical record under construction. Callers keep
//! adding user records; when one doesn't fit, the accumulator hands the full
//! physical record to every registered listener, starts a fresh one, and puts
//! the new user record into it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  add(...)    │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  PhysicalRecord (current)    │
//! │  - try_add() -> fits?        │
//! └──────┬───────────────────────┘
//!        │ full
//!        ├─→ snapshot current record
//!        ├─→ notify listeners (inline or spawned)
//!        ├─→ clear, re-add the user record
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  returned to caller as       │
//! │  Some(PhysicalRecord)        │
//! └──────────────────────────────┘
//! ```
//!
//! ## Listener Dispatch
//!
//! - `ListenerMode::Inline`: called on the caller's thread before `add()`
//!   returns. A panicking listener is caught and logged.
//! - `ListenerMode::Spawned`: run on tokio's blocking pool, tracked by a
//!   `TaskTracker` so shutdown can wait for it. Without a tokio runtime the
//!   listener runs inline and a warning is logged.
//!
//! Listener outcomes never reach `add()`.
//!
//! ## Thread Safety
//!
//! Accumulator is NOT thread-safe. The Router wraps each one in
//! `Arc<tokio::sync::Mutex>`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardpack_core::PhysicalRecord;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace, warn};

use crate::error::Result;

/// Callback invoked with every completed physical record.
///
/// Implemented for any `Fn(Arc<PhysicalRecord>) + Send + Sync`.
///
/// # Examples
///
/// ```ignore
/// let listener: Arc<dyn RecordListener> = Arc::new(|record: Arc<PhysicalRecord>| {
///     println!("{} user records ready", record.len());
/// });
/// accumulator.register_listener(listener, ListenerMode::Inline);
/// ```
pub trait RecordListener: Send + Sync + 'static {
    fn on_record_complete(&self, record: Arc<PhysicalRecord>);
}

impl<F> RecordListener for F
where
    F: Fn(Arc<PhysicalRecord>) + Send + Sync + 'static,
{
    fn on_record_complete(&self, record: Arc<PhysicalRecord>) {
        self(record)
    }
}

/// Where a listener runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerMode {
    /// On the thread calling `add()`
    #[default]
    Inline,
    /// On a tracked task
    Spawned,
}

/// Fills one physical record at a time and reports each full one.
pub struct Accumulator {
    /// Physical record being filled
    current: PhysicalRecord,

    /// Shard this accumulator feeds, when owned by a Router
    destination: Option<String>,

    /// Registered listeners, in registration order
    listeners: Vec<(Arc<dyn RecordListener>, ListenerMode)>,

    /// Tracks spawned listener runs
    tasks: TaskTracker,
}

impl Accumulator {
    /// Create an accumulator whose physical records never exceed `max_size` bytes.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `max_size` is above 1 MiB or no larger than
    /// the 20 bytes of framing.
    pub fn new(max_size: usize) -> Result<Self> {
        Ok(Self {
            current: PhysicalRecord::new(max_size)?,
            destination: None,
            listeners: Vec::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Create an accumulator that feeds a specific shard.
    pub fn with_destination(shard_id: impl Into<String>, max_size: usize) -> Result<Self> {
        let mut accumulator = Self::new(max_size)?;
        accumulator.destination = Some(shard_id.into());
        Ok(accumulator)
    }

    /// Share a task tracker with other accumulators so they can be awaited together.
    pub(crate) fn with_tracker(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }

    /// Add a user record.
    ///
    /// # Arguments
    ///
    /// * `partition_key` - 1 to 256 characters
    /// * `data` - Payload
    /// * `explicit_hash_key` - Optional decimal 128-bit hash key
    ///
    /// # Returns
    ///
    /// - `None` if the record went into the current physical record
    /// - `Some(full)` if the current physical record was full. Listeners have
    ///   already been notified with `full`, and the new user record is the
    ///   first entry of the next physical record.
    ///
    /// # Errors
    ///
    /// - `OversizedEntry` if the record can't fit even an empty physical
    ///   record. Nothing changes and no listener is called.
    /// - `InvalidPartitionKey` / `InvalidExplicitHashKey`
    pub fn add(
        &mut self,
        partition_key: &str,
        data: impl Into<Bytes>,
        explicit_hash_key: Option<&str>,
    ) -> Result<Option<PhysicalRecord>> {
        let data = data.into();

        if self.current.try_add(partition_key, data.clone(), explicit_hash_key)? {
            trace!(
                record_count = self.current.len(),
                size_bytes = self.current.size_bytes(),
                "Appended user record"
            );
            return Ok(None);
        }

        let completed = self.current.take();
        debug!(
            destination = self.destination.as_deref().unwrap_or("-"),
            record_count = completed.len(),
            size_bytes = completed.size_bytes(),
            "Physical record full"
        );
        self.notify(&completed);

        let added = self.current.try_add(partition_key, data, explicit_hash_key)?;
        debug_assert!(added, "user record rejected by an empty physical record");

        Ok(Some(completed))
    }

    /// Take the current physical record, leaving an empty one.
    ///
    /// Returns `None` if nothing has been added. Listeners are not called.
    pub fn flush(&mut self) -> Option<PhysicalRecord> {
        if self.current.is_empty() {
            return None;
        }

        let flushed = self.current.take();
        debug!(
            destination = self.destination.as_deref().unwrap_or("-"),
            record_count = flushed.len(),
            "Flushed accumulator"
        );
        Some(flushed)
    }

    /// Flush and hand the result to every listener.
    ///
    /// Does nothing if the accumulator is empty.
    pub fn flush_to_listeners(&mut self) -> Option<PhysicalRecord> {
        let flushed = self.flush()?;
        self.notify(&flushed);
        Some(flushed)
    }

    /// Register a listener for completed physical records.
    pub fn register_listener(&mut self, listener: Arc<dyn RecordListener>, mode: ListenerMode) {
        self.listeners.push((listener, mode));
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Wait until every spawned listener run has finished.
    pub async fn wait_for_listeners(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// User records in the current physical record.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Framed size of the current physical record.
    pub fn size_bytes(&self) -> usize {
        self.current.size_bytes()
    }

    pub fn max_size(&self) -> usize {
        self.current.max_size()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// The physical record being filled.
    pub fn current(&self) -> &PhysicalRecord {
        &self.current
    }

    fn notify(&self, record: &PhysicalRecord) {
        if self.listeners.is_empty() {
            return;
        }

        let shared = Arc::new(record.clone());
        for (listener, mode) in &self.listeners {
            match mode {
                ListenerMode::Inline => {
                    invoke(listener.as_ref(), Arc::clone(&shared), self.destination.as_deref());
                }
                ListenerMode::Spawned => match Handle::try_current() {
                    Ok(handle) => {
                        let listener = Arc::clone(listener);
                        let record = Arc::clone(&shared);
                        let destination = self.destination.clone();
                        self.tasks.spawn_blocking_on(
                            move || invoke(listener.as_ref(), record, destination.as_deref()),
                            &handle,
                        );
                    }
                    Err(_) => {
                        warn!(
                            destination = self.destination.as_deref().unwrap_or("-"),
                            "No tokio runtime, running spawned listener inline"
                        );
                        invoke(listener.as_ref(), Arc::clone(&shared), self.destination.as_deref());
                    }
                },
            }
        }
    }
}

impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator")
            .field("destination", &self.destination)
            .field("record_count", &self.current.len())
            .field("size_bytes", &self.current.size_bytes())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn invoke(listener: &dyn RecordListener, record: Arc<PhysicalRecord>, destination: Option<&str>) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_record_complete(record))) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(
            destination = destination.unwrap_or("-"),
            panic = %message,
            "Record listener panicked"
        );
    }
}
