//! Router - Hash-Range Routing to Per-Shard Accumulators
//!
//! A stream is split into shards, each owning a contiguous range of the 128-bit
//! hash key space. Records that share a physical record must land on the same
//! shard, so the Router keeps one accumulator per shard and sends each user
//! record to the accumulator whose shard covers its hash.
//!
//! ## Routing
//!
//! ```text
//! add(pk, data, ehk?)
//!        │
//!        ├─→ hash = ehk (decimal u128) or MD5(pk) read big-endian
//!        ├─→ every `refresh_threshold` lookups: refresh shard table
//!        ├─→ find shard with start <= hash <= end (numeric comparison)
//!        │
//!        ▼
//! ┌──────────────────────────────────────────┐
//! │  accumulators: HashMap<ShardId, Acc>     │
//! │  "shardId-000000000000" → Accumulator    │
//! │  "shardId-000000000001" → Accumulator    │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Refresh
//!
//! A refresh pages through the topology provider, drops every shard that is a
//! parent of another shard (closed by a split or merge), hands every cached
//! accumulator's contents to the listeners, and starts over with an empty cache.
//! Re-ingesting a record that was rejected for landing on the wrong shard
//! refreshes first and then routes each user record again.
//!
//! ## Thread Safety
//!
//! Router state sits behind a `tokio::sync::Mutex`, and each accumulator behind
//! its own. Locks are always taken state first, then accumulator.
//!
//! ## Example
//! ```ignore
//! use shardpack_client::{ListenerMode, Router};
//!
//! let router = Router::builder()
//!     .stream_name("orders")
//!     .topology_provider(provider)
//!     .listener(Arc::new(|record: Arc<PhysicalRecord>| transmit(record)))
//!     .build()
//!     .await?;
//!
//! router.add("user-1", Bytes::from("click"), None).await?;
//! router.close().await;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardpack_core::{
    parse_explicit_hash_key, partition_key_hash, validate_partition_key, PhysicalRecord,
};
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::accumulator::{Accumulator, ListenerMode, RecordListener};
use crate::config::AggregationConfig;
use crate::error::{ClientError, Result};

/// A shard as reported by the topology provider.
///
/// Hash keys are decimal strings, as the stream service reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub shard_id: String,
    pub parent_shard_id: Option<String>,
    pub adjacent_parent_shard_id: Option<String>,
    pub starting_hash_key: String,
    pub ending_hash_key: String,
}

/// One page of a shard listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardPage {
    pub shards: Vec<ShardInfo>,
    pub has_more: bool,
}

/// Source of stream topology.
///
/// Implementations wrap the stream service's shard listing call. The Router
/// pages through it by passing the last shard id it received as
/// `exclusive_start_shard_id`.
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn list_shards(
        &self,
        stream_name: &str,
        exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage>;
}

/// An open shard and its hash key range (inclusive on both ends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub shard_id: String,
    pub starting_hash_key: u128,
    pub ending_hash_key: u128,
}

impl ShardDescriptor {
    pub fn contains(&self, hash: u128) -> bool {
        self.starting_hash_key <= hash && hash <= self.ending_hash_key
    }
}

/// Snapshot of what the Router is holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub shard_count: usize,
    pub accumulator_count: usize,
    pub buffered_records: usize,
    pub buffered_bytes: usize,
    pub access_count: u64,
}

struct RouterState {
    /// Open (leaf) shards
    shards: Vec<ShardDescriptor>,

    /// Accumulator per shard id, created on first use
    accumulators: HashMap<String, Arc<Mutex<Accumulator>>>,

    /// Accumulator lookups since the last refresh
    access_count: u64,

    /// Wired into every accumulator
    listeners: Vec<(Arc<dyn RecordListener>, ListenerMode)>,
}

/// Routes user records to per-shard accumulators.
pub struct Router {
    stream_name: String,
    provider: Arc<dyn TopologyProvider>,
    config: AggregationConfig,
    state: Mutex<RouterState>,
    tasks: TaskTracker,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Shard that should receive this record.
    ///
    /// Refreshes the shard table first if `refresh_threshold` lookups have
    /// happened since the last refresh.
    ///
    /// # Errors
    ///
    /// - `Core(InvalidPartitionKey | InvalidExplicitHashKey)`
    /// - `Topology` if a due refresh fails
    /// - `NoDestination` if no open shard covers the hash
    pub async fn resolve_destination(
        &self,
        partition_key: &str,
        explicit_hash_key: Option<&str>,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        self.resolve_locked(&mut state, partition_key, explicit_hash_key)
            .await
    }

    /// Accumulator for the shard that should receive this record.
    ///
    /// Creates it (with every registered listener) on first use. Counts as
    /// one lookup towards the refresh threshold.
    ///
    /// An accumulator obtained here is retired by the next refresh. Prefer
    /// [`add`](Self::add), which appends under the router lock.
    pub async fn get_accumulator(
        &self,
        partition_key: &str,
        explicit_hash_key: Option<&str>,
    ) -> Result<Arc<Mutex<Accumulator>>> {
        let mut state = self.state.lock().await;
        self.accumulator_locked(&mut state, partition_key, explicit_hash_key)
            .await
    }

    /// Route and add a user record.
    ///
    /// # Returns
    ///
    /// The completed physical record if this add filled the shard's
    /// accumulator (listeners have already seen it), `None` otherwise.
    pub async fn add(
        &self,
        partition_key: &str,
        data: impl Into<Bytes>,
        explicit_hash_key: Option<&str>,
    ) -> Result<Option<PhysicalRecord>> {
        let mut state = self.state.lock().await;
        let accumulator = self
            .accumulator_locked(&mut state, partition_key, explicit_hash_key)
            .await?;
        let mut accumulator = accumulator.lock().await;
        accumulator.add(partition_key, data, explicit_hash_key)
    }

    /// Reload the shard table.
    ///
    /// Every cached accumulator is flushed to the listeners and discarded.
    /// If the provider fails, the previous table and cache are kept.
    pub async fn refresh(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Route every user record of `record` again against a fresh shard table.
    ///
    /// Used when the stream rejects a physical record because its shard was
    /// split or merged.
    ///
    /// # Returns
    ///
    /// Physical records completed while re-adding.
    pub async fn reingest(&self, record: &PhysicalRecord) -> Result<Vec<PhysicalRecord>> {
        let user_records = record.user_records()?;
        self.refresh().await?;

        let mut completed = Vec::new();
        for user_record in user_records {
            if let Some(full) = self
                .add(
                    &user_record.partition_key,
                    user_record.data,
                    user_record.explicit_hash_key.as_deref(),
                )
                .await?
            {
                completed.push(full);
            }
        }

        debug!(
            record_count = record.len(),
            completed = completed.len(),
            "Re-ingested physical record"
        );
        Ok(completed)
    }

    /// Register a listener on every current and future accumulator.
    pub async fn on_record_complete(&self, listener: Arc<dyn RecordListener>, mode: ListenerMode) {
        let mut state = self.state.lock().await;
        for accumulator in state.accumulators.values() {
            accumulator
                .lock()
                .await
                .register_listener(Arc::clone(&listener), mode);
        }
        state.listeners.push((listener, mode));
    }

    /// Take the contents of every accumulator. Listeners are not called.
    pub async fn flush_all(&self) -> Vec<PhysicalRecord> {
        let state = self.state.lock().await;
        let mut flushed = Vec::new();
        for accumulator in state.accumulators.values() {
            if let Some(record) = accumulator.lock().await.flush() {
                flushed.push(record);
            }
        }
        debug!(record_count = flushed.len(), "Flushed all accumulators");
        flushed
    }

    /// Current open shards.
    pub async fn shards(&self) -> Vec<ShardDescriptor> {
        self.state.lock().await.shards.clone()
    }

    pub async fn stats(&self) -> RouterStats {
        let state = self.state.lock().await;
        let mut stats = RouterStats {
            shard_count: state.shards.len(),
            accumulator_count: state.accumulators.len(),
            access_count: state.access_count,
            ..Default::default()
        };
        for accumulator in state.accumulators.values() {
            let accumulator = accumulator.lock().await;
            stats.buffered_records += accumulator.len();
            if !accumulator.is_empty() {
                stats.buffered_bytes += accumulator.size_bytes();
            }
        }
        stats
    }

    /// Flush every accumulator to the listeners and wait for spawned listeners.
    pub async fn close(&self) {
        {
            let state = self.state.lock().await;
            for accumulator in state.accumulators.values() {
                accumulator.lock().await.flush_to_listeners();
            }
        }

        self.tasks.close();
        self.tasks.wait().await;
        info!(stream = %self.stream_name, "Router closed");
    }

    async fn resolve_locked(
        &self,
        state: &mut RouterState,
        partition_key: &str,
        explicit_hash_key: Option<&str>,
    ) -> Result<String> {
        validate_partition_key(partition_key)?;
        let hash = match explicit_hash_key {
            Some(ehk) => parse_explicit_hash_key(ehk)?,
            None => partition_key_hash(partition_key),
        };

        if state.access_count >= self.config.refresh_threshold {
            self.refresh_locked(state).await?;
        }

        state
            .shards
            .iter()
            .find(|shard| shard.contains(hash))
            .map(|shard| shard.shard_id.clone())
            .ok_or(ClientError::NoDestination(hash))
    }

    async fn accumulator_locked(
        &self,
        state: &mut RouterState,
        partition_key: &str,
        explicit_hash_key: Option<&str>,
    ) -> Result<Arc<Mutex<Accumulator>>> {
        let shard_id = self
            .resolve_locked(state, partition_key, explicit_hash_key)
            .await?;

        let accumulator = match state.accumulators.get(&shard_id) {
            Some(accumulator) => Arc::clone(accumulator),
            None => {
                let mut accumulator =
                    Accumulator::with_destination(shard_id.clone(), self.config.max_record_size)?
                        .with_tracker(self.tasks.clone());
                for (listener, mode) in &state.listeners {
                    accumulator.register_listener(Arc::clone(listener), *mode);
                }
                debug!(shard_id = %shard_id, "Created accumulator");

                let accumulator = Arc::new(Mutex::new(accumulator));
                state.accumulators.insert(shard_id, Arc::clone(&accumulator));
                accumulator
            }
        };

        state.access_count += 1;
        Ok(accumulator)
    }

    async fn refresh_locked(&self, state: &mut RouterState) -> Result<()> {
        let listed = self.list_all_shards().await?;

        let parents: HashSet<&str> = listed
            .iter()
            .flat_map(|shard| {
                [
                    shard.parent_shard_id.as_deref(),
                    shard.adjacent_parent_shard_id.as_deref(),
                ]
            })
            .flatten()
            .collect();

        let mut shards = Vec::new();
        for shard in listed.iter().filter(|s| !parents.contains(s.shard_id.as_str())) {
            shards.push(ShardDescriptor {
                shard_id: shard.shard_id.clone(),
                starting_hash_key: parse_hash_key(&self.stream_name, &shard.starting_hash_key)?,
                ending_hash_key: parse_hash_key(&self.stream_name, &shard.ending_hash_key)?,
            });
        }

        let mut flushed = 0;
        for (_, accumulator) in state.accumulators.drain() {
            if accumulator.lock().await.flush_to_listeners().is_some() {
                flushed += 1;
            }
        }

        info!(
            stream = %self.stream_name,
            listed = listed.len(),
            open = shards.len(),
            flushed,
            "Refreshed shard table"
        );

        state.shards = shards;
        state.access_count = 0;
        Ok(())
    }

    async fn list_all_shards(&self) -> Result<Vec<ShardInfo>> {
        let mut shards: Vec<ShardInfo> = Vec::new();
        loop {
            let start = shards.last().map(|s| s.shard_id.clone());
            let page = self
                .provider
                .list_shards(&self.stream_name, start.as_deref())
                .await?;

            let page_len = page.shards.len();
            shards.extend(page.shards);

            if !page.has_more {
                return Ok(shards);
            }
            if page_len == 0 {
                return Err(ClientError::topology(
                    &self.stream_name,
                    "provider reported more shards but returned an empty page",
                ));
            }
        }
    }
}

fn parse_hash_key(stream_name: &str, value: &str) -> Result<u128> {
    parse_explicit_hash_key(value).map_err(|e| ClientError::topology(stream_name, e))
}

/// Builder for configuring and creating a `Router`.
///
/// # Required Fields
///
/// - `stream_name`
/// - `topology_provider`
///
/// # Default Values
///
/// - `max_record_size`: 1 MiB
/// - `refresh_threshold`: 1000 lookups
/// - `listener_mode`: inline
pub struct RouterBuilder {
    stream_name: Option<String>,
    provider: Option<Arc<dyn TopologyProvider>>,
    config: AggregationConfig,
    listeners: Vec<(Arc<dyn RecordListener>, Option<ListenerMode>)>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            stream_name: None,
            provider: None,
            config: AggregationConfig::default(),
            listeners: Vec::new(),
        }
    }

    /// Set the stream to route for (required).
    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = Some(name.into());
        self
    }

    /// Set the topology provider (required).
    pub fn topology_provider(mut self, provider: Arc<dyn TopologyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: AggregationConfig) -> Self {
        self.config = config;
        self
    }

    /// Physical record ceiling in bytes.
    pub fn max_record_size(mut self, size: usize) -> Self {
        self.config.max_record_size = size;
        self
    }

    /// Lookups between shard table refreshes.
    pub fn refresh_threshold(mut self, count: u64) -> Self {
        self.config.refresh_threshold = count;
        self
    }

    /// Default mode for listeners added with [`listener`](Self::listener).
    pub fn listener_mode(mut self, mode: ListenerMode) -> Self {
        self.config.listener_mode = mode;
        self
    }

    /// Add a listener that runs in the configured `listener_mode`.
    pub fn listener(mut self, listener: Arc<dyn RecordListener>) -> Self {
        self.listeners.push((listener, None));
        self
    }

    /// Add a listener with an explicit mode.
    pub fn listener_with_mode(
        mut self,
        listener: Arc<dyn RecordListener>,
        mode: ListenerMode,
    ) -> Self {
        self.listeners.push((listener, Some(mode)));
        self
    }

    /// Build the Router and load the initial shard table.
    pub async fn build(self) -> Result<Router> {
        let stream_name = self
            .stream_name
            .ok_or_else(|| ClientError::ConfigError("stream_name is required".to_string()))?;
        let provider = self
            .provider
            .ok_or_else(|| ClientError::ConfigError("topology_provider is required".to_string()))?;
        self.config.validate()?;

        let default_mode = self.config.listener_mode;
        let listeners = self
            .listeners
            .into_iter()
            .map(|(listener, mode)| (listener, mode.unwrap_or(default_mode)))
            .collect();

        let router = Router {
            stream_name,
            provider,
            config: self.config,
            state: Mutex::new(RouterState {
                shards: Vec::new(),
                accumulators: HashMap::new(),
                access_count: 0,
                listeners,
            }),
            tasks: TaskTracker::new(),
        };

        router.refresh().await?;
        Ok(router)
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
