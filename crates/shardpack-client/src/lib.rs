//! Shardpack Client - Aggregating Producer and Deaggregating Consumer APIs
//!
//! This crate sits on top of `shardpack-core` and provides the pieces a
//! stream producer and consumer need: shard-aware routing of user records into
//! per-shard accumulators, batching finished physical records for multi-record
//! put calls, and expanding aggregated records back into user records on the
//! consuming side.
//!
//! # Examples
//!
//! ## Producer
//!
//! ```ignore
//! use shardpack_client::{PutRecordsBatch, Router};
//!
//! let router = Router::builder()
//!     .stream_name("orders")
//!     .topology_provider(provider)
//!     .build()
//!     .await?;
//!
//! if let Some(full) = router.add("user123", Bytes::from("order data"), None).await? {
//!     let mut batch = PutRecordsBatch::new();
//!     batch.try_push(&full);
//!     put_records(batch.drain()).await?;
//! }
//! ```
//!
//! ## Consumer
//!
//! ```ignore
//! use shardpack_client::{deaggregate_all, parse_records};
//!
//! let records = deaggregate_all(parse_records(&event_json)?);
//! for record in records {
//!     println!("{}: {:?}", record.kinesis.partition_key, record.kinesis.decode_data()?);
//! }
//! ```

pub mod accumulator;
pub mod batch;
pub mod config;
pub mod deaggregate;
pub mod envelope;
pub mod error;
pub mod router;

pub use accumulator::{Accumulator, ListenerMode, RecordListener};
pub use batch::{
    PutRecordsBatch, PutRecordsEntry, MAX_BYTES_PER_REQUEST, MAX_RECORDS_PER_REQUEST,
};
pub use config::AggregationConfig;
pub use deaggregate::{deaggregate_all, DeaggregateIter, Deaggregator, DeaggregatorConfig};
pub use envelope::{
    parse_records, AnalyticsRecord, EventRecord, FirehoseRecord, InboundRecord, KinesisData,
    LegacyMetadata, LEGACY_SCHEMA_VERSION,
};
pub use error::{ClientError, Result};
pub use router::{
    Router, RouterBuilder, RouterStats, ShardDescriptor, ShardInfo, ShardPage, TopologyProvider,
};
