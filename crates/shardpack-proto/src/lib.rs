//! Shardpack Protocol Buffer Definitions
//!
//! This crate contains the message types that make up the body of an aggregated
//! physical record. The layout is the KPL aggregation format, so records produced
//! here can be read by any KPL-compatible consumer and vice versa.
//!
//! ## Schema
//!
//! ```text
//! message AggregatedRecord {
//!     repeated string partition_key_table     = 1;
//!     repeated string explicit_hash_key_table = 2;
//!     repeated Record records                 = 3;
//! }
//!
//! message Tag {
//!     required string key   = 1;
//!     optional string value = 2;
//! }
//!
//! message Record {
//!     required uint64 partition_key_index     = 1;
//!     optional uint64 explicit_hash_key_index = 2;
//!     required bytes  data                    = 3;
//!     repeated Tag    tags                    = 4;
//! }
//! ```
//!
//! The schema is proto2, so `required` scalars are always written (even when
//! zero) and `optional` scalars are omitted when unset. The size predictor in
//! `shardpack-core` relies on exactly this behavior.
//!
//! ## Usage
//!
//! ```ignore
//! use prost::Message;
//! use shardpack_proto::{AggregatedRecord, Record};
//!
//! let body = AggregatedRecord {
//!     partition_key_table: vec!["user-1".to_string()],
//!     explicit_hash_key_table: vec![],
//!     records: vec![Record {
//!         partition_key_index: 0,
//!         explicit_hash_key_index: None,
//!         data: b"hello".to_vec().into(),
//!         tags: vec![],
//!     }],
//! };
//!
//! let bytes = body.encode_to_vec();
//! let parsed = AggregatedRecord::decode(bytes.as_slice())?;
//! ```

/// Body of an aggregated physical record.
///
/// Field order matters: prost writes fields in tag order, so all partition keys
/// come first, then all explicit hash keys, then the user records.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AggregatedRecord {
    #[prost(string, repeated, tag = "1")]
    pub partition_key_table: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,

    #[prost(string, repeated, tag = "2")]
    pub explicit_hash_key_table: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,

    #[prost(message, repeated, tag = "3")]
    pub records: ::prost::alloc::vec::Vec<Record>,
}

/// Free-form key/value tag attached to a user record.
///
/// Never written by the encoder; parsed and ignored on decode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tag {
    #[prost(string, required, tag = "1")]
    pub key: ::prost::alloc::string::String,

    #[prost(string, optional, tag = "2")]
    pub value: ::core::option::Option<::prost::alloc::string::String>,
}

/// A single user record inside an aggregated record.
///
/// Keys are stored as indices into the tables of the enclosing
/// [`AggregatedRecord`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    #[prost(uint64, required, tag = "1")]
    pub partition_key_index: u64,

    #[prost(uint64, optional, tag = "2")]
    pub explicit_hash_key_index: ::core::option::Option<u64>,

    #[prost(bytes = "bytes", required, tag = "3")]
    pub data: ::prost::bytes::Bytes,

    #[prost(message, repeated, tag = "4")]
    pub tags: ::prost::alloc::vec::Vec<Tag>,
}
