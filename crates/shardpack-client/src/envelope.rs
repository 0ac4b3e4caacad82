//! Event Envelopes
//!
//! Records reach a consumer wrapped in a JSON envelope. The payload sits base64
//! encoded in `kinesis.data`, next to the sequence number, partition key, and
//! whatever other metadata the delivering service attached.
//!
//! ## Accepted Shapes
//!
//! ```text
//! Stream event (canonical)        Analytics preprocessor         Firehose transformer
//! {                               {                              {
//!   "eventSource": "...",           "recordId": "...",             "recordId": "...",
//!   "kinesis": {                    "data": "<base64>",            "data": "<base64>",
//!     "sequenceNumber": "...",      "kinesisStreamRecordMetadata": "kinesisRecordMetadata": {
//!     "partitionKey": "...",          { sequenceNumber,              sequenceNumber,
//!     "data": "<base64>",               partitionKey,                partitionKey,
//!     ...                               approximateArrivalTimestamp, approximateArrivalTimestamp,
//!   }                                   shardId }                    shardId }
//! }                               }                              }
//! ```
//!
//! The two legacy shapes are normalized into the canonical one with schema
//! version `"1.0"`. Unknown fields are kept and written back out unchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::Result;

/// Schema version assumed for records that arrive without one.
pub const LEGACY_SCHEMA_VERSION: &str = "1.0";

/// A stream record in the canonical envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kinesis: KinesisData,

    /// Everything outside `kinesis` (event source, region, ARNs, ...)
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// The `kinesis` object of a canonical envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinesis_schema_version: Option<String>,

    pub sequence_number: String,

    /// Position inside an aggregated record; set on deaggregated records only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sequence_number: Option<u64>,

    pub partition_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_hash_key: Option<String>,

    /// Set to `true` on records produced by deaggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_arrival_timestamp: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    /// Base64 payload
    pub data: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KinesisData {
    /// Decode the base64 payload.
    pub fn decode_data(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Stream metadata carried by the legacy shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMetadata {
    pub sequence_number: String,
    pub partition_key: String,
    #[serde(default)]
    pub approximate_arrival_timestamp: Option<Number>,
    #[serde(default)]
    pub shard_id: Option<String>,
}

/// Record handed to an analytics preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    pub record_id: String,
    pub data: String,
    pub kinesis_stream_record_metadata: LegacyMetadata,
}

/// Record handed to a Firehose transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseRecord {
    pub record_id: String,
    pub data: String,
    pub kinesis_record_metadata: LegacyMetadata,
}

/// Any envelope shape the deaggregator accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundRecord {
    Event(EventRecord),
    Analytics(AnalyticsRecord),
    Firehose(FirehoseRecord),
}

impl InboundRecord {
    /// Convert to the canonical envelope.
    pub fn normalize(self) -> EventRecord {
        match self {
            InboundRecord::Event(record) => record,
            InboundRecord::Analytics(record) => {
                from_legacy(record.record_id, record.data, record.kinesis_stream_record_metadata)
            }
            InboundRecord::Firehose(record) => {
                from_legacy(record.record_id, record.data, record.kinesis_record_metadata)
            }
        }
    }
}

impl From<EventRecord> for InboundRecord {
    fn from(record: EventRecord) -> Self {
        InboundRecord::Event(record)
    }
}

fn from_legacy(record_id: String, data: String, metadata: LegacyMetadata) -> EventRecord {
    EventRecord {
        kinesis: KinesisData {
            kinesis_schema_version: Some(LEGACY_SCHEMA_VERSION.to_string()),
            sequence_number: metadata.sequence_number,
            sub_sequence_number: None,
            partition_key: metadata.partition_key,
            explicit_hash_key: None,
            aggregated: None,
            approximate_arrival_timestamp: metadata.approximate_arrival_timestamp,
            shard_id: metadata.shard_id,
            record_id: Some(record_id),
            data,
            extra: Map::new(),
        },
        metadata: Map::new(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventPayload {
    Batch {
        #[serde(rename = "Records", alias = "records")]
        records: Vec<InboundRecord>,
    },
    List(Vec<InboundRecord>),
    Single(Box<InboundRecord>),
}

/// Parse the records out of an event document.
///
/// Accepts a whole event (`{"Records": [...]}` or Firehose's
/// `{"records": [...]}`), a bare array, or a single record.
///
/// # Errors
///
/// `Serialization` if the document matches none of these.
pub fn parse_records(json: &str) -> Result<Vec<InboundRecord>> {
    let payload: EventPayload = serde_json::from_str(json)?;
    Ok(match payload {
        EventPayload::Batch { records } | EventPayload::List(records) => records,
        EventPayload::Single(record) => vec![*record],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream_event() -> Value {
        json!({
            "eventSource": "aws:kinesis",
            "eventID": "shardId-000000000000:4954",
            "awsRegion": "eu-west-1",
            "kinesis": {
                "kinesisSchemaVersion": "1.0",
                "partitionKey": "pk",
                "sequenceNumber": "4954",
                "data": "aGVsbG8=",
                "approximateArrivalTimestamp": 1545084650.987
            }
        })
    }

    #[test]
    fn test_canonical_roundtrip_keeps_unknown_fields() {
        let value = stream_event();
        let record: InboundRecord = serde_json::from_value(value.clone()).unwrap();
        let event = record.normalize();

        assert_eq!(event.kinesis.partition_key, "pk");
        assert_eq!(event.kinesis.decode_data().unwrap(), b"hello");
        assert_eq!(event.metadata["awsRegion"], "eu-west-1");
        assert_eq!(serde_json::to_value(&event).unwrap(), value);
    }

    #[test]
    fn test_analytics_shape_normalizes() {
        let record: InboundRecord = serde_json::from_value(json!({
            "recordId": "49546986683135544286507457936321625675700192471156785154",
            "data": "aGVsbG8=",
            "kinesisStreamRecordMetadata": {
                "sequenceNumber": "4954",
                "partitionKey": "pk",
                "approximateArrivalTimestamp": 1520280173,
                "shardId": "shardId-000000000003"
            }
        }))
        .unwrap();
        assert!(matches!(record, InboundRecord::Analytics(_)));

        let event = record.normalize();
        assert_eq!(event.kinesis.kinesis_schema_version.as_deref(), Some("1.0"));
        assert_eq!(event.kinesis.sequence_number, "4954");
        assert_eq!(event.kinesis.shard_id.as_deref(), Some("shardId-000000000003"));
        assert_eq!(
            event.kinesis.record_id.as_deref(),
            Some("49546986683135544286507457936321625675700192471156785154")
        );
        assert_eq!(
            event.kinesis.approximate_arrival_timestamp,
            Some(Number::from(1520280173u64))
        );
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_firehose_shape_normalizes() {
        let record: InboundRecord = serde_json::from_value(json!({
            "recordId": "r-1",
            "approximateArrivalTimestamp": 1520280173000u64,
            "data": "aGVsbG8=",
            "kinesisRecordMetadata": {
                "sequenceNumber": "4954",
                "partitionKey": "pk",
                "approximateArrivalTimestamp": 1520280173000u64,
                "shardId": "shardId-000000000001"
            }
        }))
        .unwrap();
        assert!(matches!(record, InboundRecord::Firehose(_)));

        let event = record.normalize();
        assert_eq!(event.kinesis.partition_key, "pk");
        assert_eq!(event.kinesis.record_id.as_deref(), Some("r-1"));
        assert_eq!(event.kinesis.data, "aGVsbG8=");
    }

    #[test]
    fn test_parse_records_accepts_event_list_and_single() {
        let single = stream_event();
        let event = json!({ "Records": [single.clone(), single.clone()] });
        let firehose = json!({
            "invocationId": "inv",
            "records": [{
                "recordId": "r-1",
                "data": "aGVsbG8=",
                "kinesisRecordMetadata": { "sequenceNumber": "1", "partitionKey": "pk" }
            }]
        });

        assert_eq!(parse_records(&event.to_string()).unwrap().len(), 2);
        assert_eq!(parse_records(&firehose.to_string()).unwrap().len(), 1);
        assert_eq!(parse_records(&json!([single.clone()]).to_string()).unwrap().len(), 1);
        assert_eq!(parse_records(&single.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_records_rejects_unknown_shape() {
        let err = parse_records(r#"{"foo": 1}"#).unwrap_err();
        assert!(matches!(err, crate::ClientError::Serialization(_)));
    }
}
