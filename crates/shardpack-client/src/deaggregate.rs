//! Deaggregator - Expanding Aggregated Envelopes into User Records
//!
//! This module turns a sequence of inbound envelopes into a sequence of
//! user-record envelopes. Aggregated records expand into one envelope per user
//! record; everything else passes through unchanged.
//!
//! ## What Does the Deaggregator Do?
//!
//! 1. **Normalizes** legacy Analytics/Firehose shapes into the canonical envelope
//! 2. **Decodes** the base64 payload
//! 3. **Validates** magic, length, and MD5 digest, then parses the body
//! 4. **Expands** each entry into a copy of the envelope with its own
//!    partition key, explicit hash key, `subSequenceNumber`, and payload
//!
//! Anything that fails steps 2-3 is not an aggregated record and is emitted
//! as-is (after normalization). A bad key index in step 4 stops that one input
//! with an error diagnostic; the next input is processed normally.
//!
//! ## Memory
//!
//! `Deaggregator::iter` is lazy: it holds the current physical record only, so
//! a large batch can be streamed without materializing every user record.
//!
//! ## Example
//! ```ignore
//! use shardpack_client::{parse_records, Deaggregator};
//!
//! let inputs = parse_records(&event_json)?;
//! for record in Deaggregator::default().iter(inputs) {
//!     let payload = record.kinesis.decode_data()?;
//!     handle(&record.kinesis.partition_key, &payload);
//! }
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardpack_core::{decode_physical, DecodedRecord, UserRecord};
use tracing::{debug, error};

use crate::envelope::{EventRecord, InboundRecord};

/// Deaggregation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeaggregatorConfig {
    /// Check the MD5 trailer before trusting a body (default: true)
    #[serde(default = "default_verify_digest")]
    pub verify_digest: bool,
}

impl Default for DeaggregatorConfig {
    fn default() -> Self {
        Self {
            verify_digest: default_verify_digest(),
        }
    }
}

fn default_verify_digest() -> bool {
    true
}

/// Expands aggregated envelopes.
#[derive(Debug, Clone, Default)]
pub struct Deaggregator {
    config: DeaggregatorConfig,
}

impl Deaggregator {
    pub fn new(config: DeaggregatorConfig) -> Self {
        Self { config }
    }

    /// Lazily expand `inputs`, in order.
    pub fn iter<I>(&self, inputs: I) -> DeaggregateIter<I::IntoIter>
    where
        I: IntoIterator<Item = InboundRecord>,
    {
        DeaggregateIter {
            inputs: inputs.into_iter(),
            current: None,
            config: self.config,
        }
    }

    /// Expand every input into one list.
    pub fn deaggregate_all<I>(&self, inputs: I) -> Vec<EventRecord>
    where
        I: IntoIterator<Item = InboundRecord>,
    {
        self.iter(inputs).collect()
    }
}

/// Expand every input with the default settings.
pub fn deaggregate_all<I>(inputs: I) -> Vec<EventRecord>
where
    I: IntoIterator<Item = InboundRecord>,
{
    Deaggregator::default().deaggregate_all(inputs)
}

/// Iterator returned by [`Deaggregator::iter`].
pub struct DeaggregateIter<I> {
    inputs: I,
    current: Option<Expansion>,
    config: DeaggregatorConfig,
}

/// An aggregated input being expanded.
struct Expansion {
    /// Input envelope with its payload removed
    envelope: EventRecord,
    decoded: DecodedRecord,
    /// Framed bytes, kept for diagnostics
    raw: Bytes,
    next: usize,
}

enum Step {
    Passthrough(EventRecord),
    Expand(Expansion),
}

impl<I> DeaggregateIter<I> {
    fn begin(&self, envelope: EventRecord) -> Step {
        let raw = match envelope.kinesis.decode_data() {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                debug!(
                    sequence_number = %envelope.kinesis.sequence_number,
                    error = %e,
                    "Payload is not base64, passing through"
                );
                return Step::Passthrough(envelope);
            }
        };

        match decode_physical(raw.clone(), self.config.verify_digest) {
            Ok(decoded) => {
                let mut envelope = envelope;
                envelope.kinesis.data = String::new();
                envelope.metadata.remove("data");
                debug!(
                    sequence_number = %envelope.kinesis.sequence_number,
                    record_count = decoded.len(),
                    "Expanding aggregated record"
                );
                Step::Expand(Expansion {
                    envelope,
                    decoded,
                    raw,
                    next: 0,
                })
            }
            Err(e) => {
                debug!(
                    sequence_number = %envelope.kinesis.sequence_number,
                    reason = %e,
                    "Not an aggregated record, passing through"
                );
                Step::Passthrough(envelope)
            }
        }
    }
}

impl<I> Iterator for DeaggregateIter<I>
where
    I: Iterator<Item = InboundRecord>,
{
    type Item = EventRecord;

    fn next(&mut self) -> Option<EventRecord> {
        loop {
            if let Some(expansion) = self.current.as_mut() {
                let index = expansion.next;
                match expansion.decoded.user_record(index) {
                    Some(Ok(record)) => {
                        expansion.next += 1;
                        return Some(user_envelope(&expansion.envelope, record, index as u64));
                    }
                    Some(Err(e)) => {
                        report_failure(expansion, &e);
                        self.current = None;
                    }
                    None => self.current = None,
                }
                continue;
            }

            let envelope = self.inputs.next()?.normalize();
            match self.begin(envelope) {
                Step::Passthrough(record) => return Some(record),
                Step::Expand(expansion) => self.current = Some(expansion),
            }
        }
    }
}

fn user_envelope(
    envelope: &EventRecord,
    record: UserRecord,
    sub_sequence_number: u64,
) -> EventRecord {
    let mut out = envelope.clone();
    out.kinesis.partition_key = record.partition_key;
    out.kinesis.explicit_hash_key = record.explicit_hash_key;
    out.kinesis.sub_sequence_number = Some(sub_sequence_number);
    out.kinesis.aggregated = Some(true);
    out.kinesis.data = STANDARD.encode(&record.data);
    out
}

fn report_failure(expansion: &Expansion, err: &shardpack_core::Error) {
    let decoded = &expansion.decoded;
    let entries: String = decoded
        .entries()
        .iter()
        .map(|entry| {
            format!(
                "[has_ehk={}, ehk_idx={:?}, pk_idx={}, data_len={}]",
                entry.explicit_hash_key_index.is_some(),
                entry.explicit_hash_key_index,
                entry.partition_key_index,
                entry.data.len()
            )
        })
        .collect();

    error!(
        sequence_number = %expansion.envelope.kinesis.sequence_number,
        sub_sequence_number = expansion.next,
        error = %err,
        partition_keys = ?decoded.partition_key_table(),
        explicit_hash_keys = ?decoded.explicit_hash_key_table(),
        entries = %entries,
        raw = %STANDARD.encode(&expansion.raw),
        "Unexpected failure during deaggregation"
    );
}
