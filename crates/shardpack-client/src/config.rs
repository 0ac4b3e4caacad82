//! Aggregation Configuration
//!
//! This module defines the producer-side settings shared by the Router and the
//! accumulators it creates.
//!
//! ## AggregationConfig
//!
//! - **max_record_size**: Ceiling on each physical record in bytes (default: 1 MiB, the transport limit)
//! - **refresh_threshold**: Accumulator lookups between shard table refreshes (default: 1000)
//! - **listener_mode**: How listeners registered through the Router run (default: inline)
//!
//! ## Usage
//!
//! ```ignore
//! use shardpack_client::AggregationConfig;
//!
//! // From a config file
//! let config: AggregationConfig = serde_json::from_str(r#"{"refresh_threshold": 500}"#)?;
//!
//! // In code
//! let config = AggregationConfig {
//!     max_record_size: 256 * 1024,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use shardpack_core::{AGGREGATION_OVERHEAD, MAX_BYTES_PER_RECORD};

use crate::accumulator::ListenerMode;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Physical record ceiling in bytes (default: 1 MiB)
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// Accumulator lookups before the shard table is refreshed (default: 1000)
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold: u64,

    /// Dispatch mode for Router-registered listeners (default: inline)
    #[serde(default)]
    pub listener_mode: ListenerMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_record_size: default_max_record_size(),
            refresh_threshold: default_refresh_threshold(),
            listener_mode: ListenerMode::default(),
        }
    }
}

impl AggregationConfig {
    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the ceiling is above 1 MiB or leaves no room for a body,
    /// or if the refresh threshold is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_record_size > MAX_BYTES_PER_RECORD {
            return Err(ClientError::ConfigError(format!(
                "max_record_size {} exceeds maximum value {}",
                self.max_record_size, MAX_BYTES_PER_RECORD
            )));
        }
        if self.max_record_size <= AGGREGATION_OVERHEAD {
            return Err(ClientError::ConfigError(format!(
                "max_record_size {} leaves no room for records",
                self.max_record_size
            )));
        }
        if self.refresh_threshold == 0 {
            return Err(ClientError::ConfigError(
                "refresh_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_record_size() -> usize {
    MAX_BYTES_PER_RECORD
}

fn default_refresh_threshold() -> u64 {
    1000
}
