//! Runtime configuration.
//!
//! [`Config`] carries every tunable of the partition store and the delivery
//! protocol. It derives `serde` traits with `#[serde(default)]` so a loader
//! may supply any subset of fields; loading itself is the caller's concern.
//!
//! # Configuration Presets
//!
//! - [`Config::production()`] - long timeouts for large clusters
//! - [`Config::testing()`] - short timeouts so failure paths run quickly
//!
//! # Example
//!
//! ```rust
//! use bsp_graph::config::Config;
//! use bsp_graph::graph::EdgeStrategy;
//!
//! let mut config = Config::testing();
//! config.edge_strategy = EdgeStrategy::Sorted;
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::EdgeStrategy;
use crate::storage::PartitionKind;

/// Configuration for partition storage and request delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Age in milliseconds after which an unacknowledged request is resent.
    pub request_timeout_ms: u64,

    /// Period in milliseconds of the background resend check.
    pub waiting_interval_ms: u64,

    /// Dispatch attempts allowed per request before it fails permanently.
    pub max_request_attempts: u32,

    /// Consecutive failed connection attempts before a destination is
    /// declared unreachable.
    pub max_reconnect_attempts: u32,

    /// Concurrency hint used to size the shards of each partition map.
    pub map_concurrency: usize,

    /// Edge container strategy used by decoded vertices.
    pub edge_strategy: EdgeStrategy,

    /// Partition implementation created for new partitions.
    pub partition_kind: PartitionKind,
}

impl Default for Config {
    fn default() -> Self {
        Self::production()
    }
}

impl Config {
    /// Creates a configuration for production clusters.
    ///
    /// Requests are resent after ten minutes without an acknowledgement and
    /// checked every fifteen seconds.
    pub fn production() -> Self {
        Self {
            request_timeout_ms: 600_000,
            waiting_interval_ms: 15_000,
            max_request_attempts: 10,
            max_reconnect_attempts: 30,
            map_concurrency: 16,
            edge_strategy: EdgeStrategy::Hashed,
            partition_kind: PartitionKind::ByteArray,
        }
    }

    /// Creates a configuration with short timeouts for tests.
    pub fn testing() -> Self {
        Self {
            request_timeout_ms: 200,
            waiting_interval_ms: 50,
            max_request_attempts: 5,
            max_reconnect_attempts: 3,
            map_concurrency: 4,
            edge_strategy: EdgeStrategy::Hashed,
            partition_kind: PartitionKind::ByteArray,
        }
    }

    /// Rejects values the store and the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(GraphError::InvalidArgument(
                "request_timeout_ms must be positive".into(),
            ));
        }
        if self.waiting_interval_ms == 0 {
            return Err(GraphError::InvalidArgument(
                "waiting_interval_ms must be positive".into(),
            ));
        }
        if self.max_request_attempts == 0 {
            return Err(GraphError::InvalidArgument(
                "max_request_attempts must be at least 1".into(),
            ));
        }
        if self.map_concurrency == 0 {
            return Err(GraphError::InvalidArgument(
                "map_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Partition-store view of this configuration.
    pub fn partition(&self) -> PartitionConfig {
        PartitionConfig {
            map_concurrency: self.map_concurrency,
            edge_strategy: self.edge_strategy,
            partition_kind: self.partition_kind,
        }
    }

    /// Delivery-protocol view of this configuration.
    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            waiting_interval: Duration::from_millis(self.waiting_interval_ms),
            max_request_attempts: self.max_request_attempts.max(1),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Settings consumed by partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Concurrency hint for the partition map.
    pub map_concurrency: usize,
    /// Edge strategy of decoded vertices.
    pub edge_strategy: EdgeStrategy,
    /// Partition implementation.
    pub partition_kind: PartitionKind,
}

impl PartitionConfig {
    /// Shard count for the partition map: a power of two, at least two.
    pub fn shard_amount(&self) -> usize {
        self.map_concurrency.max(2).next_power_of_two()
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Config::default().partition()
    }
}

/// Settings consumed by the delivery coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Age after which an unacknowledged request is resent.
    pub request_timeout: Duration,
    /// Period of the background resend check.
    pub waiting_interval: Duration,
    /// Dispatch attempts allowed per request.
    pub max_request_attempts: u32,
    /// Consecutive failed connection attempts tolerated per destination.
    pub max_reconnect_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Config::default().delivery()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        Config::production().validate().unwrap();
        Config::testing().validate().unwrap();
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config {
            request_timeout_ms: 0,
            ..Config::testing()
        };
        assert!(matches!(
            config.validate(),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"request_timeout_ms": 1000, "edge_strategy": "lazy"}"#)
                .unwrap();
        assert_eq!(config.request_timeout_ms, 1000);
        assert_eq!(config.edge_strategy, EdgeStrategy::Lazy);
        assert_eq!(config.waiting_interval_ms, Config::production().waiting_interval_ms);
        assert_eq!(config.partition_kind, PartitionKind::ByteArray);
    }

    #[test]
    fn shard_amount_is_a_power_of_two() {
        let mut partition = Config::testing().partition();
        partition.map_concurrency = 5;
        assert_eq!(partition.shard_amount(), 8);
        partition.map_concurrency = 1;
        assert_eq!(partition.shard_amount(), 2);
    }
}
