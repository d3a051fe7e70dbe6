use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a station keeps its messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Messages older than the given age are discarded.
    MaxAge(Duration),

    /// At most the given number of messages is kept.
    Messages(u64),

    /// At most the given number of payload bytes is kept.
    Bytes(u64),
}

impl Default for Retention {
    fn default() -> Self {
        Self::MaxAge(Duration::from_secs(604_800))
    }
}

/// Where a station stores its messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Persisted to disk.
    #[default]
    File,

    /// Kept in memory only.
    Memory,
}

/// Broker-side settings of a station.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    /// Number of replicas.
    pub replicas: u32,

    /// Retention policy.
    pub retention: Retention,

    /// Storage type.
    pub storage: StorageType,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            replicas: 1,
            retention: Retention::default(),
            storage: StorageType::default(),
        }
    }
}

/// Tunables sent along when a consumer is created.
///
/// `max_ack_time` and `max_msg_deliveries` are enforced by the broker; the
/// others describe how the client intends to pull.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Longest wait for a batch to fill.
    pub batch_max_wait: Duration,

    /// Largest number of messages per pull.
    pub batch_size: usize,

    /// How long a delivery may stay unacknowledged before it is redelivered.
    pub max_ack_time: Duration,

    /// How many times a message is delivered before it is dead-lettered.
    pub max_msg_deliveries: u32,

    /// Delay between pulls.
    pub pull_interval: Duration,
}

/// A request on the broker's control channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    /// Create a factory.
    CreateFactory {
        /// Factory name.
        name: String,
        /// Free-form description.
        description: String,
    },

    /// Remove a factory together with its stations.
    RemoveFactory {
        /// Factory name.
        name: String,
    },

    /// Create a station inside a factory.
    CreateStation {
        /// Station name.
        name: String,
        /// Owning factory.
        factory: String,
        /// Station settings.
        settings: StationSettings,
    },

    /// Remove a station together with its producers and consumers.
    RemoveStation {
        /// Station name.
        name: String,
    },

    /// Create a producer on a station.
    CreateProducer {
        /// Producer name.
        name: String,
        /// Station the producer publishes to.
        station: String,
        /// Connection owning the producer.
        connection_id: String,
    },

    /// Remove a producer.
    RemoveProducer {
        /// Producer name.
        name: String,
        /// Station of the producer.
        station: String,
    },

    /// Create a consumer on a station.
    CreateConsumer {
        /// Consumer name.
        name: String,
        /// Station the consumer pulls from.
        station: String,
        /// Consumer group sharing delivery state.
        group: String,
        /// Connection owning the consumer.
        connection_id: String,
        /// Tunables.
        settings: ConsumerSettings,
    },

    /// Remove a consumer.
    RemoveConsumer {
        /// Consumer name.
        name: String,
        /// Station of the consumer.
        station: String,
    },
}

impl ControlRequest {
    /// Name of the entity the request acts on.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::CreateFactory { name, .. }
            | Self::RemoveFactory { name }
            | Self::CreateStation { name, .. }
            | Self::RemoveStation { name }
            | Self::CreateProducer { name, .. }
            | Self::RemoveProducer { name, .. }
            | Self::CreateConsumer { name, .. }
            | Self::RemoveConsumer { name, .. } => name,
        }
    }

    /// Short operation label, used in logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::CreateFactory { .. } => "create_factory",
            Self::RemoveFactory { .. } => "remove_factory",
            Self::CreateStation { .. } => "create_station",
            Self::RemoveStation { .. } => "remove_station",
            Self::CreateProducer { .. } => "create_producer",
            Self::RemoveProducer { .. } => "remove_producer",
            Self::CreateConsumer { .. } => "create_consumer",
            Self::RemoveConsumer { .. } => "remove_consumer",
        }
    }
}
