use crate::error::{Error, Result};

use std::time::Duration;

use memphis_broker::{ConsumerSettings, Retention, StationSettings, StorageType};
use serde::{Deserialize, Serialize};

/// Options for a single produce call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProduceOptions {
    /// How long to wait for the broker to acknowledge the message.
    pub ack_wait: Duration,
}

impl Default for ProduceOptions {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(15),
        }
    }
}

/// Options for a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerOptions {
    /// Longest the broker holds a fetch open waiting for messages.
    pub batch_max_wait: Duration,

    /// Most messages returned by a single fetch.
    pub batch_size: usize,

    /// Consumer group; the consumer's own name when unset.
    pub group: Option<String>,

    /// How long a delivered message may stay unacknowledged before redelivery.
    pub max_ack_time: Duration,

    /// Delivery attempts before a message is given up on. Zero means unlimited.
    pub max_msg_deliveries: u32,

    /// Time between fetches.
    pub pull_interval: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            batch_max_wait: Duration::from_secs(5),
            batch_size: 10,
            group: None,
            max_ack_time: Duration::from_secs(30),
            max_msg_deliveries: 10,
            pull_interval: Duration::from_secs(1),
        }
    }
}

impl ConsumerOptions {
    pub(crate) fn group_name<'a>(&'a self, consumer: &'a str) -> &'a str {
        self.group
            .as_deref()
            .filter(|group| !group.is_empty())
            .unwrap_or(consumer)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidOption {
                option: "batch_size",
                reason: "must be at least 1",
            });
        }

        if self.pull_interval.is_zero() {
            return Err(Error::InvalidOption {
                option: "pull_interval",
                reason: "must be greater than zero",
            });
        }

        Ok(())
    }

    pub(crate) const fn settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            batch_max_wait: self.batch_max_wait,
            batch_size: self.batch_size,
            max_ack_time: self.max_ack_time,
            max_msg_deliveries: self.max_msg_deliveries,
            pull_interval: self.pull_interval,
        }
    }
}

/// Options for a station.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationOptions {
    /// Owning factory; the default factory when unset.
    pub factory: Option<String>,

    /// Number of copies the broker keeps.
    pub replicas: u32,

    /// When stored messages are discarded.
    pub retention: Retention,

    /// Where messages are stored.
    pub storage: StorageType,
}

impl Default for StationOptions {
    fn default() -> Self {
        let settings = StationSettings::default();

        Self {
            factory: None,
            replicas: settings.replicas,
            retention: settings.retention,
            storage: settings.storage,
        }
    }
}

impl StationOptions {
    /// Options placing the station in a named factory.
    #[must_use]
    pub fn in_factory(factory: impl Into<String>) -> Self {
        Self {
            factory: Some(factory.into()),
            ..Self::default()
        }
    }

    pub(crate) const fn settings(&self) -> StationSettings {
        StationSettings {
            replicas: self.replicas,
            retention: self.retention,
            storage: self.storage,
        }
    }
}
