//! Client for memphis brokers: factories, stations, producers and pulling consumers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod consumer;
mod entity;
mod error;
mod factory;
mod name;
mod options;
mod producer;
mod pull;
mod registry;
mod station;

pub use connection::Connection;
pub use consumer::{Consumer, ConsumerState, ERROR_CHANNEL_CAPACITY};
pub use entity::{Entity, EntityKind};
pub use error::{BoxError, Error, Result};
pub use factory::{DEFAULT_FACTORY, Factory};
pub use name::{MAX_NAME_LENGTH, validate_name};
pub use options::{ConsumerOptions, ProduceOptions, StationOptions};
pub use producer::Producer;
pub use station::Station;

pub use memphis_broker::{Broker, Retention, StorageType};
