use crate::entity::EntityKind;

use std::error::Error as StdError;
use std::time::Duration;

use memphis_broker::{BrokerError, BrokerErrorKind, ControlRequest};
use thiserror::Error;

/// Boxed error from a broker implementation.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type for client operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while using a connection and its entities.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker did not acknowledge a message in time.
    #[error("message was not acknowledged within {0:?}")]
    AckTimeout(Duration),

    /// Connecting to the broker failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] BoxError),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The name is already taken, locally or on the broker.
    #[error("{kind} '{name}' already exists")]
    DuplicateName {
        /// Kind of entity.
        kind: EntityKind,
        /// The duplicate name.
        name: String,
    },

    /// An option is out of range.
    #[error("invalid option {option}: {reason}")]
    InvalidOption {
        /// The option name.
        option: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The name breaks the naming rules.
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        /// Kind of entity.
        kind: EntityKind,
        /// The rejected name.
        name: String,
        /// Which rule was broken.
        reason: &'static str,
    },

    /// The entity does not exist or was already removed.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of entity.
        kind: EntityKind,
        /// The unknown name.
        name: String,
    },

    /// The broker rejected a message.
    #[error("failed to send message: {0}")]
    Send(#[source] BoxError),

    /// Any other broker failure.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl Error {
    pub(crate) fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn transport<E: BrokerError>(error: E) -> Self {
        match error.kind() {
            BrokerErrorKind::Closed => Self::ConnectionClosed,
            _ => Self::Transport(Box::new(error)),
        }
    }

    /// Maps a rejected control request onto the entity it concerns.
    pub(crate) fn control<E: BrokerError>(request: &ControlRequest, error: E) -> Self {
        let kind = match request {
            ControlRequest::CreateFactory { .. } | ControlRequest::RemoveFactory { .. } => {
                EntityKind::Factory
            }
            ControlRequest::CreateStation { .. } | ControlRequest::RemoveStation { .. } => {
                EntityKind::Station
            }
            ControlRequest::CreateProducer { .. } | ControlRequest::RemoveProducer { .. } => {
                EntityKind::Producer
            }
            ControlRequest::CreateConsumer { .. } | ControlRequest::RemoveConsumer { .. } => {
                EntityKind::Consumer
            }
        };

        match error.kind() {
            BrokerErrorKind::AlreadyExists => Self::DuplicateName {
                kind,
                name: request.name().to_string(),
            },
            // A missing parent fails a creation.
            BrokerErrorKind::NotFound => match request {
                ControlRequest::CreateStation { factory, .. } => {
                    Self::not_found(EntityKind::Factory, factory.as_str())
                }
                ControlRequest::CreateProducer { station, .. }
                | ControlRequest::CreateConsumer { station, .. } => {
                    Self::not_found(EntityKind::Station, station.as_str())
                }
                _ => Self::not_found(kind, request.name()),
            },
            _ => Self::transport(error),
        }
    }
}
