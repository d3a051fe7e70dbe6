use memphis_broker::{BrokerError, BrokerErrorKind};
use thiserror::Error;

/// Errors returned by the in-memory broker.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The entity to create already exists.
    #[error("{entity} '{name}' already exists")]
    AlreadyExists {
        /// Kind of entity.
        entity: &'static str,
        /// Its name.
        name: String,
    },

    /// The session was closed.
    #[error("session closed")]
    Closed,

    /// The entity does not exist.
    #[error("{entity} '{name}' does not exist")]
    NotFound {
        /// Kind of entity.
        entity: &'static str,
        /// Its name.
        name: String,
    },

    /// The server is offline or failing on purpose.
    #[error("broker unavailable")]
    Unavailable,
}

impl Error {
    pub(crate) fn already_exists(entity: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            name: name.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            name: name.into(),
        }
    }
}

impl BrokerError for Error {
    fn kind(&self) -> BrokerErrorKind {
        match self {
            Self::AlreadyExists { .. } => BrokerErrorKind::AlreadyExists,
            Self::Closed => BrokerErrorKind::Closed,
            Self::NotFound { .. } => BrokerErrorKind::NotFound,
            Self::Unavailable => BrokerErrorKind::Unavailable,
        }
    }
}
