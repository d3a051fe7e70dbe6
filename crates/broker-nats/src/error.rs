use memphis_broker::{BrokerError, BrokerErrorKind};
use thiserror::Error;

/// Errors that can occur when talking to a memphis broker over NATS.
#[derive(Debug, Error)]
pub enum Error {
    /// The session was closed.
    #[error("session closed")]
    Closed,

    /// Connecting to the NATS server failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] async_nats::Error),

    /// A control request could not be serialized.
    #[error("failed to encode control request: {0}")]
    Encode(#[from] serde_json::Error),

    /// A NATS or `JetStream` operation failed.
    #[error("{operation} failed: {source}")]
    Nats {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying error.
        source: async_nats::Error,
    },

    /// The broker answered a control request with an error.
    #[error("{operation} rejected by broker: {reason}")]
    Rejected {
        /// Classification of the reason.
        kind: BrokerErrorKind,
        /// The rejected operation.
        operation: &'static str,
        /// The broker's error text.
        reason: String,
    },
}

impl Error {
    pub(crate) fn nats(operation: &'static str, source: impl Into<async_nats::Error>) -> Self {
        Self::Nats {
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn rejected(operation: &'static str, reason: String) -> Self {
        Self::Rejected {
            kind: classify_rejection(&reason),
            operation,
            reason,
        }
    }
}

/// Classifies the error text the broker replies with to a control request.
pub(crate) fn classify_rejection(reason: &str) -> BrokerErrorKind {
    let reason = reason.to_lowercase();

    if reason.contains("already exist") {
        BrokerErrorKind::AlreadyExists
    } else if reason.contains("not exist") || reason.contains("not found") {
        BrokerErrorKind::NotFound
    } else {
        BrokerErrorKind::Other
    }
}

fn classify_transport(error: &str) -> BrokerErrorKind {
    let error = error.to_lowercase();

    if error.contains("timed out") || error.contains("timeout") {
        BrokerErrorKind::Timeout
    } else if error.contains("not found") {
        BrokerErrorKind::NotFound
    } else if error.contains("no responders")
        || error.contains("connection")
        || error.contains("disconnected")
    {
        BrokerErrorKind::Unavailable
    } else {
        BrokerErrorKind::Other
    }
}

impl BrokerError for Error {
    fn kind(&self) -> BrokerErrorKind {
        match self {
            Self::Closed => BrokerErrorKind::Closed,
            Self::Connect(_) => BrokerErrorKind::Unavailable,
            Self::Encode(_) => BrokerErrorKind::Other,
            Self::Nats { source, .. } => classify_transport(&source.to_string()),
            Self::Rejected { kind, .. } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejection() {
        assert_eq!(
            classify_rejection("Producer with the same name already exists"),
            BrokerErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_rejection("Station orders does not exist"),
            BrokerErrorKind::NotFound
        );
        assert_eq!(
            classify_rejection("factory not found"),
            BrokerErrorKind::NotFound
        );
        assert_eq!(
            classify_rejection("Unauthorized"),
            BrokerErrorKind::Other
        );
    }

    #[test]
    fn test_transport_kinds() {
        let timeout = Error::nats("publish", "request timed out");
        assert_eq!(timeout.kind(), BrokerErrorKind::Timeout);

        let unavailable = Error::nats("create_station", "no responders");
        assert_eq!(unavailable.kind(), BrokerErrorKind::Unavailable);

        let missing = Error::nats("fetch", "stream not found");
        assert_eq!(missing.kind(), BrokerErrorKind::NotFound);

        assert_eq!(Error::Closed.kind(), BrokerErrorKind::Closed);
    }

    #[test]
    fn test_rejected_keeps_reason() {
        let error = Error::rejected("create_factory", "Factory already exists".to_string());

        assert_eq!(error.kind(), BrokerErrorKind::AlreadyExists);
        assert_eq!(
            error.to_string(),
            "create_factory rejected by broker: Factory already exists"
        );
    }
}
