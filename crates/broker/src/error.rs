use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Broad classification of broker failures.
///
/// Clients use the kind to tell an authoritative rejection (a name already taken,
/// an entity that does not exist) apart from transport trouble.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrokerErrorKind {
    /// The entity to create already exists.
    AlreadyExists,

    /// The session has been closed.
    Closed,

    /// The entity to act on does not exist.
    NotFound,

    /// Any other failure reported by the broker.
    Other,

    /// The broker did not answer in time.
    Timeout,

    /// The broker could not be reached.
    Unavailable,
}

impl Display for BrokerErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let kind = match self {
            Self::AlreadyExists => "already exists",
            Self::Closed => "closed",
            Self::NotFound => "not found",
            Self::Other => "other",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
        };

        f.write_str(kind)
    }
}

/// Marker trait for broker errors
pub trait BrokerError: Error + Send + Sync + 'static {
    /// Classifies the error.
    fn kind(&self) -> BrokerErrorKind;
}
