use std::time::Duration;

use bytes::Bytes;

/// A message to publish to a station.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    /// Connection the producer belongs to.
    pub connection_id: String,

    /// The message body.
    pub payload: Bytes,

    /// Name of the publishing producer.
    pub producer: String,

    /// Target station.
    pub station: String,
}

/// A pull request on behalf of a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Longest wait for the batch to fill.
    pub batch_max_wait: Duration,

    /// Largest number of messages to return.
    pub batch_size: usize,

    /// Name of the pulling consumer.
    pub consumer: String,

    /// Consumer group whose delivery state is advanced.
    pub group: String,

    /// Station to pull from.
    pub station: String,
}

/// A pulled message together with the handle used to acknowledge it.
#[derive(Debug)]
pub struct Delivery<H> {
    /// Handle to pass back to the broker.
    pub handle: H,

    /// The message body.
    pub payload: Bytes,
}
