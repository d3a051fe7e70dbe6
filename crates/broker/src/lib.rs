//! Abstract interface to a memphis broker: control requests, publishing and pulling.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Control requests create and remove factories, stations, producers and consumers.
pub mod control;

/// Deliveries are messages pulled from a station on behalf of a consumer group.
pub mod delivery;

mod error;

pub use control::{
    ConsumerSettings, ControlRequest, Retention, StationSettings, StorageType,
};
pub use delivery::{Delivery, FetchRequest, Publication};
pub use error::{BrokerError, BrokerErrorKind};

use std::fmt::Debug;

use async_trait::async_trait;

/// Marker trait for broker options
pub trait BrokerOptions: Clone + Debug + Send + Sync + 'static {}

/// Marker trait for delivery handles.
///
/// A handle is opaque to the client; it is only ever handed back to the broker
/// that produced it to acknowledge or reject the delivery.
pub trait DeliveryHandle: Debug + Send + Sync + 'static {}

/// A trait representing an authenticated session with a memphis broker.
#[async_trait]
pub trait Broker
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the broker.
    type Error: BrokerError;

    /// The options used to connect to the broker.
    type Options: BrokerOptions;

    /// The handle used to acknowledge deliveries.
    type Handle: DeliveryHandle;

    /// Opens a session identified by `connection_id`.
    async fn connect(connection_id: String, options: Self::Options) -> Result<Self, Self::Error>;

    /// Issues a control request and waits for the broker's verdict.
    async fn control(&self, request: ControlRequest) -> Result<(), Self::Error>;

    /// Publishes a message and resolves once the broker acknowledged it.
    ///
    /// Implementations may wait indefinitely; callers bound the wait themselves.
    async fn publish(&self, publication: Publication) -> Result<(), Self::Error>;

    /// Pulls up to `batch_size` messages, waiting at most `batch_max_wait` to fill the batch.
    ///
    /// An empty batch is a normal outcome.
    async fn fetch(
        &self,
        request: FetchRequest,
    ) -> Result<Vec<Delivery<Self::Handle>>, Self::Error>;

    /// Acknowledges a delivery.
    async fn ack(&self, handle: Self::Handle) -> Result<(), Self::Error>;

    /// Rejects a delivery so the broker may redeliver it right away.
    async fn nack(&self, handle: Self::Handle) -> Result<(), Self::Error>;

    /// Ends the session. Further calls fail with an error of kind `Closed`.
    async fn close(&self) -> Result<(), Self::Error>;
}
