use crate::connection::Connection;
use crate::entity::EntityKind;
use crate::error::{Error, Result};
use crate::name::validate_name;
use crate::options::ProduceOptions;

use bytes::Bytes;
use memphis_broker::{Broker, BrokerError, BrokerErrorKind, ControlRequest, Publication};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Publishes messages to a single station.
#[derive(Debug)]
pub struct Producer<B: Broker> {
    connection: Connection<B>,
    name: String,
    station: String,
}

impl<B: Broker> Producer<B> {
    #[instrument(skip(connection), fields(connection_id = %connection.id()))]
    pub(crate) async fn create(connection: Connection<B>, station: &str, name: &str) -> Result<Self> {
        validate_name(EntityKind::Producer, name)?;
        connection.ensure_open()?;
        connection
            .registry()
            .reserve(station, EntityKind::Producer, name)?;

        let request = ControlRequest::CreateProducer {
            name: name.to_string(),
            station: station.to_string(),
            connection_id: connection.id().to_string(),
        };

        if let Err(e) = connection.control(request).await {
            connection
                .registry()
                .release(station, EntityKind::Producer, name);
            return Err(e);
        }

        info!("producer created");

        Ok(Self {
            connection,
            name: name.to_string(),
            station: station.to_string(),
        })
    }

    /// The producer's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The station messages go to.
    #[must_use]
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Publishes a message and waits for the broker to acknowledge it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AckTimeout`] if no acknowledgement arrives within
    /// `options.ack_wait`, [`Error::Send`] if the broker rejects the message and
    /// [`Error::NotFound`] once the producer was removed.
    #[instrument(skip(self, payload), fields(station = %self.station, producer = %self.name))]
    pub async fn produce(&self, payload: impl Into<Bytes>, options: ProduceOptions) -> Result<()> {
        self.connection.ensure_open()?;

        if !self
            .connection
            .registry()
            .contains(&self.station, EntityKind::Producer, &self.name)
        {
            return Err(Error::not_found(EntityKind::Producer, self.name.as_str()));
        }

        let publication = Publication {
            connection_id: self.connection.id().to_string(),
            payload: payload.into(),
            producer: self.name.clone(),
            station: self.station.clone(),
        };

        match timeout(options.ack_wait, self.connection.broker().publish(publication)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(match e.kind() {
                BrokerErrorKind::Closed => Error::ConnectionClosed,
                BrokerErrorKind::Timeout => Error::AckTimeout(options.ack_wait),
                _ => Error::Send(Box::new(e)),
            }),
            Err(_) => {
                warn!(ack_wait = ?options.ack_wait, "message not acknowledged in time");
                Err(Error::AckTimeout(options.ack_wait))
            }
        }
    }

    /// Deregisters the producer and removes it from the broker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when called a second time.
    #[instrument(skip(self), fields(station = %self.station, producer = %self.name))]
    pub async fn remove(&self) -> Result<()> {
        self.connection.ensure_open()?;

        if !self
            .connection
            .registry()
            .release(&self.station, EntityKind::Producer, &self.name)
        {
            return Err(Error::not_found(EntityKind::Producer, self.name.as_str()));
        }

        self.connection
            .control(ControlRequest::RemoveProducer {
                name: self.name.clone(),
                station: self.station.clone(),
            })
            .await?;

        info!("producer removed");

        Ok(())
    }
}
