use crate::connection::Connection;
use crate::consumer::Consumer;
use crate::entity::EntityKind;
use crate::error::Result;
use crate::factory::DEFAULT_FACTORY;
use crate::name::validate_name;
use crate::options::{ConsumerOptions, StationOptions};
use crate::producer::Producer;

use memphis_broker::{Broker, ControlRequest};
use tracing::{info, instrument};

/// A named message log inside a factory.
#[derive(Debug)]
pub struct Station<B: Broker> {
    connection: Connection<B>,
    factory: String,
    name: String,
}

impl<B: Broker> Station<B> {
    #[instrument(skip(connection, options), fields(connection_id = %connection.id()))]
    pub(crate) async fn create(
        connection: Connection<B>,
        name: &str,
        options: StationOptions,
    ) -> Result<Self> {
        validate_name(EntityKind::Station, name)?;

        let factory = match options.factory.as_deref() {
            Some(factory) if factory != DEFAULT_FACTORY => {
                validate_name(EntityKind::Factory, factory)?;
                connection.ensure_open()?;
                factory.to_string()
            }
            _ => {
                connection.ensure_open()?;
                connection.ensure_default_factory().await?;
                DEFAULT_FACTORY.to_string()
            }
        };

        connection
            .control(ControlRequest::CreateStation {
                name: name.to_string(),
                factory: factory.clone(),
                settings: options.settings(),
            })
            .await?;

        connection.registry().record_station(name, &factory);

        info!(factory = %factory, "station created");

        Ok(Self {
            connection,
            factory,
            name: name.to_string(),
        })
    }

    /// The station's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The factory the station belongs to.
    #[must_use]
    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Creates a producer publishing to this station.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`](crate::Error::InvalidName) or
    /// [`Error::DuplicateName`](crate::Error::DuplicateName).
    pub async fn create_producer(&self, name: &str) -> Result<Producer<B>> {
        Producer::create(self.connection.clone(), &self.name, name).await
    }

    /// Creates a consumer on this station and starts pulling.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`](crate::Error::InvalidName),
    /// [`Error::InvalidOption`](crate::Error::InvalidOption) or
    /// [`Error::DuplicateName`](crate::Error::DuplicateName).
    pub async fn create_consumer(
        &self,
        name: &str,
        options: ConsumerOptions,
    ) -> Result<Consumer<B>> {
        Consumer::create(self.connection.clone(), &self.name, name, options).await
    }

    /// Removes the station and, on the broker, its producers and consumers.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) if the station is already gone.
    #[instrument(skip(self), fields(connection_id = %self.connection.id(), station = %self.name))]
    pub async fn remove(&self) -> Result<()> {
        self.connection.ensure_open()?;
        self.connection
            .control(ControlRequest::RemoveStation {
                name: self.name.clone(),
            })
            .await?;

        self.connection.registry().forget_station(&self.name);

        info!("station removed");

        Ok(())
    }
}
