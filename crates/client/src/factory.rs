use crate::connection::Connection;
use crate::entity::EntityKind;
use crate::error::{Error, Result};
use crate::name::validate_name;
use crate::options::StationOptions;
use crate::station::Station;

use memphis_broker::{Broker, ControlRequest};
use tracing::{info, instrument};

/// Name of the factory stations fall into when none is given.
///
/// The name is reserved: it cannot be used for an explicitly created factory.
pub const DEFAULT_FACTORY: &str = "default";

/// A named group of stations.
#[derive(Debug)]
pub struct Factory<B: Broker> {
    connection: Connection<B>,
    description: String,
    name: String,
}

impl<B: Broker> Factory<B> {
    #[instrument(skip(connection, description), fields(connection_id = %connection.id()))]
    pub(crate) async fn create(
        connection: Connection<B>,
        name: &str,
        description: &str,
    ) -> Result<Self> {
        validate_name(EntityKind::Factory, name)?;

        if name == DEFAULT_FACTORY {
            return Err(Error::InvalidName {
                kind: EntityKind::Factory,
                name: name.to_string(),
                reason: "is reserved for the default factory",
            });
        }

        connection.ensure_open()?;
        connection
            .control(ControlRequest::CreateFactory {
                name: name.to_string(),
                description: description.to_string(),
            })
            .await?;

        info!("factory created");

        Ok(Self {
            connection,
            description: description.to_string(),
            name: name.to_string(),
        })
    }

    /// The factory's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The description given at creation.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Creates a station in this factory with default settings.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`] or [`Error::DuplicateName`].
    pub async fn create_station(&self, name: &str) -> Result<Station<B>> {
        self.create_station_with_options(name, StationOptions::default())
            .await
    }

    /// Creates a station in this factory. The factory given in `options` is ignored.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`] or [`Error::DuplicateName`].
    pub async fn create_station_with_options(
        &self,
        name: &str,
        options: StationOptions,
    ) -> Result<Station<B>> {
        let options = StationOptions {
            factory: Some(self.name.clone()),
            ..options
        };

        Station::create(self.connection.clone(), name, options).await
    }

    /// Removes the factory and, on the broker, every station in it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if the factory is already gone.
    #[instrument(skip(self), fields(connection_id = %self.connection.id(), factory = %self.name))]
    pub async fn remove(&self) -> Result<()> {
        self.connection.ensure_open()?;
        self.connection
            .control(ControlRequest::RemoveFactory {
                name: self.name.clone(),
            })
            .await?;

        self.connection.registry().forget_factory(&self.name);

        info!("factory removed");

        Ok(())
    }
}
