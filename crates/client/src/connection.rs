use crate::consumer::Consumer;
use crate::entity::{Entity, EntityKind};
use crate::error::{Error, Result};
use crate::factory::{DEFAULT_FACTORY, Factory};
use crate::name::validate_name;
use crate::options::{ConsumerOptions, StationOptions};
use crate::producer::Producer;
use crate::registry::EntityRegistry;
use crate::station::Station;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use memphis_broker::{Broker, ControlRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Debug)]
struct ConnectionInner<B: Broker> {
    broker: B,
    closed: AtomicBool,
    id: String,
    registry: EntityRegistry,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// An authenticated session with a broker.
///
/// Cloning is cheap; all clones share the session, its registry of names and
/// the background pull tasks of its consumers.
#[derive(Clone, Debug)]
pub struct Connection<B: Broker> {
    inner: Arc<ConnectionInner<B>>,
}

impl<B: Broker> Connection<B> {
    /// Connects to the broker under a freshly generated connection id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the broker cannot be reached or refuses the session.
    #[instrument(skip(options))]
    pub async fn connect(options: B::Options) -> Result<Self> {
        let id = Uuid::new_v4().to_string();

        let broker = B::connect(id.clone(), options)
            .await
            .map_err(|e| Error::Connect(Box::new(e)))?;

        info!(connection_id = %id, "connected to broker");

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                broker,
                closed: AtomicBool::new(false),
                id,
                registry: EntityRegistry::default(),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        })
    }

    /// The id the broker knows this session by.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stops every consumer, waits for their pull tasks and ends the session.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the broker fails to end the session.
    #[instrument(skip(self), fields(connection_id = %self.inner.id))]
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.registry.clear();

        self.inner.broker.close().await.map_err(Error::transport)?;

        info!("connection closed");

        Ok(())
    }

    /// Creates a factory.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`] for a malformed or reserved name and
    /// [`Error::DuplicateName`] if the factory exists.
    pub async fn create_factory(&self, name: &str, description: &str) -> Result<Factory<B>> {
        Factory::create(self.clone(), name, description).await
    }

    /// Creates a station, in the default factory unless the options name one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`], [`Error::DuplicateName`], or
    /// [`Error::NotFound`] when the named factory does not exist.
    pub async fn create_station(&self, name: &str, options: StationOptions) -> Result<Station<B>> {
        Station::create(self.clone(), name, options).await
    }

    /// Creates a producer, creating the station in the default factory if needed.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`] or [`Error::DuplicateName`].
    pub async fn create_producer(&self, name: &str, station: &str) -> Result<Producer<B>> {
        validate_name(EntityKind::Producer, name)?;
        self.ensure_station(station).await?;

        Producer::create(self.clone(), station, name).await
    }

    /// Creates a consumer and starts pulling, creating the station in the
    /// default factory if needed.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`], [`Error::InvalidOption`] or [`Error::DuplicateName`].
    pub async fn create_consumer(
        &self,
        name: &str,
        station: &str,
        options: ConsumerOptions,
    ) -> Result<Consumer<B>> {
        validate_name(EntityKind::Consumer, name)?;
        validate_name(EntityKind::ConsumerGroup, options.group_name(name))?;
        options.validate()?;
        self.ensure_station(station).await?;

        Consumer::create(self.clone(), station, name, options).await
    }

    /// Removes an entity by name, whether or not this connection created it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if the broker does not know the entity.
    #[instrument(skip(self), fields(connection_id = %self.inner.id))]
    pub async fn destroy(&self, entity: Entity) -> Result<()> {
        self.ensure_open()?;

        let registry = &self.inner.registry;

        let request = match &entity {
            Entity::Consumer { name, station } => ControlRequest::RemoveConsumer {
                name: name.clone(),
                station: station.clone(),
            },
            Entity::Factory(name) => ControlRequest::RemoveFactory { name: name.clone() },
            Entity::Producer { name, station } => ControlRequest::RemoveProducer {
                name: name.clone(),
                station: station.clone(),
            },
            Entity::Station(name) => ControlRequest::RemoveStation { name: name.clone() },
        };

        self.control(request).await?;

        // Local state only goes once the broker has let go of the entity.
        match &entity {
            Entity::Consumer { name, station } => {
                registry.release(station, EntityKind::Consumer, name);
            }
            Entity::Factory(name) => registry.forget_factory(name),
            Entity::Producer { name, station } => {
                registry.release(station, EntityKind::Producer, name);
            }
            Entity::Station(name) => registry.forget_station(name),
        }

        info!(kind = %entity.kind(), name = entity.name(), "destroyed entity");

        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        Ok(())
    }

    pub(crate) fn broker(&self) -> &B {
        &self.inner.broker
    }

    pub(crate) fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// A token cancelled when the connection closes.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn(task)
    }

    /// Sends a control request, mapping rejections onto the entity concerned.
    pub(crate) async fn control(&self, request: ControlRequest) -> Result<()> {
        debug!(
            operation = request.operation(),
            name = request.name(),
            "sending control request"
        );

        match self.inner.broker.control(request.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::control(&request, e)),
        }
    }

    /// Creates the default factory unless it already exists.
    pub(crate) async fn ensure_default_factory(&self) -> Result<()> {
        let request = ControlRequest::CreateFactory {
            name: DEFAULT_FACTORY.to_string(),
            description: String::new(),
        };

        match self.control(request).await {
            Ok(()) | Err(Error::DuplicateName { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Makes sure a station exists, creating it in the default factory.
    async fn ensure_station(&self, station: &str) -> Result<()> {
        if self.inner.registry.knows_station(station) {
            return Ok(());
        }

        match Station::create(self.clone(), station, StationOptions::default()).await {
            Ok(_) => Ok(()),
            Err(Error::DuplicateName {
                kind: EntityKind::Station,
                ..
            }) => {
                debug!(station, "reusing existing station");
                self.inner.registry.adopt_station(station);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
