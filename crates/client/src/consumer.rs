use crate::connection::Connection;
use crate::entity::EntityKind;
use crate::error::{Error, Result};
use crate::name::validate_name;
use crate::options::ConsumerOptions;
use crate::pull::PullLoop;

use bytes::Bytes;
use memphis_broker::{Broker, ControlRequest, FetchRequest};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Pull failures kept for [`Consumer::errors`] before new ones are dropped.
pub const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Whether a consumer is still pulling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// The pull loop is running.
    Pulling,

    /// The consumer was removed, dropped or its connection closed.
    Stopped,
}

/// Pulls messages from a station in the background.
///
/// Messages arrive on a bounded channel sized to the batch; a full channel
/// holds the pull loop back until the application catches up. Each message is
/// acknowledged once the channel accepts it.
///
/// Dropping the consumer stops the pull loop but leaves the consumer
/// registered on the broker; use [`Consumer::remove`] to remove it.
#[derive(Debug)]
pub struct Consumer<B: Broker> {
    connection: Connection<B>,
    errors: mpsc::Receiver<Error>,
    group: String,
    name: String,
    puller: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
    station: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Broker> Consumer<B> {
    #[instrument(skip(connection, options), fields(connection_id = %connection.id()))]
    pub(crate) async fn create(
        connection: Connection<B>,
        station: &str,
        name: &str,
        options: ConsumerOptions,
    ) -> Result<Self> {
        validate_name(EntityKind::Consumer, name)?;

        let group = options.group_name(name).to_string();
        validate_name(EntityKind::ConsumerGroup, &group)?;
        options.validate()?;

        connection.ensure_open()?;
        connection
            .registry()
            .reserve(station, EntityKind::Consumer, name)?;

        let request = ControlRequest::CreateConsumer {
            name: name.to_string(),
            station: station.to_string(),
            group: group.clone(),
            connection_id: connection.id().to_string(),
            settings: options.settings(),
        };

        if let Err(e) = connection.control(request).await {
            connection
                .registry()
                .release(station, EntityKind::Consumer, name);
            return Err(e);
        }

        let shutdown = connection.child_token();
        connection
            .registry()
            .attach(station, name, shutdown.clone());

        let (output, puller) = mpsc::channel(options.batch_size);
        let (errors_tx, errors) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let pull_loop = PullLoop {
            broker: connection.broker().clone(),
            errors: errors_tx,
            interval: options.pull_interval,
            output,
            request: FetchRequest {
                batch_max_wait: options.batch_max_wait,
                batch_size: options.batch_size,
                consumer: name.to_string(),
                group: group.clone(),
                station: station.to_string(),
            },
            shutdown: shutdown.clone(),
        };

        let task = connection.spawn(pull_loop.run());

        info!(group = %group, "consumer created");

        Ok(Self {
            connection,
            errors,
            group,
            name: name.to_string(),
            puller,
            shutdown,
            station: station.to_string(),
            task: Mutex::new(Some(task)),
        })
    }

    /// The consumer's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The consumer group sharing delivery state.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The station pulled from.
    #[must_use]
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Whether the pull loop is still running.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        if self.shutdown.is_cancelled() {
            ConsumerState::Stopped
        } else {
            ConsumerState::Pulling
        }
    }

    /// Waits for the next message. `None` once the consumer stopped and the
    /// channel is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.puller.recv().await
    }

    /// The channel messages arrive on.
    pub const fn puller(&mut self) -> &mut mpsc::Receiver<Bytes> {
        &mut self.puller
    }

    /// Failed pulls. The loop keeps pulling after reporting one.
    pub const fn errors(&mut self) -> &mut mpsc::Receiver<Error> {
        &mut self.errors
    }

    /// Stops pulling, waits for the pull loop to finish and removes the
    /// consumer from the broker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when called a second time.
    #[instrument(skip(self), fields(station = %self.station, consumer = %self.name))]
    pub async fn remove(&self) -> Result<()> {
        self.connection.ensure_open()?;

        if !self
            .connection
            .registry()
            .release(&self.station, EntityKind::Consumer, &self.name)
        {
            return Err(Error::not_found(EntityKind::Consumer, self.name.as_str()));
        }

        self.shutdown.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "pull loop ended abnormally");
            }
        }

        self.connection
            .control(ControlRequest::RemoveConsumer {
                name: self.name.clone(),
                station: self.station.clone(),
            })
            .await?;

        info!("consumer removed");

        Ok(())
    }
}

impl<B: Broker> Drop for Consumer<B> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
