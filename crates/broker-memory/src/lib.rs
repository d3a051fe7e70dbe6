//! In-memory (single process) implementation of a memphis broker for local development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod server;

pub use error::Error;
pub use server::MemoryServer;

use server::FetchOutcome;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use memphis_broker::{
    Broker, BrokerOptions, ControlRequest, Delivery, DeliveryHandle, FetchRequest, Publication,
};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

/// Options for the in-memory broker.
#[derive(Clone, Debug, Default)]
pub struct MemoryBrokerOptions {
    /// The server to connect to. Sessions sharing a server see the same stations.
    pub server: MemoryServer,
}
impl BrokerOptions for MemoryBrokerOptions {}

/// Identifies a delivery within a consumer group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryDeliveryHandle {
    group: String,
    seq: u64,
    station: String,
}
impl DeliveryHandle for MemoryDeliveryHandle {}

/// A session with a [`MemoryServer`].
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    closed: Arc<AtomicBool>,
    connection_id: String,
    server: MemoryServer,
}

impl MemoryBroker {
    /// The server this session is connected to.
    #[must_use]
    pub const fn server(&self) -> &MemoryServer {
        &self.server
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Error = Error;
    type Options = MemoryBrokerOptions;
    type Handle = MemoryDeliveryHandle;

    async fn connect(
        connection_id: String,
        options: MemoryBrokerOptions,
    ) -> Result<Self, Self::Error> {
        let server = options.server;

        if !server.is_online().await {
            return Err(Error::Unavailable);
        }

        info!(connection_id = %connection_id, "memory session opened");

        Ok(Self {
            closed: Arc::new(AtomicBool::new(false)),
            connection_id,
            server,
        })
    }

    async fn control(&self, request: ControlRequest) -> Result<(), Self::Error> {
        self.ensure_open()?;

        if !self.server.is_online().await {
            return Err(Error::Unavailable);
        }

        debug!(
            connection_id = %self.connection_id,
            operation = request.operation(),
            name = request.name(),
            "control request"
        );

        self.server.control(request).await
    }

    async fn publish(&self, publication: Publication) -> Result<(), Self::Error> {
        self.ensure_open()?;

        self.server
            .append(&publication.station, publication.payload)
            .await?;

        let delay = self.server.ack_delay().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    async fn fetch(
        &self,
        request: FetchRequest,
    ) -> Result<Vec<Delivery<Self::Handle>>, Self::Error> {
        let deadline = Instant::now() + request.batch_max_wait;

        loop {
            self.ensure_open()?;

            // Registered before looking at the state so no publish slips through.
            let notified = self.server.notify().notified();

            match self
                .server
                .try_fetch(&request.station, &request.group, request.batch_size)
                .await?
            {
                FetchOutcome::Ready(ready) => {
                    return Ok(ready
                        .into_iter()
                        .map(|(seq, payload)| Delivery {
                            handle: MemoryDeliveryHandle {
                                group: request.group.clone(),
                                seq,
                                station: request.station.clone(),
                            },
                            payload,
                        })
                        .collect());
                }
                FetchOutcome::Empty(redelivery_due) => {
                    if Instant::now() >= deadline {
                        return Ok(Vec::new());
                    }

                    let wake_at = redelivery_due.map_or(deadline, |due| due.min(deadline));
                    let _ = timeout_at(wake_at, notified).await;
                }
            }
        }
    }

    async fn ack(&self, handle: Self::Handle) -> Result<(), Self::Error> {
        self.ensure_open()?;

        self.server
            .settle(&handle.station, &handle.group, handle.seq, true)
            .await
    }

    async fn nack(&self, handle: Self::Handle) -> Result<(), Self::Error> {
        self.ensure_open()?;

        self.server
            .settle(&handle.station, &handle.group, handle.seq, false)
            .await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(connection_id = %self.connection_id, "memory session closed");
            // Wake fetches parked on this session.
            self.server.notify().notify_waiters();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use assert_matches::assert_matches;
    use bytes::Bytes;
    use memphis_broker::{BrokerError, BrokerErrorKind, ConsumerSettings, Retention, StationSettings};

    fn settings(max_ack_time: Duration, max_msg_deliveries: u32) -> ConsumerSettings {
        ConsumerSettings {
            batch_max_wait: Duration::from_millis(100),
            batch_size: 10,
            max_ack_time,
            max_msg_deliveries,
            pull_interval: Duration::from_millis(100),
        }
    }

    async fn setup(station_settings: StationSettings) -> MemoryBroker {
        let broker = MemoryBroker::connect("test".to_string(), MemoryBrokerOptions::default())
            .await
            .unwrap();

        broker
            .control(ControlRequest::CreateFactory {
                name: "factory".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        broker
            .control(ControlRequest::CreateStation {
                name: "station".to_string(),
                factory: "factory".to_string(),
                settings: station_settings,
            })
            .await
            .unwrap();

        broker
    }

    async fn add_consumer(broker: &MemoryBroker, name: &str, settings: ConsumerSettings) {
        broker
            .control(ControlRequest::CreateConsumer {
                name: name.to_string(),
                station: "station".to_string(),
                group: name.to_string(),
                connection_id: "test".to_string(),
                settings,
            })
            .await
            .unwrap();
    }

    async fn publish(broker: &MemoryBroker, payload: &'static str) {
        broker
            .publish(Publication {
                connection_id: "test".to_string(),
                payload: Bytes::from(payload),
                producer: "producer".to_string(),
                station: "station".to_string(),
            })
            .await
            .unwrap();
    }

    fn fetch_request(group: &str, batch_max_wait: Duration) -> FetchRequest {
        FetchRequest {
            batch_max_wait,
            batch_size: 10,
            consumer: group.to_string(),
            group: group.to_string(),
            station: "station".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_producer_rejected() {
        let broker = setup(StationSettings::default()).await;

        let create = ControlRequest::CreateProducer {
            name: "producer".to_string(),
            station: "station".to_string(),
            connection_id: "test".to_string(),
        };

        broker.control(create.clone()).await.unwrap();
        let error = broker.control(create).await.unwrap_err();

        assert_eq!(error.kind(), BrokerErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_factory_removal_cascades_to_its_stations_only() {
        let broker = setup(StationSettings::default()).await;
        let server = broker.server().clone();

        broker
            .control(ControlRequest::CreateFactory {
                name: "default".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        broker
            .control(ControlRequest::CreateStation {
                name: "other".to_string(),
                factory: "default".to_string(),
                settings: StationSettings::default(),
            })
            .await
            .unwrap();

        broker
            .control(ControlRequest::RemoveFactory {
                name: "factory".to_string(),
            })
            .await
            .unwrap();

        assert!(!server.station_exists("station").await);
        assert!(server.station_exists("other").await);
    }

    #[tokio::test]
    async fn test_fetch_returns_empty_batch_after_wait() {
        let broker = setup(StationSettings::default()).await;
        add_consumer(&broker, "consumer", settings(Duration::from_secs(30), 10)).await;

        let started = Instant::now();
        let batch = broker
            .fetch(fetch_request("consumer", Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_fetch_wakes_on_publish() {
        let broker = setup(StationSettings::default()).await;
        add_consumer(&broker, "consumer", settings(Duration::from_secs(30), 10)).await;

        let fetching = tokio::spawn({
            let broker = broker.clone();
            async move {
                broker
                    .fetch(fetch_request("consumer", Duration::from_secs(5)))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        publish(&broker, "hello").await;

        let batch = tokio::time::timeout(Duration::from_secs(1), fetching)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_unacked_messages_are_redelivered_then_dead_lettered() {
        let broker = setup(StationSettings::default()).await;
        let server = broker.server().clone();
        add_consumer(&broker, "consumer", settings(Duration::from_millis(20), 2)).await;
        publish(&broker, "stubborn").await;

        let request = fetch_request("consumer", Duration::from_millis(200));

        let first = broker.fetch(request.clone()).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = broker.fetch(request.clone()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].payload, Bytes::from("stubborn"));

        let third = broker.fetch(request).await.unwrap();
        assert!(third.is_empty());

        assert_eq!(
            server.dead_letters("station", "consumer").await,
            vec![Bytes::from("stubborn")]
        );
        assert_eq!(server.pending_count("station", "consumer").await, 0);
    }

    #[tokio::test]
    async fn test_acked_messages_are_not_redelivered() {
        let broker = setup(StationSettings::default()).await;
        add_consumer(&broker, "consumer", settings(Duration::from_millis(20), 5)).await;
        publish(&broker, "once").await;

        let request = fetch_request("consumer", Duration::from_millis(100));

        let mut batch = broker.fetch(request.clone()).await.unwrap();
        broker.ack(batch.remove(0).handle).await.unwrap();

        assert!(broker.fetch(request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_resume_after_last_delivered() {
        let broker = setup(StationSettings::default()).await;
        add_consumer(&broker, "consumer", settings(Duration::from_secs(30), 5)).await;
        for payload in ["one", "two", "three"] {
            publish(&broker, payload).await;
        }

        let request = FetchRequest {
            batch_size: 2,
            ..fetch_request("consumer", Duration::from_millis(100))
        };

        let first = broker.fetch(request.clone()).await.unwrap();
        let second = broker.fetch(request).await.unwrap();

        let payloads: Vec<Bytes> = first
            .iter()
            .chain(second.iter())
            .map(|delivery| delivery.payload.clone())
            .collect();
        assert_eq!(
            payloads,
            vec![Bytes::from("one"), Bytes::from("two"), Bytes::from("three")]
        );
    }

    #[tokio::test]
    async fn test_nack_redelivers_immediately() {
        let broker = setup(StationSettings::default()).await;
        add_consumer(&broker, "consumer", settings(Duration::from_secs(30), 5)).await;
        publish(&broker, "again").await;

        let request = fetch_request("consumer", Duration::from_millis(100));

        let mut batch = broker.fetch(request.clone()).await.unwrap();
        broker.nack(batch.remove(0).handle).await.unwrap();

        let batch = broker.fetch(request).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, Bytes::from("again"));
    }

    #[tokio::test]
    async fn test_message_retention() {
        let broker = setup(StationSettings {
            retention: Retention::Messages(2),
            ..StationSettings::default()
        })
        .await;
        let server = broker.server().clone();

        publish(&broker, "one").await;
        publish(&broker, "two").await;
        publish(&broker, "three").await;

        assert_eq!(server.message_count("station").await, 2);

        add_consumer(&broker, "late", settings(Duration::from_secs(30), 5)).await;
        let batch = broker
            .fetch(fetch_request("late", Duration::from_millis(50)))
            .await
            .unwrap();

        let payloads: Vec<Bytes> = batch.into_iter().map(|d| d.payload).collect();
        assert_eq!(payloads, vec![Bytes::from("two"), Bytes::from("three")]);
    }

    #[tokio::test]
    async fn test_injected_fetch_failures() {
        let broker = setup(StationSettings::default()).await;
        add_consumer(&broker, "consumer", settings(Duration::from_secs(30), 5)).await;
        broker.server().fail_next_fetches(1).await;

        let request = fetch_request("consumer", Duration::from_millis(10));

        assert_matches!(broker.fetch(request.clone()).await, Err(Error::Unavailable));
        assert_matches!(broker.fetch(request).await, Ok(batch) if batch.is_empty());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let broker = setup(StationSettings::default()).await;

        broker.close().await.unwrap();
        broker.close().await.unwrap();

        assert_matches!(
            broker
                .control(ControlRequest::RemoveStation {
                    name: "station".to_string()
                })
                .await,
            Err(Error::Closed)
        );
    }

    #[tokio::test]
    async fn test_offline_server_refuses_sessions() {
        let server = MemoryServer::new();
        server.set_online(false).await;

        let result = MemoryBroker::connect("test".to_string(), MemoryBrokerOptions { server }).await;

        assert_matches!(result, Err(Error::Unavailable));
    }

    #[tokio::test]
    async fn test_offline_server_refuses_control_requests() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(
            "test".to_string(),
            MemoryBrokerOptions {
                server: server.clone(),
            },
        )
        .await
        .unwrap();

        server.set_online(false).await;
        let request = ControlRequest::CreateFactory {
            name: "factory".to_string(),
            description: String::new(),
        };

        assert_matches!(broker.control(request.clone()).await, Err(Error::Unavailable));
        assert!(!server.factory_exists("factory").await);

        server.set_online(true).await;
        assert!(broker.control(request).await.is_ok());
    }
}
