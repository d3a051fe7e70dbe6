//! Implementation of a memphis broker session over NATS and `JetStream`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod wire;

pub use error::Error;

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::{self, AckKind, Context as JetStreamContext};
use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use memphis_broker::{
    Broker, BrokerOptions, ControlRequest, Delivery, DeliveryHandle, FetchRequest, Publication,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Options for connecting to a memphis broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsBrokerOptions {
    /// Token presented when connecting.
    pub connection_token: String,

    /// Broker host name.
    pub host: String,

    /// Reconnect attempts before giving up.
    pub max_reconnects: usize,

    /// Broker port.
    pub port: u16,

    /// Whether to reconnect after losing the connection.
    pub reconnect: bool,

    /// Delay between reconnect attempts.
    pub reconnect_interval: Duration,

    /// Timeout for connecting and for each request.
    pub timeout: Duration,

    /// Application user the session runs as.
    pub username: String,
}

impl Default for NatsBrokerOptions {
    fn default() -> Self {
        Self {
            connection_token: String::new(),
            host: "localhost".to_string(),
            max_reconnects: 3,
            port: 6666,
            reconnect: true,
            reconnect_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(15),
            username: String::new(),
        }
    }
}
impl BrokerOptions for NatsBrokerOptions {}

/// A `JetStream` message awaiting acknowledgement.
pub struct NatsDeliveryHandle(jetstream::Message);
impl DeliveryHandle for NatsDeliveryHandle {}

impl Debug for NatsDeliveryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("NatsDeliveryHandle")
            .field("subject", &self.0.subject)
            .finish_non_exhaustive()
    }
}

/// A session with a memphis broker over NATS.
#[derive(Clone)]
pub struct NatsBroker {
    client: Client,
    closed: Arc<AtomicBool>,
    connection_id: String,
    // Pull consumers keyed by (station, group).
    consumers: Arc<DashMap<(String, String), PullConsumer>>,
    jetstream: JetStreamContext,
}

impl Debug for NatsBroker {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("NatsBroker")
            .field("connection_id", &self.connection_id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl NatsBroker {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        Ok(())
    }

    async fn pull_consumer(&self, station: &str, group: &str) -> Result<PullConsumer, Error> {
        let key = (station.to_string(), group.to_string());

        let cached = self.consumers.get(&key).map(|entry| entry.value().clone());
        if let Some(consumer) = cached {
            return Ok(consumer);
        }

        let stream = self
            .jetstream
            .get_stream(wire::stream_name(station))
            .await
            .map_err(|e| Error::nats("get_stream", e))?;

        let consumer: PullConsumer = stream
            .get_consumer(&wire::stream_name(group))
            .await
            .map_err(|e| Error::nats("get_consumer", e))?;

        debug!(station, group, "cached pull consumer");
        self.consumers.insert(key, consumer.clone());

        Ok(consumer)
    }
}

#[async_trait]
impl Broker for NatsBroker {
    type Error = Error;
    type Options = NatsBrokerOptions;
    type Handle = NatsDeliveryHandle;

    #[instrument(skip(options), fields(host = %options.host, port = options.port))]
    async fn connect(connection_id: String, options: NatsBrokerOptions) -> Result<Self, Error> {
        let mut connect_options = ConnectOptions::with_token(options.connection_token.clone())
            .name(&format!("{connection_id}::{}", options.username))
            .connection_timeout(options.timeout)
            .request_timeout(Some(options.timeout));

        connect_options = if options.reconnect {
            let interval = options.reconnect_interval;
            connect_options
                .max_reconnects(options.max_reconnects)
                .reconnect_delay_callback(move |_| interval)
        } else {
            connect_options.max_reconnects(0)
        };

        let client = connect_options
            .connect(format!("{}:{}", options.host, options.port))
            .await
            .map_err(|e| Error::Connect(e.into()))?;

        info!(connection_id = %connection_id, "connected to memphis broker");

        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
            closed: Arc::new(AtomicBool::new(false)),
            connection_id,
            consumers: Arc::new(DashMap::new()),
        })
    }

    async fn control(&self, request: ControlRequest) -> Result<(), Error> {
        self.ensure_open()?;

        let operation = request.operation();
        let (subject, body) = wire::encode(&request)?;

        let reply = self
            .client
            .request(subject, Bytes::from(body))
            .await
            .map_err(|e| Error::nats(operation, e))?;

        if !reply.payload.is_empty() {
            let reason = String::from_utf8_lossy(&reply.payload).into_owned();
            warn!(operation, reason = %reason, "control request rejected");
            return Err(Error::rejected(operation, reason));
        }

        if let ControlRequest::RemoveStation { name } = &request {
            self.consumers.retain(|(station, _), _| station != name);
        }

        Ok(())
    }

    async fn publish(&self, publication: Publication) -> Result<(), Error> {
        self.ensure_open()?;

        let mut headers = HeaderMap::new();
        headers.insert("connectionId", publication.connection_id.as_str());
        headers.insert("producedBy", publication.producer.as_str());

        let subject = format!("{}.final", wire::stream_name(&publication.station));

        let ack = self
            .jetstream
            .publish_with_headers(subject, headers, publication.payload)
            .await
            .map_err(|e| Error::nats("publish", e))?;

        ack.await.map_err(|e| Error::nats("publish", e))?;

        Ok(())
    }

    async fn fetch(
        &self,
        request: FetchRequest,
    ) -> Result<Vec<Delivery<NatsDeliveryHandle>>, Error> {
        self.ensure_open()?;

        let consumer = self
            .pull_consumer(&request.station, &request.group)
            .await?;

        let mut batch = consumer
            .batch()
            .max_messages(request.batch_size)
            .expires(request.batch_max_wait)
            .messages()
            .await
            .map_err(|e| Error::nats("fetch", e))?;

        let mut deliveries = Vec::with_capacity(request.batch_size);
        while let Some(message) = batch.next().await {
            let message = message.map_err(|e| Error::nats("fetch", e))?;

            deliveries.push(Delivery {
                payload: message.payload.clone(),
                handle: NatsDeliveryHandle(message),
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, handle: NatsDeliveryHandle) -> Result<(), Error> {
        self.ensure_open()?;

        handle.0.ack().await.map_err(|e| Error::nats("ack", e))
    }

    async fn nack(&self, handle: NatsDeliveryHandle) -> Result<(), Error> {
        self.ensure_open()?;

        handle
            .0
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| Error::nats("nack", e))
    }

    async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.consumers.clear();
        self.client
            .flush()
            .await
            .map_err(|e| Error::nats("close", e))?;

        info!(connection_id = %self.connection_id, "memphis session closed");

        Ok(())
    }
}
