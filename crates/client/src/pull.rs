use crate::entity::EntityKind;
use crate::error::Error;

use std::ops::ControlFlow;
use std::time::Duration;

use bytes::Bytes;
use memphis_broker::{Broker, BrokerError, BrokerErrorKind, Delivery, FetchRequest};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Background task feeding a consumer's channel from periodic fetches.
pub(crate) struct PullLoop<B: Broker> {
    pub(crate) broker: B,
    pub(crate) errors: mpsc::Sender<Error>,
    pub(crate) interval: Duration,
    pub(crate) output: mpsc::Sender<Bytes>,
    pub(crate) request: FetchRequest,
    pub(crate) shutdown: CancellationToken,
}

impl<B: Broker> PullLoop<B> {
    pub(crate) async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            station = %self.request.station,
            consumer = %self.request.consumer,
            "pull loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                fetched = self.broker.fetch(self.request.clone()) => fetched,
            };

            match fetched {
                Ok(batch) => {
                    trace!(size = batch.len(), "pulled batch");

                    if self.deliver(batch).await.is_break() {
                        break;
                    }
                }
                Err(e) => self.report(self.fetch_error(e)),
            }
        }

        // Marks the consumer stopped when the loop ends on its own.
        self.shutdown.cancel();

        debug!(
            station = %self.request.station,
            consumer = %self.request.consumer,
            "pull loop stopped"
        );
    }

    /// Hands each message to the consumer, acking it once accepted.
    async fn deliver(&self, batch: Vec<Delivery<B::Handle>>) -> ControlFlow<()> {
        let mut deliveries = batch.into_iter();

        while let Some(Delivery { handle, payload }) = deliveries.next() {
            let accepted = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => false,
                sent = self.output.send(payload) => sent.is_ok(),
            };

            if !accepted {
                let undelivered = std::iter::once(handle)
                    .chain(deliveries.by_ref().map(|delivery| delivery.handle));
                self.release(undelivered).await;

                return ControlFlow::Break(());
            }

            if let Err(e) = self.broker.ack(handle).await {
                self.report(Error::transport(e));
            }
        }

        ControlFlow::Continue(())
    }

    /// Gives undelivered messages back to the broker.
    async fn release(&self, handles: impl Iterator<Item = B::Handle> + Send) {
        for handle in handles {
            if let Err(e) = self.broker.nack(handle).await {
                debug!(error = %e, "failed to release undelivered message");
            }
        }
    }

    fn fetch_error(&self, error: B::Error) -> Error {
        match error.kind() {
            BrokerErrorKind::NotFound => {
                Error::not_found(EntityKind::Consumer, self.request.consumer.as_str())
            }
            _ => Error::transport(error),
        }
    }

    fn report(&self, error: Error) {
        warn!(
            station = %self.request.station,
            consumer = %self.request.consumer,
            error = %error,
            "pull failed"
        );

        // A full or unread error channel drops the report.
        let _ = self.errors.try_send(error);
    }
}
