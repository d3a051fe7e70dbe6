#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use memphis_broker_memory::{MemoryBroker, MemoryBrokerOptions, MemoryServer};
use memphis_client::{Connection, Consumer, ConsumerOptions};
use tokio::time::timeout;

pub type MemoryConnection = Connection<MemoryBroker>;

pub async fn connect(server: &MemoryServer) -> MemoryConnection {
    Connection::connect(MemoryBrokerOptions {
        server: server.clone(),
    })
    .await
    .expect("Failed to connect")
}

/// Consumer options that pull quickly enough for tests.
pub fn fast_options() -> ConsumerOptions {
    ConsumerOptions {
        batch_max_wait: Duration::from_millis(50),
        pull_interval: Duration::from_millis(10),
        ..ConsumerOptions::default()
    }
}

pub async fn next_message(consumer: &mut Consumer<MemoryBroker>) -> Bytes {
    timeout(Duration::from_secs(5), consumer.recv())
        .await
        .expect("Timed out waiting for message")
        .expect("Consumer channel closed")
}
