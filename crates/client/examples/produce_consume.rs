use std::time::Duration;

use memphis_broker_memory::{MemoryBroker, MemoryBrokerOptions};
use memphis_client::{Connection, ConsumerOptions, ProduceOptions, StationOptions};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let connection: Connection<MemoryBroker> =
        Connection::connect(MemoryBrokerOptions::default()).await?;

    let factory = connection.create_factory("demo", "example factory").await?;
    let station = factory
        .create_station_with_options("greetings", StationOptions::default())
        .await?;

    let producer = station.create_producer("greeter").await?;
    let mut consumer = station
        .create_consumer(
            "listener",
            ConsumerOptions {
                pull_interval: Duration::from_millis(100),
                ..ConsumerOptions::default()
            },
        )
        .await?;

    for name in ["ada", "grace", "linus"] {
        producer
            .produce(format!("hello, {name}"), ProduceOptions::default())
            .await?;
    }

    for _ in 0..3 {
        if let Some(message) = consumer.recv().await {
            info!(message = %String::from_utf8_lossy(&message), "received");
        }
    }

    consumer.remove().await?;
    producer.remove().await?;
    station.remove().await?;
    factory.remove().await?;
    connection.close().await?;

    Ok(())
}
