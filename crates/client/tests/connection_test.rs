mod common;

use common::{MemoryConnection, connect, fast_options, next_message};

use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use memphis_broker_memory::{MemoryBrokerOptions, MemoryServer};
use memphis_client::{
    Connection, ConsumerState, Entity, EntityKind, Error, ProduceOptions, StationOptions,
};
use tokio::time::timeout;
use tracing_test::traced_test;

#[tokio::test]
async fn test_connections_get_distinct_ids() {
    let server = MemoryServer::new();

    let first = connect(&server).await;
    let second = connect(&server).await;

    assert!(!first.id().is_empty());
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn test_connect_to_offline_server() {
    let server = MemoryServer::new();
    server.set_online(false).await;

    let result: Result<MemoryConnection, _> = Connection::connect(MemoryBrokerOptions {
        server: server.clone(),
    })
    .await;

    assert_matches!(result, Err(Error::Connect(_)));
}

#[tokio::test]
#[traced_test]
async fn test_close_stops_consumers() {
    let server = MemoryServer::new();
    let connection = connect(&server).await;
    let mut consumer = connection
        .create_consumer("consumer_name_a", "station_name_1", fast_options())
        .await
        .unwrap();

    connection.close().await.unwrap();

    assert!(connection.is_closed());
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(
        timeout(Duration::from_secs(1), consumer.recv())
            .await
            .unwrap(),
        None
    );

    assert_matches!(
        connection
            .create_producer("producer_name_a", "station_name_1")
            .await,
        Err(Error::ConnectionClosed)
    );
    assert_matches!(consumer.remove().await, Err(Error::ConnectionClosed));

    // Closing again is fine.
    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_close_fails_pending_produce_calls() {
    let server = MemoryServer::new();
    let connection = connect(&server).await;
    let producer = connection
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    connection.close().await.unwrap();

    assert_matches!(
        producer.produce("too late", ProduceOptions::default()).await,
        Err(Error::ConnectionClosed)
    );
}

#[tokio::test]
async fn test_clones_share_the_session() {
    let server = MemoryServer::new();
    let connection = connect(&server).await;
    let clone = connection.clone();

    let _producer = connection
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    assert_eq!(clone.id(), connection.id());
    assert_matches!(
        clone
            .create_producer("producer_name_a", "station_name_1")
            .await,
        Err(Error::DuplicateName { .. })
    );

    clone.close().await.unwrap();
    assert!(connection.is_closed());
}

#[tokio::test]
async fn test_connections_share_stations() {
    let server = MemoryServer::new();
    let publisher = connect(&server).await;
    let subscriber = connect(&server).await;

    let station = publisher
        .create_station("station_name_1", StationOptions::default())
        .await
        .unwrap();
    let producer = station.create_producer("producer_name_a").await.unwrap();

    // The existing station is reused rather than reported as a duplicate.
    let mut consumer = subscriber
        .create_consumer("consumer_name_a", "station_name_1", fast_options())
        .await
        .unwrap();

    producer
        .produce("across sessions", ProduceOptions::default())
        .await
        .unwrap();

    assert_eq!(
        next_message(&mut consumer).await,
        Bytes::from("across sessions")
    );
}

#[tokio::test]
#[traced_test]
async fn test_destroy_by_name() {
    let server = MemoryServer::new();
    let owner = connect(&server).await;
    let admin = connect(&server).await;

    let factory = owner.create_factory("factory_name_1", "").await.unwrap();
    factory.create_station("station_name_1").await.unwrap();
    let _producer = owner
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    admin
        .destroy(Entity::Producer {
            name: "producer_name_a".to_string(),
            station: "station_name_1".to_string(),
        })
        .await
        .unwrap();
    assert!(!server.producer_exists("station_name_1", "producer_name_a").await);

    admin
        .destroy(Entity::Station("station_name_1".to_string()))
        .await
        .unwrap();
    assert!(!server.station_exists("station_name_1").await);

    admin
        .destroy(Entity::Factory("factory_name_1".to_string()))
        .await
        .unwrap();
    assert!(!server.factory_exists("factory_name_1").await);

    assert_matches!(
        admin
            .destroy(Entity::Factory("factory_name_1".to_string()))
            .await,
        Err(Error::NotFound {
            kind: EntityKind::Factory,
            ..
        })
    );
}

#[tokio::test]
async fn test_destroy_consumer_stops_local_pulling() {
    let server = MemoryServer::new();
    let connection = connect(&server).await;
    let consumer = connection
        .create_consumer("consumer_name_a", "station_name_1", fast_options())
        .await
        .unwrap();

    connection
        .destroy(Entity::Consumer {
            name: "consumer_name_a".to_string(),
            station: "station_name_1".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert!(!server.consumer_exists("station_name_1", "consumer_name_a").await);
}

#[tokio::test]
async fn test_failed_destroy_keeps_local_state() {
    let server = MemoryServer::new();
    let connection = connect(&server).await;
    let consumer = connection
        .create_consumer("consumer_name_a", "station_name_1", fast_options())
        .await
        .unwrap();
    let _producer = connection
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    server.set_online(false).await;

    assert_matches!(
        connection
            .destroy(Entity::Consumer {
                name: "consumer_name_a".to_string(),
                station: "station_name_1".to_string(),
            })
            .await,
        Err(Error::Transport(_))
    );
    assert_matches!(
        connection
            .destroy(Entity::Producer {
                name: "producer_name_a".to_string(),
                station: "station_name_1".to_string(),
            })
            .await,
        Err(Error::Transport(_))
    );
    assert_eq!(consumer.state(), ConsumerState::Pulling);

    server.set_online(true).await;

    assert!(server.consumer_exists("station_name_1", "consumer_name_a").await);
    assert_matches!(
        connection
            .create_producer("producer_name_a", "station_name_1")
            .await,
        Err(Error::DuplicateName {
            kind: EntityKind::Producer,
            ..
        })
    );
}

#[tokio::test]
#[traced_test]
async fn test_factory_removal_clears_entries_on_reused_station() {
    let server = MemoryServer::new();
    let owner = connect(&server).await;
    let user = connect(&server).await;

    let factory = owner.create_factory("factory_name_1", "").await.unwrap();
    factory.create_station("station_name_1").await.unwrap();

    // Reuses the station owned by factory_name_1.
    let _producer = user
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    user.destroy(Entity::Factory("factory_name_1".to_string()))
        .await
        .unwrap();
    assert!(!server.station_exists("station_name_1").await);

    let producer = user
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    assert_eq!(
        server.station_factory("station_name_1").await.as_deref(),
        Some("default")
    );
    producer
        .produce("again", ProduceOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_factory_removal_keeps_entries_on_surviving_reused_station() {
    let server = MemoryServer::new();
    let owner = connect(&server).await;
    let user = connect(&server).await;

    let kept = owner.create_factory("factory_name_1", "").await.unwrap();
    kept.create_station("station_name_1").await.unwrap();
    user.create_factory("factory_name_2", "").await.unwrap();

    let _producer = user
        .create_producer("producer_name_a", "station_name_1")
        .await
        .unwrap();

    user.destroy(Entity::Factory("factory_name_2".to_string()))
        .await
        .unwrap();

    assert_matches!(
        user.create_producer("producer_name_a", "station_name_1")
            .await,
        Err(Error::DuplicateName {
            kind: EntityKind::Producer,
            ..
        })
    );
}
