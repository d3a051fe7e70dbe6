//! JSON bodies of the broker's control subjects.

use memphis_broker::{ControlRequest, Retention, StorageType};
use serde::Serialize;

const FACTORY_CREATIONS: &str = "$memphis_factory_creations";
const FACTORY_DESTRUCTIONS: &str = "$memphis_factory_destructions";
const STATION_CREATIONS: &str = "$memphis_station_creations";
const STATION_DESTRUCTIONS: &str = "$memphis_station_destructions";
const PRODUCER_CREATIONS: &str = "$memphis_producer_creations";
const PRODUCER_DESTRUCTIONS: &str = "$memphis_producer_destructions";
const CONSUMER_CREATIONS: &str = "$memphis_consumer_creations";
const CONSUMER_DESTRUCTIONS: &str = "$memphis_consumer_destructions";

const APPLICATION: &str = "application";

#[derive(Serialize)]
struct CreateFactory<'a> {
    factory_name: &'a str,
    factory_description: &'a str,
}

#[derive(Serialize)]
struct RemoveFactory<'a> {
    factory_name: &'a str,
}

#[derive(Serialize)]
struct CreateStation<'a> {
    name: &'a str,
    factory_name: &'a str,
    retention_type: &'static str,
    retention_value: u64,
    storage_type: &'static str,
    replicas: u32,
}

#[derive(Serialize)]
struct RemoveStation<'a> {
    station_name: &'a str,
}

#[derive(Serialize)]
struct CreateProducer<'a> {
    name: &'a str,
    station_name: &'a str,
    connection_id: &'a str,
    producer_type: &'static str,
}

#[derive(Serialize)]
struct CreateConsumer<'a> {
    name: &'a str,
    station_name: &'a str,
    connection_id: &'a str,
    consumer_type: &'static str,
    consumers_group: &'a str,
    max_ack_time_ms: u64,
    max_msg_deliveries: u32,
}

#[derive(Serialize)]
struct RemoveMember<'a> {
    name: &'a str,
    station_name: &'a str,
}

const fn retention(retention: Retention) -> (&'static str, u64) {
    match retention {
        Retention::MaxAge(age) => ("message_age_sec", age.as_secs()),
        Retention::Messages(count) => ("messages", count),
        Retention::Bytes(bytes) => ("bytes", bytes),
    }
}

const fn storage(storage: StorageType) -> &'static str {
    match storage {
        StorageType::File => "file",
        StorageType::Memory => "memory",
    }
}

/// The subject and JSON body for a control request.
pub fn encode(request: &ControlRequest) -> Result<(&'static str, Vec<u8>), serde_json::Error> {
    match request {
        ControlRequest::CreateFactory { name, description } => Ok((
            FACTORY_CREATIONS,
            serde_json::to_vec(&CreateFactory {
                factory_name: name,
                factory_description: description,
            })?,
        )),
        ControlRequest::RemoveFactory { name } => Ok((
            FACTORY_DESTRUCTIONS,
            serde_json::to_vec(&RemoveFactory { factory_name: name })?,
        )),
        ControlRequest::CreateStation {
            name,
            factory,
            settings,
        } => {
            let (retention_type, retention_value) = retention(settings.retention);

            Ok((
                STATION_CREATIONS,
                serde_json::to_vec(&CreateStation {
                    name,
                    factory_name: factory,
                    retention_type,
                    retention_value,
                    storage_type: storage(settings.storage),
                    replicas: settings.replicas,
                })?,
            ))
        }
        ControlRequest::RemoveStation { name } => Ok((
            STATION_DESTRUCTIONS,
            serde_json::to_vec(&RemoveStation { station_name: name })?,
        )),
        ControlRequest::CreateProducer {
            name,
            station,
            connection_id,
        } => Ok((
            PRODUCER_CREATIONS,
            serde_json::to_vec(&CreateProducer {
                name,
                station_name: station,
                connection_id,
                producer_type: APPLICATION,
            })?,
        )),
        ControlRequest::RemoveProducer { name, station } => Ok((
            PRODUCER_DESTRUCTIONS,
            serde_json::to_vec(&RemoveMember {
                name,
                station_name: station,
            })?,
        )),
        ControlRequest::CreateConsumer {
            name,
            station,
            group,
            connection_id,
            settings,
        } => Ok((
            CONSUMER_CREATIONS,
            serde_json::to_vec(&CreateConsumer {
                name,
                station_name: station,
                connection_id,
                consumer_type: APPLICATION,
                consumers_group: group,
                max_ack_time_ms: u64::try_from(settings.max_ack_time.as_millis())
                    .unwrap_or(u64::MAX),
                max_msg_deliveries: settings.max_msg_deliveries,
            })?,
        )),
        ControlRequest::RemoveConsumer { name, station } => Ok((
            CONSUMER_DESTRUCTIONS,
            serde_json::to_vec(&RemoveMember {
                name,
                station_name: station,
            })?,
        )),
    }
}

/// `JetStream` names cannot contain `.`, which memphis names may.
pub fn stream_name(station: &str) -> String {
    station.replace('.', "#")
}
