use crate::error::Error;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use memphis_broker::{ConsumerSettings, ControlRequest, Retention, StationSettings};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
struct Stored {
    payload: Bytes,
    received_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    deliveries: u32,
    payload: Bytes,
}

#[derive(Debug)]
struct GroupState {
    cursor: u64,
    dead_letters: Vec<Bytes>,
    pending: BTreeMap<u64, Pending>,
    settings: ConsumerSettings,
}

impl GroupState {
    fn exhausted(&self, deliveries: u32) -> bool {
        self.settings.max_msg_deliveries != 0 && deliveries >= self.settings.max_msg_deliveries
    }

    /// Expired deliveries first (oldest sequence first), then unseen messages.
    fn take_ready(
        &mut self,
        log: &VecDeque<Stored>,
        limit: usize,
        now: Instant,
    ) -> Vec<(u64, Bytes)> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();

        let mut ready = Vec::new();

        for seq in expired {
            let Some(pending) = self.pending.get(&seq) else {
                continue;
            };

            if self.exhausted(pending.deliveries) {
                if let Some(pending) = self.pending.remove(&seq) {
                    debug!(seq, deliveries = pending.deliveries, "dead-lettering message");
                    self.dead_letters.push(pending.payload);
                }
                continue;
            }

            if ready.len() < limit {
                if let Some(pending) = self.pending.get_mut(&seq) {
                    pending.deliveries += 1;
                    pending.deadline = now + self.settings.max_ack_time;
                    trace!(seq, deliveries = pending.deliveries, "redelivering message");
                    ready.push((seq, pending.payload.clone()));
                }
            }
        }

        let cursor = self.cursor;
        for stored in log.iter().filter(|stored| stored.seq >= cursor) {
            if ready.len() >= limit {
                break;
            }

            self.pending.insert(
                stored.seq,
                Pending {
                    deadline: now + self.settings.max_ack_time,
                    deliveries: 1,
                    payload: stored.payload.clone(),
                },
            );
            self.cursor = stored.seq + 1;
            ready.push((stored.seq, stored.payload.clone()));
        }

        ready
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }
}

#[derive(Debug)]
struct StationState {
    bytes: u64,
    consumers: HashMap<String, String>,
    factory: String,
    groups: HashMap<String, GroupState>,
    log: VecDeque<Stored>,
    next_seq: u64,
    producers: HashSet<String>,
    settings: StationSettings,
}

impl StationState {
    fn new(factory: String, settings: StationSettings) -> Self {
        Self {
            bytes: 0,
            consumers: HashMap::new(),
            factory,
            groups: HashMap::new(),
            log: VecDeque::new(),
            next_seq: 1,
            producers: HashSet::new(),
            settings,
        }
    }

    fn append(&mut self, payload: Bytes) {
        let now = Instant::now();

        self.bytes += payload.len() as u64;
        self.log.push_back(Stored {
            payload,
            received_at: now,
            seq: self.next_seq,
        });
        self.next_seq += 1;

        self.enforce_retention(now);
    }

    fn enforce_retention(&mut self, now: Instant) {
        loop {
            let Some(oldest) = self.log.front() else {
                return;
            };

            let evict = match self.settings.retention {
                Retention::MaxAge(max_age) => now.duration_since(oldest.received_at) > max_age,
                Retention::Messages(max) => self.log.len() as u64 > max,
                Retention::Bytes(max) => self.bytes > max,
            };

            if !evict {
                return;
            }

            if let Some(evicted) = self.log.pop_front() {
                self.bytes -= evicted.payload.len() as u64;
                trace!(seq = evicted.seq, "evicted message by retention");
            }
        }
    }

    fn first_seq(&self) -> u64 {
        self.log.front().map_or(self.next_seq, |stored| stored.seq)
    }
}

#[derive(Debug)]
struct ServerState {
    ack_delay: Duration,
    factories: HashMap<String, String>,
    failing_fetches: usize,
    online: bool,
    stations: HashMap<String, StationState>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            ack_delay: Duration::ZERO,
            factories: HashMap::new(),
            failing_fetches: 0,
            online: true,
            stations: HashMap::new(),
        }
    }
}

impl ServerState {
    fn station_mut(&mut self, name: &str) -> Result<&mut StationState, Error> {
        self.stations
            .get_mut(name)
            .ok_or_else(|| Error::not_found("station", name))
    }

    fn apply(&mut self, request: ControlRequest) -> Result<(), Error> {
        match request {
            ControlRequest::CreateFactory { name, description } => {
                if self.factories.contains_key(&name) {
                    return Err(Error::already_exists("factory", name));
                }
                self.factories.insert(name, description);
            }
            ControlRequest::RemoveFactory { name } => {
                if self.factories.remove(&name).is_none() {
                    return Err(Error::not_found("factory", name));
                }
                self.stations.retain(|_, station| station.factory != name);
            }
            ControlRequest::CreateStation {
                name,
                factory,
                settings,
            } => {
                if !self.factories.contains_key(&factory) {
                    return Err(Error::not_found("factory", factory));
                }
                if self.stations.contains_key(&name) {
                    return Err(Error::already_exists("station", name));
                }
                self.stations
                    .insert(name, StationState::new(factory, settings));
            }
            ControlRequest::RemoveStation { name } => {
                if self.stations.remove(&name).is_none() {
                    return Err(Error::not_found("station", name));
                }
            }
            ControlRequest::CreateProducer { name, station, .. } => {
                let station = self.station_mut(&station)?;
                if !station.producers.insert(name.clone()) {
                    return Err(Error::already_exists("producer", name));
                }
            }
            ControlRequest::RemoveProducer { name, station } => {
                if !self.station_mut(&station)?.producers.remove(&name) {
                    return Err(Error::not_found("producer", name));
                }
            }
            ControlRequest::CreateConsumer {
                name,
                station,
                group,
                settings,
                ..
            } => {
                let station = self.station_mut(&station)?;
                if station.consumers.contains_key(&name) {
                    return Err(Error::already_exists("consumer", name));
                }
                let cursor = station.first_seq();
                station
                    .groups
                    .entry(group.clone())
                    .or_insert_with(|| GroupState {
                        cursor,
                        dead_letters: Vec::new(),
                        pending: BTreeMap::new(),
                        settings,
                    });
                station.consumers.insert(name, group);
            }
            ControlRequest::RemoveConsumer { name, station } => {
                if self.station_mut(&station)?.consumers.remove(&name).is_none() {
                    return Err(Error::not_found("consumer", name));
                }
            }
        }

        Ok(())
    }
}

/// What a fetch attempt found.
pub(crate) enum FetchOutcome {
    /// Messages ready for delivery.
    Ready(Vec<(u64, Bytes)>),

    /// Nothing ready; retry no later than the given instant.
    Empty(Option<Instant>),
}

/// An in-process broker shared by every session connected to it.
#[derive(Clone, Debug, Default)]
pub struct MemoryServer {
    notify: Arc<Notify>,
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    /// Creates an empty, online server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the server on- or offline. Offline servers refuse new sessions and
    /// control requests.
    pub async fn set_online(&self, online: bool) {
        self.state.lock().await.online = online;
    }

    /// Delays every publish acknowledgment by `delay`.
    pub async fn set_ack_delay(&self, delay: Duration) {
        self.state.lock().await.ack_delay = delay;
    }

    /// Makes the next `count` fetches fail as if the broker were unreachable.
    pub async fn fail_next_fetches(&self, count: usize) {
        self.state.lock().await.failing_fetches = count;
    }

    /// Whether a factory exists.
    pub async fn factory_exists(&self, name: &str) -> bool {
        self.state.lock().await.factories.contains_key(name)
    }

    /// Whether a station exists.
    pub async fn station_exists(&self, name: &str) -> bool {
        self.state.lock().await.stations.contains_key(name)
    }

    /// The factory a station belongs to.
    pub async fn station_factory(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .stations
            .get(name)
            .map(|station| station.factory.clone())
    }

    /// Settings a station was created with.
    pub async fn station_settings(&self, name: &str) -> Option<StationSettings> {
        self.state
            .lock()
            .await
            .stations
            .get(name)
            .map(|station| station.settings.clone())
    }

    /// Whether a producer exists on a station.
    pub async fn producer_exists(&self, station: &str, name: &str) -> bool {
        self.state
            .lock()
            .await
            .stations
            .get(station)
            .is_some_and(|station| station.producers.contains(name))
    }

    /// Whether a consumer exists on a station.
    pub async fn consumer_exists(&self, station: &str, name: &str) -> bool {
        self.state
            .lock()
            .await
            .stations
            .get(station)
            .is_some_and(|station| station.consumers.contains_key(name))
    }

    /// Number of retained messages in a station.
    pub async fn message_count(&self, station: &str) -> usize {
        self.state
            .lock()
            .await
            .stations
            .get(station)
            .map_or(0, |station| station.log.len())
    }

    /// Number of unacknowledged deliveries of a consumer group.
    pub async fn pending_count(&self, station: &str, group: &str) -> usize {
        self.state
            .lock()
            .await
            .stations
            .get(station)
            .and_then(|station| station.groups.get(group))
            .map_or(0, |group| group.pending.len())
    }

    /// Messages a consumer group gave up on after `max_msg_deliveries` attempts.
    pub async fn dead_letters(&self, station: &str, group: &str) -> Vec<Bytes> {
        self.state
            .lock()
            .await
            .stations
            .get(station)
            .and_then(|station| station.groups.get(group))
            .map_or_else(Vec::new, |group| group.dead_letters.clone())
    }

    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }

    pub(crate) async fn is_online(&self) -> bool {
        self.state.lock().await.online
    }

    pub(crate) async fn control(&self, request: ControlRequest) -> Result<(), Error> {
        let result = self.state.lock().await.apply(request);
        // Removals end pending fetches early.
        self.notify.notify_waiters();
        result
    }

    pub(crate) async fn ack_delay(&self) -> Duration {
        self.state.lock().await.ack_delay
    }

    pub(crate) async fn append(&self, station: &str, payload: Bytes) -> Result<(), Error> {
        self.state.lock().await.station_mut(station)?.append(payload);
        self.notify.notify_waiters();
        Ok(())
    }

    pub(crate) async fn try_fetch(
        &self,
        station: &str,
        group: &str,
        limit: usize,
    ) -> Result<FetchOutcome, Error> {
        let mut state = self.state.lock().await;

        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(Error::Unavailable);
        }

        let station = state.station_mut(station)?;
        let StationState { groups, log, .. } = station;
        let group = groups
            .get_mut(group)
            .ok_or_else(|| Error::not_found("consumer group", group))?;

        let ready = group.take_ready(log, limit, Instant::now());
        if ready.is_empty() {
            Ok(FetchOutcome::Empty(group.next_deadline()))
        } else {
            Ok(FetchOutcome::Ready(ready))
        }
    }

    pub(crate) async fn settle(
        &self,
        station: &str,
        group: &str,
        seq: u64,
        ack: bool,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let group = state
            .station_mut(station)?
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::not_found("consumer group", group))?;

        if ack {
            group.pending.remove(&seq);
        } else if let Some(pending) = group.pending.get_mut(&seq) {
            pending.deadline = Instant::now();
        }
        drop(state);

        if !ack {
            self.notify.notify_waiters();
        }

        Ok(())
    }
}
