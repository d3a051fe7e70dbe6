//! Local bookkeeping of the producers and consumers a connection created.

use crate::entity::EntityKind;
use crate::error::{Error, Result};

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct EntityKey {
    kind: EntityKind,
    name: String,
    station: String,
}

impl EntityKey {
    fn new(station: &str, kind: EntityKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            station: station.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    // Consumers carry the token that stops their pull loop.
    entities: HashMap<EntityKey, Option<CancellationToken>>,
    // Station name to owning factory, `None` for reused stations of unknown owner.
    stations: HashMap<String, Option<String>>,
}

impl RegistryState {
    fn drop_entries(&mut self, station: &str) -> usize {
        let mut removed = 0;

        self.entities.retain(|key, token| {
            if key.station != station {
                return true;
            }

            if let Some(token) = token.take() {
                token.cancel();
            }
            removed += 1;
            false
        });

        removed
    }

    fn drop_station(&mut self, station: &str) -> usize {
        self.stations.remove(station);
        self.drop_entries(station)
    }
}

/// Names taken by this connection, keyed by station and kind.
///
/// A name is reserved before the broker is asked to create the entity so two
/// concurrent creations of the same name cannot both reach the broker.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    state: Mutex<RegistryState>,
}

impl EntityRegistry {
    /// Reserves a name, failing if it is already in use on the station.
    pub fn reserve(&self, station: &str, kind: EntityKind, name: &str) -> Result<()> {
        let key = EntityKey::new(station, kind, name);
        let mut state = self.state.lock();

        if state.entities.contains_key(&key) {
            return Err(Error::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }

        state.entities.insert(key, None);
        drop(state);

        Ok(())
    }

    /// Attaches the token that stops a consumer when its entry is dropped.
    pub fn attach(&self, station: &str, name: &str, token: CancellationToken) {
        let key = EntityKey::new(station, EntityKind::Consumer, name);

        if let Some(slot) = self.state.lock().entities.get_mut(&key) {
            *slot = Some(token);
        } else {
            // Removed while the broker call was in flight.
            token.cancel();
        }
    }

    /// Whether a name is currently registered.
    pub fn contains(&self, station: &str, kind: EntityKind, name: &str) -> bool {
        self.state
            .lock()
            .entities
            .contains_key(&EntityKey::new(station, kind, name))
    }

    /// Drops a name, returning whether it was registered.
    pub fn release(&self, station: &str, kind: EntityKind, name: &str) -> bool {
        let removed = self
            .state
            .lock()
            .entities
            .remove(&EntityKey::new(station, kind, name));

        match removed {
            Some(token) => {
                if let Some(token) = token {
                    token.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Records a station the broker has just created.
    ///
    /// Entries left over from an earlier station of the same name are stale
    /// and get dropped.
    pub fn record_station(&self, station: &str, factory: &str) {
        let mut state = self.state.lock();

        let stale = state.drop_entries(station);
        state
            .stations
            .insert(station.to_string(), Some(factory.to_string()));
        drop(state);

        if stale > 0 {
            debug!(station, stale, "dropped entries of a replaced station");
        }
    }

    /// Records a station that already existed, whose factory is unknown.
    pub fn adopt_station(&self, station: &str) {
        self.state
            .lock()
            .stations
            .entry(station.to_string())
            .or_insert(None);
    }

    /// Whether this connection has created or reused the station.
    pub fn knows_station(&self, station: &str) -> bool {
        self.state.lock().stations.contains_key(station)
    }

    /// Drops a station and every entry registered on it.
    pub fn forget_station(&self, station: &str) {
        let removed = self.state.lock().drop_station(station);
        debug!(station, removed, "forgot station entries");
    }

    /// Drops every station of a factory along with their entries.
    ///
    /// Stations of unknown owner may have gone with the factory. They stop
    /// being known so the next use checks with the broker, which either
    /// confirms them or lets [`record_station`](Self::record_station) clear
    /// their entries.
    pub fn forget_factory(&self, factory: &str) {
        let mut state = self.state.lock();

        let stations: Vec<String> = state
            .stations
            .iter()
            .filter(|(_, owner)| owner.as_deref() == Some(factory))
            .map(|(station, _)| station.clone())
            .collect();

        for station in &stations {
            state.drop_station(station);
        }
        state.stations.retain(|_, owner| owner.is_some());
        drop(state);

        debug!(factory, stations = stations.len(), "forgot factory stations");
    }

    /// Drops everything, stopping all consumers.
    pub fn clear(&self) {
        let mut state = self.state.lock();

        for token in state.entities.drain().filter_map(|(_, token)| token) {
            token.cancel();
        }
        state.stations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_reserve_rejects_duplicates_per_station_and_kind() {
        let registry = EntityRegistry::default();

        registry
            .reserve("station", EntityKind::Producer, "same")
            .unwrap();

        assert_matches!(
            registry.reserve("station", EntityKind::Producer, "same"),
            Err(Error::DuplicateName { kind: EntityKind::Producer, .. })
        );

        // Same name, different station or kind.
        assert!(registry.reserve("other", EntityKind::Producer, "same").is_ok());
        assert!(registry.reserve("station", EntityKind::Consumer, "same").is_ok());
    }

    #[test]
    fn test_release_only_once() {
        let registry = EntityRegistry::default();
        registry
            .reserve("station", EntityKind::Producer, "producer")
            .unwrap();

        assert!(registry.release("station", EntityKind::Producer, "producer"));
        assert!(!registry.release("station", EntityKind::Producer, "producer"));
        assert!(!registry.contains("station", EntityKind::Producer, "producer"));
    }

    #[test]
    fn test_release_cancels_attached_token() {
        let registry = EntityRegistry::default();
        let token = CancellationToken::new();

        registry
            .reserve("station", EntityKind::Consumer, "consumer")
            .unwrap();
        registry.attach("station", "consumer", token.clone());

        assert!(!token.is_cancelled());
        registry.release("station", EntityKind::Consumer, "consumer");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_attach_after_release_cancels() {
        let registry = EntityRegistry::default();
        let token = CancellationToken::new();

        registry.attach("station", "gone", token.clone());

        assert!(token.is_cancelled());
    }

    #[test]
    fn test_forget_factory_cascades_to_its_stations_only() {
        let registry = EntityRegistry::default();
        let doomed = CancellationToken::new();
        let survivor = CancellationToken::new();

        registry.record_station("first", "factory");
        registry.record_station("second", "default");

        registry
            .reserve("first", EntityKind::Consumer, "consumer")
            .unwrap();
        registry.attach("first", "consumer", doomed.clone());
        registry
            .reserve("second", EntityKind::Consumer, "consumer")
            .unwrap();
        registry.attach("second", "consumer", survivor.clone());

        registry.forget_factory("factory");

        assert!(doomed.is_cancelled());
        assert!(!survivor.is_cancelled());
        assert!(!registry.knows_station("first"));
        assert!(registry.knows_station("second"));
        assert!(registry.contains("second", EntityKind::Consumer, "consumer"));
    }

    #[test]
    fn test_adopted_station_is_rechecked_after_factory_removal() {
        let registry = EntityRegistry::default();
        let token = CancellationToken::new();

        registry.adopt_station("shared");
        registry
            .reserve("shared", EntityKind::Consumer, "consumer")
            .unwrap();
        registry.attach("shared", "consumer", token.clone());

        registry.forget_factory("anything");

        // Unknown again, but the entry stays until the broker says otherwise.
        assert!(!registry.knows_station("shared"));
        assert!(registry.contains("shared", EntityKind::Consumer, "consumer"));
        assert!(!token.is_cancelled());

        registry.record_station("shared", "default");

        assert!(!registry.contains("shared", EntityKind::Consumer, "consumer"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clear_stops_everything() {
        let registry = EntityRegistry::default();
        let token = CancellationToken::new();

        registry.record_station("station", "default");
        registry
            .reserve("station", EntityKind::Consumer, "consumer")
            .unwrap();
        registry.attach("station", "consumer", token.clone());

        registry.clear();

        assert!(token.is_cancelled());
        assert!(!registry.knows_station("station"));
    }
}
