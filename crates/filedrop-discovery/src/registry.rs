//! Registry of discovered servers
//!
//! The registry is the only owner of the id → [`Server`] mapping. Every
//! mutation happens under one write lock and, when it changed anything,
//! publishes a fresh snapshot through a `watch` channel before the lock is
//! released, so subscribers see snapshots in mutation order and never a
//! half-applied change.

use filedrop_core::Server;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::debug;

/// Resolution epoch of a registry entry.
///
/// Every `upsert` issues a new generation. A probe started for one
/// generation can only update the entry while it still has that generation.
pub type Generation = u64;

#[derive(Debug)]
struct Entry {
    server: Server,
    generation: Generation,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<String, Entry>,
    last_generation: Generation,
}

impl RegistryState {
    fn snapshot(&self) -> Vec<Server> {
        self.entries
            .values()
            .map(|entry| entry.server.clone())
            .collect()
    }
}

/// Concurrency-safe store of known servers, keyed by id.
///
/// Snapshots are ordered by id.
#[derive(Debug)]
pub struct ServerRegistry {
    state: RwLock<RegistryState>,
    publisher: watch::Sender<Vec<Server>>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(Vec::new());
        Self {
            state: RwLock::new(RegistryState::default()),
            publisher,
        }
    }

    /// Inserts or replaces the entry for `server.id`.
    ///
    /// Name, address, port and availability are taken from `server`; the
    /// stored selection flag is kept. Returns the entry's new generation.
    pub fn upsert(&self, server: Server) -> Generation {
        let mut state = self.state.write();
        state.last_generation += 1;
        let generation = state.last_generation;

        let (server, changed) = match state.entries.get(&server.id) {
            Some(existing) => {
                let merged = Server {
                    is_selected: existing.server.is_selected,
                    ..server
                };
                let changed = merged != existing.server;
                (merged, changed)
            }
            None => (server, true),
        };

        debug!(server = %server.id, address = %server.socket_addr(), generation, "Upserting server");
        state
            .entries
            .insert(server.id.clone(), Entry { server, generation });

        if changed {
            self.publish(&state);
        }
        generation
    }

    /// Updates only the availability flag of `id`.
    ///
    /// A missing id is not an error: the server may have been removed while
    /// its probe was in flight. Returns whether an entry was found.
    pub fn set_availability(&self, id: &str, available: bool) -> bool {
        self.update_availability(id, None, available)
    }

    /// Like [`set_availability`](Self::set_availability), but also ignored
    /// when the entry was re-resolved after `generation` was issued.
    pub fn set_availability_for(&self, id: &str, generation: Generation, available: bool) -> bool {
        self.update_availability(id, Some(generation), available)
    }

    fn update_availability(&self, id: &str, generation: Option<Generation>, available: bool) -> bool {
        let mut state = self.state.write();

        let Some(entry) = state.entries.get_mut(id) else {
            debug!(server = %id, available, "Availability update for unknown server ignored");
            return false;
        };

        if let Some(expected) = generation {
            if entry.generation != expected {
                debug!(
                    server = %id,
                    expected,
                    current = entry.generation,
                    "Stale availability update ignored"
                );
                return false;
            }
        }

        if entry.server.is_available == available {
            return true;
        }
        entry.server.is_available = available;

        self.publish(&state);
        true
    }

    /// Removes the entry for `id`, if present.
    pub fn remove(&self, id: &str) -> Option<Server> {
        let mut state = self.state.write();
        let removed = state.entries.remove(id).map(|entry| entry.server);

        if removed.is_some() {
            self.publish(&state);
        }
        removed
    }

    /// Returns the current servers as one consistent, id-ordered copy.
    pub fn snapshot(&self) -> Vec<Server> {
        self.state.read().snapshot()
    }

    /// Returns the current servers together with their generations.
    pub(crate) fn snapshot_with_generations(&self) -> Vec<(Server, Generation)> {
        self.state
            .read()
            .entries
            .values()
            .map(|entry| (entry.server.clone(), entry.generation))
            .collect()
    }

    /// Subscribes to published snapshots (latest value only).
    ///
    /// Snapshots are published while the registry lock is held, so a
    /// borrowed snapshot must not be held across calls into the registry.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Server>> {
        self.publisher.subscribe()
    }

    /// Gets a server by id
    pub fn get(&self, id: &str) -> Option<Server> {
        self.state.read().entries.get(id).map(|entry| entry.server.clone())
    }

    /// Gets the first server with the given display name
    pub fn find_by_name(&self, name: &str) -> Option<Server> {
        self.state
            .read()
            .entries
            .values()
            .find(|entry| entry.server.name == name)
            .map(|entry| entry.server.clone())
    }

    /// Number of known servers
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no server is known
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, state: &RegistryState) {
        let snapshot = state.snapshot();
        metrics::gauge!("filedrop_registry_servers").set(snapshot.len() as f64);
        self.publisher.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn server(id: &str, last_octet: u8, port: u16) -> Server {
        Server::discovered(id, IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), port)
    }

    #[test]
    fn test_upsert_same_id_replaces_entry() {
        let registry = ServerRegistry::new();
        registry.upsert(server("svc1", 5, 8000));
        registry.upsert(server("svc1", 5, 9000));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "svc1");
        assert_eq!(snapshot[0].port, 9000);
    }

    #[test]
    fn test_upsert_issues_increasing_generations() {
        let registry = ServerRegistry::new();
        let first = registry.upsert(server("svc1", 5, 8000));
        let second = registry.upsert(server("svc1", 5, 8000));
        let other = registry.upsert(server("svc2", 6, 8000));

        assert!(first < second);
        assert!(second < other);
    }

    #[test]
    fn test_upsert_keeps_selection_and_resets_availability() {
        let registry = ServerRegistry::new();
        let mut selected = server("svc1", 5, 8000);
        selected.is_selected = true;
        selected.is_available = false;
        registry.upsert(selected);

        registry.upsert(server("svc1", 7, 8001));

        let stored = registry.get("svc1").unwrap();
        assert!(stored.is_selected);
        assert!(stored.is_available);
        assert_eq!(stored.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[test]
    fn test_set_availability_on_absent_id_is_noop() {
        let registry = ServerRegistry::new();
        let mut updates = registry.subscribe();

        assert!(!registry.set_availability("ghost", false));
        assert!(!registry.set_availability("ghost", true));

        assert!(registry.is_empty());
        assert!(registry.get("ghost").is_none());
        assert!(!updates.has_changed().unwrap());
    }

    #[test]
    fn test_set_availability_updates_only_flag() {
        let registry = ServerRegistry::new();
        registry.upsert(server("svc1", 5, 8000));

        assert!(registry.set_availability("svc1", false));

        let stored = registry.get("svc1").unwrap();
        assert!(!stored.is_available);
        assert_eq!(stored.port, 8000);
        assert_eq!(stored.name, "svc1");
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let registry = ServerRegistry::new();
        let old = registry.upsert(server("svc1", 5, 8000));
        let current = registry.upsert(server("svc1", 5, 9000));

        assert!(!registry.set_availability_for("svc1", old, false));
        assert!(registry.get("svc1").unwrap().is_available);

        assert!(registry.set_availability_for("svc1", current, false));
        assert!(!registry.get("svc1").unwrap().is_available);
    }

    #[test]
    fn test_remove() {
        let registry = ServerRegistry::new();
        registry.upsert(server("svc1", 5, 8000));

        assert!(registry.remove("svc1").is_some());
        assert!(registry.remove("svc1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_ordered_by_id() {
        let registry = ServerRegistry::new();
        registry.upsert(server("charlie", 3, 8000));
        registry.upsert(server("alpha", 1, 8000));
        registry.upsert(server("bravo", 2, 8000));

        let ids: Vec<_> = registry.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_publication_follows_mutations() {
        let registry = ServerRegistry::new();
        let mut updates = registry.subscribe();

        registry.upsert(server("svc1", 5, 8000));
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().len(), 1);

        // Unchanged availability is not a new state.
        registry.set_availability("svc1", true);
        assert!(!updates.has_changed().unwrap());

        registry.set_availability("svc1", false);
        assert!(updates.has_changed().unwrap());
        assert!(!updates.borrow_and_update()[0].is_available);

        registry.remove("svc1");
        assert!(updates.borrow_and_update().is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let registry = ServerRegistry::new();
        registry.upsert(server("svc1", 5, 8000));

        assert_eq!(registry.find_by_name("svc1").unwrap().port, 8000);
        assert!(registry.find_by_name("nope").is_none());
    }

    #[test]
    fn test_snapshot_never_torn_under_concurrent_writes() {
        // Writers keep address and port in lockstep (10.0.0.n <-> 8000 + n);
        // readers must never observe one without the other.
        let registry = Arc::new(ServerRegistry::new());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        let n = ((i + w) % 200) as u8 + 1;
                        let id = format!("svc{}", i % 8);
                        registry.upsert(server(&id, n, 8000 + n as u16));
                        registry.set_availability(&id, i % 2 == 0);
                        if i % 50 == 0 {
                            registry.remove(&id);
                        }
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                let published = registry.subscribe();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        for snapshot in [registry.snapshot(), published.borrow().clone()] {
                            for s in snapshot {
                                let IpAddr::V4(v4) = s.address else { unreachable!() };
                                assert_eq!(s.port, 8000 + v4.octets()[3] as u16);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
    }
}
