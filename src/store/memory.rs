//! In-process realtime presence store
//!
//! `MemoryServer` plays the role of the hosted database: it owns the shared
//! `players` tree, publishes a full snapshot after every change and tracks
//! per-connection disconnect cleanups. Each client talks to it through its own
//! `MemoryStore` connection.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::push_id::PushIdGenerator;
use super::{
    PlayerId, PlayerRecord, PresenceStore, RecordPatch, RosterSnapshot, StoreError, Subscription,
};
use crate::util::time::now_millis;

/// Identifies one client connection to the server
pub type ConnectionId = Uuid;

struct ServerState {
    players: RosterSnapshot,
    /// Records to delete when a connection drops
    cleanups: HashMap<ConnectionId, HashSet<PlayerId>>,
    connections: HashSet<ConnectionId>,
    offline: bool,
    ids: PushIdGenerator,
}

struct ServerInner {
    state: RwLock<ServerState>,
    events: broadcast::Sender<Arc<RosterSnapshot>>,
}

impl ServerInner {
    /// Publish the current tree. Called with the write lock held so snapshots
    /// go out in mutation order.
    fn publish(&self, state: &ServerState) {
        // No subscribers is fine
        let _ = self.events.send(Arc::new(state.players.clone()));
    }
}

/// Shared realtime tree
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<ServerInner>,
}

impl MemoryServer {
    /// `capacity` bounds how many snapshots a slow subscriber may fall behind
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(ServerInner {
                state: RwLock::new(ServerState {
                    players: RosterSnapshot::new(),
                    cleanups: HashMap::new(),
                    connections: HashSet::new(),
                    offline: false,
                    ids: PushIdGenerator::new(),
                }),
                events,
            }),
        }
    }

    /// Open a new client connection
    pub fn connect(&self) -> MemoryStore {
        let connection = Uuid::new_v4();
        self.inner.state.write().connections.insert(connection);
        debug!("Presence connection {} opened", connection);
        MemoryStore {
            server: self.inner.clone(),
            connection,
        }
    }

    /// Simulate a backend outage: every operation fails while offline
    pub fn set_offline(&self, offline: bool) {
        self.inner.state.write().offline = offline;
    }

    /// Server-side view of the tree
    pub fn snapshot(&self) -> RosterSnapshot {
        self.inner.state.read().players.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.state.read().connections.len()
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One client's connection to a [`MemoryServer`]
///
/// Dropping the connection without removing its records triggers their
/// registered disconnect cleanup, like a closed browser tab.
pub struct MemoryStore {
    server: Arc<ServerInner>,
    connection: ConnectionId,
}

impl MemoryStore {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.server.state.read().connections.contains(&self.connection)
    }

    /// Drop the connection and run its cleanups. Idempotent.
    pub fn disconnect(&self) {
        let mut state = self.server.state.write();
        if !state.connections.remove(&self.connection) {
            return;
        }

        let pending = state.cleanups.remove(&self.connection).unwrap_or_default();
        let mut removed = 0;
        for id in &pending {
            if state.players.remove(id).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            self.server.publish(&state);
        }
        info!(
            "Presence connection {} dropped, cleaned up {} records",
            self.connection, removed
        );
    }

    fn check(&self, state: &ServerState) -> Result<(), StoreError> {
        if state.offline {
            return Err(StoreError::Unavailable("server offline".to_string()));
        }
        if !state.connections.contains(&self.connection) {
            return Err(StoreError::Disconnected);
        }
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl PresenceStore for MemoryStore {
    async fn create_record(&self, record: PlayerRecord) -> Result<PlayerId, StoreError> {
        let mut state = self.server.state.write();
        self.check(&state)?;

        let id = state.ids.next_id(now_millis());
        state.players.insert(id.clone(), record);
        self.server.publish(&state);
        Ok(id)
    }

    async fn read_all(&self) -> Result<RosterSnapshot, StoreError> {
        let state = self.server.state.read();
        self.check(&state)?;
        Ok(state.players.clone())
    }

    async fn update(&self, id: &PlayerId, patch: RecordPatch) -> Result<(), StoreError> {
        let mut state = self.server.state.write();
        self.check(&state)?;

        let record = state
            .players
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply_to(record);
        self.server.publish(&state);
        Ok(())
    }

    async fn remove(&self, id: &PlayerId) -> Result<(), StoreError> {
        let mut state = self.server.state.write();
        self.check(&state)?;

        for pending in state.cleanups.values_mut() {
            pending.remove(id);
        }
        if state.players.remove(id).is_some() {
            self.server.publish(&state);
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let state = self.server.state.read();
        self.check(&state)?;

        // Subscribe under the lock so no change slips between the initial
        // snapshot and the first broadcast
        let rx = self.server.events.subscribe();
        Ok(Subscription::new(Arc::new(state.players.clone()), rx))
    }

    async fn register_cleanup_on_disconnect(&self, id: &PlayerId) -> Result<(), StoreError> {
        let mut state = self.server.state.write();
        self.check(&state)?;

        state
            .cleanups
            .entry(self.connection)
            .or_default()
            .insert(id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::Skin;

    fn record(name: &str, joined_at: u64) -> PlayerRecord {
        PlayerRecord::new(name, Skin::Default, joined_at)
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let server = MemoryServer::default();
        let store = server.connect();

        let id = store.create_record(record("Player1", 100)).await.unwrap();
        let snapshot = store.read_all().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&id).unwrap().username, "Player1");
    }

    #[tokio::test]
    async fn test_created_ids_are_unique() {
        let server = MemoryServer::default();
        let a = server.connect();
        let b = server.connect();

        let id1 = a.create_record(record("Player1", 1)).await.unwrap();
        let id2 = b.create_record(record("Player2", 1)).await.unwrap();
        let id3 = a.create_record(record("Player3", 1)).await.unwrap();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_eq!(server.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let server = MemoryServer::default();
        let store = server.connect();
        let id = store.create_record(record("Player1", 100)).await.unwrap();

        store.update(&id, RecordPatch::skin(Skin::Red)).await.unwrap();

        let rec = server.snapshot().get(&id).cloned().unwrap();
        assert_eq!(rec.skin, Skin::Red);
        assert_eq!(rec.username, "Player1");
        assert_eq!(rec.joined_at, 100);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let server = MemoryServer::default();
        let store = server.connect();
        let missing = PlayerId::new("nope");

        let result = store.update(&missing, RecordPatch::last_active(1)).await;
        assert_eq!(result, Err(StoreError::NotFound(missing)));
        assert!(server.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let server = MemoryServer::default();
        let store = server.connect();
        let id = store.create_record(record("Player1", 100)).await.unwrap();

        store.remove(&id).await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(server.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_state_then_changes() {
        let server = MemoryServer::default();
        let writer = server.connect();
        let reader = server.connect();
        writer.create_record(record("Player1", 1)).await.unwrap();

        let mut sub = reader.subscribe().await.unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 1);

        writer.create_record(record("Player2", 2)).await.unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_runs_registered_cleanup() {
        let server = MemoryServer::default();
        let observer = server.connect();
        let client = server.connect();

        let kept = client.create_record(record("Keeper", 1)).await.unwrap();
        let dropped = client.create_record(record("Leaver", 2)).await.unwrap();
        client.register_cleanup_on_disconnect(&dropped).await.unwrap();

        let mut sub = observer.subscribe().await.unwrap();
        sub.next().await.unwrap();

        client.disconnect();

        let snapshot = sub.next().await.unwrap();
        assert!(snapshot.contains(&kept));
        assert!(!snapshot.contains(&dropped));
        assert!(!client.is_connected());
        assert_eq!(
            client.read_all().await.unwrap_err(),
            StoreError::Disconnected
        );
    }

    #[tokio::test]
    async fn test_drop_triggers_cleanup() {
        let server = MemoryServer::default();
        let client = server.connect();
        let id = client.create_record(record("Player1", 1)).await.unwrap();
        client.register_cleanup_on_disconnect(&id).await.unwrap();

        drop(client);

        assert!(server.snapshot().is_empty());
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_remove_cancels_cleanup() {
        let server = MemoryServer::default();
        let client = server.connect();
        let id = client.create_record(record("Player1", 1)).await.unwrap();
        client.register_cleanup_on_disconnect(&id).await.unwrap();
        client.remove(&id).await.unwrap();

        let pending = server
            .inner
            .state
            .read()
            .cleanups
            .get(&client.connection_id())
            .map(|ids| ids.len())
            .unwrap_or(0);
        assert_eq!(pending, 0);
    }

    #[tokio::test]
    async fn test_offline_server_fails_operations() {
        let server = MemoryServer::default();
        let store = server.connect();
        server.set_offline(true);

        let result = store.create_record(record("Player1", 1)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        server.set_offline(false);
        assert!(store.create_record(record("Player1", 1)).await.is_ok());
    }
}
