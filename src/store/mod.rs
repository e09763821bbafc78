//! Presence store client
//!
//! A realtime tree of player records under the `players` collection. Clients
//! read snapshots, merge-patch their own record, subscribe to full-collection
//! snapshots and ask the store to delete their record when their connection
//! drops.

pub mod memory;
pub mod push_id;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::handle;
use crate::skin::Skin;

/// Name of the collection holding player records
pub const PLAYERS_PATH: &str = "players";

/// Store-assigned key of a player record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a `players/<id>` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub username: String,
    pub skin: Skin,
    pub joined_at: u64,
    pub last_active: u64,
}

impl PlayerRecord {
    pub fn new(username: impl Into<String>, skin: Skin, now_ms: u64) -> Self {
        Self {
            username: username.into(),
            skin,
            joined_at: now_ms,
            last_active: now_ms,
        }
    }
}

/// Field-level merge patch. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin: Option<Skin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<u64>,
}

impl RecordPatch {
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn skin(skin: Skin) -> Self {
        Self {
            skin: Some(skin),
            ..Self::default()
        }
    }

    pub fn last_active(now_ms: u64) -> Self {
        Self {
            last_active: Some(now_ms),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.skin.is_none() && self.last_active.is_none()
    }

    /// Merge into an existing record
    pub fn apply_to(&self, record: &mut PlayerRecord) {
        if let Some(username) = &self.username {
            record.username = username.clone();
        }
        if let Some(skin) = self.skin {
            record.skin = skin;
        }
        if let Some(last_active) = self.last_active {
            record.last_active = last_active;
        }
    }
}

/// Point-in-time view of the whole `players` collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RosterSnapshot(BTreeMap<PlayerId, PlayerRecord>);

impl RosterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.0.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerRecord> {
        self.0.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.0.contains_key(id)
    }

    pub fn insert(&mut self, id: PlayerId, record: PlayerRecord) -> Option<PlayerRecord> {
        self.0.insert(id, record)
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerRecord> {
        self.0.remove(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &PlayerRecord)> {
        self.0.iter()
    }

    /// Find a record whose username collides with `username`, ignoring `except`
    pub fn find_handle(
        &self,
        username: &str,
        except: Option<&PlayerId>,
    ) -> Option<(&PlayerId, &PlayerRecord)> {
        self.0.iter().find(|(id, record)| {
            Some(*id) != except && handle::handles_collide(&record.username, username)
        })
    }
}

impl FromIterator<(PlayerId, PlayerRecord)> for RosterSnapshot {
    fn from_iter<I: IntoIterator<Item = (PlayerId, PlayerRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Store errors. The cause of a backend failure is opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(PlayerId),
    #[error("connection to the presence store was lost")]
    Disconnected,
    #[error("presence store unavailable: {0}")]
    Unavailable(String),
    #[error("presence store closed")]
    Closed,
}

/// Cancellable stream of full roster snapshots
///
/// The first call to [`Subscription::next`] yields the state at subscription
/// time; later calls wait for the next change. Each snapshot is complete, so
/// a subscriber that falls behind skips straight to newer ones.
pub struct Subscription {
    initial: Option<Arc<RosterSnapshot>>,
    rx: Option<broadcast::Receiver<Arc<RosterSnapshot>>>,
}

impl Subscription {
    pub fn new(
        initial: Arc<RosterSnapshot>,
        rx: broadcast::Receiver<Arc<RosterSnapshot>>,
    ) -> Self {
        Self {
            initial: Some(initial),
            rx: Some(rx),
        }
    }

    /// Next snapshot, or `None` once cancelled or the store has shut down
    pub async fn next(&mut self) -> Option<Arc<RosterSnapshot>> {
        if let Some(snapshot) = self.initial.take() {
            return Some(snapshot);
        }

        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Roster subscriber lagged, skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Stop receiving snapshots
    pub fn cancel(&mut self) {
        self.initial = None;
        self.rx = None;
    }

    pub fn is_active(&self) -> bool {
        self.initial.is_some() || self.rx.is_some()
    }
}

/// Client-side handle to the presence store
///
/// Every operation may suspend. Implementations decide how connection loss is
/// detected; callers only register intent with
/// [`register_cleanup_on_disconnect`](PresenceStore::register_cleanup_on_disconnect).
pub trait PresenceStore: Send + Sync + 'static {
    /// Allocate a fresh key under `players` and write `record` there
    fn create_record(
        &self,
        record: PlayerRecord,
    ) -> impl Future<Output = Result<PlayerId, StoreError>> + Send;

    /// Snapshot of every record
    fn read_all(&self) -> impl Future<Output = Result<RosterSnapshot, StoreError>> + Send;

    /// Merge-patch an existing record. Fails with `NotFound` if absent.
    fn update(
        &self,
        id: &PlayerId,
        patch: RecordPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a record. Absent ids are ignored.
    fn remove(&self, id: &PlayerId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Subscribe to full-collection snapshots
    fn subscribe(&self) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Delete `id` server-side if this client's connection drops first
    fn register_cleanup_on_disconnect(
        &self,
        id: &PlayerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
