use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{KeyValueStorage, SessionCache};
use crate::handle;
use crate::metrics::LobbyMetrics;
use crate::session::heartbeat::{self, Heartbeat};
use crate::session::state::{ActivePlayer, SessionState};
use crate::session::SessionError;
use crate::skin::Skin;
use crate::store::{PlayerId, PlayerRecord, PresenceStore, RecordPatch, RosterSnapshot};
use crate::util::time::now_millis;

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the owning client patches `lastActive`
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: heartbeat::DEFAULT_INTERVAL,
        }
    }
}

/// Result of the startup rejoin attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Rejoined with the cached handle and skin
    Rejoined(ActivePlayer),
    /// Nothing cached; ask for a handle
    NoSavedSession,
    /// The cached identity could not be reused. The cache has been cleared;
    /// ask for a fresh handle.
    Rejected(SessionError),
}

/// Drives the local player's presence in the lobby
///
/// Handle uniqueness is cooperative: a join reads the roster, checks for a
/// case-insensitive collision and then creates its record. Two clients that
/// check against the same snapshot can both succeed.
pub struct SessionManager<S: PresenceStore, K: KeyValueStorage> {
    store: Arc<S>,
    cache: SessionCache<K>,
    config: SessionConfig,
    metrics: Arc<LobbyMetrics>,
    state: SessionState,
    player: Option<ActivePlayer>,
    heartbeat: Option<Heartbeat>,
    /// Set once a roster snapshot containing our record has been observed
    seen_in_roster: bool,
}

impl<S: PresenceStore, K: KeyValueStorage> SessionManager<S, K> {
    pub fn new(store: Arc<S>, cache: SessionCache<K>, config: SessionConfig) -> Self {
        Self {
            store,
            cache,
            config,
            metrics: Arc::new(LobbyMetrics::new()),
            state: SessionState::Unauthenticated,
            player: None,
            heartbeat: None,
            seen_in_roster: false,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<LobbyMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn player(&self) -> Option<&ActivePlayer> {
        self.player.as_ref()
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        self.player.as_ref().map(|p| &p.id)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &SessionCache<K> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<LobbyMetrics> {
        &self.metrics
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(Heartbeat::is_running)
    }

    /// Join the lobby as `handle`
    ///
    /// Validation, the collision check and record creation abort cleanly.
    /// Failures after the record exists (cleanup registration, cache write)
    /// are logged and not rolled back.
    pub async fn join(&mut self, handle: &str, skin: Skin) -> Result<ActivePlayer, SessionError> {
        if !self.state.can_join() {
            return Err(SessionError::AlreadyActive);
        }

        let previous = self.state;
        self.state = SessionState::Joining;

        match self.try_join(handle, skin).await {
            Ok(player) => {
                self.state = SessionState::Active;
                self.metrics.joins_total.fetch_add(1, Ordering::Relaxed);
                info!("Joined lobby as {} ({})", player.username(), player.id);
                Ok(player)
            }
            Err(e) => {
                self.state = previous;
                self.metrics.record_join_failure(&e);
                warn!("Join as '{}' failed: {}", handle, e);
                Err(e)
            }
        }
    }

    async fn try_join(&mut self, handle: &str, skin: Skin) -> Result<ActivePlayer, SessionError> {
        handle::validate(handle).into_result()?;

        let roster = self.store.read_all().await?;
        if roster.find_handle(handle, None).is_some() {
            return Err(SessionError::Conflict(handle.to_string()));
        }

        let record = PlayerRecord::new(handle, skin, now_millis());
        let id = self.store.create_record(record.clone()).await?;

        if let Err(e) = self.store.register_cleanup_on_disconnect(&id).await {
            warn!("Could not register disconnect cleanup for {}: {}", id, e);
        }

        self.heartbeat = Some(Heartbeat::start(
            self.store.clone(),
            id.clone(),
            self.config.heartbeat_interval,
            self.metrics.clone(),
        ));

        let player = ActivePlayer { id, record };
        if let Err(e) = self.cache.save(&player.to_local_session()) {
            warn!("Could not persist session for {}: {}", player.id, e);
        }

        self.player = Some(player.clone());
        self.seen_in_roster = false;
        Ok(player)
    }

    /// Leave the lobby: delete the record, then stop the liveness signal
    ///
    /// No-op when not active. If the delete fails the session stays active so
    /// the leave can be retried. The local cache is kept.
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Ok(());
        }

        if let Some(player) = &self.player {
            info!("Leaving lobby as {} ({})", player.username(), player.id);
            self.store.remove(&player.id).await?;
        }

        self.stop_heartbeat();
        self.player = None;
        self.state = SessionState::Left;
        self.metrics.leaves_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Change handle. On any failure the current identity is unchanged.
    pub async fn rename(&mut self, new_handle: &str) -> Result<(), SessionError> {
        let id = self.active_id()?;
        handle::validate(new_handle).into_result()?;

        // Our own record counts, so the current handle is rejected too
        let roster = self.store.read_all().await?;
        if roster.find_handle(new_handle, None).is_some() {
            return Err(SessionError::Conflict(new_handle.to_string()));
        }

        self.store
            .update(&id, RecordPatch::username(new_handle))
            .await?;

        if let Some(player) = self.player.as_mut() {
            info!("Renamed {} -> {}", player.record.username, new_handle);
            player.record.username = new_handle.to_string();
        }
        if let Err(e) = self.cache.set_username(new_handle) {
            warn!("Could not persist new handle: {}", e);
        }
        self.metrics.renames_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Change skin. Unknown ids fall back to `default`.
    pub async fn change_skin(&mut self, skin_id: &str) -> Result<Skin, SessionError> {
        let id = self.active_id()?;
        let skin = Skin::parse_or_default(skin_id);

        self.store.update(&id, RecordPatch::skin(skin)).await?;

        if let Some(player) = self.player.as_mut() {
            player.record.skin = skin;
        }
        if let Err(e) = self.cache.set_skin(skin) {
            warn!("Could not persist skin: {}", e);
        }
        self.metrics.skin_changes_total.fetch_add(1, Ordering::Relaxed);
        Ok(skin)
    }

    /// Feed a roster snapshot. Detects that the store reclaimed our record.
    pub fn observe(&mut self, snapshot: &RosterSnapshot) -> SessionState {
        if !self.state.is_active() {
            return self.state;
        }
        let Some(player) = &self.player else {
            return self.state;
        };

        if snapshot.contains(&player.id) {
            self.seen_in_roster = true;
        } else if self.seen_in_roster {
            warn!(
                "Record {} for {} disappeared from the roster, session lost",
                player.id,
                player.username()
            );
            self.stop_heartbeat();
            self.player = None;
            self.state = SessionState::Disconnected;
            self.metrics
                .disconnects_observed
                .fetch_add(1, Ordering::Relaxed);
        }
        self.state
    }

    /// Try to rejoin with the cached identity
    ///
    /// A record from the previous run that has not been cleaned up yet still
    /// holds the handle, so this fails with a conflict in that case and the
    /// user has to pick a fresh handle.
    pub async fn resume(&mut self) -> ResumeOutcome {
        let Some(saved) = self.cache.load() else {
            return ResumeOutcome::NoSavedSession;
        };

        match self.join(&saved.username, saved.skin).await {
            Ok(player) => ResumeOutcome::Rejoined(player),
            Err(e) => {
                info!("Saved session for '{}' rejected: {}", saved.username, e);
                if let Err(ce) = self.cache.clear() {
                    warn!("Could not clear saved session: {}", ce);
                }
                ResumeOutcome::Rejected(e)
            }
        }
    }

    fn active_id(&self) -> Result<PlayerId, SessionError> {
        match (&self.state, &self.player) {
            (SessionState::Active, Some(player)) => Ok(player.id.clone()),
            _ => Err(SessionError::NotActive),
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
    }
}
