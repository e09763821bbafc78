//! Lobby application controller
//!
//! Maps user triggers (submit handle, change handle, pick skin, quit) onto the
//! session manager and keeps the avatar preview in sync.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::KeyValueStorage;
use crate::handle;
use crate::metrics::LobbyMetrics;
use crate::render::AvatarRenderer;
use crate::roster::{self, RosterEntry};
use crate::session::{ActivePlayer, ResumeOutcome, SessionError, SessionManager};
use crate::skin::Skin;
use crate::store::{PresenceStore, RosterSnapshot};

/// What the user sees after startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Back in the lobby with the saved identity
    Ready(ActivePlayer),
    /// Ask for a handle. Carries the reason when a saved identity was refused.
    NeedsHandle(Option<SessionError>),
}

pub struct LobbyApp<S: PresenceStore, K: KeyValueStorage, R: AvatarRenderer> {
    session: SessionManager<S, K>,
    renderer: R,
    /// Skin picked in the UI, used for the next join
    selected_skin: Skin,
}

impl<S: PresenceStore, K: KeyValueStorage, R: AvatarRenderer> LobbyApp<S, K, R> {
    pub fn new(session: SessionManager<S, K>, renderer: R) -> Self {
        Self {
            session,
            renderer,
            selected_skin: Skin::Default,
        }
    }

    pub fn session(&self) -> &SessionManager<S, K> {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn selected_skin(&self) -> Skin {
        self.selected_skin
    }

    /// Try the saved identity, otherwise ask for a handle
    pub async fn start(&mut self) -> StartupOutcome {
        match self.session.resume().await {
            ResumeOutcome::Rejoined(player) => {
                self.show_avatar(player.record.skin);
                StartupOutcome::Ready(player)
            }
            ResumeOutcome::NoSavedSession => StartupOutcome::NeedsHandle(None),
            ResumeOutcome::Rejected(e) => StartupOutcome::NeedsHandle(Some(e)),
        }
    }

    /// Join with a handle typed into the entry box
    ///
    /// The entry box only accepts letters and digits, so anything else is
    /// dropped before validation. Nothing left means nothing was entered.
    pub async fn submit_handle(&mut self, raw: &str) -> Result<ActivePlayer, SessionError> {
        let handle = handle::sanitize_input(raw.trim());
        if handle.is_empty() {
            self.session.metrics().record_join_failure(&SessionError::EmptyHandle);
            return Err(SessionError::EmptyHandle);
        }
        let player = self.session.join(&handle, self.selected_skin).await?;
        self.show_avatar(player.record.skin);
        Ok(player)
    }

    /// Rename the active player
    pub async fn change_handle(&mut self, raw: &str) -> Result<(), SessionError> {
        let handle = raw.trim();
        if handle.is_empty() {
            return Err(SessionError::EmptyHandle);
        }
        self.session.rename(handle).await
    }

    /// Pick a skin. Applied to the preview immediately and, when joined, to
    /// the shared record.
    pub async fn select_skin(&mut self, skin_id: &str) -> Result<Skin, SessionError> {
        let skin = Skin::parse_or_default(skin_id);
        if skin == self.selected_skin {
            return Ok(skin);
        }

        self.show_avatar(skin);
        if self.session.state().is_active() {
            self.session.change_skin(skin.as_str()).await?;
        }
        Ok(skin)
    }

    /// Handle a roster snapshot: update session liveness, project the list
    pub fn on_roster(&mut self, snapshot: &RosterSnapshot) -> Vec<RosterEntry> {
        self.session.observe(snapshot);
        self.session.metrics().record_roster(snapshot.len());
        roster::project(snapshot, self.session.player_id())
    }

    /// Leave the lobby but keep running
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        self.session.leave().await
    }

    /// Fresh roster read, for an on-demand listing
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, SessionError> {
        let snapshot = self.session.store().read_all().await?;
        Ok(roster::project(&snapshot, self.session.player_id()))
    }

    /// Leave explicitly before exiting
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.session.leave().await {
            warn!("Leave on shutdown failed: {}", e);
        }
        info!("Lobby client stopped");
    }

    pub fn metrics(&self) -> Arc<LobbyMetrics> {
        self.session.metrics().clone()
    }

    fn show_avatar(&mut self, skin: Skin) {
        self.selected_skin = skin;
        self.renderer.set_avatar_skin(skin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalSession, MemoryStorage, SessionCache};
    use crate::handle::HandleViolation;
    use crate::session::{SessionConfig, SessionState};
    use crate::store::memory::{MemoryServer, MemoryStore};
    use crate::store::PlayerId;

    #[derive(Default)]
    struct RecordingRenderer {
        skins: Vec<Skin>,
    }

    impl AvatarRenderer for RecordingRenderer {
        fn set_avatar_skin(&mut self, skin: Skin) {
            self.skins.push(skin);
        }
    }

    fn app_with_cache(
        server: &MemoryServer,
        cache: SessionCache<MemoryStorage>,
    ) -> LobbyApp<MemoryStore, MemoryStorage, RecordingRenderer> {
        let session = SessionManager::new(
            Arc::new(server.connect()),
            cache,
            SessionConfig::default(),
        );
        LobbyApp::new(session, RecordingRenderer::default())
    }

    fn new_app(server: &MemoryServer) -> LobbyApp<MemoryStore, MemoryStorage, RecordingRenderer> {
        app_with_cache(server, SessionCache::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_start_without_saved_session() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);

        assert_eq!(app.start().await, StartupOutcome::NeedsHandle(None));
        assert!(app.renderer().skins.is_empty());
    }

    #[tokio::test]
    async fn test_start_rejoins_and_shows_saved_skin() {
        let server = MemoryServer::default();
        let mut cache = SessionCache::new(MemoryStorage::new());
        cache
            .save(&LocalSession {
                username: "Player1".to_string(),
                player_id: Some(PlayerId::new("old")),
                skin: Skin::Red,
            })
            .unwrap();
        let mut app = app_with_cache(&server, cache);

        let outcome = app.start().await;

        assert!(matches!(outcome, StartupOutcome::Ready(_)));
        assert_eq!(app.renderer().skins, vec![Skin::Red]);
        assert_eq!(app.selected_skin(), Skin::Red);
    }

    #[tokio::test]
    async fn test_submit_handle_uses_selected_skin() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);

        app.select_skin("green").await.unwrap();
        let player = app.submit_handle("  Player1 ").await.unwrap();

        assert_eq!(player.record.skin, Skin::Green);
        assert_eq!(player.username(), "Player1");
        assert_eq!(server.snapshot().get(&player.id).unwrap().skin, Skin::Green);
    }

    #[tokio::test]
    async fn test_submit_handle_filters_input() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);

        let player = app.submit_handle("Pl@yer_1").await.unwrap();
        assert_eq!(player.username(), "Plyer1");

        let server = MemoryServer::default();
        let mut app = new_app(&server);
        assert_eq!(
            app.submit_handle("abc").await,
            Err(SessionError::Validation(HandleViolation::TooShort))
        );
    }

    #[tokio::test]
    async fn test_blank_handle_asks_for_input() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);

        for raw in ["", "   ", "_-!"] {
            assert_eq!(app.submit_handle(raw).await, Err(SessionError::EmptyHandle));
        }
        assert!(server.snapshot().is_empty());
        assert_eq!(app.session().state(), SessionState::Unauthenticated);
        assert_eq!(
            app.session()
                .metrics()
                .join_rejected_validation
                .load(std::sync::atomic::Ordering::Relaxed),
            3
        );

        app.submit_handle("Player1").await.unwrap();
        assert_eq!(app.change_handle("  ").await, Err(SessionError::EmptyHandle));
        assert_eq!(app.session().player().unwrap().username(), "Player1");
    }

    #[tokio::test]
    async fn test_select_skin_while_active_updates_store() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);
        let player = app.submit_handle("Player1").await.unwrap();

        app.select_skin("blue").await.unwrap();

        assert_eq!(server.snapshot().get(&player.id).unwrap().skin, Skin::Blue);
        assert_eq!(app.renderer().skins, vec![Skin::Default, Skin::Blue]);
    }

    #[tokio::test]
    async fn test_select_same_skin_is_noop() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);
        app.submit_handle("Player1").await.unwrap();

        app.select_skin("default").await.unwrap();

        assert_eq!(app.renderer().skins, vec![Skin::Default]);
        assert_eq!(
            app.session()
                .metrics()
                .skin_changes_total
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
    }

    #[tokio::test]
    async fn test_on_roster_projects_and_tracks_disconnect() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);
        let other = server.connect();
        let mut sub = other.subscribe().await.unwrap();
        sub.next().await.unwrap();

        let player = app.submit_handle("Player1").await.unwrap();
        let snapshot = sub.next().await.unwrap();
        let entries = app.on_roster(&snapshot);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_local);
        assert_eq!(entries[0].id, player.id);

        app.session().store().disconnect();
        let snapshot = sub.next().await.unwrap();
        let entries = app.on_roster(&snapshot);
        assert!(entries.is_empty());
        assert_eq!(app.session().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_roster_reads_store() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);
        let mut other = new_app(&server);
        other.submit_handle("Early1").await.unwrap();
        app.submit_handle("Later1").await.unwrap();

        let entries = app.roster().await.unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["Early1", "Later1"]);
        assert!(entries[1].is_local);
    }

    #[tokio::test]
    async fn test_shutdown_leaves() {
        let server = MemoryServer::default();
        let mut app = new_app(&server);
        app.submit_handle("Player1").await.unwrap();

        app.shutdown().await;

        assert!(server.snapshot().is_empty());
        assert_eq!(app.session().state(), SessionState::Left);
    }
}
