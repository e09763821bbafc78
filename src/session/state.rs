use crate::cache::LocalSession;
use crate::store::{PlayerId, PlayerRecord};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No identity yet
    Unauthenticated,
    /// Join in flight
    Joining,
    /// Record exists and the liveness signal is running
    Active,
    /// Left explicitly
    Left,
    /// Record reclaimed by the store's disconnect cleanup
    Disconnected,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self == SessionState::Active
    }

    /// Whether `join` may be attempted from this state
    pub fn can_join(self) -> bool {
        !matches!(self, SessionState::Active | SessionState::Joining)
    }
}

/// The local player's identity while active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePlayer {
    pub id: PlayerId,
    pub record: PlayerRecord,
}

impl ActivePlayer {
    pub fn username(&self) -> &str {
        &self.record.username
    }

    pub fn to_local_session(&self) -> LocalSession {
        LocalSession {
            username: self.record.username.clone(),
            player_id: Some(self.id.clone()),
            skin: self.record.skin,
        }
    }
}
