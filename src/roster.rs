//! Roster view
//!
//! Pure projection of roster snapshots into an ordered player list. Nothing is
//! kept between snapshots; every update re-renders the whole list.

use std::fmt::Write;

use crate::skin::Skin;
use crate::store::{PlayerId, RosterSnapshot, Subscription};

/// One line of the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub username: String,
    pub skin: Skin,
    pub joined_at: u64,
    pub last_active: u64,
    /// Whether this is the local player
    pub is_local: bool,
}

/// Order a snapshot by join time (oldest first) and mark the local player
pub fn project(snapshot: &RosterSnapshot, local_id: Option<&PlayerId>) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = snapshot
        .iter()
        .map(|(id, record)| RosterEntry {
            id: id.clone(),
            username: record.username.clone(),
            skin: record.skin,
            joined_at: record.joined_at,
            last_active: record.last_active,
            is_local: Some(id) == local_id,
        })
        .collect();

    // Ties fall back to id, which is itself time-ordered
    entries.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
    entries
}

/// Render the full list as text
pub fn render(entries: &[RosterEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Players online ({})", entries.len());
    for entry in entries {
        let marker = if entry.is_local { " (you)" } else { "" };
        let _ = writeln!(out, "  {} [{}]{}", entry.username, entry.skin, marker);
    }
    out
}

/// Live roster fed by a store subscription
pub struct RosterView {
    subscription: Subscription,
}

impl RosterView {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// Wait for the next snapshot and project it, or `None` once the
    /// subscription has ended
    pub async fn next(&mut self, local_id: Option<&PlayerId>) -> Option<Vec<RosterEntry>> {
        let snapshot = self.subscription.next().await?;
        Some(project(&snapshot, local_id))
    }

    /// Next raw snapshot, for callers that also feed the session manager
    pub async fn next_snapshot(&mut self) -> Option<std::sync::Arc<RosterSnapshot>> {
        self.subscription.next().await
    }

    pub fn close(&mut self) {
        self.subscription.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryServer;
    use crate::store::{PlayerRecord, PresenceStore};

    fn snapshot(players: &[(&str, &str, u64)]) -> RosterSnapshot {
        players
            .iter()
            .map(|(id, name, joined_at)| {
                (
                    PlayerId::new(*id),
                    PlayerRecord::new(*name, Skin::Default, *joined_at),
                )
            })
            .collect()
    }

    #[test]
    fn test_sorted_by_join_time() {
        let snap = snapshot(&[("a", "Third", 300), ("b", "First", 100), ("c", "Second", 200)]);

        let entries = project(&snap, None);
        let joined: Vec<u64> = entries.iter().map(|e| e.joined_at).collect();

        assert_eq!(joined, vec![100, 200, 300]);
        assert_eq!(entries[0].username, "First");
    }

    #[test]
    fn test_ties_broken_by_id() {
        let snap = snapshot(&[("z", "Later", 100), ("a", "Early", 100)]);
        let entries = project(&snap, None);
        assert_eq!(entries[0].id.as_str(), "a");
    }

    #[test]
    fn test_marks_local_player() {
        let snap = snapshot(&[("a", "Alice", 1), ("b", "Bobby", 2)]);
        let local = PlayerId::new("b");

        let entries = project(&snap, Some(&local));

        assert!(!entries[0].is_local);
        assert!(entries[1].is_local);
    }

    #[test]
    fn test_empty_snapshot() {
        let entries = project(&RosterSnapshot::new(), None);
        assert!(entries.is_empty());
        assert_eq!(render(&entries), "Players online (0)\n");
    }

    #[test]
    fn test_render() {
        let snap = snapshot(&[("a", "Alice", 1), ("b", "Bobby", 2)]);
        let local = PlayerId::new("a");

        let text = render(&project(&snap, Some(&local)));

        assert_eq!(
            text,
            "Players online (2)\n  Alice [default] (you)\n  Bobby [default]\n"
        );
    }

    #[tokio::test]
    async fn test_view_follows_store() {
        let server = MemoryServer::default();
        let store = server.connect();
        let mut view = RosterView::new(store.subscribe().await.unwrap());

        assert!(view.next(None).await.unwrap().is_empty());

        let id = store
            .create_record(PlayerRecord::new("Player1", Skin::Blue, 5))
            .await
            .unwrap();
        let entries = view.next(Some(&id)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_local);

        view.close();
        assert!(view.next(None).await.is_none());
    }
}
