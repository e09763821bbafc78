use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::metrics::LobbyMetrics;
use crate::store::{PlayerId, PresenceStore, RecordPatch};
use crate::util::time::now_millis;

/// Default liveness interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic `lastActive` patch for one record
///
/// Best effort: a failed tick is dropped. The task is aborted when the handle
/// is stopped or dropped, so nothing is written after leaving.
pub struct Heartbeat {
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn the liveness task. The first patch goes out one interval from now.
    pub fn start<S: PresenceStore>(
        store: Arc<S>,
        id: PlayerId,
        every: Duration,
        metrics: Arc<LobbyMetrics>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match store.update(&id, RecordPatch::last_active(now_millis())).await {
                    Ok(()) => {
                        metrics.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        debug!("Heartbeat for {} dropped: {}", id, e);
                        metrics.heartbeats_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });

        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::Skin;
    use crate::store::memory::MemoryServer;
    use crate::store::PlayerRecord;

    #[tokio::test(start_paused = true)]
    async fn test_patches_every_interval() {
        let server = MemoryServer::default();
        let store = Arc::new(server.connect());
        let id = store
            .create_record(PlayerRecord::new("Player1", Skin::Default, 0))
            .await
            .unwrap();
        let metrics = Arc::new(LobbyMetrics::new());

        let heartbeat = Heartbeat::start(
            store.clone(),
            id.clone(),
            Duration::from_secs(30),
            metrics.clone(),
        );

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(metrics.heartbeats_sent.load(Ordering::Relaxed), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(metrics.heartbeats_sent.load(Ordering::Relaxed), 3);

        let rec = server.snapshot().get(&id).cloned().unwrap();
        assert!(rec.last_active > 0);
        assert_eq!(rec.joined_at, 0);
        assert!(heartbeat.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_is_dropped_silently() {
        let server = MemoryServer::default();
        let store = Arc::new(server.connect());
        let metrics = Arc::new(LobbyMetrics::new());

        let _heartbeat = Heartbeat::start(
            store,
            PlayerId::new("gone"),
            Duration::from_secs(30),
            metrics.clone(),
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(metrics.heartbeats_sent.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.heartbeats_dropped.load(Ordering::Relaxed), 1);
        assert!(server.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_writes() {
        let server = MemoryServer::default();
        let store = Arc::new(server.connect());
        let id = store
            .create_record(PlayerRecord::new("Player1", Skin::Default, 0))
            .await
            .unwrap();
        let metrics = Arc::new(LobbyMetrics::new());

        let heartbeat = Heartbeat::start(store, id, Duration::from_secs(30), metrics.clone());
        heartbeat.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(metrics.heartbeats_sent.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.heartbeats_dropped.load(Ordering::Relaxed), 0);
    }
}
