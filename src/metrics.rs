//! Prometheus-compatible lobby metrics
//!
//! Counters are plain atomics updated by the session manager and the roster
//! loop. With the `metrics` feature the binary can expose them over HTTP.
//! Default endpoint: http://localhost:9090/metrics

use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::sync::Arc;
use std::time::Instant;
#[cfg(feature = "metrics")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(feature = "metrics")]
use tokio::net::TcpListener;
#[cfg(feature = "metrics")]
use tracing::{debug, info};

use crate::session::SessionError;

/// Metrics registry for one lobby client
#[derive(Debug)]
pub struct LobbyMetrics {
    // Session lifecycle
    pub joins_total: AtomicU64,
    pub join_rejected_validation: AtomicU64,
    pub join_rejected_conflict: AtomicU64,
    pub join_failed_store: AtomicU64,
    pub leaves_total: AtomicU64,
    pub renames_total: AtomicU64,
    pub skin_changes_total: AtomicU64,
    pub disconnects_observed: AtomicU64,

    // Liveness signal
    pub heartbeats_sent: AtomicU64,
    pub heartbeats_dropped: AtomicU64,

    // Roster
    pub roster_size: AtomicU64,
    pub roster_updates: AtomicU64,

    start_time: Instant,
}

impl LobbyMetrics {
    pub fn new() -> Self {
        Self {
            joins_total: AtomicU64::new(0),
            join_rejected_validation: AtomicU64::new(0),
            join_rejected_conflict: AtomicU64::new(0),
            join_failed_store: AtomicU64::new(0),
            leaves_total: AtomicU64::new(0),
            renames_total: AtomicU64::new(0),
            skin_changes_total: AtomicU64::new(0),
            disconnects_observed: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            heartbeats_dropped: AtomicU64::new(0),
            roster_size: AtomicU64::new(0),
            roster_updates: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count a failed join by error kind
    pub fn record_join_failure(&self, error: &SessionError) {
        let counter = match error {
            SessionError::EmptyHandle | SessionError::Validation(_) => {
                &self.join_rejected_validation
            }
            SessionError::Conflict(_) => &self.join_rejected_conflict,
            SessionError::Store(_) => &self.join_failed_store,
            SessionError::NotActive | SessionError::AlreadyActive => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a roster snapshot of `size` players
    pub fn record_roster(&self, size: usize) {
        self.roster_size.store(size as u64, Ordering::Relaxed);
        self.roster_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("lobby_joins_total", "Successful joins", "counter",
            self.joins_total.load(Ordering::Relaxed));
        metric!("lobby_join_rejected_validation_total",
            "Joins rejected for an invalid handle", "counter",
            self.join_rejected_validation.load(Ordering::Relaxed));
        metric!("lobby_join_rejected_conflict_total",
            "Joins rejected because the handle was taken", "counter",
            self.join_rejected_conflict.load(Ordering::Relaxed));
        metric!("lobby_join_failed_store_total", "Joins aborted by a store failure", "counter",
            self.join_failed_store.load(Ordering::Relaxed));
        metric!("lobby_leaves_total", "Explicit leaves", "counter",
            self.leaves_total.load(Ordering::Relaxed));
        metric!("lobby_renames_total", "Successful handle changes", "counter",
            self.renames_total.load(Ordering::Relaxed));
        metric!("lobby_skin_changes_total", "Successful skin changes", "counter",
            self.skin_changes_total.load(Ordering::Relaxed));
        metric!("lobby_disconnects_observed_total",
            "Sessions reclaimed by disconnect cleanup", "counter",
            self.disconnects_observed.load(Ordering::Relaxed));
        metric!("lobby_heartbeats_sent_total", "Liveness patches written", "counter",
            self.heartbeats_sent.load(Ordering::Relaxed));
        metric!("lobby_heartbeats_dropped_total", "Liveness patches that failed", "counter",
            self.heartbeats_dropped.load(Ordering::Relaxed));
        metric!("lobby_roster_size", "Players in the last roster snapshot", "gauge",
            self.roster_size.load(Ordering::Relaxed));
        metric!("lobby_roster_updates_total", "Roster snapshots received", "counter",
            self.roster_updates.load(Ordering::Relaxed));
        metric!("lobby_uptime_seconds", "Client uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON-format metrics output
    pub fn to_json(&self) -> String {
        format!(
            r#"{{
  "session": {{
    "joins": {},
    "rejected_validation": {},
    "rejected_conflict": {},
    "failed_store": {},
    "leaves": {},
    "renames": {},
    "skin_changes": {},
    "disconnects_observed": {}
  }},
  "heartbeat": {{
    "sent": {},
    "dropped": {}
  }},
  "roster": {{
    "size": {},
    "updates": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.joins_total.load(Ordering::Relaxed),
            self.join_rejected_validation.load(Ordering::Relaxed),
            self.join_rejected_conflict.load(Ordering::Relaxed),
            self.join_failed_store.load(Ordering::Relaxed),
            self.leaves_total.load(Ordering::Relaxed),
            self.renames_total.load(Ordering::Relaxed),
            self.skin_changes_total.load(Ordering::Relaxed),
            self.disconnects_observed.load(Ordering::Relaxed),
            self.heartbeats_sent.load(Ordering::Relaxed),
            self.heartbeats_dropped.load(Ordering::Relaxed),
            self.roster_size.load(Ordering::Relaxed),
            self.roster_updates.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for LobbyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
#[cfg(feature = "metrics")]
pub async fn start_metrics_server(metrics: Arc<LobbyMetrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        http_ok("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_ok("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_ok("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(feature = "metrics")]
fn http_ok(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}
