use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lobby_presence::app::{LobbyApp, StartupOutcome};
use lobby_presence::cache::{KeyValueStorage, SessionCache};
use lobby_presence::config::LobbyConfig;
use lobby_presence::metrics::LobbyMetrics;
use lobby_presence::render::{AvatarRenderer, TracingRenderer};
use lobby_presence::roster::{self, RosterView};
use lobby_presence::session::SessionManager;
use lobby_presence::skin::Skin;
use lobby_presence::store::memory::MemoryServer;
use lobby_presence::store::PresenceStore;

#[cfg(feature = "file_cache")]
type Storage = lobby_presence::cache::FileStorage;
#[cfg(not(feature = "file_cache"))]
type Storage = lobby_presence::cache::MemoryStorage;

const HELP: &str = "\
Commands:
  join <handle>    enter the lobby
  rename <handle>  change your handle
  skin <id>        pick a skin (default, blue, red, green)
  roster           list players online
  leave            leave the lobby
  play, stats      not available yet
  quit             leave and exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Lobby Presence v{}", env!("CARGO_PKG_VERSION"));

    let config = LobbyConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: heartbeat={}s, cache={}, prefix={}",
        config.heartbeat_interval.as_secs(),
        config.session_cache_path,
        config.session_key_prefix
    );

    let metrics = Arc::new(LobbyMetrics::new());

    #[cfg(feature = "metrics")]
    if let Some(port) = config.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = lobby_presence::metrics::start_metrics_server(metrics_clone, port).await
            {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // In-process presence backend; one connection for this client
    let server = MemoryServer::new(config.subscription_capacity);
    let store = Arc::new(server.connect());

    let cache = SessionCache::with_prefix(open_storage(&config)?, &config.session_key_prefix);
    let session = SessionManager::new(store.clone(), cache, config.session_config())
        .with_metrics(metrics);
    let mut app = LobbyApp::new(session, TracingRenderer::new());
    let mut view = RosterView::new(store.subscribe().await?);

    match app.start().await {
        StartupOutcome::Ready(player) => println!("Welcome back, {}", player.username()),
        StartupOutcome::NeedsHandle(reason) => {
            if let Some(e) = reason {
                println!("Saved handle not restored: {}", e);
            }
            println!("Pick a handle with: join <handle>  (type 'help' for commands)");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !run_command(&mut app, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            snapshot = view.next_snapshot() => {
                match snapshot {
                    Some(snapshot) => print!("{}", roster::render(&app.on_roster(&snapshot))),
                    None => {
                        warn!("Roster subscription ended");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    view.close();
    app.shutdown().await;

    Ok(())
}

#[cfg(feature = "file_cache")]
fn open_storage(config: &LobbyConfig) -> anyhow::Result<Storage> {
    Ok(Storage::open(&config.session_cache_path)?)
}

#[cfg(not(feature = "file_cache"))]
fn open_storage(_config: &LobbyConfig) -> anyhow::Result<Storage> {
    Ok(Storage::new())
}

/// Run one input line. Returns false when the user asked to quit.
async fn run_command<S, K, R>(app: &mut LobbyApp<S, K, R>, line: &str) -> bool
where
    S: PresenceStore,
    K: KeyValueStorage,
    R: AvatarRenderer,
{
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "join" => match app.submit_handle(arg).await {
            Ok(player) => println!("Joined as {}", player.username()),
            Err(e) => println!("Join failed: {}", e),
        },
        "rename" => match app.change_handle(arg).await {
            Ok(()) => println!("Handle changed to {}", arg),
            Err(e) => println!("Rename failed: {}", e),
        },
        "skin" => {
            if arg.is_empty() {
                let ids: Vec<&str> = Skin::ALL.iter().map(|s| s.as_str()).collect();
                println!("Current skin: {} (choices: {})", app.selected_skin(), ids.join(", "));
            } else {
                match app.select_skin(arg).await {
                    Ok(skin) => println!("Skin: {}", skin),
                    Err(e) => println!("Skin change failed: {}", e),
                }
            }
        }
        "roster" => match app.roster().await {
            Ok(entries) => print!("{}", roster::render(&entries)),
            Err(e) => println!("Roster unavailable: {}", e),
        },
        "leave" => match app.leave().await {
            Ok(()) => println!("Left the lobby"),
            Err(e) => println!("Leave failed: {}", e),
        },
        "play" | "stats" => println!("'{}' is not available yet", command),
        "help" => println!("{}", HELP),
        "quit" | "exit" => return false,
        other => println!("Unknown command '{}', type 'help'", other),
    }

    true
}
