use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
pub mod clock;
pub mod config;
pub mod database;
pub mod driver;
pub mod engine;
pub mod ipc;
pub mod models;
pub mod monitor;
pub mod registry;
pub mod scheduler;

pub use crate::config::TrackerSettings;
pub use crate::database::{Database, MemoryStore, Store};
pub use crate::driver::EngineHandle;
pub use crate::engine::{TimerEngine, TimerStatus};
pub use crate::registry::SessionRegistry;


/// `$REDTIME_DB`, else `<data dir>/redtime/redtime.db`.
fn database_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("REDTIME_DB") {
        return Some(PathBuf::from(path));
    }
    dirs::data_dir().map(|d| d.join("redtime").join("redtime.db"))
}

/// Open the SQLite store; fall back to memory so tracking still works
/// (without crash recovery) when the disk is unusable.
fn open_store() -> Arc<dyn Store> {
    let Some(path) = database_path() else {
        warn!("[DB] No data directory available, using in-memory store");
        return Arc::new(MemoryStore::new());
    };
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            let msg = match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    "Permission denied. Check the data directory is writable."
                }
                _ => "Failed to create data directory.",
            };
            error!("[DB] {} Path: {}: {}", msg, dir.display(), e);
            return Arc::new(MemoryStore::new());
        }
    }
    match Database::open_with_recovery(&path) {
        Ok(db) => {
            info!("[DB] Using {}", path.display());
            Arc::new(db)
        }
        Err(e) => {
            error!(
                "[DB] Failed to open {}: {}. Using in-memory store, crash recovery disabled.",
                path.display(),
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

/// Writes outbound messages to stdout, one JSON line each.
async fn write_outbound(mut rx: mpsc::UnboundedReceiver<ipc::Outbound>) {
    let mut stdout = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        let line = match msg.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("[IPC] Failed to encode {} message: {}", msg.topic(), e);
                continue;
            }
        };
        if stdout.write_all(line.as_bytes()).await.is_err()
            || stdout.write_all(b"\n").await.is_err()
            || stdout.flush().await.is_err()
        {
            // Tray side went away; later sends are dropped by the closed channel
            warn!("[IPC] Outbound pipe closed");
            break;
        }
    }
}

/// Reads inbound JSON lines from stdin until EOF or `window: quit`.
async fn read_inbound(registry: Arc<SessionRegistry>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("[IPC] Inbound channel closed");
                break;
            }
            Err(e) => {
                error!("[IPC] Failed to read inbound channel: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match ipc::Inbound::parse_line(&line) {
            Ok(msg) => {
                let quit = matches!(
                    &msg,
                    ipc::Inbound::Window(ipc::WindowEvent {
                        action: ipc::WindowAction::Quit
                    })
                );
                registry.route(msg);
                if quit {
                    break;
                }
            }
            Err(e) => warn!("[IPC] Ignoring malformed message: {} ({})", e, line),
        }
    }
}

async fn run_async() {
    let store = open_store();
    let settings = TrackerSettings::load(store.as_ref());

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(out_rx));

    let mut engine = TimerEngine::new(
        settings,
        monitor::default_oracle(),
        store,
        Box::new(ipc::ChannelSink::new(out_tx)),
        Arc::new(clock::TokioClock::new()),
    );
    if engine.restore() {
        info!("[RECOVERY] Previous session restored as paused");
    }

    let (handle, engine_task) = driver::spawn(engine);
    let registry = Arc::new(SessionRegistry::new());
    registry.register(handle.clone());

    tokio::select! {
        _ = read_inbound(registry.clone()) => {}
        _ = tokio::signal::ctrl_c() => info!("[SHUTDOWN] Interrupted"),
    }

    registry.unregister();
    handle.shutdown().await;
    drop(handle);
    if let Err(e) = engine_task.await {
        error!("[SHUTDOWN] Engine task failed: {}", e);
    }
    // engine dropped its sink, so the writer drains and ends
    if let Err(e) = writer.await {
        debug!("[SHUTDOWN] Writer task failed: {}", e);
    }
    info!("[SHUTDOWN] Timer state flushed, bye");
}

pub fn run() {
    // Logs go to stderr: stdout is the tray channel. Default info when RUST_LOG is unset.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("[SETUP] Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    rt.block_on(run_async());
}
