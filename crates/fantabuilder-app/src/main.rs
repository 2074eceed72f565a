// Auction draft server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Load the player catalog and mirror it into the database
// 5. Register configured sessions, resuming any stored progress
// 6. Create channels
// 7. Spawn WebSocket server task
// 8. Spawn app logic task
// 9. Wait for Ctrl+C
// 10. Cleanup on exit

use std::sync::Arc;

use fantabuilder_app::app;
use fantabuilder_app::ws_server;
use fantabuilder_core::config;
use fantabuilder_core::db::Database;
use fantabuilder_core::draft::{Catalog, CatalogError};
use fantabuilder_core::service::DraftService;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file)
    init_tracing()?;
    info!("Fantabuilder starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} sessions, {} starting credits",
        config.sessions.len(),
        config.draft.initial_credits
    );

    // 3. Open database
    let db_path = config.db_path.to_string_lossy().into_owned();
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    info!("Database opened at {db_path}");

    // 4. Load the catalog. The CSV is authoritative when present; a missing
    //    file falls back to whatever a previous run imported.
    let catalog = match Catalog::from_csv_path(&config.catalog_path) {
        Ok(catalog) => {
            db.import_players(catalog.players())
                .context("failed to import player catalog")?;
            catalog
        }
        Err(e @ CatalogError::Io { .. }) => {
            warn!(
                "Could not read catalog {}: {e}; using stored players",
                config.catalog_path.display()
            );
            let players = db.load_players().context("failed to load stored players")?;
            Catalog::new(players).context("stored player catalog is invalid")?
        }
        Err(e) => return Err(e).context("failed to load player catalog"),
    };
    if catalog.is_empty() {
        anyhow::bail!("player catalog is empty");
    }
    info!("Catalog holds {} players", catalog.len());

    // 5. Register sessions
    let mut service = DraftService::new(Arc::clone(&db), Arc::new(catalog));
    app::register_sessions(&mut service, &config.sessions).context("failed to register sessions")?;
    let session_ids: Vec<&str> = service.session_ids().collect();
    info!("Serving sessions: {}", session_ids.join(", "));
    let app_state = app::AppState::new(service);

    // 6. Create channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 7. Spawn WebSocket server task
    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        match ws_server::TcpConnectionListener::bind(ws_port).await {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    info!("WebSocket server listening on {addr}");
                }
                if let Err(e) = ws_server::run(listener, ws_tx).await {
                    error!("WebSocket server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind WebSocket server on port {}: {}", ws_port, e);
            }
        }
    });

    // 8. Spawn app logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, shutdown_rx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 9. Serve until interrupted
    info!("Application ready on port {}", ws_port);
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    let _ = shutdown_tx.send(());

    // 10. Cleanup: wait for app task to finish (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    // Abort WebSocket server (it loops forever)
    ws_handle.abort();

    info!("Fantabuilder shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file under `logs/`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("fantabuilder.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    EnvFilter::new("fantabuilder=info,fantabuilder_core=info,fantabuilder_app=info,warn")
                }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
