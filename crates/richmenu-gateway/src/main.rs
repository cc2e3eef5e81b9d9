use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use richmenu_core::config::RichMenuConfig;
use richmenu_line::LineClient;
use richmenu_scheduler::{ImageEncoder, Publisher, SchedulerEngine, SqliteJobStore};
use tracing::{info, warn};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "richmenu_gateway=info,richmenu_scheduler=info,richmenu_line=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // load config: RICHMENU_CONFIG > ~/.richmenu/richmenu.toml
    let config_path = std::env::var("RICHMENU_CONFIG").ok();
    let config = RichMenuConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({e}), using defaults");
        RichMenuConfig::default()
    });
    let tz = config.scheduler.tz()?;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let store = Arc::new(SqliteJobStore::new(db)?);
    info!("database schema ready");

    let client = Arc::new(LineClient::new(&config.line)?);
    let publisher = Publisher::new(
        store,
        client,
        ImageEncoder::from(&config.encoder),
        &config.storage.upload_dir,
    );
    let engine = SchedulerEngine::new(
        publisher,
        tz,
        Duration::from_secs(config.scheduler.poll_interval_secs.max(1)),
    );
    let handle = engine.handle();

    // spawn scheduler engine loop in background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(async move { engine.run(shutdown_rx).await });

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, handle));
    let router = app::build_router(state);

    info!("rich menu gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    // let a publish in progress finish before exiting
    let _ = shutdown_tx.send(true);
    engine_task.await?;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
