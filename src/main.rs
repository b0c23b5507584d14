use ampster::config::Config;
use ampster::integration::{Ampster, DEFAULT_ENTRY_ID};
use ampster::logging::init_logging;
use ampster::web::{AppState, serve};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path, e))?,
        None => Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?,
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Logging init failed: {}", e))?;

    info!("Ampster {} starting up", env!("APP_VERSION"));

    let app = Arc::new(Ampster::new());
    app.setup_entry(DEFAULT_ENTRY_ID, &config)
        .await
        .map_err(|e| anyhow::anyhow!("Setup failed: {}", e))?;

    let state = AppState::new(app.clone(), DEFAULT_ENTRY_ID, config.logging.file.clone());
    let (host, port) = (config.web.host.clone(), config.web.port);
    let web_task = tokio::spawn(async move {
        if let Err(e) = serve(state, &host, port).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    web_task.abort();
    let unloaded = app.unload_all().await;
    info!("Unloaded {} entries; bye", unloaded);
    Ok(())
}
