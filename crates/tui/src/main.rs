mod app;

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
};

use cardadmin_core::{
    config::{self, AppConfig},
    resource::{HttpCardApi, ResourceManager},
    session::{SessionGuard, SessionProvider},
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    tracing::info!(api = %config.api_base_url, session = %config.session_file.display(), "Starting cardadmin");

    let session: Arc<dyn SessionProvider> = Arc::new(config.session_store());
    let api = HttpCardApi::new(config.api_base_url.clone()).with_session(Arc::clone(&session));
    let manager = ResourceManager::new(Arc::new(api));
    let guard = SessionGuard::new(session, config.login_path.clone());

    let mut app = app::CardAdminApp::new(guard, manager, &config);
    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("cardadmin.log"))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is owned by the terminal UI, so only the file layer is installed.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
