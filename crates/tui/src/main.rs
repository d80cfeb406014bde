mod app;

use anyhow::Result;
use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use gameshelf_core::{
    config::{self, AppConfig},
    LibraryService,
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let (library, events, service_task) = LibraryService::spawn(config)?;

    let mut app = app::GameShelfApp::new(library.clone());
    app.attach_events(events);

    if let Some(root) = env::args_os().nth(1) {
        let root = PathBuf::from(root);
        if let Err(err) = library.set_root_directory(&root).await {
            tracing::error!(root = %root.display(), "Failed to switch games directory: {err}");
            app.set_status(format!("Could not use {}: {err}", root.display()));
        }
    }

    let result = app.run().await;

    library.shutdown();
    if let Err(err) = service_task.await {
        tracing::error!("Library service task error: {err}");
    }
    result
}

fn init_logging() -> Result<()> {
    let log_dir = env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("gameshelf.log"))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

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
