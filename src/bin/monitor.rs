use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use climate_station::api::{self, MonitorState};
use climate_station::db::Database;
use climate_station::logging;
use climate_station::settings::Settings;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "climate-monitor",
    about = "Web dashboard for logged climate measurements"
)]
struct Args {
    /// Path of the settings file.
    #[arg(short, long, default_value = "climate-station.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    logging::init()?;

    if let Err(e) = run(&Args::parse()).await {
        log::error!("{e:#}");
    }

    Ok(())
}

async fn run(args: &Args) -> Result<(), anyhow::Error> {
    let settings = Settings::load_or_init(&args.config)?;
    log::set_max_level(settings.logging.level_filter());

    let db = Database::new(&settings.database.path);
    db.ensure_schema().context("Failed to initialize database")?;

    let state = Arc::new(MonitorState {
        db,
        settings: settings.monitor.clone(),
    });
    let app = api::router(state);

    let listener = TcpListener::bind(settings.monitor.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", settings.monitor.listen))?;
    log::info!("Monitor listening on http://{}", settings.monitor.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
