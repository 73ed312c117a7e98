use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use climate_station::collector::Collector;
use climate_station::logging;
use climate_station::registry;
use climate_station::settings::Settings;

#[derive(Parser)]
#[command(name = "climate-logger", about = "Periodic climate measurement agent")]
struct Args {
    /// Path of the settings file.
    #[arg(short, long, default_value = "climate-station.json")]
    config: PathBuf,

    /// Run a single measurement cycle and exit.
    #[arg(long)]
    once: bool,
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

    let mut builder = Collector::builder()
        .provider(registry::build_provider(&settings.logger.provider, &settings)?)
        .delay(Duration::from_secs(settings.logger.poll_delay_secs));
    for name in &settings.logger.loggers {
        builder = builder.logger(registry::build_logger(name, &settings)?);
    }
    for name in &settings.logger.limiters {
        builder = builder.limiter(registry::build_limiter(name, &settings)?);
    }
    let mut collector = builder.build()?;

    if args.once {
        return collector.run_once().await;
    }

    collector.start().context("Failed to start measurement loop")?;
    log::info!(
        "Logging {} measurements every {} s",
        settings.logger.provider,
        settings.logger.poll_delay_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C signal")?;
    collector.stop().await?;
    log::info!("Measurement loop stopped");

    Ok(())
}
