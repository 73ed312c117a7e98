//! Terminal logger bring-up shared by both binaries.

use anyhow::Context;
use log::LevelFilter;
use simplelog::{ColorChoice, Config, ConfigBuilder, TermLogger, TerminalMode};

/// Installs the terminal logger. The sink accepts every level; the
/// effective verbosity is governed through `log::set_max_level`, which
/// starts at `Info` until the settings file has been read.
pub fn init() -> Result<(), anyhow::Error> {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_time_offset_to_local()
        .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
        .build();
    install(config)
}

fn install(config: Config) -> Result<(), anyhow::Error> {
    TermLogger::init(
        LevelFilter::Trace,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log};
    use simplelog::Config;

    use super::install;

    #[test]
    fn configured_levels_above_info_reach_the_sink() {
        install(Config::default()).unwrap();
        assert_eq!(log::max_level(), LevelFilter::Info);

        let debug = log::Metadata::builder()
            .level(Level::Debug)
            .target("climate_station")
            .build();
        assert!(log::logger().enabled(&debug));
        assert!(!log::log_enabled!(Level::Debug));

        log::set_max_level(LevelFilter::Debug);
        assert!(log::log_enabled!(Level::Debug));
        assert!(!log::log_enabled!(Level::Trace));

        log::set_max_level(LevelFilter::Info);
        assert!(!log::log_enabled!(Level::Debug));
    }
}
