//! Maps settings names to provider, logger and limiter implementations.

use crate::db::Database;
use crate::limiter::{AgeLimiter, CountLimiter, MeasurementLimiter};
use crate::logger::{ConsoleLogger, DatabaseLogger, MeasurementLogger};
use crate::provider::{Bme280Provider, MeasurementProvider, RandomProvider, SerialProvider};
use crate::settings::Settings;

pub const PROVIDER_NAMES: &[&str] = &["random", "bme280", "serial"];
pub const LOGGER_NAMES: &[&str] = &["console", "database"];
pub const LIMITER_NAMES: &[&str] = &["count", "age"];

pub fn build_provider(
    name: &str,
    settings: &Settings,
) -> Result<Box<dyn MeasurementProvider>, anyhow::Error> {
    match name {
        "random" => Ok(Box::new(RandomProvider)),
        "bme280" => Ok(Box::new(Bme280Provider::new(settings.logger.sensor.clone()))),
        "serial" => Ok(Box::new(SerialProvider::new(settings.logger.serial.clone())?)),
        _ => Err(anyhow::anyhow!(
            "Unknown measurement provider {name:?}: expected one of {}",
            PROVIDER_NAMES.join(", ")
        )),
    }
}

pub fn build_logger(
    name: &str,
    settings: &Settings,
) -> Result<Box<dyn MeasurementLogger>, anyhow::Error> {
    match name {
        "console" => Ok(Box::new(ConsoleLogger::default())),
        "database" => Ok(Box::new(DatabaseLogger::new(Database::new(
            &settings.database.path,
        )))),
        _ => Err(anyhow::anyhow!(
            "Unknown measurement logger {name:?}: expected one of {}",
            LOGGER_NAMES.join(", ")
        )),
    }
}

pub fn build_limiter(
    name: &str,
    settings: &Settings,
) -> Result<Box<dyn MeasurementLimiter>, anyhow::Error> {
    let db = Database::new(&settings.database.path);
    match name {
        "count" => Ok(Box::new(CountLimiter::new(
            db,
            settings.logger.retention.max_rows,
        ))),
        "age" => Ok(Box::new(AgeLimiter::new(
            db,
            settings.logger.retention.max_age_hours,
        ))),
        _ => Err(anyhow::anyhow!(
            "Unknown measurement limiter {name:?}: expected one of {}",
            LIMITER_NAMES.join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_provider_name_resolves() {
        let settings = Settings::default();
        for name in PROVIDER_NAMES {
            let provider = build_provider(name, &settings).unwrap();
            assert_eq!(provider.name(), *name);
        }
    }

    #[test]
    fn every_documented_logger_name_resolves() {
        let settings = Settings::default();
        for name in LOGGER_NAMES {
            let logger = build_logger(name, &settings).unwrap();
            assert_eq!(logger.name(), *name);
        }
    }

    #[test]
    fn every_documented_limiter_name_resolves() {
        let settings = Settings::default();
        for name in LIMITER_NAMES {
            let limiter = build_limiter(name, &settings).unwrap();
            assert_eq!(limiter.name(), *name);
        }
    }

    fn rejection<T>(result: Result<T, anyhow::Error>) -> String {
        match result {
            Ok(_) => panic!("the name should have been rejected"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn unknown_names_are_rejected_with_the_alternatives() {
        let settings = Settings::default();

        let message = rejection(build_provider("carrier-pigeon", &settings));
        assert!(message.contains("random, bme280, serial"));

        let message = rejection(build_logger("null", &settings));
        assert!(message.contains("console, database"));

        let message = rejection(build_limiter("none", &settings));
        assert!(message.contains("count, age"));
    }
}
