use anyhow::Context;

use crate::db::Database;
use crate::measurement::Measurement;

/// Sink for measurements. `configure` prepares the sink; logging fails
/// until it has been called.
pub trait MeasurementLogger: Send {
    fn name(&self) -> &'static str;
    fn configure(&mut self) -> Result<(), anyhow::Error>;
    fn log_measurement(&mut self, measurement: &Measurement) -> Result<(), anyhow::Error>;
}

#[derive(Default)]
pub struct ConsoleLogger {
    configured: bool,
}

impl MeasurementLogger for ConsoleLogger {
    fn name(&self) -> &'static str {
        "console"
    }

    fn configure(&mut self) -> Result<(), anyhow::Error> {
        self.configured = true;
        Ok(())
    }

    fn log_measurement(&mut self, measurement: &Measurement) -> Result<(), anyhow::Error> {
        if !self.configured {
            return Err(anyhow::anyhow!("Console logger is not configured"));
        }
        log::info!("{measurement}");
        Ok(())
    }
}

pub struct DatabaseLogger {
    db: Database,
    configured: bool,
}

impl DatabaseLogger {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            configured: false,
        }
    }
}

impl MeasurementLogger for DatabaseLogger {
    fn name(&self) -> &'static str {
        "database"
    }

    fn configure(&mut self) -> Result<(), anyhow::Error> {
        self.db
            .ensure_schema()
            .context("Failed to initialize database")?;
        self.configured = true;
        Ok(())
    }

    fn log_measurement(&mut self, measurement: &Measurement) -> Result<(), anyhow::Error> {
        if !self.configured {
            return Err(anyhow::anyhow!("Database logger is not configured"));
        }
        self.db.insert(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Measurement {
        Measurement {
            timestamp: Utc::now(),
            pressure: 750.0,
            temperature: 21.5,
            humidity: 45.0,
        }
    }

    #[test]
    fn console_logger_fails_before_configuration() {
        let mut logger = ConsoleLogger::default();
        assert!(logger.log_measurement(&sample()).is_err());

        logger.configure().unwrap();
        assert!(logger.log_measurement(&sample()).is_ok());
    }

    #[test]
    fn database_logger_fails_before_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = DatabaseLogger::new(Database::new(dir.path().join("test.db")));
        assert!(logger.log_measurement(&sample()).is_err());
    }

    #[test]
    fn database_logger_persists_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db"));
        let mut logger = DatabaseLogger::new(db.clone());

        logger.configure().unwrap();
        logger.log_measurement(&sample()).unwrap();

        assert_eq!(db.latest(10).unwrap().len(), 1);
    }
}
