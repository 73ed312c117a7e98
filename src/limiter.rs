use anyhow::Context;
use chrono::{Duration, Utc};

use crate::db::Database;

/// Retention policy applied after measurements are logged.
pub trait MeasurementLimiter: Send {
    fn name(&self) -> &'static str;
    fn configure(&mut self) -> Result<(), anyhow::Error>;
    fn apply(&mut self) -> Result<(), anyhow::Error>;
}

/// Keeps only the newest `max_rows` measurements.
pub struct CountLimiter {
    db: Database,
    max_rows: u64,
    configured: bool,
}

impl CountLimiter {
    pub fn new(db: Database, max_rows: u64) -> Self {
        Self {
            db,
            max_rows,
            configured: false,
        }
    }
}

impl MeasurementLimiter for CountLimiter {
    fn name(&self) -> &'static str {
        "count"
    }

    fn configure(&mut self) -> Result<(), anyhow::Error> {
        self.db
            .ensure_schema()
            .context("Failed to initialize database")?;
        self.configured = true;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), anyhow::Error> {
        if !self.configured {
            return Err(anyhow::anyhow!("Count limiter is not configured"));
        }
        let deleted = self.db.delete_beyond_count(self.max_rows)?;
        if deleted > 0 {
            log::debug!(
                "Pruned {deleted} measurements beyond the newest {}",
                self.max_rows
            );
        }
        Ok(())
    }
}

/// Drops measurements older than a fixed age.
pub struct AgeLimiter {
    db: Database,
    max_age: Duration,
    configured: bool,
}

impl AgeLimiter {
    pub fn new(db: Database, max_age_hours: u64) -> Self {
        let hours = max_age_hours.min(1_000_000) as i64;
        Self {
            db,
            max_age: Duration::hours(hours),
            configured: false,
        }
    }
}

impl MeasurementLimiter for AgeLimiter {
    fn name(&self) -> &'static str {
        "age"
    }

    fn configure(&mut self) -> Result<(), anyhow::Error> {
        self.db
            .ensure_schema()
            .context("Failed to initialize database")?;
        self.configured = true;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), anyhow::Error> {
        if !self.configured {
            return Err(anyhow::anyhow!("Age limiter is not configured"));
        }
        let cutoff = Utc::now() - self.max_age;
        let deleted = self.db.delete_older_than(cutoff)?;
        if deleted > 0 {
            log::debug!("Pruned {deleted} measurements older than {cutoff}");
        }
        Ok(())
    }
}
