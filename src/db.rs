use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::measurement::{Measurement, MeasurementFilter};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle on the measurement database. Connections are opened per call
/// and short-lived; WAL mode and a busy timeout cover concurrent access
/// from the logger and the monitor processes.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<Connection, anyhow::Error> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open database file {}", self.path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        Ok(conn)
    }

    /// Creates the measurements table when missing. The timestamp key is
    /// Unix seconds; a sample landing on an existing second replaces it.
    pub fn ensure_schema(&self) -> Result<(), anyhow::Error> {
        let conn = self.open()?;
        conn.execute_batch(
            r"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS measurements (
                timestamp INTEGER PRIMARY KEY,
                pressure REAL NOT NULL,
                temperature REAL NOT NULL,
                humidity REAL NOT NULL
            );
            ",
        )
        .context("Failed to create measurements table")?;
        Ok(())
    }

    pub fn insert(&self, measurement: &Measurement) -> Result<(), anyhow::Error> {
        let conn = self.open()?;
        conn.execute(
            r"
            INSERT OR REPLACE INTO measurements (timestamp, pressure, temperature, humidity)
            VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                measurement.timestamp.timestamp(),
                measurement.pressure,
                measurement.temperature,
                measurement.humidity,
            ],
        )
        .context("Failed to insert measurement")?;
        Ok(())
    }

    /// The `count` most recent measurements, newest first.
    pub fn latest(&self, count: u32) -> Result<Vec<Measurement>, anyhow::Error> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r"
            SELECT timestamp, pressure, temperature, humidity
            FROM measurements
            ORDER BY timestamp DESC
            LIMIT ?1",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![count],
            |row| -> rusqlite::Result<(i64, f64, f64, f64)> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )?;

        let mut measurements = Vec::new();
        for row in rows {
            let (secs, pressure, temperature, humidity) =
                row.context("Failed to read measurement row")?;
            measurements.push(to_measurement(secs, pressure, temperature, humidity)?);
        }
        Ok(measurements)
    }

    /// Averages measurements into fixed-width buckets across the filter
    /// window. Each returned timestamp is the start of its bucket; empty
    /// buckets produce no row.
    pub fn aggregate(&self, filter: &MeasurementFilter) -> Result<Vec<Measurement>, anyhow::Error> {
        let filter = filter.normalized();
        let from = filter.from_time.timestamp();
        let to = filter.to_time.timestamp();
        let step = filter.time_step();

        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r"
            SELECT (timestamp - ?1) / ?3 AS bucket,
                   AVG(pressure), AVG(temperature), AVG(humidity)
            FROM measurements
            WHERE timestamp BETWEEN ?1 AND ?2
            GROUP BY bucket
            ORDER BY bucket",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![from, to, step],
            |row| -> rusqlite::Result<(i64, f64, f64, f64)> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )?;

        let mut measurements = Vec::new();
        for row in rows {
            let (bucket, pressure, temperature, humidity) =
                row.context("Failed to read aggregated row")?;
            measurements.push(to_measurement(
                from + bucket * step,
                pressure,
                temperature,
                humidity,
            )?);
        }
        Ok(measurements)
    }

    /// Deletes everything but the newest `max_rows` measurements and
    /// returns the number of rows removed.
    pub fn delete_beyond_count(&self, max_rows: u64) -> Result<usize, anyhow::Error> {
        let limit = i64::try_from(max_rows).unwrap_or(i64::MAX);
        let conn = self.open()?;
        let deleted = conn
            .execute(
                r"
                DELETE FROM measurements
                WHERE timestamp NOT IN (
                    SELECT timestamp FROM measurements ORDER BY timestamp DESC LIMIT ?1
                )",
                rusqlite::params![limit],
            )
            .context("Failed to prune measurements by count")?;
        Ok(deleted)
    }

    /// Deletes measurements taken before `cutoff` and returns the number
    /// of rows removed.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, anyhow::Error> {
        let conn = self.open()?;
        let deleted = conn
            .execute(
                "DELETE FROM measurements WHERE timestamp < ?1",
                rusqlite::params![cutoff.timestamp()],
            )
            .context("Failed to prune measurements by age")?;
        Ok(deleted)
    }
}

fn to_measurement(
    secs: i64,
    pressure: f64,
    temperature: f64,
    humidity: f64,
) -> Result<Measurement, anyhow::Error> {
    let timestamp = DateTime::from_timestamp(secs, 0)
        .with_context(|| format!("timestamp {secs} is out of range"))?;
    Ok(Measurement {
        timestamp,
        pressure,
        temperature,
        humidity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db"));
        db.ensure_schema().unwrap();
        (dir, db)
    }

    fn sample(secs: i64, temperature: f64) -> Measurement {
        Measurement {
            timestamp: DateTime::from_timestamp(secs, 0).unwrap(),
            pressure: 750.0,
            temperature,
            humidity: 40.0,
        }
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let (_dir, db) = test_db();
        db.ensure_schema().unwrap();
        db.insert(&sample(1_700_000_000, 20.0)).unwrap();
        assert_eq!(db.latest(10).unwrap().len(), 1);
    }

    #[test]
    fn same_second_insert_replaces_the_row() {
        let (_dir, db) = test_db();
        db.insert(&sample(1_700_000_000, 20.0)).unwrap();
        db.insert(&sample(1_700_000_000, 25.0)).unwrap();

        let rows = db.latest(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 25.0);
    }

    #[test]
    fn latest_returns_newest_first_and_honors_the_limit() {
        let (_dir, db) = test_db();
        for i in 0..5 {
            db.insert(&sample(1_700_000_000 + i * 60, f64::from(i as u32)))
                .unwrap();
        }

        let rows = db.latest(3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].temperature, 4.0);
        assert_eq!(rows[2].temperature, 2.0);
    }

    #[test]
    fn aggregate_averages_rows_into_buckets() {
        let (_dir, db) = test_db();
        let from = 1_700_000_000;
        // Two buckets of 29 s each: samples at +0/+10/+20 and +30/+40/+50.
        for (offset, temperature) in [(0, 1.0), (10, 2.0), (20, 3.0), (30, 4.0), (40, 5.0), (50, 6.0)] {
            db.insert(&sample(from + offset, temperature)).unwrap();
        }

        let filter = MeasurementFilter::new(
            DateTime::from_timestamp(from, 0).unwrap(),
            DateTime::from_timestamp(from + 59, 0).unwrap(),
            2,
        );
        assert_eq!(filter.time_step(), 29);

        let rows = db.aggregate(&filter).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp.timestamp(), from);
        assert!((rows[0].temperature - 2.0).abs() < 1e-9);
        assert_eq!(rows[1].timestamp.timestamp(), from + 29);
        assert!((rows[1].temperature - 5.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_skips_empty_buckets() {
        let (_dir, db) = test_db();
        let from = 1_700_000_000;
        db.insert(&sample(from, 1.0)).unwrap();
        db.insert(&sample(from + 90, 2.0)).unwrap();

        let filter = MeasurementFilter::new(
            DateTime::from_timestamp(from, 0).unwrap(),
            DateTime::from_timestamp(from + 99, 0).unwrap(),
            10,
        );

        let rows = db.aggregate(&filter).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp.timestamp(), from);
        assert_eq!(rows[1].timestamp.timestamp(), from + 90);
    }

    #[test]
    fn aggregate_accepts_reversed_endpoints() {
        let (_dir, db) = test_db();
        let from = 1_700_000_000;
        db.insert(&sample(from + 5, 21.0)).unwrap();

        let filter = MeasurementFilter::new(
            DateTime::from_timestamp(from + 100, 0).unwrap(),
            DateTime::from_timestamp(from, 0).unwrap(),
            10,
        );

        let rows = db.aggregate(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 21.0);
    }

    #[test]
    fn aggregate_of_empty_window_returns_no_rows() {
        let (_dir, db) = test_db();
        let filter = MeasurementFilter::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            DateTime::from_timestamp(1_700_000_100, 0).unwrap(),
            10,
        );
        assert!(db.aggregate(&filter).unwrap().is_empty());
    }

    #[test]
    fn delete_beyond_count_keeps_the_newest_rows() {
        let (_dir, db) = test_db();
        for i in 0..5 {
            db.insert(&sample(1_700_000_000 + i * 60, f64::from(i as u32)))
                .unwrap();
        }

        let deleted = db.delete_beyond_count(3).unwrap();
        assert_eq!(deleted, 2);

        let rows = db.latest(10).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].temperature, 2.0);
    }

    #[test]
    fn delete_older_than_removes_only_stale_rows() {
        let (_dir, db) = test_db();
        let base = 1_700_000_000;
        db.insert(&sample(base, 1.0)).unwrap();
        db.insert(&sample(base + 3600, 2.0)).unwrap();

        let cutoff = DateTime::from_timestamp(base + 1800, 0).unwrap();
        let deleted = db.delete_older_than(cutoff).unwrap();
        assert_eq!(deleted, 1);

        let rows = db.latest(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 2.0);
    }
}
