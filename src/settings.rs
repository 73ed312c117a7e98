//! Settings shared by the logger and monitor binaries.
//!
//! The settings file is JSON with `//` line comments. Comments are
//! stripped before parsing and regenerated on every save, so the file
//! stays self-describing even after hand edits.

use std::fs;
use std::path::Path;

use anyhow::Context;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub logger: LoggerSettings,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "./climate-station.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerSettings {
    /// Registry name of the measurement provider.
    pub provider: String,
    /// Registry names of the measurement loggers, applied in order.
    pub loggers: Vec<String>,
    /// Registry names of the measurement limiters, applied in order.
    pub limiters: Vec<String>,
    pub poll_delay_secs: u64,
    pub sensor: SensorSettings,
    pub serial: SerialSettings,
    pub retention: RetentionSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            provider: "random".to_string(),
            loggers: vec!["console".to_string(), "database".to_string()],
            limiters: vec!["count".to_string(), "age".to_string()],
            poll_delay_secs: 60,
            sensor: SensorSettings::default(),
            serial: SerialSettings::default(),
            retention: RetentionSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorSettings {
    pub bus: u8,
    /// I2C addresses probed in order until a BME280 answers.
    pub addresses: Vec<u8>,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            bus: 1,
            addresses: vec![0x76, 0x77],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetentionSettings {
    pub max_rows: u64,
    pub max_age_hours: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_rows: 100_000,
            max_age_hours: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorSettings {
    pub listen: String,
    pub auth: AuthSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8081".to_string(),
            auth: AuthSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthSettings {
    pub user: String,
    /// Lowercase hex SHA-256 digest of the password.
    pub password_sha256: String,
    pub token_secret: String,
    pub cookie_name: String,
    pub session_hours: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            user: "admin".to_string(),
            // "admin"
            password_sha256: "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"
                .to_string(),
            token_secret: "change-this-secret".to_string(),
            cookie_name: "station_auth".to_string(),
            session_hours: 24,
        }
    }
}

impl Settings {
    /// Loads the settings file, falling back to defaults when it does not
    /// exist, then rewrites it with regenerated comments.
    pub fn load_or_init(path: &Path) -> Result<Settings, anyhow::Error> {
        let settings = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            serde_json::from_str(&strip_comments(&raw))
                .with_context(|| format!("Failed to parse settings file {}", path.display()))?
        } else {
            Settings::default()
        };
        settings.save(path)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), anyhow::Error> {
        let rendered = self.render_commented()?;
        fs::write(path, rendered)
            .with_context(|| format!("Failed to write settings file {}", path.display()))
    }

    fn render_commented(&self) -> Result<String, anyhow::Error> {
        let value = serde_json::to_value(self).context("Failed to serialize settings")?;
        let sections = [
            ("logging", "Log level: off, error, warn, info, debug or trace."),
            ("database", "Path of the SQLite database shared by the logger and the monitor."),
            (
                "logger",
                "Measurement agent: provider is one of random, bme280 or serial; loggers are console and/or database; limiters are count and/or age.",
            ),
            ("monitor", "Web dashboard: listen address and sign-in credentials (passwordSha256 is the hex SHA-256 of the password)."),
        ];

        let mut out = String::from("{\n");
        for (i, (name, comment)) in sections.iter().enumerate() {
            let body = serde_json::to_string_pretty(&value[*name])
                .with_context(|| format!("Failed to serialize settings section {name}"))?;
            out.push_str(&format!("  // {comment}\n  \"{name}\": {}", indent(&body)));
            out.push_str(if i + 1 < sections.len() { ",\n" } else { "\n" });
        }
        out.push_str("}\n");
        Ok(out)
    }
}

fn strip_comments(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent(text: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.to_string()
            } else {
                format!("  {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
