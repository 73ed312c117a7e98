use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::Context;
use backon::{BlockingRetryable, ConstantBuilder};
use bme280::i2c::BME280;
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use rppal::{
    hal::Delay,
    i2c::I2c,
    uart::{Parity, Uart},
};

use crate::measurement::{Measurement, pascals_to_mmhg};
use crate::settings::{SensorSettings, SerialSettings};

/// Source of climate samples. `configure` acquires whatever hardware the
/// provider needs; `measure` fails until it has been called.
pub trait MeasurementProvider: Send {
    fn name(&self) -> &'static str;
    fn configure(&mut self) -> Result<(), anyhow::Error>;
    fn measure(&mut self) -> Result<Measurement, anyhow::Error>;
}

pub const RANDOM_PRESSURE_RANGE: RangeInclusive<f64> = 730.0..=790.0;
pub const RANDOM_TEMPERATURE_RANGE: RangeInclusive<f64> = 15.0..=30.0;
pub const RANDOM_HUMIDITY_RANGE: RangeInclusive<f64> = 30.0..=70.0;

/// Uniformly random samples, usable on machines without any sensor.
pub struct RandomProvider;

impl MeasurementProvider for RandomProvider {
    fn name(&self) -> &'static str {
        "random"
    }

    fn configure(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn measure(&mut self) -> Result<Measurement, anyhow::Error> {
        let mut rng = rand::thread_rng();
        Ok(Measurement {
            timestamp: Utc::now(),
            pressure: rng.gen_range(RANDOM_PRESSURE_RANGE),
            temperature: rng.gen_range(RANDOM_TEMPERATURE_RANGE),
            humidity: rng.gen_range(RANDOM_HUMIDITY_RANGE),
        })
    }
}

/// BME280 on the I2C bus. Configuration probes each configured address
/// in order and keeps the first sensor that answers.
pub struct Bme280Provider {
    settings: SensorSettings,
    delay: Delay,
    device: Option<BME280<I2c>>,
}

impl Bme280Provider {
    pub fn new(settings: SensorSettings) -> Self {
        Self {
            settings,
            delay: Delay,
            device: None,
        }
    }

    fn probe(&self, address: u8) -> Result<BME280<I2c>, anyhow::Error> {
        let i2c = I2c::with_bus(self.settings.bus)
            .with_context(|| format!("Failed to initialize I2C bus {}", self.settings.bus))?;
        let mut device = match address {
            0x76 => BME280::new_primary(i2c),
            0x77 => BME280::new_secondary(i2c),
            other => {
                return Err(anyhow::anyhow!(
                    "Unsupported BME280 address 0x{other:02x}: expected 0x76 or 0x77"
                ));
            }
        };

        let retry_builder = ConstantBuilder::default()
            .with_delay(Duration::from_millis(100))
            .with_max_times(3);
        (|| device.init(&mut Delay))
            .retry(retry_builder)
            .notify(|e, dur| {
                log::warn!("No BME280 answer at 0x{address:02x}: {e}");
                log::info!("Retrying in {:?}", dur);
            })
            .call()
            .with_context(|| format!("Failed to initialize BME280 at 0x{address:02x}"))?;
        Ok(device)
    }
}

impl MeasurementProvider for Bme280Provider {
    fn name(&self) -> &'static str {
        "bme280"
    }

    fn configure(&mut self) -> Result<(), anyhow::Error> {
        let addresses = self.settings.addresses.clone();
        for address in addresses {
            match self.probe(address) {
                Ok(device) => {
                    log::info!(
                        "BME280 found on I2C bus {} at 0x{address:02x}",
                        self.settings.bus
                    );
                    self.device = Some(device);
                    return Ok(());
                }
                Err(e) => log::warn!("{e:#}"),
            }
        }
        Err(anyhow::anyhow!(
            "No BME280 found on I2C bus {} (addresses tried: {})",
            self.settings.bus,
            self.settings
                .addresses
                .iter()
                .map(|a| format!("0x{a:02x}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn measure(&mut self) -> Result<Measurement, anyhow::Error> {
        let device = self
            .device
            .as_mut()
            .context("BME280 provider is not configured")?;
        let sample = device
            .measure(&mut self.delay)
            .map_err(|e| anyhow::anyhow!("Failed to read BME280 measurements: {e}"))?;
        Ok(Measurement {
            timestamp: Utc::now(),
            pressure: pascals_to_mmhg(f64::from(sample.pressure)),
            temperature: f64::from(sample.temperature),
            humidity: f64::from(sample.humidity),
        })
    }
}

pub const SERIAL_PARITY: Parity = Parity::None;
pub const SERIAL_DATA_BITS: u8 = 8;
pub const SERIAL_STOP_BITS: u8 = 1;

pub const ID_COMMAND: &str = "Id";
pub const MEASURE_COMMAND: &str = "Measure All";

const ID_RESPONSE_PATTERN: &str = r"^BMEReader(?:\s+v[0-9]+(?:\.[0-9]+)*)?$";
const MEASURE_RESPONSE_PATTERN: &str =
    r"^P=(-?[0-9]+(?:\.[0-9]+)?);\s*T=(-?[0-9]+(?:\.[0-9]+)?);\s*H=(-?[0-9]+(?:\.[0-9]+)?)\s*$";

const MAX_RESPONSE_LEN: usize = 256;

/// Microcontroller adapter speaking a line protocol over a serial port.
/// Commands are newline terminated; the adapter identifies itself as
/// "BMEReader" and reports measurements as "P=...; T=...; H=...".
pub struct SerialProvider {
    settings: SerialSettings,
    id_pattern: Regex,
    measure_pattern: Regex,
    port: Option<Uart>,
}

impl SerialProvider {
    pub fn new(settings: SerialSettings) -> Result<Self, anyhow::Error> {
        Ok(Self {
            settings,
            id_pattern: Regex::new(ID_RESPONSE_PATTERN)
                .context("Failed to compile identification pattern")?,
            measure_pattern: Regex::new(MEASURE_RESPONSE_PATTERN)
                .context("Failed to compile measurement pattern")?,
            port: None,
        })
    }
}

impl MeasurementProvider for SerialProvider {
    fn name(&self) -> &'static str {
        "serial"
    }

    // The port is committed only after the adapter has identified itself.
    fn configure(&mut self) -> Result<(), anyhow::Error> {
        self.port = None;
        let mut port = Uart::with_path(
            &self.settings.device,
            self.settings.baud_rate,
            SERIAL_PARITY,
            SERIAL_DATA_BITS,
            SERIAL_STOP_BITS,
        )
        .with_context(|| format!("Failed to open serial device {}", self.settings.device))?;
        port.set_read_mode(1, Duration::from_millis(self.settings.read_timeout_ms))
            .context("Failed to set read mode")?;

        let response =
            exchange(&mut port, ID_COMMAND).context("Failed to identify serial adapter")?;
        if !self.id_pattern.is_match(response.trim()) {
            return Err(anyhow::anyhow!(
                "Unexpected serial adapter identification: {response:?}"
            ));
        }
        log::info!("Serial adapter identified as {:?}", response.trim());
        self.port = Some(port);
        Ok(())
    }

    fn measure(&mut self) -> Result<Measurement, anyhow::Error> {
        let port = self
            .port
            .as_mut()
            .context("Serial provider is not configured")?;
        let response =
            exchange(port, MEASURE_COMMAND).context("I/O failure while measuring over serial")?;
        let (pressure, temperature, humidity) =
            parse_measure_response(&self.measure_pattern, response.trim())?;
        Ok(Measurement {
            timestamp: Utc::now(),
            pressure,
            temperature,
            humidity,
        })
    }
}

fn exchange(port: &mut Uart, command: &str) -> Result<String, anyhow::Error> {
    port.write(format!("{command}\n").as_bytes())
        .context("Failed to write command to serial port")?;
    read_line(port)
}

fn read_line(port: &mut Uart) -> Result<String, anyhow::Error> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = port
            .read(&mut byte)
            .context("Failed to read response from serial port")?;
        if n == 0 {
            return Err(anyhow::anyhow!(
                "Serial response timed out after {} bytes",
                line.len()
            ));
        }
        if byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            line.push(byte[0]);
        }
        if line.len() > MAX_RESPONSE_LEN {
            return Err(anyhow::anyhow!(
                "Serial response exceeded {MAX_RESPONSE_LEN} bytes"
            ));
        }
    }
    String::from_utf8(line).context("Serial response is not valid UTF-8")
}

fn parse_measure_response(pattern: &Regex, response: &str) -> Result<(f64, f64, f64), anyhow::Error> {
    let captures = pattern
        .captures(response)
        .with_context(|| format!("Malformed measurement response: {response:?}"))?;
    let number = |i: usize| -> Result<f64, anyhow::Error> {
        captures[i]
            .parse::<f64>()
            .with_context(|| format!("Malformed number in measurement response: {response:?}"))
    };
    Ok((number(1)?, number(2)?, number(3)?))
}
