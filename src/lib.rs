//! Shared library of the climate station: measurement model, settings,
//! storage, the periodic collection loop and the monitor's HTTP API.

pub mod api;
pub mod collector;
pub mod db;
pub mod limiter;
pub mod logger;
pub mod logging;
pub mod measurement;
pub mod periodic;
pub mod provider;
pub mod registry;
pub mod settings;

pub use measurement::{Measurement, MeasurementFilter};
