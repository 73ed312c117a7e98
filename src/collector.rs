//! Measurement collection loop.
//!
//! A collector owns one provider, any number of loggers and any number
//! of limiters. Every cycle takes a measurement, hands it to each logger
//! and then applies each limiter. A failing logger or limiter is
//! reported through the error hook and never stops the loop or the rest
//! of the cycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::limiter::MeasurementLimiter;
use crate::logger::MeasurementLogger;
use crate::periodic::{Cycle, ErrorHook, PeriodicTask, log_error_hook};
use crate::provider::MeasurementProvider;

pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(60);

pub struct CollectorCycle {
    provider: Box<dyn MeasurementProvider>,
    loggers: Vec<Box<dyn MeasurementLogger>>,
    limiters: Vec<Box<dyn MeasurementLimiter>>,
    on_error: ErrorHook,
}

impl CollectorCycle {
    fn configure(&mut self) -> Result<(), anyhow::Error> {
        self.provider
            .configure()
            .with_context(|| format!("Failed to configure {} provider", self.provider.name()))?;
        log::info!("Measurement provider: {}", self.provider.name());

        for logger in &mut self.loggers {
            logger
                .configure()
                .with_context(|| format!("Failed to configure {} logger", logger.name()))?;
            log::info!("Measurement logger: {}", logger.name());
        }
        for limiter in &mut self.limiters {
            limiter
                .configure()
                .with_context(|| format!("Failed to configure {} limiter", limiter.name()))?;
            log::info!("Measurement limiter: {}", limiter.name());
        }
        Ok(())
    }
}

impl Cycle for CollectorCycle {
    async fn run(&mut self) -> Result<(), anyhow::Error> {
        let measurement = self.provider.measure().context("Measurement failed")?;

        for logger in &mut self.loggers {
            if let Err(e) = logger.log_measurement(&measurement) {
                let e = e.context(format!(
                    "Failed to log measurement with {} logger",
                    logger.name()
                ));
                (self.on_error)(&e);
            }
        }
        for limiter in &mut self.limiters {
            if let Err(e) = limiter.apply() {
                let e = e.context(format!("Failed to apply {} limiter", limiter.name()));
                (self.on_error)(&e);
            }
        }
        Ok(())
    }
}

/// Periodic measurement collector. Start configures the parts in
/// registration order and spawns the loop; starting a running collector
/// is a no-op.
pub struct Collector {
    task: PeriodicTask<CollectorCycle>,
}

impl Collector {
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::new()
    }

    pub fn start(&mut self) -> Result<(), anyhow::Error> {
        if self.task.is_running() {
            return Ok(());
        }
        let cycle = self
            .task
            .cycle_mut()
            .context("Collector cycle is not available")?;
        cycle.configure()?;
        self.task.start();
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), anyhow::Error> {
        self.task.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Configures the parts and runs a single cycle without spawning the
    /// loop.
    pub async fn run_once(&mut self) -> Result<(), anyhow::Error> {
        let cycle = self
            .task
            .cycle_mut()
            .context("Collector is already running")?;
        cycle.configure()?;
        cycle.run().await
    }
}

pub struct CollectorBuilder {
    provider: Option<Box<dyn MeasurementProvider>>,
    loggers: Vec<Box<dyn MeasurementLogger>>,
    limiters: Vec<Box<dyn MeasurementLimiter>>,
    delay: Duration,
    on_error: ErrorHook,
}

impl CollectorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            loggers: Vec::new(),
            limiters: Vec::new(),
            delay: DEFAULT_POLL_DELAY,
            on_error: log_error_hook(),
        }
    }

    pub fn provider(mut self, provider: Box<dyn MeasurementProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn logger(mut self, logger: Box<dyn MeasurementLogger>) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn limiter(mut self, limiter: Box<dyn MeasurementLimiter>) -> Self {
        self.limiters.push(limiter);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_error(mut self, hook: ErrorHook) -> Self {
        self.on_error = hook;
        self
    }

    pub fn build(self) -> Result<Collector, anyhow::Error> {
        let provider = self
            .provider
            .context("Collector needs a measurement provider")?;
        if self.loggers.is_empty() {
            return Err(anyhow::anyhow!(
                "Collector needs at least one measurement logger"
            ));
        }
        let cycle = CollectorCycle {
            provider,
            loggers: self.loggers,
            limiters: self.limiters,
            on_error: Arc::clone(&self.on_error),
        };
        Ok(Collector {
            task: PeriodicTask::new(cycle, self.delay, self.on_error),
        })
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
