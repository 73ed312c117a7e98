//! Periodic execution of a fallible cycle on the tokio runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

/// Callback invoked with every error a cycle produces. The loop itself
/// never stops on cycle errors.
pub type ErrorHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

pub fn log_error_hook() -> ErrorHook {
    Arc::new(|e| log::error!("{e:#}"))
}

/// One unit of periodic work.
pub trait Cycle: Send + 'static {
    fn run(&mut self) -> impl Future<Output = Result<(), anyhow::Error>> + Send;
}

/// Runs a [`Cycle`] repeatedly with a fixed delay between the end of one
/// run and the start of the next. The task can be stopped and started
/// again; dropping it aborts the loop.
pub struct PeriodicTask<C: Cycle> {
    delay: Duration,
    on_error: ErrorHook,
    cycle: Option<C>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<C>>,
}

impl<C: Cycle> PeriodicTask<C> {
    pub fn new(cycle: C, delay: Duration, on_error: ErrorHook) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            delay,
            on_error,
            cycle: Some(cycle),
            shutdown,
            handle: None,
        }
    }

    /// Spawns the loop task. Returns false without side effects when the
    /// loop is already running.
    pub fn start(&mut self) -> bool {
        if self.handle.is_some() {
            return false;
        }
        let Some(mut cycle) = self.cycle.take() else {
            return false;
        };

        self.shutdown.send_replace(false);
        let mut stop = self.shutdown.subscribe();
        let delay = self.delay;
        let on_error = Arc::clone(&self.on_error);

        self.handle = Some(tokio::spawn(async move {
            loop {
                if let Err(e) = cycle.run().await {
                    (on_error)(&e);
                }
                tokio::select! {
                    _ = stop.changed() => {}
                    _ = time::sleep(delay) => {}
                }
                if *stop.borrow() {
                    break;
                }
            }
            cycle
        }));
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Interrupts the delay wait, lets an in-flight cycle finish and
    /// takes the cycle back so the task can be started again.
    pub async fn stop(&mut self) -> Result<(), anyhow::Error> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.shutdown.send_replace(true);
        let cycle = handle.await.context("periodic task panicked")?;
        self.cycle = Some(cycle);
        Ok(())
    }

    /// The cycle, available whenever the loop is not running.
    pub fn cycle_mut(&mut self) -> Option<&mut C> {
        self.cycle.as_mut()
    }
}

impl<C: Cycle> Drop for PeriodicTask<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
