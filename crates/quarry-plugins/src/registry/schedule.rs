//! The background discovery loop and its injected time sources.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{PluginRegistry, REGISTRY_TARGET};
use crate::error::PluginError;

/// Paces discovery passes.
///
/// The loop stops when the stop channel disconnects; a ticker must return
/// `false` promptly once that happens.
pub trait Ticker: Send + 'static {
    /// Blocks until the next pass is due. Returns `false` when the loop
    /// should stop instead.
    fn wait(&mut self, stop: &Receiver<()>) -> bool;
}

/// Fires at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicker {
    interval: Duration,
}

impl IntervalTicker {
    /// Creates a ticker firing every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    fn wait(&mut self, stop: &Receiver<()>) -> bool {
        matches!(stop.recv_timeout(self.interval), Err(RecvTimeoutError::Timeout))
    }
}

/// Source of wall-clock timestamps for `discoveredAt`.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> OffsetDateTime;
}

/// Reads the system clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Spawns the background discovery thread.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryLoop;

impl DiscoveryLoop {
    /// Starts discovering into `registry`.
    ///
    /// The first pass runs immediately; later passes run whenever `ticker`
    /// fires. A failed pass is logged and the loop carries on.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DiscoveryThread`] if the thread cannot be
    /// started.
    pub fn spawn(
        registry: Arc<PluginRegistry>,
        mut ticker: impl Ticker,
    ) -> Result<DiscoveryHandle, PluginError> {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name(String::from("quarry-discovery"))
            .spawn(move || {
                info!(
                    target: REGISTRY_TARGET,
                    dir = %registry.dir().display(),
                    "plugin discovery started"
                );
                loop {
                    let cancelled = || stop_requested(&stopped);
                    if let Err(err) = registry.discover(&cancelled) {
                        warn!(target: REGISTRY_TARGET, error = %err, "discovery pass failed");
                    }
                    if !ticker.wait(&stopped) {
                        break;
                    }
                }
                debug!(target: REGISTRY_TARGET, "plugin discovery stopped");
            })
            .map_err(|err| PluginError::DiscoveryThread {
                message: err.to_string(),
            })?;
        Ok(DiscoveryHandle {
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

fn stop_requested(stopped: &Receiver<()>) -> bool {
    !matches!(stopped.try_recv(), Err(TryRecvError::Empty))
}

/// Handle to the background discovery thread.
///
/// Dropping the handle signals the loop to stop without waiting for it.
pub struct DiscoveryHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DiscoveryHandle {
    /// Stops the loop and waits for it to exit.
    ///
    /// A pass in progress is abandoned before its next probe, so this waits
    /// at most one probe timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DiscoveryThread`] if the thread panicked.
    pub fn shutdown(mut self) -> Result<(), PluginError> {
        self.stop.take();
        match self.thread.take().map(JoinHandle::join) {
            Some(Err(_)) => Err(PluginError::DiscoveryThread {
                message: String::from("discovery thread panicked"),
            }),
            Some(Ok(())) | None => Ok(()),
        }
    }
}

impl fmt::Debug for DiscoveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryHandle")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.stop.take();
    }
}
