//! Shared test doubles and crate-level behaviour tests.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use mockall::mock;
use time::OffsetDateTime;

use crate::error::PluginError;
use crate::invoker::{InvocationRequest, PluginInvoker};
use crate::registry::{Clock, PluginRegistry, Ticker};


mock! {
    pub Invoker {}
    impl PluginInvoker for Invoker {
        fn invoke(&self, request: &InvocationRequest) -> Result<Vec<u8>, PluginError>;
    }
}

/// Writes an executable `/bin/sh` script into `dir`.
#[cfg(unix)]
pub(crate) fn write_plugin(
    dir: &std::path::Path,
    name: &str,
    body: &str,
) -> std::path::PathBuf {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write plugin script");
    let mut permissions = fs::metadata(&path).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("mark script executable");
    path
}

/// `info` answer for a well-behaved plugin.
pub(crate) fn info_json(name: &str, version: &str) -> Vec<u8> {
    format!(
        r#"{{"name":"{name}","version":"{version}","description":"{name} driver","type":"sql"}}"#
    )
    .into_bytes()
}

/// A ticker driven explicitly by the test through [`Tick`].
pub(crate) struct ManualTicker {
    ticks: Receiver<()>,
}

/// Sending half of a [`ManualTicker`].
pub(crate) struct Tick(Sender<()>);

impl ManualTicker {
    pub(crate) fn new() -> (Self, Tick) {
        let (sender, ticks) = mpsc::channel();
        (Self { ticks }, Tick(sender))
    }
}

impl Tick {
    pub(crate) fn fire(&self) {
        self.0.send(()).expect("discovery loop is running");
    }
}

impl Ticker for ManualTicker {
    fn wait(&mut self, stop: &Receiver<()>) -> bool {
        loop {
            if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                return false;
            }
            match self.ticks.recv_timeout(Duration::from_millis(5)) {
                Ok(()) => return true,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

/// A clock that only moves when told to.
pub(crate) struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub(crate) fn new() -> Self {
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid timestamp");
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("clock lock")
    }
}

/// Blocks until `registry` has completed at least `count` passes.
pub(crate) fn wait_for_passes(registry: &PluginRegistry, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry.passes() < count {
        assert!(
            Instant::now() < deadline,
            "registry completed {} of {count} passes",
            registry.passes()
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}
