//! Process-based plugin invocation.
//!
//! [`ProcessInvoker`] implements [`PluginInvoker`] by spawning a fresh child
//! process per call as `<executable> <command>`, writing the request line to
//! stdin, and collecting stdout and stderr until the process exits or the
//! deadline passes. Plugins are never kept resident.
//!
//! Every pipe is serviced by its own helper thread so a plugin that fills
//! one stream while the host is blocked on another cannot deadlock the call.
//! The calling thread only polls the child. When the deadline passes the
//! child is killed and reaped, and the call returns without waiting for the
//! helpers: a grandchild that inherited a pipe must not hold the caller
//! hostage.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::de::IgnoredAny;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::invoker::{InvocationRequest, PluginInvoker};
use crate::protocol::PLUGIN_NAME_ENV;

/// Tracing target for plugin process operations.
const PROCESS_TARGET: &str = "quarry_plugins::process";

/// Interval between exit checks while waiting on a child.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time allowed for the output pipes to reach end-of-file once the child has
/// exited, when the call deadline has already been consumed.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Executes plugins by spawning child processes.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use quarry_plugins::invoker::{InvocationRequest, PluginInvoker};
/// use quarry_plugins::process::ProcessInvoker;
/// use quarry_plugins::protocol::PluginCommand;
///
/// let request = InvocationRequest::new(
///     "sqlite",
///     "/opt/quarry/plugins/sqlite",
///     PluginCommand::Info,
///     Duration::from_secs(2),
/// );
/// let stdout = ProcessInvoker.invoke(&request);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl PluginInvoker for ProcessInvoker {
    fn invoke(&self, request: &InvocationRequest) -> Result<Vec<u8>, PluginError> {
        invoke_process(request)
    }
}

type Captured = Receiver<io::Result<Vec<u8>>>;

fn invoke_process(request: &InvocationRequest) -> Result<Vec<u8>, PluginError> {
    let name = request.plugin();
    let deadline = Instant::now() + request.timeout();

    let mut command = Command::new(request.executable());
    command
        .arg(request.command().as_str())
        .env(PLUGIN_NAME_ENV, name)
        .stdin(if request.payload().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(
        target: PROCESS_TARGET,
        plugin = name,
        command = %request.command(),
        executable = %request.executable().display(),
        timeout_ms = request.timeout_ms(),
        "spawning plugin process"
    );

    let mut child = command.spawn().map_err(|err| PluginError::SpawnFailed {
        name: name.to_owned(),
        message: err.to_string(),
        source: Some(Arc::new(err)),
    })?;

    let (stdout_pipe, stderr_pipe) = match start_helpers(request, &mut child) {
        Ok(pipes) => pipes,
        Err(err) => {
            terminate(name, &mut child);
            return Err(err);
        }
    };

    let status = wait_with_deadline(request, &mut child, deadline)?;
    let stdout = collect(request, &stdout_pipe, deadline)?;
    let stderr = collect(request, &stderr_pipe, deadline)?;
    classify(request, status, stdout, &stderr)
}

fn start_helpers(
    request: &InvocationRequest,
    child: &mut Child,
) -> Result<(Captured, Captured), PluginError> {
    let name = request.plugin();
    if let (Some(stdin), Some(payload)) = (child.stdin.take(), request.payload()) {
        spawn_writer(name, stdin, payload.to_vec())?;
    }
    let stdout = spawn_reader(name, "stdout", child.stdout.take())?;
    let stderr = spawn_reader(name, "stderr", child.stderr.take())?;
    Ok((stdout, stderr))
}

/// Writes the request line and closes stdin. A plugin that exits without
/// reading its input produces a broken pipe, which is not an error.
fn spawn_writer(name: &str, mut stdin: ChildStdin, payload: Vec<u8>) -> Result<(), PluginError> {
    let plugin = name.to_owned();
    thread::Builder::new()
        .name(format!("plugin-stdin-{name}"))
        .spawn(move || {
            let written = stdin.write_all(&payload).and_then(|()| stdin.flush());
            if let Err(err) = written {
                debug!(
                    target: PROCESS_TARGET,
                    plugin = %plugin,
                    error = %err,
                    "plugin did not consume its request"
                );
            }
        })
        .map(drop)
        .map_err(|err| helper_failed(name, err))
}

fn spawn_reader(
    name: &str,
    stream: &str,
    pipe: Option<impl Read + Send + 'static>,
) -> Result<Captured, PluginError> {
    let (sender, receiver) = mpsc::channel();
    let Some(mut pipe) = pipe else {
        drop(sender.send(Ok(Vec::new())));
        return Ok(receiver);
    };
    thread::Builder::new()
        .name(format!("plugin-{stream}-{name}"))
        .spawn(move || {
            let mut buffer = Vec::new();
            let outcome = pipe.read_to_end(&mut buffer).map(|_| buffer);
            // The caller may have given up on this call already.
            drop(sender.send(outcome));
        })
        .map_err(|err| helper_failed(name, err))?;
    Ok(receiver)
}

fn helper_failed(name: &str, err: io::Error) -> PluginError {
    PluginError::SpawnFailed {
        name: name.to_owned(),
        message: format!("failed to start I/O helper thread: {err}"),
        source: Some(Arc::new(err)),
    }
}

fn wait_with_deadline(
    request: &InvocationRequest,
    child: &mut Child,
    deadline: Instant,
) -> Result<ExitStatus, PluginError> {
    let name = request.plugin();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: PROCESS_TARGET,
                    plugin = name,
                    command = %request.command(),
                    ?status,
                    "plugin process exited"
                );
                return Ok(status);
            }
            Ok(None) if Instant::now() >= deadline => {
                warn!(
                    target: PROCESS_TARGET,
                    plugin = name,
                    command = %request.command(),
                    timeout_ms = request.timeout_ms(),
                    "plugin timed out, killing process"
                );
                terminate(name, child);
                return Err(timeout(request));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                terminate(name, child);
                return Err(PluginError::Io {
                    name: name.to_owned(),
                    source: Arc::new(err),
                });
            }
        }
    }
}

/// Kills and reaps the child so it is not left running or as a zombie.
fn terminate(name: &str, child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(target: PROCESS_TARGET, plugin = name, error = %err, "kill failed");
    }
    if let Err(err) = child.wait() {
        debug!(target: PROCESS_TARGET, plugin = name, error = %err, "reap failed");
    }
}

fn collect(
    request: &InvocationRequest,
    captured: &Captured,
    deadline: Instant,
) -> Result<Vec<u8>, PluginError> {
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(DRAIN_GRACE);
    match captured.recv_timeout(wait) {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(err)) => Err(PluginError::Io {
            name: request.plugin().to_owned(),
            source: Arc::new(err),
        }),
        // The child exited but something it spawned still holds the pipe.
        Err(RecvTimeoutError::Timeout) => Err(timeout(request)),
        Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
    }
}

fn timeout(request: &InvocationRequest) -> PluginError {
    PluginError::Timeout {
        name: request.plugin().to_owned(),
        command: request.command(),
        timeout_ms: request.timeout_ms(),
    }
}

/// Separates a logical answer from a process failure.
///
/// Parseable JSON on stdout is an answer whatever the exit status says. A
/// failing exit or stderr chatter without such an answer is a crash. A clean
/// exit with nothing on stdout violates the protocol. Any other stdout is
/// legacy text, handed on for the codec to wrap.
fn classify(
    request: &InvocationRequest,
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: &[u8],
) -> Result<Vec<u8>, PluginError> {
    let name = request.plugin();
    if serde_json::from_slice::<IgnoredAny>(&stdout).is_ok() {
        if !status.success() {
            debug!(
                target: PROCESS_TARGET,
                plugin = name,
                ?status,
                "plugin answered despite unsuccessful exit"
            );
        }
        return Ok(stdout);
    }

    let diagnostics = String::from_utf8_lossy(stderr).trim().to_owned();
    if !status.success() || !diagnostics.is_empty() {
        let message = if diagnostics.is_empty() {
            format!("process exited with {status}")
        } else {
            diagnostics
        };
        return Err(PluginError::Crashed {
            name: name.to_owned(),
            command: request.command(),
            status: status.code(),
            message,
        });
    }

    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(PluginError::InvalidOutput {
            name: name.to_owned(),
            message: String::from("plugin produced no output on stdout"),
        });
    }
    Ok(stdout)
}
