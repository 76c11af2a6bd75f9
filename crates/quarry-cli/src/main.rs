//! CLI entrypoint for the Quarry plugin host.
//!
//! The binary delegates to [`quarry_cli::run`], which loads configuration,
//! parses the subcommand, and drives the plugin engine and credential vault.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    quarry_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
