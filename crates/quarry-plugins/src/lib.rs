//! Plugin execution engine for Quarry.
//!
//! Database drivers are independently built executables that live in a
//! plugin directory. The host never links a database client; it discovers
//! the executables, probes them, and runs each request in a fresh,
//! short-lived process that speaks JSON over its standard streams.
//!
//! # Architecture
//!
//! - [`protocol`] defines the wire types of the four plugin commands.
//! - [`codec`] encodes requests and decodes responses, repairing shapes
//!   produced by older plugin builds.
//! - [`invoker`] is the seam for running one bounded call;
//!   [`process::ProcessInvoker`] implements it with child processes.
//! - [`registry`] keeps the discovered plugins and runs the background
//!   discovery loop.
//! - [`facade`] composes the above, plus an optional credential vault, into
//!   the operations the host calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use quarry_plugins::{DiscoveryLoop, IntervalTicker, Orchestrator, PluginRegistry};
//! use quarry_plugins::process::ProcessInvoker;
//!
//! let invoker = Arc::new(ProcessInvoker);
//! let registry = Arc::new(PluginRegistry::new(
//!     "/opt/quarry/plugins",
//!     invoker.clone(),
//!     Duration::from_secs(2),
//! ));
//! let discovery = DiscoveryLoop::spawn(
//!     Arc::clone(&registry),
//!     IntervalTicker::new(Duration::from_secs(2)),
//! )
//! .expect("discovery thread starts");
//!
//! let orchestrator = Orchestrator::new(registry, invoker, Duration::from_secs(30));
//! for plugin in orchestrator.list_plugins() {
//!     println!("{}", plugin.name());
//! }
//! discovery.shutdown().expect("discovery stops");
//! ```

pub mod codec;
pub mod error;
pub mod facade;
pub mod invoker;
pub mod process;
pub mod protocol;
pub mod registry;

#[cfg(test)]
mod tests;

pub use self::codec::{DecodeStrategy, DecodedExec};
pub use self::error::PluginError;
pub use self::facade::Orchestrator;
pub use self::invoker::{InvocationRequest, PluginInvoker};
pub use self::protocol::{
    AuthForm, AuthForms, ConnectionParams, ConnectionTree, ExecOptions, ExecResult, PluginCommand,
};
pub use self::registry::{
    DiscoveryHandle, DiscoveryLoop, IntervalTicker, PluginDescriptor, PluginRegistry,
};
