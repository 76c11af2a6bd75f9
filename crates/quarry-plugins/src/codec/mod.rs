//! Request encoding and response decoding.
//!
//! Plugins ship independently of the host and may lag a protocol revision.
//! `exec` responses therefore pass through an ordered chain of decode
//! strategies, each either producing an [`ExecResult`] or deferring to the
//! next. The last strategy wraps the raw output as opaque text and cannot
//! fail, so a malformed response degrades what is shown instead of failing
//! the call.
//!
//! The probe responses (`info`, `authforms`) and `connection-tree` have no
//! legacy shapes and decode strictly.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PluginError;
use crate::protocol::{
    AuthForms, ConnectionTree, ConnectionTreeNode, ExecRequest, ExecResult, PluginCommand,
    PluginInfo, TreeRequest,
};

mod repair;

use crate::protocol::result::Envelope;

/// Strategy that produced a decoded `exec` result, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// The response matched the current envelope.
    Canonical,
    /// The response was a bare JSON string.
    BareString,
    /// Field names were normalised before decoding.
    NormalisedFields,
    /// The raw output was wrapped as opaque text.
    RawWrap,
}

impl DecodeStrategy {
    /// Returns a stable identifier for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::BareString => "bare_string",
            Self::NormalisedFields => "normalised_fields",
            Self::RawWrap => "raw_wrap",
        }
    }

    /// Returns `true` when a legacy or fallback path was needed.
    #[must_use]
    pub const fn is_repair(self) -> bool {
        !matches!(self, Self::Canonical)
    }
}

impl fmt::Display for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded `exec` response together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedExec {
    result: ExecResult,
    strategy: DecodeStrategy,
}

impl DecodedExec {
    /// Returns the decoded result.
    #[must_use]
    pub const fn result(&self) -> &ExecResult {
        &self.result
    }

    /// Returns the strategy that produced the result.
    #[must_use]
    pub const fn strategy(&self) -> DecodeStrategy {
        self.strategy
    }

    /// Consumes the wrapper, returning the result.
    #[must_use]
    pub fn into_result(self) -> ExecResult {
        self.result
    }
}

type Attempt = fn(&Value) -> Option<ExecResult>;

const EXEC_CHAIN: [(DecodeStrategy, Attempt); 3] = [
    (DecodeStrategy::Canonical, decode_canonical),
    (DecodeStrategy::BareString, decode_bare_string),
    (DecodeStrategy::NormalisedFields, repair::decode_normalised),
];

/// Encodes an `exec` request as a single JSON line.
///
/// # Errors
///
/// Returns [`PluginError::SerializeRequest`] if serialisation fails.
pub fn encode_exec_request(request: &ExecRequest) -> Result<Vec<u8>, PluginError> {
    encode_line(request)
}

/// Encodes a `connection-tree` request as a single JSON line.
///
/// # Errors
///
/// Returns [`PluginError::SerializeRequest`] if serialisation fails.
pub fn encode_tree_request(request: &TreeRequest) -> Result<Vec<u8>, PluginError> {
    encode_line(request)
}

fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, PluginError> {
    let mut line = serde_json::to_vec(value).map_err(PluginError::SerializeRequest)?;
    line.push(b'\n');
    Ok(line)
}

/// Decodes an `exec` response, repairing legacy shapes.
///
/// Never fails: output that matches no known shape is wrapped as opaque text
/// under [`crate::protocol::RESERVED_KEY`].
///
/// # Example
///
/// ```
/// use quarry_plugins::codec::{DecodeStrategy, decode_exec_response};
/// use quarry_plugins::protocol::RESERVED_KEY;
///
/// let decoded = decode_exec_response(br#""42 rows affected""#);
/// assert_eq!(decoded.strategy(), DecodeStrategy::BareString);
/// let kv = decoded.result().as_key_value().unwrap();
/// assert_eq!(kv.get(RESERVED_KEY), Some("42 rows affected"));
/// ```
#[must_use]
pub fn decode_exec_response(stdout: &[u8]) -> DecodedExec {
    if let Ok(value) = serde_json::from_slice::<Value>(stdout) {
        for (strategy, attempt) in EXEC_CHAIN {
            if let Some(result) = attempt(&value) {
                return DecodedExec { result, strategy };
            }
        }
    }
    DecodedExec {
        result: wrap_raw(stdout),
        strategy: DecodeStrategy::RawWrap,
    }
}

fn decode_canonical(value: &Value) -> Option<ExecResult> {
    Envelope::deserialize(value).ok()?.into_result()
}

fn decode_bare_string(value: &Value) -> Option<ExecResult> {
    value.as_str().map(ExecResult::opaque)
}

fn wrap_raw(stdout: &[u8]) -> ExecResult {
    ExecResult::opaque(String::from_utf8_lossy(stdout).trim())
}

/// Decodes an `info` response.
///
/// # Errors
///
/// Returns [`PluginError::Decode`] when the output is not a JSON object.
pub fn decode_info(name: &str, stdout: &[u8]) -> Result<PluginInfo, PluginError> {
    decode_strict(name, PluginCommand::Info, stdout)
}

#[derive(Deserialize)]
struct AuthFormsResponse {
    #[serde(default)]
    forms: AuthForms,
}

/// Decodes an `authforms` response, filling missing form keys from the map
/// key.
///
/// # Errors
///
/// Returns [`PluginError::Decode`] when the output does not match the shape.
pub fn decode_auth_forms(name: &str, stdout: &[u8]) -> Result<AuthForms, PluginError> {
    let response: AuthFormsResponse = decode_strict(name, PluginCommand::AuthForms, stdout)?;
    let mut forms = response.forms;
    for (key, form) in &mut forms {
        if form.key.is_empty() {
            form.key.clone_from(key);
        }
    }
    Ok(forms)
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    nodes: Vec<ConnectionTreeNode>,
    #[serde(default)]
    error: Option<String>,
}

/// Decodes a `connection-tree` response.
///
/// # Errors
///
/// Returns [`PluginError::Reported`] when the plugin included an error, or
/// [`PluginError::Decode`] when the output does not match the shape.
pub fn decode_connection_tree(name: &str, stdout: &[u8]) -> Result<ConnectionTree, PluginError> {
    let response: TreeResponse = decode_strict(name, PluginCommand::ConnectionTree, stdout)?;
    if let Some(message) = response.error.filter(|message| !message.trim().is_empty()) {
        return Err(PluginError::Reported {
            name: name.to_owned(),
            command: PluginCommand::ConnectionTree,
            message,
        });
    }
    Ok(ConnectionTree::new(response.nodes))
}

fn decode_strict<T>(name: &str, command: PluginCommand, stdout: &[u8]) -> Result<T, PluginError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_slice(stdout).map_err(|err| PluginError::Decode {
        name: name.to_owned(),
        command,
        message: err.to_string(),
        source: Some(err),
    })
}
