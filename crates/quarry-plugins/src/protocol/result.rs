//! The `exec` result envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key under which opaque or legacy text output is stored in a
/// [`KeyValueResult`].
pub const RESERVED_KEY: &str = "_";

/// A result column with an optional declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    declared_type: Option<String>,
}

impl Column {
    /// Creates an untyped column.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
        }
    }

    /// Attaches the declared type reported by the database.
    #[must_use]
    pub fn with_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    /// Returns the column name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the declared type, when the plugin reported one.
    #[must_use]
    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }
}

/// Tabular output: ordered columns and rows of string-formatted cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlResult {
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

impl SqlResult {
    /// Creates a tabular result.
    #[must_use]
    pub const fn new(columns: Vec<Column>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Returns the columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the rows in order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Output of document databases: an ordered list of JSON documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

impl DocumentResult {
    /// Creates a document result.
    #[must_use]
    pub const fn new(documents: Vec<serde_json::Value>) -> Self {
        Self { documents }
    }

    /// Returns the documents in order.
    #[must_use]
    pub fn documents(&self) -> &[serde_json::Value] {
        &self.documents
    }
}

/// Flat key-value output, also used to carry opaque text under
/// [`RESERVED_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValueResult {
    entries: BTreeMap<String, String>,
}

impl KeyValueResult {
    /// Creates a key-value result.
    #[must_use]
    pub const fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Wraps opaque text under the reserved key.
    ///
    /// # Example
    ///
    /// ```
    /// use quarry_plugins::protocol::{KeyValueResult, RESERVED_KEY};
    ///
    /// let kv = KeyValueResult::wrapped("42 rows affected");
    /// assert_eq!(kv.get(RESERVED_KEY), Some("42 rows affected"));
    /// ```
    #[must_use]
    pub fn wrapped(text: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(RESERVED_KEY.to_owned(), text.into());
        Self { entries }
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns all entries.
    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

/// The populated variant of an [`ExecResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    /// Tabular output.
    Sql(SqlResult),
    /// Document output.
    Document(DocumentResult),
    /// Key-value output.
    KeyValue(KeyValueResult),
}

/// Outcome of an `exec` call.
///
/// When no error is present exactly one payload variant is populated. A
/// business failure reported by the plugin carries an error message and
/// optionally a partial payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    payload: Option<ResultPayload>,
    error: Option<String>,
}

impl ExecResult {
    /// Creates a successful result with the given payload.
    #[must_use]
    pub const fn success(payload: ResultPayload) -> Self {
        Self {
            payload: Some(payload),
            error: None,
        }
    }

    /// Creates a business failure without payload.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Wraps opaque text as a key-value result.
    #[must_use]
    pub fn opaque(text: impl Into<String>) -> Self {
        Self::success(ResultPayload::KeyValue(KeyValueResult::wrapped(text)))
    }

    /// Builds a result from decoded parts, rejecting the empty combination.
    #[must_use]
    pub fn from_parts(payload: Option<ResultPayload>, error: Option<String>) -> Option<Self> {
        if payload.is_none() && error.is_none() {
            return None;
        }
        Some(Self { payload, error })
    }

    /// Returns the payload, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&ResultPayload> {
        self.payload.as_ref()
    }

    /// Returns the business error reported by the plugin, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns `true` when the plugin reported no error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the tabular payload, if that is the populated variant.
    #[must_use]
    pub const fn as_sql(&self) -> Option<&SqlResult> {
        match &self.payload {
            Some(ResultPayload::Sql(sql)) => Some(sql),
            _ => None,
        }
    }

    /// Returns the key-value payload, if that is the populated variant.
    #[must_use]
    pub const fn as_key_value(&self) -> Option<&KeyValueResult> {
        match &self.payload {
            Some(ResultPayload::KeyValue(kv)) => Some(kv),
            _ => None,
        }
    }

    /// Returns the document payload, if that is the populated variant.
    #[must_use]
    pub const fn as_document(&self) -> Option<&DocumentResult> {
        match &self.payload {
            Some(ResultPayload::Document(document)) => Some(document),
            _ => None,
        }
    }
}

/// Canonical on-the-wire shape of an [`ExecResult`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sql: Option<SqlResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) document: Option<DocumentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) kv: Option<KeyValueResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl Envelope {
    /// Converts the envelope into a result when at most one payload is set
    /// and the result is not empty.
    pub(crate) fn into_result(self) -> Option<ExecResult> {
        let payloads = [
            self.sql.map(ResultPayload::Sql),
            self.document.map(ResultPayload::Document),
            self.kv.map(ResultPayload::KeyValue),
        ];
        let mut populated = payloads.into_iter().flatten();
        let payload = populated.next();
        if populated.next().is_some() {
            return None;
        }
        ExecResult::from_parts(payload, self.error)
    }
}

impl From<&ExecResult> for Envelope {
    fn from(result: &ExecResult) -> Self {
        let mut envelope = Self {
            error: result.error.clone(),
            ..Self::default()
        };
        match result.payload.clone() {
            Some(ResultPayload::Sql(sql)) => envelope.sql = Some(sql),
            Some(ResultPayload::Document(document)) => envelope.document = Some(document),
            Some(ResultPayload::KeyValue(kv)) => envelope.kv = Some(kv),
            None => {}
        }
        envelope
    }
}

impl Serialize for ExecResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Envelope::from(self).serialize(serializer)
    }
}
