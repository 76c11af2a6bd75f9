//! Field-name normalisation for responses from older plugin builds.
//!
//! Only structural keys are rewritten: the envelope keys, the keys of the
//! `sql` payload and the keys of its column objects. Key-value entries and
//! document bodies are user data and pass through untouched.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::protocol::ExecResult;
use crate::protocol::result::Envelope;

/// Text substituted for SQL `NULL` cells when legacy rows carry JSON nulls.
const NULL_CELL: &str = "NULL";

pub(super) fn decode_normalised(value: &Value) -> Option<ExecResult> {
    let Value::Object(fields) = value else {
        return None;
    };

    let mut envelope = Map::new();
    for (key, inner) in fields {
        let Some(field) = envelope_field(key) else {
            continue;
        };
        let repaired = match field {
            "sql" => repair_sql(inner)?,
            "document" => repair_document(inner),
            "kv" => repair_kv(inner)?,
            _ => match repair_error(inner) {
                Some(message) => message,
                None => continue,
            },
        };
        if envelope.insert(field.to_owned(), repaired).is_some() {
            // Two spellings of the same field; the intent is ambiguous.
            return None;
        }
    }

    Envelope::deserialize(&Value::Object(envelope))
        .ok()?
        .into_result()
}

fn fold(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn envelope_field(key: &str) -> Option<&'static str> {
    match fold(key).as_str() {
        "sql" | "sqlresult" => Some("sql"),
        "document" | "documents" | "documentresult" | "docs" => Some("document"),
        "kv" | "kvresult" | "keyvalue" | "keyvalueresult" => Some("kv"),
        "error" | "err" | "errormessage" => Some("error"),
        _ => None,
    }
}

fn repair_sql(value: &Value) -> Option<Value> {
    let Value::Object(fields) = value else {
        return None;
    };

    let mut columns = Vec::new();
    let mut raw_rows = None;
    for (key, inner) in fields {
        match fold(key).as_str() {
            "columns" | "cols" => columns = repair_columns(inner)?,
            "rows" => raw_rows = Some(inner),
            _ => {}
        }
    }

    let names: Vec<String> = columns
        .iter()
        .filter_map(|column| column.get("name").and_then(Value::as_str))
        .map(str::to_owned)
        .collect();
    let rows = match raw_rows {
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| repair_row(row, &names))
            .collect::<Option<Vec<_>>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return None,
    };

    let mut sql = Map::new();
    sql.insert("columns".to_owned(), Value::Array(columns));
    sql.insert("rows".to_owned(), Value::Array(rows));
    Some(Value::Object(sql))
}

fn repair_columns(value: &Value) -> Option<Vec<Value>> {
    let Value::Array(items) = value else {
        return None;
    };
    items.iter().map(repair_column).collect()
}

fn repair_column(value: &Value) -> Option<Value> {
    let mut column = Map::new();
    match value {
        Value::String(name) => {
            column.insert("name".to_owned(), Value::String(name.clone()));
        }
        Value::Object(fields) => {
            for (key, inner) in fields {
                let target = match fold(key).as_str() {
                    "name" | "columnname" | "column" => "name",
                    "type" | "declaredtype" | "datatype" | "columntype" => "type",
                    _ => continue,
                };
                if !inner.is_null() {
                    column.insert(target.to_owned(), Value::String(cell_text(inner)));
                }
            }
            if !column.contains_key("name") {
                return None;
            }
        }
        _ => return None,
    }
    Some(Value::Object(column))
}

fn repair_row(row: &Value, names: &[String]) -> Option<Value> {
    let cells: Vec<String> = match row {
        Value::Array(cells) => cells.iter().map(cell_text).collect(),
        Value::Object(by_name) => names
            .iter()
            .map(|name| by_name.get(name).map_or_else(|| NULL_CELL.to_owned(), cell_text))
            .collect(),
        _ => return None,
    };
    Some(Value::Array(cells.into_iter().map(Value::String).collect()))
}

fn repair_document(value: &Value) -> Value {
    let documents = match value {
        Value::Array(items) => items.clone(),
        Value::Object(fields) => fields
            .iter()
            .find(|(key, inner)| {
                matches!(fold(key).as_str(), "documents" | "docs") && inner.is_array()
            })
            .and_then(|(_, inner)| inner.as_array().cloned())
            .unwrap_or_else(|| vec![value.clone()]),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    let mut document = Map::new();
    document.insert("documents".to_owned(), Value::Array(documents));
    Value::Object(document)
}

fn repair_kv(value: &Value) -> Option<Value> {
    let Value::Object(entries) = value else {
        return None;
    };
    let repaired = entries
        .iter()
        .map(|(key, inner)| (key.clone(), Value::String(cell_text(inner))))
        .collect();
    Some(Value::Object(repaired))
}

fn repair_error(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(message) if message.trim().is_empty() => None,
        other => Some(Value::String(cell_text(other))),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => NULL_CELL.to_owned(),
        other => other.to_string(),
    }
}
