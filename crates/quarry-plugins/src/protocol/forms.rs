//! Authentication form descriptions returned by `authforms`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Input widget kind for an [`AuthField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthFieldType {
    /// Free text.
    Text,
    /// Numeric input.
    Number,
    /// Masked secret input.
    Password,
    /// Choice from [`AuthField::options`].
    Select,
    /// Boolean toggle.
    Checkbox,
    /// Path to a local file.
    FilePath,
}

impl AuthFieldType {
    fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "password" => Some(Self::Password),
            "select" => Some(Self::Select),
            "checkbox" => Some(Self::Checkbox),
            "filepath" => Some(Self::FilePath),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for AuthFieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown auth field type '{raw}'")))
    }
}

/// One input of an authentication form.
///
/// The pre-filled value is read from `default`, falling back to
/// `defaultValue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireField")]
pub struct AuthField {
    /// Widget kind.
    #[serde(rename = "type")]
    pub field_type: AuthFieldType,
    /// Connection parameter name the value is stored under.
    pub name: String,
    /// Label shown next to the input.
    #[serde(default)]
    pub label: String,
    /// Whether the field must be filled in.
    #[serde(default)]
    pub required: bool,
    /// Placeholder hint.
    #[serde(default)]
    pub placeholder: String,
    /// Pre-filled value.
    #[serde(default, rename = "default")]
    pub default_value: String,
    /// Allowed values for [`AuthFieldType::Select`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Deserialize)]
struct WireField {
    #[serde(rename = "type")]
    field_type: AuthFieldType,
    name: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    placeholder: String,
    #[serde(default)]
    default: Option<String>,
    #[serde(default, rename = "defaultValue")]
    default_value: Option<String>,
    #[serde(default)]
    options: Vec<String>,
}

impl From<WireField> for AuthField {
    fn from(wire: WireField) -> Self {
        Self {
            field_type: wire.field_type,
            name: wire.name,
            label: wire.label,
            required: wire.required,
            placeholder: wire.placeholder,
            default_value: wire.default.or(wire.default_value).unwrap_or_default(),
            options: wire.options,
        }
    }
}

/// A named authentication method, such as "password" or "connection URI".
///
/// The display name is read from `displayName`, then `display_name`, then
/// `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireForm")]
pub struct AuthForm {
    /// Stable identifier of the form.
    #[serde(default)]
    pub key: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Inputs, in display order.
    #[serde(default)]
    pub fields: Vec<AuthField>,
}

#[derive(Deserialize)]
struct WireForm {
    #[serde(default)]
    key: String,
    #[serde(default, rename = "displayName")]
    camel_name: Option<String>,
    #[serde(default, rename = "display_name")]
    snake_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fields: Vec<AuthField>,
}

impl From<WireForm> for AuthForm {
    fn from(wire: WireForm) -> Self {
        let display_name = wire
            .camel_name
            .or(wire.snake_name)
            .or(wire.name)
            .unwrap_or_default();
        Self {
            key: wire.key,
            display_name,
            fields: wire.fields,
        }
    }
}

/// Forms keyed by their stable identifier.
pub type AuthForms = BTreeMap<String, AuthForm>;
