//! Core data types: literal values, module descriptors and errors.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A literal constant appearing in a query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<Utc>),
    /// Declared wire token of an enumeration member.
    Enum(String),
    List(Vec<Value>),
}

/// An enumeration whose members have a declared wire token.
pub trait WireEnum {
    fn wire_token(&self) -> &str;
}

impl Value {
    /// Build an enum literal from its declared wire token.
    pub fn from_enum<E: WireEnum + ?Sized>(value: &E) -> Self {
        Value::Enum(value.wire_token().to_string())
    }

    /// Render the value the way the API expects it on the wire.
    ///
    /// `Null` has no wire form: an absent parameter is how the protocol
    /// spells "no value".
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Date(d) => Some(d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Enum(token) => Some(token.clone()),
            Value::List(items) => Some(
                items
                    .iter()
                    .filter_map(Value::to_wire)
                    .collect::<Vec<_>>()
                    .join("|"),
            ),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Date(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Enum(v) => write!(f, "#{v}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Declared type of a module property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterType {
    /// A primitive type known by name (`string`, `integer`, `boolean`, `timestamp`, ...).
    Simple(String),
    /// An enumeration, listing its allowed wire tokens.
    Enum(Vec<String>),
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterType::Simple(name) => write!(f, "{name}"),
            ParameterType::Enum(values) => write!(f, "enum({})", values.join("|")),
        }
    }
}

/// A property of a module's result, as described by the binding generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "wireType")]
    pub ty: ParameterType,
    #[serde(default)]
    pub nullable: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, ty: ParameterType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Check a literal against the declared type. Returns the reason on mismatch.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if let Value::Null = value {
            return if self.nullable {
                Ok(())
            } else {
                Err("property is not nullable".to_string())
            };
        }

        match (&self.ty, value) {
            (ParameterType::Enum(allowed), Value::Enum(token) | Value::Str(token)) => {
                if allowed.iter().any(|a| a == token) {
                    Ok(())
                } else {
                    Err(format!("'{token}' is not one of {}", allowed.join("|")))
                }
            }
            (ParameterType::Enum(_), Value::List(items)) => {
                items.iter().try_for_each(|item| self.check(item))
            }
            (ParameterType::Enum(_), other) => Err(format!("expected an enum token, got {other}")),
            (ParameterType::Simple(tag), v) => match (tag.as_str(), v) {
                ("boolean", Value::Bool(_))
                | ("integer", Value::Int(_))
                | ("timestamp", Value::Date(_)) => Ok(()),
                ("boolean" | "integer" | "timestamp", Value::List(items)) => {
                    items.iter().try_for_each(|item| self.check(item))
                }
                ("boolean" | "integer" | "timestamp", other) => {
                    Err(format!("expected a {tag} literal, got {other}"))
                }
                _ => Ok(()),
            },
        }
    }
}

/// Description of one API module, produced by the binding generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    #[serde(rename = "moduleName")]
    pub name: String,
    #[serde(rename = "wireParameterPrefix", default)]
    pub prefix: String,
    #[serde(rename = "propertyList", default)]
    pub properties: Vec<Property>,
    #[serde(rename = "listResult", default = "default_list_result")]
    pub list_result: bool,
}

fn default_list_result() -> bool {
    true
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            properties: Vec::new(),
            list_result: true,
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Mark the module as returning a single result element.
    pub fn single(mut self) -> Self {
        self.list_result = false;
        self
    }

    /// Look up a property by its wire name (case-insensitive).
    pub fn property(&self, wire_name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(wire_name))
    }
}

/// Broad classification of a [`WikiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Compile,
    Transport,
    Protocol,
    Configuration,
}

/// Errors that can occur while compiling or executing a query.
#[derive(thiserror::Error, Debug)]
pub enum WikiError {
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Unknown property '{property}' on module '{module}'")]
    UnknownProperty { module: String, property: String },

    #[error("Invalid value for '{property}': {reason}")]
    InvalidValue { property: String, reason: String },

    #[error("Result shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {message} (response: {excerpt:?})")]
    Protocol { message: String, excerpt: String },

    #[error("API error {code}: {info}")]
    Api { code: String, info: String },
}

impl WikiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WikiError::UnsupportedExpression(_)
            | WikiError::UnknownProperty { .. }
            | WikiError::InvalidValue { .. }
            | WikiError::ShapeMismatch { .. } => ErrorKind::Compile,
            WikiError::Configuration(_) => ErrorKind::Configuration,
            WikiError::Transport(_) | WikiError::Io(_) => ErrorKind::Transport,
            WikiError::Protocol { .. } | WikiError::Api { .. } => ErrorKind::Protocol,
        }
    }

    /// Build a protocol error carrying the start of the offending body.
    pub(crate) fn protocol(message: impl Into<String>, body: &str) -> Self {
        const EXCERPT_LEN: usize = 200;
        WikiError::Protocol {
            message: message.into(),
            excerpt: body.chars().take(EXCERPT_LEN).collect(),
        }
    }
}

/// Convenience result type.
pub type WikiResult<T> = Result<T, WikiError>;
