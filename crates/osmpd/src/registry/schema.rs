//! Argument schemas and binding of request arguments.

use std::fmt;

use osmp_protocol::{Arguments, ErrorKind};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON type accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// JSON string.
    String,
    /// JSON number without a fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
    /// Any JSON value, including `null`.
    Any,
}

impl ParamKind {
    /// Returns true when `value` has this kind. Only [`ParamKind::Any`]
    /// accepts `null`.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    /// Lower-case name used in messages and help output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A named, typed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    required: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
}

impl ParamSpec {
    /// Declares a mandatory parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
        }
    }

    /// Declares an optional parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Attaches a description shown by `help`.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted JSON type.
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Whether the parameter must be supplied.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Help text.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Ordered parameter list of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    params: Vec<ParamSpec>,
}

impl Schema {
    /// Creates a schema that accepts no arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Declaration order defines positional binding.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    /// Validates `arguments` and binds them to parameter names.
    ///
    /// Unknown names are rejected before required parameters are checked, so
    /// a client sending a parameter this server does not know about always
    /// receives [`SchemaViolation::Unexpected`].
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaViolation`] found.
    pub fn bind(&self, arguments: Arguments) -> Result<BoundArguments, SchemaViolation> {
        let values = match arguments {
            Arguments::Named(values) => values,
            Arguments::Positional(values) => self.bind_positional(values)?,
        };

        if let Some(name) = values.keys().find(|name| self.get(name).is_none()) {
            return Err(SchemaViolation::Unexpected {
                param: name.clone(),
            });
        }

        for param in &self.params {
            match values.get(&param.name) {
                None if param.required => {
                    return Err(SchemaViolation::Missing {
                        param: param.name.clone(),
                    });
                }
                Some(value) if !param.kind.accepts(value) => {
                    return Err(SchemaViolation::Invalid {
                        param: param.name.clone(),
                        expected: param.kind,
                    });
                }
                _ => {}
            }
        }

        Ok(BoundArguments { values })
    }

    fn bind_positional(&self, values: Vec<Value>) -> Result<Map<String, Value>, SchemaViolation> {
        if values.len() > self.params.len() {
            return Err(SchemaViolation::ExtraPositional {
                supplied: values.len(),
                accepted: self.params.len(),
            });
        }
        Ok(self
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(values)
            .collect())
    }
}

/// Binds arguments for a command that may lack a schema.
///
/// Without a schema, named arguments pass through unchecked and positional
/// arguments are rejected because they cannot be named.
pub(crate) fn bind(
    schema: Option<&Schema>,
    arguments: Arguments,
) -> Result<BoundArguments, SchemaViolation> {
    match (schema, arguments) {
        (Some(schema), arguments) => schema.bind(arguments),
        (None, Arguments::Named(values)) => Ok(BoundArguments { values }),
        (None, Arguments::Positional(values)) if values.is_empty() => {
            Ok(BoundArguments::default())
        }
        (None, Arguments::Positional(_)) => Err(SchemaViolation::PositionalWithoutSchema),
    }
}

/// Schema violations detected while binding arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// A required parameter was not supplied.
    #[error("missing required argument '{param}'")]
    Missing {
        /// Parameter name.
        param: String,
    },
    /// A value had the wrong JSON type.
    #[error("argument '{param}' must be of type {expected}")]
    Invalid {
        /// Parameter name.
        param: String,
        /// Declared type.
        expected: ParamKind,
    },
    /// A named value matched no parameter.
    #[error("unexpected argument '{param}'")]
    Unexpected {
        /// Supplied name.
        param: String,
    },
    /// More positional values than declared parameters.
    #[error("{supplied} positional arguments supplied but only {accepted} accepted")]
    ExtraPositional {
        /// Number of values supplied.
        supplied: usize,
        /// Number of declared parameters.
        accepted: usize,
    },
    /// Positional values for a command without a schema.
    #[error("command does not declare parameters for positional arguments")]
    PositionalWithoutSchema,
}

impl SchemaViolation {
    /// Protocol error kind reported to clients.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Missing { .. } => ErrorKind::MissingArgument,
            Self::Invalid { .. } => ErrorKind::InvalidArgument,
            Self::Unexpected { .. }
            | Self::ExtraPositional { .. }
            | Self::PositionalWithoutSchema => ErrorKind::UnexpectedArgument,
        }
    }
}

/// Arguments validated against a command's schema, keyed by parameter name.
///
/// Optional parameters that were not supplied are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Map<String, Value>,
}

impl BoundArguments {
    /// Raw value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value of `name`.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Signed integer value of `name`.
    #[must_use]
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Unsigned integer value of `name`.
    #[must_use]
    pub fn u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    /// Floating point value of `name`.
    #[must_use]
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Boolean value of `name`.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Returns true when `name` was supplied.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of supplied arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no argument was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the arguments, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

impl From<Map<String, Value>> for BoundArguments {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}
