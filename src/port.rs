//! Port descriptors and the value rules attached to them.
//!
//! Every node declares its inputs and outputs as named, typed ports. The
//! type tags are deliberately coarse: they gate connections at graph build
//! time and drive the single permitted coercion (`string` → `json`/`object`)
//! at port-resolution time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;

/// Type tag carried by a port. `Json` and `Object` are equivalent at
/// runtime; `Any` disables checking on that port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Json,
    Any,
}

impl PortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortType::String => "string",
            PortType::Number => "number",
            PortType::Boolean => "boolean",
            PortType::Array => "array",
            PortType::Object => "object",
            PortType::Json => "json",
            PortType::Any => "any",
        }
    }

    fn is_object_like(&self) -> bool {
        matches!(self, PortType::Object | PortType::Json)
    }

    /// Whether a value produced by a port of type `self` may flow into a
    /// port of type `target`.
    pub fn connects_to(&self, target: PortType) -> bool {
        if *self == PortType::Any || target == PortType::Any {
            return true;
        }
        if *self == target {
            return true;
        }
        if self.is_object_like() && target.is_object_like() {
            return true;
        }
        // String sources may feed json/object targets (parse-on-read).
        *self == PortType::String && target.is_object_like()
    }
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single input or output port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    pub port_type: PortType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Finite set of admissible values, when constrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, port_type: PortType, required: bool) -> Self {
        PortDescriptor {
            name: name.into(),
            port_type,
            required,
            default_value: None,
            options: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_options(mut self, options: Vec<Value>) -> Self {
        self.options = Some(options);
        self
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check a supplied value against a port declaration, applying the one
/// permitted coercion (`string` → `json`/`object` via JSON parse). Returns
/// the value to hand to the node.
pub fn coerce_value(port: &PortDescriptor, value: Value) -> Result<Value, NodeError> {
    let coerced = match port.port_type {
        PortType::Any => value,
        PortType::String => match value {
            Value::String(_) => value,
            other => {
                return Err(mismatch(port, &other));
            }
        },
        PortType::Number => match value {
            Value::Number(_) => value,
            other => return Err(mismatch(port, &other)),
        },
        PortType::Boolean => match value {
            Value::Bool(_) => value,
            other => return Err(mismatch(port, &other)),
        },
        PortType::Array => match value {
            Value::Array(_) => value,
            other => return Err(mismatch(port, &other)),
        },
        PortType::Object | PortType::Json => match value {
            Value::Object(_) | Value::Array(_) => value,
            Value::String(s) => {
                serde_json::from_str::<Value>(&s).map_err(|e| NodeError::TypeCoercionError {
                    port: port.name.clone(),
                    reason: e.to_string(),
                })?
            }
            other => return Err(mismatch(port, &other)),
        },
    };

    if let Some(options) = &port.options {
        if !options.contains(&coerced) {
            return Err(NodeError::invalid_value(
                &port.name,
                format!("'{}' is not an admissible value", coerced),
            ));
        }
    }

    Ok(coerced)
}

fn mismatch(port: &PortDescriptor, value: &Value) -> NodeError {
    NodeError::TypeMismatch {
        port: port.name.clone(),
        expected: port.port_type.as_str().to_string(),
        actual: json_type_name(value).to_string(),
    }
}

/// The engine-wide emptiness predicate: null, empty array, empty object
/// and whitespace-only strings are empty. `false`, `0` and `0.0` are not.
/// Merge, PassThrough and the Switch `is_empty` operators all share this.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
