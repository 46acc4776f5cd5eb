//! Tool trait and descriptor types.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether `value` is acceptable for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// A named, typed parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    pub required: bool,
}

/// What the reasoning engine is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Ordered parameter list.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a required parameter.
    pub fn param(mut self, name: &str, kind: ParameterKind, description: &str) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        });
        self
    }

    /// Add an optional parameter.
    pub fn optional_param(mut self, name: &str, kind: ParameterKind, description: &str) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
        });
        self
    }

    /// JSON Schema for the parameters, in declaration order.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                json!({
                    "type": p.kind.as_str(),
                    "description": p.description,
                }),
            );
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check engine-supplied arguments against the declared parameters.
    ///
    /// `null` is treated as an empty argument object.
    pub fn validate_arguments(&self, args: &Value) -> Result<(), ToolError> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };

        for p in &self.parameters {
            match obj.get(&p.name) {
                None | Some(Value::Null) if p.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing '{}' argument",
                        p.name
                    )));
                }
                Some(value) if !value.is_null() && !p.kind.accepts(value) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "'{}' must be of type {}",
                        p.name,
                        p.kind.as_str()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A callable the reasoning engine may ask for.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameters.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool with already-validated arguments.
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}
