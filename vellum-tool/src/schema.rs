//! Typed parameter schemas, their JSON Schema rendering, and argument
//! validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed description of a tool's parameters.
///
/// This is the closed set of shapes the registry understands; it renders
/// to JSON Schema for providers and validates incoming arguments before
/// a handler ever sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterSchema {
    /// A string value.
    String {
        /// Optional description shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// A floating-point number.
    Number {
        /// Optional description shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// An integer.
    Integer {
        /// Optional description shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// A boolean.
    Boolean {
        /// Optional description shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// A homogeneous array.
    Array {
        /// Schema of the elements.
        items: Box<ParameterSchema>,
        /// Optional description shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// An object with named properties.
    Object {
        /// Property name to schema.
        properties: BTreeMap<String, ParameterSchema>,
        /// Names of properties a call must supply.
        #[serde(default)]
        required: Vec<String>,
    },
    /// One of a fixed set of values.
    Enum {
        /// The allowed values (strings or numbers).
        values: Vec<serde_json::Value>,
        /// Optional description shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl ParameterSchema {
    /// An object schema with no properties (for zero-argument tools).
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object {
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// A string schema with a description.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::String {
            description: Some(description.into()),
        }
    }

    /// A string enum schema.
    #[must_use]
    pub fn string_enum(values: &[&str]) -> Self {
        Self::Enum {
            values: values
                .iter()
                .map(|v| serde_json::Value::String((*v).to_string()))
                .collect(),
            description: None,
        }
    }

    /// An object schema from `(name, schema)` pairs plus required names.
    #[must_use]
    pub fn object(
        properties: impl IntoIterator<Item = (&'static str, ParameterSchema)>,
        required: &[&str],
    ) -> Self {
        Self::Object {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            required: required.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    /// The JSON Schema `type` name for this schema.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Number { .. } => "number",
            Self::Integer { .. } => "integer",
            Self::Boolean { .. } => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Enum { values, .. } => match values.first() {
                Some(serde_json::Value::Number(_)) => "number",
                _ => "string",
            },
        }
    }

    /// Names of required properties, when this is an object schema.
    #[must_use]
    pub fn required_properties(&self) -> &[String] {
        match self {
            Self::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// Render standard JSON Schema.
    #[must_use]
    pub fn to_json_schema(&self) -> serde_json::Value {
        self.render(false)
    }

    /// Render JSON Schema in strict mode: `additionalProperties: false`
    /// and every property listed in `required`, applied recursively
    /// (the OpenAI strict-output convention).
    #[must_use]
    pub fn to_json_schema_strict(&self) -> serde_json::Value {
        self.render(true)
    }

    fn render(&self, strict: bool) -> serde_json::Value {
        let mut out = match self {
            Self::Array { items, .. } => serde_json::json!({
                "type": "array",
                "items": items.render(strict),
            }),
            Self::Object {
                properties,
                required,
            } => {
                let props: serde_json::Map<String, serde_json::Value> = properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render(strict)))
                    .collect();
                let required: Vec<&str> = if strict {
                    properties.keys().map(String::as_str).collect()
                } else {
                    required.iter().map(String::as_str).collect()
                };
                let mut obj = serde_json::json!({
                    "type": "object",
                    "properties": props,
                    "required": required,
                });
                if strict {
                    obj["additionalProperties"] = serde_json::Value::Bool(false);
                }
                obj
            }
            Self::Enum { values, .. } => serde_json::json!({
                "type": self.type_name(),
                "enum": values,
            }),
            _ => serde_json::json!({ "type": self.type_name() }),
        };

        if let Some(desc) = self.description() {
            out["description"] = serde_json::Value::String(desc.to_string());
        }
        out
    }

    fn description(&self) -> Option<&str> {
        match self {
            Self::String { description }
            | Self::Number { description }
            | Self::Integer { description }
            | Self::Boolean { description }
            | Self::Array { description, .. }
            | Self::Enum { description, .. } => description.as_deref(),
            Self::Object { .. } => None,
        }
    }

    /// Build a schema from exported JSON Schema, best effort.
    ///
    /// Used when tools arrive schema-first (MCP servers). Constructs
    /// this crate cannot represent are dropped from `properties`, which
    /// leaves those fields unvalidated rather than rejected; `required`
    /// names are kept either way.
    #[must_use]
    pub fn from_json_schema(schema: &serde_json::Value) -> Option<Self> {
        let description = schema["description"].as_str().map(str::to_string);
        if let Some(values) = schema["enum"].as_array() {
            return Some(Self::Enum {
                values: values.clone(),
                description,
            });
        }
        match schema["type"].as_str()? {
            "string" => Some(Self::String { description }),
            "number" => Some(Self::Number { description }),
            "integer" => Some(Self::Integer { description }),
            "boolean" => Some(Self::Boolean { description }),
            "array" => Some(Self::Array {
                items: Box::new(Self::from_json_schema(&schema["items"])?),
                description,
            }),
            "object" => {
                let properties = schema["properties"]
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .filter_map(|(k, v)| {
                                Self::from_json_schema(v).map(|s| (k.clone(), s))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let required = schema["required"]
                    .as_array()
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(|n| n.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Self::Object {
                    properties,
                    required,
                })
            }
            _ => None,
        }
    }

    /// Validate call arguments against this schema.
    ///
    /// Only object schemas accept arguments; the registry handles the
    /// `null`-arguments rule before calling this.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violation:
    /// `"missing required field '{k}'"` or `"field '{k}' expected {type}"`.
    pub fn validate(&self, arguments: &serde_json::Value) -> Result<(), String> {
        let Self::Object {
            properties,
            required,
        } = self
        else {
            return Err(format!("expected {} arguments", self.type_name()));
        };

        let Some(map) = arguments.as_object() else {
            return Err("expected an object".to_string());
        };

        for key in required {
            if !map.contains_key(key) {
                return Err(format!("missing required field '{key}'"));
            }
        }

        for (key, value) in map {
            if let Some(schema) = properties.get(key) {
                schema.validate_value(key, value)?;
            }
        }

        Ok(())
    }

    fn validate_value(&self, key: &str, value: &serde_json::Value) -> Result<(), String> {
        let mismatch = || format!("field '{key}' expected {}", self.type_name());
        let ok = match self {
            Self::String { .. } => value.is_string(),
            Self::Number { .. } => value.is_number(),
            Self::Integer { .. } => value.is_i64() || value.is_u64(),
            Self::Boolean { .. } => value.is_boolean(),
            Self::Array { items, .. } => {
                let Some(elements) = value.as_array() else {
                    return Err(mismatch());
                };
                for element in elements {
                    items.validate_value(key, element)?;
                }
                return Ok(());
            }
            Self::Object { .. } => {
                if !value.is_object() {
                    return Err(mismatch());
                }
                return self
                    .validate(value)
                    .map_err(|e| format!("field '{key}': {e}"));
            }
            Self::Enum { values, .. } => {
                if !values.contains(value) {
                    return Err(format!(
                        "field '{key}' expected one of {}",
                        serde_json::Value::Array(values.clone())
                    ));
                }
                return Ok(());
            }
        };
        if ok { Ok(()) } else { Err(mismatch()) }
    }
}
