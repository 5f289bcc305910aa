//! Tool definitions translated on demand into each backend family's schema.
//!
//! ```rust
//! use sbprovider::{ParameterKind, ToolDefinition, ToolParameter};
//!
//! let tool = ToolDefinition::new("lookup", "Look up a record")
//!     .with_parameter(ToolParameter::required("id", ParameterKind::String, "Record id"));
//!
//! let schema = tool.json_schema();
//! assert_eq!(schema["type"], "object");
//! assert_eq!(schema["required"][0], "id");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterKind {
    /// Lower-case JSON-schema type tag shared by the OpenAI and Anthropic
    /// families.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            default: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn required(
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        let mut parameter = Self::new(name, kind, description);
        parameter.required = true;
        parameter
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed_values(mut self, allowed_values: Vec<Value>) -> Self {
        self.allowed_values = allowed_values;
        self
    }
}

/// Stateless tool description with an ordered parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ToolParameter>,
    #[serde(default = "default_returns")]
    pub returns: ParameterKind,
}

fn default_returns() -> ParameterKind {
    ParameterKind::String
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            returns: ParameterKind::String,
        }
    }

    /// Appends a parameter.
    ///
    /// # Panics
    ///
    /// Panics if a parameter with the same name is already declared; duplicate
    /// parameter names are a programming error, not a runtime condition.
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        assert!(
            !self.parameters.iter().any(|p| p.name == parameter.name),
            "duplicate tool parameter name '{}' in tool '{}'",
            parameter.name,
            self.name
        );
        self.parameters.push(parameter);
        self
    }

    pub fn with_returns(mut self, returns: ParameterKind) -> Self {
        self.returns = returns;
        self
    }

    /// Draft-style object schema embedded verbatim by the OpenAI and
    /// Anthropic families; the Gemini family re-cases the type tags.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for parameter in &self.parameters {
            let mut property = Map::new();
            property.insert("type".to_string(), json!(parameter.kind.as_str()));
            property.insert("description".to_string(), json!(parameter.description));

            if let Some(default) = &parameter.default {
                property.insert("default".to_string(), default.clone());
            }

            if !parameter.allowed_values.is_empty() {
                property.insert("enum".to_string(), Value::from(parameter.allowed_values.clone()));
            }

            properties.insert(parameter.name.clone(), Value::Object(property));
            if parameter.required {
                required.push(json!(parameter.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_preserves_order_and_required_flags() {
        let tool = ToolDefinition::new("search", "Search things")
            .with_parameter(ToolParameter::required("query", ParameterKind::String, "Query text"))
            .with_parameter(
                ToolParameter::new("limit", ParameterKind::Integer, "Max results")
                    .with_default(json!(10)),
            );

        let schema = tool.json_schema();
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["default"], 10);
        assert_eq!(schema["required"], json!(["query"]));
    }

    #[test]
    fn enum_values_surface_in_schema() {
        let tool = ToolDefinition::new("set_mode", "Set mode").with_parameter(
            ToolParameter::required("mode", ParameterKind::String, "Mode")
                .with_allowed_values(vec![json!("fast"), json!("slow")]),
        );

        let schema = tool.json_schema();
        assert_eq!(schema["properties"]["mode"]["enum"], json!(["fast", "slow"]));
    }

    #[test]
    fn declared_return_kind_defaults_to_string() {
        let tool = ToolDefinition::new("fetch", "Fetch a value");
        assert_eq!(tool.returns, ParameterKind::String);

        let typed = tool.with_returns(ParameterKind::Object);
        assert_eq!(typed.returns, ParameterKind::Object);
    }

    #[test]
    #[should_panic(expected = "duplicate tool parameter name")]
    fn duplicate_parameter_names_panic() {
        let _ = ToolDefinition::new("bad", "Duplicate params")
            .with_parameter(ToolParameter::new("x", ParameterKind::String, "first"))
            .with_parameter(ToolParameter::new("x", ParameterKind::String, "second"));
    }
}
