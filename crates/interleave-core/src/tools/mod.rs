//! Tool registry: schemas the model sees plus the handlers that run locally.
//!
//! The registry is built once and shared read-only (`Arc<ToolRegistry>`)
//! across turns. Inputs are checked against the declared JSON schema before a
//! handler is dispatched.

pub mod calculator;
pub mod weather;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::events::ToolOutput;

/// Tool definition as sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Builds an object schema from a property map; every property is required.
    pub fn from_parameters(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        let required: Vec<Value> = parameters.keys().cloned().map(Value::String).collect();
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({
                "type": "object",
                "properties": parameters,
                "required": required,
            }),
        }
    }

    /// The declared property map (`parameters` in tool listings).
    pub fn parameters(&self) -> Value {
        self.input_schema
            .get("properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

/// Result of a tool call as fed back to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn from_output(tool_use_id: impl Into<String>, output: &ToolOutput) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: output.text().to_string(),
            is_error: !output.is_ok(),
        }
    }
}

/// Async tool handler function.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolOutput> + Send>>;
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Tool registry (definitions + handlers).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("definitions", &self.definitions)
            .field("handlers_len", &self.handlers.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `calculate` and `get_weather`.
    pub fn builtins() -> Self {
        Self::new()
            .with_tool(
                calculator::definition(),
                Arc::new(|input| Box::pin(async move { calculator::execute(&input) })),
            )
            .with_tool(
                weather::definition(),
                Arc::new(|input| Box::pin(async move { weather::execute(&input) })),
            )
    }

    #[must_use]
    pub fn with_tool(mut self, definition: ToolDefinition, handler: ToolHandler) -> Self {
        self.register(definition, handler);
        self
    }

    /// Registers a tool, replacing any existing one with the same name.
    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        let key = definition.name.to_ascii_lowercase();
        self.definitions
            .retain(|t| !t.name.eq_ignore_ascii_case(&definition.name));
        self.definitions.push(definition);
        self.handlers.insert(key, handler);
    }

    /// Registers a tool from a bare property map.
    pub fn add_tool<F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        parameters: Map<String, Value>,
        handler: F,
    ) where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutput> + Send + 'static,
    {
        self.register(
            ToolDefinition::from_parameters(name, description, parameters),
            Arc::new(move |input| Box::pin(handler(input))),
        );
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.definitions.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn handler(&self, name: &str) -> Option<ToolHandler> {
        self.handlers.get(&name.to_ascii_lowercase()).cloned()
    }
}

/// Checks `input` against an object schema.
///
/// Supports `type: object`, `required`, and primitive `type`s on properties.
///
/// # Errors
/// Returns a human-readable message naming the first violation.
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    let Some(object) = input.as_object() else {
        return Err("Input must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(format!("Missing required field: {field}"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (field, value) in object {
        let Some(expected) = properties
            .get(field)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if !matches_type(expected, value) {
            return Err(format!("Field '{field}' must be of type {expected}"));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let mut params = Map::new();
        params.insert("text".to_string(), json!({"type": "string"}));
        params.insert("times".to_string(), json!({"type": "integer"}));
        registry.add_tool("echo", "Echo text", params, |input: Value| async move {
            ToolOutput::success(input["text"].as_str().unwrap_or_default())
        });
        registry
    }

    #[test]
    fn test_add_tool_requires_every_parameter() {
        let registry = echo_registry();
        let def = registry.definition("echo").unwrap();
        assert_eq!(def.input_schema["type"], "object");
        let required = def.input_schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(required.contains(&json!("text")));
        assert!(required.contains(&json!("times")));
        assert_eq!(def.parameters()["text"]["type"], "string");
    }

    #[test]
    fn test_register_replaces_case_insensitively() {
        let mut registry = echo_registry();
        registry.add_tool("ECHO", "Louder", Map::new(), |_input: Value| async {
            ToolOutput::success("x")
        });
        assert_eq!(registry.definitions().len(), 1);
        assert_eq!(registry.definition("echo").unwrap().description, "Louder");
        assert!(registry.handler("Echo").is_some());
    }

    #[test]
    fn test_builtins_names() {
        let registry = ToolRegistry::builtins();
        assert_eq!(registry.tool_names(), vec!["calculate", "get_weather"]);
        assert!(!registry.is_empty());
        assert!(ToolRegistry::new().is_empty());
    }

    #[test]
    fn test_validate_input() {
        let registry = echo_registry();
        let schema = &registry.definition("echo").unwrap().input_schema;

        assert!(validate_input(schema, &json!({"text": "hi", "times": 2})).is_ok());
        assert_eq!(
            validate_input(schema, &json!("hi")).unwrap_err(),
            "Input must be a JSON object"
        );
        assert_eq!(
            validate_input(schema, &json!({"text": "hi"})).unwrap_err(),
            "Missing required field: times"
        );
        assert_eq!(
            validate_input(schema, &json!({"text": "hi", "times": 1.5})).unwrap_err(),
            "Field 'times' must be of type integer"
        );
    }

    #[test]
    fn test_validate_ignores_unknown_fields() {
        let schema = json!({"type": "object", "properties": {}});
        assert!(validate_input(&schema, &json!({"extra": true})).is_ok());
    }

    #[tokio::test]
    async fn test_handler_runs() {
        let registry = echo_registry();
        let handler = registry.handler("echo").unwrap();
        let output = handler(json!({"text": "hello", "times": 1})).await;
        assert_eq!(output, ToolOutput::success("hello"));
    }

    #[test]
    fn test_tool_result_from_failure() {
        let output = ToolOutput::failure("handler_error", "boom");
        let result = ToolResult::from_output("toolu_1", &output);
        assert!(result.is_error);
        assert_eq!(result.content, "boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["is_error"], true);

        let ok = ToolResult::from_output("toolu_2", &ToolOutput::success("4"));
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("is_error").is_none());
    }
}
