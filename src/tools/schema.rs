//! Tool signatures offered to the completion service

use crate::llm::ToolDefinition;
use serde_json::{json, Map, Value};

/// Primitive parameter types the completion service can fill in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    StringArray,
}

impl ParamKind {
    fn json_schema(&self, description: &str) -> Value {
        match self {
            ParamKind::String => json!({ "type": "string", "description": description }),
            ParamKind::StringArray => json!({
                "type": "array",
                "items": { "type": "string" },
                "description": description,
            }),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::StringArray => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::StringArray => "array of strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSchema {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSchema {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// One callable tool signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSchema>,
}

impl ToolSchema {
    pub fn param(&self, name: &str) -> Option<&ParamSchema> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSchema> {
        self.params.iter().filter(|p| p.required)
    }

    /// Renders the signature as a function declaration with a JSON Schema body
    pub fn to_definition(&self) -> ToolDefinition {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.kind.json_schema(p.description)))
            .collect();
        let required: Vec<&str> = self.required_params().map(|p| p.name).collect();

        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Checks an argument mapping against this signature.
    ///
    /// Optional parameters may be absent or `null`; required ones must be
    /// present with the declared type. Parameters the signature does not
    /// declare are rejected.
    pub fn check(&self, arguments: &Value) -> Result<(), String> {
        let args = arguments
            .as_object()
            .ok_or_else(|| format!("arguments must be an object, got {}", type_name(arguments)))?;

        for key in args.keys() {
            if self.param(key).is_none() {
                return Err(format!("unexpected parameter '{}'", key));
            }
        }

        for param in &self.params {
            match args.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(format!("missing required parameter '{}'", param.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !param.kind.matches(value) => {
                    return Err(format!(
                        "parameter '{}' must be {}, got {}",
                        param.name,
                        param.kind.label(),
                        type_name(value)
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
