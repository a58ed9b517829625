use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NAME_MARKER: &str = "EXECUTE_FUNCTION:";
pub const ARGS_MARKER: &str = "ARGUMENTS:";

/// A function invocation requested by the operator or a language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), arguments: Map::new() }
    }

    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    /// Two-line text form understood by the directive parser.
    pub fn to_directive(&self) -> String {
        format!(
            "{} {}\n{} {}",
            NAME_MARKER,
            self.name,
            ARGS_MARKER,
            Value::Object(self.arguments.clone())
        )
    }
}

/// Outcome of a dispatched call. A failed result always carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl FunctionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), error: None, data: None }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self { data: Some(data), ..Self::ok(message) }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), error: Some(error.into()), data: None }
    }
}
