//! JSON-RPC 2.0 envelopes and error codes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body was not valid JSON or not a request object
pub const PARSE_ERROR: i32 = -32700;
/// Method missing or not supported, or tool not registered
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Params do not have the required shape
pub const INVALID_PARAMS: i32 = -32602;
/// Execution failed inside the server
pub const INTERNAL_ERROR: i32 = -32603;
/// Called before `initialize`
pub const NOT_INITIALIZED: i32 = -32002;

/// Inbound request
///
/// Every field is optional at the decoding stage so that a missing `method`
/// can be answered with [`METHOD_NOT_FOUND`] instead of a parse error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol marker, expected to be "2.0"
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Opaque request id echoed in the response
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            id: Some(id.into()),
            method: Some(method.into()),
            params,
        }
    }

    /// Method name, if present and non-blank
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    /// Whether this message expects no response
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.method_name()
            .is_some_and(|m| m.starts_with("notifications/"))
    }
}

/// Error object of a failed call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code
    pub code: i32,
    /// Short description
    pub message: String,
    /// Extra detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an error without data
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach detail
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Body could not be decoded
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error").with_data(detail.into())
    }

    /// Unknown or missing method
    pub fn method_not_found(method: Option<&str>) -> Self {
        match method {
            Some(m) => Self::new(METHOD_NOT_FOUND, format!("Method not found: {m}")),
            None => Self::new(METHOD_NOT_FOUND, "Method not found: request has no method"),
        }
    }

    /// Params do not fit the method
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// Method called before the handshake
    pub fn not_initialized() -> Self {
        Self::new(NOT_INITIALIZED, "Server not initialized")
    }

    /// Execution failure
    pub fn internal(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message).with_data(detail.into())
    }
}

/// Outbound response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Id of the request, null when it could not be read
    pub id: Value,
    /// Result of a successful call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error of a failed call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Error response
    pub fn failure(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(error),
        }
    }

    /// Error code, if this is an error response
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}
