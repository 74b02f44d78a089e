//! RPC wire-format types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbor_core::RpcError;

/// Incoming RPC request from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Unique request identifier.
    pub id: String,
    /// Method name (e.g. `session.create`).
    pub method: String,
    /// Optional parameters object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outgoing RPC response to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Result payload (present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error body inside an [`RpcResponse`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `SESSION_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: impl Into<String>, error: &RpcError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcErrorBody {
                code: error.code.as_str().to_owned(),
                message: error.message.clone(),
            }),
        }
    }
}
