//! RPC method handlers, one module per method family.

pub mod events;
pub mod message;
pub mod session;
pub mod turn;

use serde::de::DeserializeOwned;
use serde_json::Value;

use arbor_core::RpcError;

/// Decode a params object into a typed struct, mapping failures to
/// `INVALID_PARAMS`.
pub(crate) fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = params.unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(e.to_string()))
}
