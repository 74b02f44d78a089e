//! `messages.*` handlers.

use serde::Deserialize;
use serde_json::{Value, json};

use arbor_core::RpcError;

use crate::context::{RpcContext, map_store_error};
use crate::handlers::decode_params;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteParams {
    session_id: String,
    event_id: String,
}

/// `messages.delete` — soft delete: appends a `message.deleted` event; the
/// target stays in the log and disappears from projection.
pub fn delete(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: DeleteParams = decode_params(params)?;
    let row = ctx
        .store()
        .delete_message(&p.session_id, &p.event_id)
        .map_err(|e| map_store_error(&e))?;
    Ok(json!({"event": row}))
}
