//! `turn.*` handlers.

use serde::Deserialize;
use serde_json::{Value, json};

use arbor_core::RpcError;

use crate::context::{RpcContext, map_runtime_error};
use crate::handlers::decode_params;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartParams {
    session_id: String,
    content: Value,
}

/// `turn.start` — accept a user turn. The response only acknowledges;
/// subsequent results arrive as broadcast events on the session.
pub async fn start(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: StartParams = decode_params(params)?;
    if p.content.is_null() {
        return Err(RpcError::invalid_params("content must not be null"));
    }

    let _handle = ctx
        .sessions
        .start_turn(&p.session_id, p.content)
        .await
        .map_err(|e| map_runtime_error(&e))?;

    Ok(json!({"accepted": true}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelParams {
    session_id: String,
}

/// `turn.cancel` — cooperative cancellation of the in-flight turn.
pub fn cancel(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: CancelParams = decode_params(params)?;
    let cancelled = ctx.sessions.cancel_turn(&p.session_id);
    Ok(json!({"ok": true, "cancelled": cancelled}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
