//! Method registry — maps method names to handlers.

use tracing::debug;

use arbor_core::{RpcError, RpcErrorCode};

use crate::context::RpcContext;
use crate::handlers;
use crate::types::{RpcRequest, RpcResponse};

/// Dispatch one request to its handler.
///
/// Unknown methods produce `METHOD_NOT_FOUND`; handler errors become the
/// response's error body. This function never panics on malformed input.
pub async fn dispatch(ctx: &RpcContext, request: RpcRequest) -> RpcResponse {
    let RpcRequest { id, method, params } = request;
    debug!(request_id = %id, method = %method, "rpc dispatch");

    let result = match method.as_str() {
        "session.create" => handlers::session::create(ctx, params),
        "session.resume" => handlers::session::resume(ctx, params),
        "session.list" => handlers::session::list(ctx, params),
        "session.delete" => handlers::session::delete(ctx, params),
        "session.fork" => handlers::session::fork(ctx, params),
        "events.append" => handlers::events::append(ctx, params),
        "events.getHistory" => handlers::events::get_history(ctx, params),
        "events.getStateAt" => handlers::events::get_state_at(ctx, params),
        "events.search" => handlers::events::search(ctx, params),
        "messages.delete" => handlers::message::delete(ctx, params),
        "turn.start" => handlers::turn::start(ctx, params).await,
        "turn.cancel" => handlers::turn::cancel(ctx, params),
        other => Err(RpcError::new(
            RpcErrorCode::MethodNotFound,
            format!("unknown method: {other}"),
        )),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => RpcResponse::failure(id, &error),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
