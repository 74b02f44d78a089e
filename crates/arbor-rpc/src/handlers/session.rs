//! `session.*` handlers.

use serde::Deserialize;
use serde_json::{Value, json};

use arbor_core::RpcError;
use arbor_events::sqlite::repositories::session::ListSessionsOptions;
use arbor_events::{EventStoreError, ForkOptions};

use crate::context::{RpcContext, map_runtime_error, map_store_error};
use crate::handlers::decode_params;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    working_directory: String,
    initial_model: Option<String>,
    title: Option<String>,
}

/// `session.create` — new session anchored at the working directory's
/// workspace.
pub fn create(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: CreateParams = decode_params(params)?;
    if p.working_directory.is_empty() {
        return Err(RpcError::invalid_params("workingDirectory must not be empty"));
    }
    let model = p.initial_model.unwrap_or_else(|| ctx.default_model.clone());

    let created = ctx
        .store()
        .create_session(
            &p.working_directory,
            &p.working_directory,
            &model,
            p.title.as_deref(),
        )
        .map_err(|e| map_store_error(&e))?;

    Ok(json!({
        "session": created.session,
        "rootEvent": created.root_event,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeParams {
    session_id: String,
}

/// `session.resume` — the session plus its projected state at head.
pub fn resume(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: ResumeParams = decode_params(params)?;
    let resumed = ctx
        .sessions
        .resume(&p.session_id)
        .map_err(|e| map_runtime_error(&e))?;

    Ok(json!({
        "session": resumed.session,
        "messages": resumed.state.messages,
        "tokenUsage": resumed.state.token_usage,
        "model": resumed.state.model,
        "reasoningLevel": resumed.state.reasoning_level,
    }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    working_directory: Option<String>,
    is_active: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// `session.list` — sessions ordered by last activity, newest first.
pub fn list(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: ListParams = decode_params(params)?;

    // An unknown working directory has no workspace and thus no sessions.
    let workspace_id = match &p.working_directory {
        Some(dir) => match ctx
            .store()
            .get_workspace_by_path(dir)
            .map_err(|e| map_store_error(&e))?
        {
            Some(ws) => Some(ws.id),
            None => return Ok(json!({"sessions": []})),
        },
        None => None,
    };

    let sessions = ctx
        .store()
        .list_sessions(ListSessionsOptions {
            workspace_id: workspace_id.as_deref(),
            is_active: p.is_active,
            limit: p.limit,
            offset: p.offset,
        })
        .map_err(|e| map_store_error(&e))?;

    Ok(json!({"sessions": sessions}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteParams {
    session_id: String,
}

/// `session.delete` — soft delete: appends `session.end` with reason
/// `aborted`; events are never removed. Deleting an already-ended session is
/// a no-op.
pub fn delete(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: DeleteParams = decode_params(params)?;
    match ctx.store().end_session(&p.session_id, "aborted") {
        Ok(_) | Err(EventStoreError::SessionEnded(_)) => Ok(json!({"ok": true})),
        Err(e) => Err(map_store_error(&e)),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForkParams {
    session_id: String,
    from_event_id: Option<String>,
    name: Option<String>,
}

/// `session.fork` — new session branching at an event (defaults to the
/// session head).
pub fn fork(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: ForkParams = decode_params(params)?;

    let fork_point = match p.from_event_id {
        Some(id) => id,
        None => ctx
            .store()
            .get_session(&p.session_id)
            .map_err(|e| map_store_error(&e))?
            .ok_or_else(|| RpcError::session_not_found(&p.session_id))?
            .head_event_id
            .ok_or_else(|| RpcError::internal("session has no head event"))?,
    };

    let forked = ctx
        .store()
        .fork(
            &fork_point,
            &ForkOptions {
                name: p.name.as_deref(),
            },
        )
        .map_err(|e| map_store_error(&e))?;

    Ok(json!({
        "session": forked.session,
        "forkEvent": forked.fork_event,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
