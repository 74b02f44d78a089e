//! `events.*` handlers.

use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;

use arbor_core::RpcError;
use arbor_events::sqlite::repositories::search::SearchOptions;
use arbor_events::{AppendOptions, EventType};

use crate::context::{RpcContext, map_store_error};
use crate::handlers::decode_params;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendParams {
    session_id: String,
    #[serde(rename = "type")]
    event_type: String,
    payload: Value,
}

/// `events.append` — append one event to a session's chain.
pub fn append(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: AppendParams = decode_params(params)?;
    let event_type =
        EventType::from_str(&p.event_type).unwrap_or(EventType::Unknown(p.event_type.clone()));

    let row = ctx
        .store()
        .append(&AppendOptions {
            session_id: &p.session_id,
            event_type,
            payload: p.payload,
            parent_id: None,
        })
        .map_err(|e| map_store_error(&e))?;

    Ok(json!({"event": row}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    session_id: String,
    since: Option<i64>,
    limit: Option<i64>,
}

/// `events.getHistory` — events owned by a session, optionally after a
/// sequence number. Clients paging with `since = last seen sequence` never
/// see a gap or duplicate.
pub fn get_history(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: HistoryParams = decode_params(params)?;

    if ctx
        .store()
        .get_session(&p.session_id)
        .map_err(|e| map_store_error(&e))?
        .is_none()
    {
        return Err(RpcError::session_not_found(&p.session_id));
    }

    let events = match p.since {
        Some(since) => ctx
            .store()
            .get_events_since(&p.session_id, since, p.limit)
            .map_err(|e| map_store_error(&e))?,
        None => ctx
            .store()
            .get_events_by_session(
                &p.session_id,
                arbor_events::sqlite::repositories::event::ListEventsOptions {
                    limit: p.limit,
                    offset: None,
                },
            )
            .map_err(|e| map_store_error(&e))?,
    };

    Ok(json!({"events": events}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateAtParams {
    event_id: String,
}

/// `events.getStateAt` — deterministic projection at an event.
pub fn get_state_at(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: StateAtParams = decode_params(params)?;
    let state = ctx
        .store()
        .get_state_at(&p.event_id)
        .map_err(|e| map_store_error(&e))?;
    Ok(json!({"state": state}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    query: String,
    workspace_id: Option<String>,
    session_id: Option<String>,
    limit: Option<i64>,
}

/// `events.search` — full-text search, best match first.
pub fn search(ctx: &RpcContext, params: Option<Value>) -> Result<Value, RpcError> {
    let p: SearchParams = decode_params(params)?;
    if p.query.trim().is_empty() {
        return Err(RpcError::invalid_params("query must not be empty"));
    }

    let results = ctx
        .store()
        .search(
            &p.query,
            SearchOptions {
                workspace_id: p.workspace_id.as_deref(),
                session_id: p.session_id.as_deref(),
                types: None,
                limit: p.limit,
            },
        )
        .map_err(|e| map_store_error(&e))?;

    Ok(json!({"results": results}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::session::create;
    use crate::handlers::turn::tests::test_context;
    use arbor_core::RpcErrorCode;
    use serde_json::json;

    fn session(ctx: &crate::RpcContext) -> String {
        create(ctx, Some(json!({"workingDirectory": "/tmp/p"})))
            .unwrap()["session"]["id"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn append_and_history() {
        let ctx = test_context();
        let sid = session(&ctx);

        let appended = append(
            &ctx,
            Some(json!({
                "sessionId": sid,
                "type": "message.user",
                "payload": {"content": "hello", "turn": 1},
            })),
        )
        .unwrap();
        assert_eq!(appended["event"]["sequence"], 1);

        let history = get_history(&ctx, Some(json!({"sessionId": sid}))).unwrap();
        assert_eq!(history["events"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn history_since_pages_without_gaps() {
        let ctx = test_context();
        let sid = session(&ctx);
        for i in 0..3 {
            let _ = append(
                &ctx,
                Some(json!({
                    "sessionId": sid,
                    "type": "message.user",
                    "payload": {"content": format!("m{i}"), "turn": 1},
                })),
            )
            .unwrap();
        }

        let page = get_history(&ctx, Some(json!({"sessionId": sid, "since": 1}))).unwrap();
        let events = page["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["sequence"], 2);
        assert_eq!(events[1]["sequence"], 3);
    }

    #[test]
    fn history_unknown_session_fails() {
        let ctx = test_context();
        let err = get_history(&ctx, Some(json!({"sessionId": "sess_missing"}))).unwrap_err();
        assert_eq!(err.code, RpcErrorCode::SessionNotFound);
    }

    #[test]
    fn state_at_event() {
        let ctx = test_context();
        let sid = session(&ctx);
        let appended = append(
            &ctx,
            Some(json!({
                "sessionId": sid,
                "type": "message.user",
                "payload": {"content": "hello", "turn": 1},
            })),
        )
        .unwrap();
        let event_id = appended["event"]["id"].as_str().unwrap();

        let state = get_state_at(&ctx, Some(json!({"eventId": event_id}))).unwrap();
        assert_eq!(state["state"]["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn state_at_unknown_event_fails() {
        let ctx = test_context();
        let err = get_state_at(&ctx, Some(json!({"eventId": "evt_missing"}))).unwrap_err();
        assert_eq!(err.code, RpcErrorCode::EventNotFound);
    }

    #[test]
    fn search_scoped_to_session() {
        let ctx = test_context();
        let sid = session(&ctx);
        let _ = append(
            &ctx,
            Some(json!({
                "sessionId": sid,
                "type": "message.user",
                "payload": {"content": "findable phrase", "turn": 1},
            })),
        )
        .unwrap();

        let hits = search(
            &ctx,
            Some(json!({"query": "findable", "sessionId": sid})),
        )
        .unwrap();
        assert_eq!(hits["results"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn search_rejects_empty_query() {
        let ctx = test_context();
        let err = search(&ctx, Some(json!({"query": "  "}))).unwrap_err();
        assert_eq!(err.code, RpcErrorCode::InvalidParams);
    }

    #[test]
    fn append_unknown_type_is_stored_opaquely() {
        let ctx = test_context();
        let sid = session(&ctx);
        let appended = append(
            &ctx,
            Some(json!({
                "sessionId": sid,
                "type": "future.widget",
                "payload": {"angle": 90},
            })),
        )
        .unwrap();
        assert_eq!(appended["event"]["type"], "future.widget");
    }
}
