//! Event repository — core event log operations.
//!
//! The event log is append-only: rows are immutable after commit and form a
//! tree via `parent_id` chains that may cross session boundaries (forks).
//! This repository provides low-level CRUD, tree traversal via recursive
//! CTEs, and query operations. Every method takes `&Connection`; transaction
//! scope belongs to the store layer.

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::errors::Result;
use crate::sqlite::row_types::EventRow;
use crate::types::{EventType, SessionEvent};

const EVENT_COLUMNS: &str = "id, session_id, parent_id, sequence, type, timestamp, payload,
             workspace_id, role, tool_name, tool_call_id, turn,
             input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens";

/// Options for listing events.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListEventsOptions {
    /// Maximum number of events to return.
    pub limit: Option<i64>,
    /// Number of events to skip.
    pub offset: Option<i64>,
}

/// Event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Insert a single event, extracting denormalized fields from the payload.
    pub fn insert(conn: &Connection, event: &SessionEvent) -> Result<()> {
        let role = extract_role(&event.event_type);
        let tool_name = extract_str(&event.payload, "name");
        let tool_call_id = extract_str(&event.payload, "toolCallId");
        let turn = extract_i64(&event.payload, "turn");
        let (input_tokens, output_tokens, cache_read, cache_create) =
            extract_tokens(&event.payload);

        let payload_str = serde_json::to_string(&event.payload)?;

        let _ = conn.execute(
            "INSERT INTO events (id, session_id, parent_id, sequence, type, timestamp, payload,
             workspace_id, role, tool_name, tool_call_id, turn,
             input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                event.id,
                event.session_id,
                event.parent_id,
                event.sequence,
                event.event_type.as_str(),
                event.timestamp,
                payload_str,
                event.workspace_id,
                role,
                tool_name,
                tool_call_id,
                turn,
                input_tokens,
                output_tokens,
                cache_read,
                cache_create,
            ],
        )?;
        Ok(())
    }

    /// Get a single event by ID.
    pub fn get_by_id(conn: &Connection, event_id: &str) -> Result<Option<EventRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![event_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Check if an event exists.
    pub fn exists(conn: &Connection, event_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = ?1)",
            params![event_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get events owned by a session, ordered by sequence ascending.
    ///
    /// Ancestors inherited through a fork are *not* included; they belong to
    /// their own sessions.
    pub fn get_by_session(
        conn: &Connection,
        session_id: &str,
        opts: ListEventsOptions,
    ) -> Result<Vec<EventRow>> {
        let mut sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 ORDER BY sequence ASC"
        );
        if let Some(limit) = opts.limit {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }
        if let Some(offset) = opts.offset {
            use std::fmt::Write;
            let _ = write!(sql, " OFFSET {offset}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get events with `sequence > after_sequence`, ordered ascending.
    pub fn get_since(
        conn: &Connection,
        session_id: &str,
        after_sequence: i64,
        limit: Option<i64>,
    ) -> Result<Vec<EventRow>> {
        let mut sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE session_id = ?1 AND sequence > ?2 ORDER BY sequence ASC"
        );
        if let Some(limit) = limit {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id, after_sequence], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Next sequence number for a session (0 for an empty session).
    pub fn next_sequence(conn: &Connection, session_id: &str) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(sequence) FROM events WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Ancestor chain from the root `session.start` down to and including the
    /// given event, following parent links across fork boundaries.
    pub fn get_ancestors(conn: &Connection, event_id: &str) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "WITH RECURSIVE ancestors(id, session_id, parent_id, sequence, type, timestamp, payload,
                    workspace_id, role, tool_name, tool_call_id, turn,
                    input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens, lvl) AS (
               SELECT id, session_id, parent_id, sequence, type, timestamp, payload,
                      workspace_id, role, tool_name, tool_call_id, turn,
                      input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens, 0
               FROM events WHERE id = ?1
               UNION ALL
               SELECT e.id, e.session_id, e.parent_id, e.sequence, e.type, e.timestamp, e.payload,
                      e.workspace_id, e.role, e.tool_name, e.tool_call_id, e.turn,
                      e.input_tokens, e.output_tokens, e.cache_read_tokens, e.cache_creation_tokens, a.lvl + 1
               FROM events e JOIN ancestors a ON e.id = a.parent_id
               WHERE a.lvl < 100000
             )
             SELECT id, session_id, parent_id, sequence, type, timestamp, payload,
                    workspace_id, role, tool_name, tool_call_id, turn,
                    input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens
             FROM ancestors ORDER BY lvl DESC",
        )?;
        let rows = stmt
            .query_map(params![event_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Direct children of an event, in sequence order.
    pub fn get_children(conn: &Connection, event_id: &str) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE parent_id = ?1 ORDER BY sequence ASC"
        ))?;
        let rows = stmt
            .query_map(params![event_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count events owned by a session.
    pub fn count_by_session(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
        Ok(EventRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            parent_id: row.get(2)?,
            sequence: row.get(3)?,
            event_type: row.get(4)?,
            timestamp: row.get(5)?,
            payload: row.get(6)?,
            workspace_id: row.get(7)?,
            role: row.get(8)?,
            tool_name: row.get(9)?,
            tool_call_id: row.get(10)?,
            turn: row.get(11)?,
            input_tokens: row.get(12)?,
            output_tokens: row.get(13)?,
            cache_read_tokens: row.get(14)?,
            cache_creation_tokens: row.get(15)?,
        })
    }
}

// ─── Extraction helpers ──────────────────────────────────────────────────────

fn extract_role(event_type: &EventType) -> Option<&'static str> {
    match event_type {
        EventType::MessageUser => Some("user"),
        EventType::MessageAssistant => Some("assistant"),
        EventType::ToolResult => Some("tool"),
        _ => None,
    }
}

fn extract_str(val: &Value, key: &str) -> Option<String> {
    val.get(key)?.as_str().map(String::from)
}

fn extract_i64(val: &Value, key: &str) -> Option<i64> {
    val.get(key)?.as_i64()
}

fn extract_tokens(payload: &Value) -> (Option<i64>, Option<i64>, Option<i64>, Option<i64>) {
    match payload.get("tokenUsage") {
        Some(tu) => (
            tu.get("inputTokens").and_then(Value::as_i64),
            tu.get("outputTokens").and_then(Value::as_i64),
            tu.get("cacheReadTokens").and_then(Value::as_i64),
            tu.get("cacheCreationTokens").and_then(Value::as_i64),
        ),
        None => (None, None, None, None),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
