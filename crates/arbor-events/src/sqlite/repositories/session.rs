//! Session repository — session rows, head/root pointers, cached counters.
//!
//! Cached counters are an optimisation only: state projection recomputes from
//! events and never trusts them. They are updated in the same transaction as
//! the append that changes them.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::sqlite::row_types::SessionRow;

const SESSION_COLUMNS: &str = "id, workspace_id, head_event_id, root_event_id, title,
             latest_model, latest_reasoning_level, working_directory,
             parent_session_id, fork_from_event_id,
             created_at, last_activity_at, ended_at,
             event_count, message_count,
             total_input_tokens, total_output_tokens,
             total_cache_read_tokens, total_cache_creation_tokens";

/// Options for creating a session row.
pub struct CreateSessionOptions<'a> {
    /// Owning workspace ID.
    pub workspace_id: &'a str,
    /// Initial model.
    pub model: &'a str,
    /// Working directory.
    pub working_directory: &'a str,
    /// Optional title.
    pub title: Option<&'a str>,
    /// Parent session (forks only).
    pub parent_session_id: Option<&'a str>,
    /// Fork point event (forks only).
    pub fork_from_event_id: Option<&'a str>,
}

/// Options for listing sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListSessionsOptions<'a> {
    /// Restrict to a workspace.
    pub workspace_id: Option<&'a str>,
    /// Restrict by active flag.
    pub is_active: Option<bool>,
    /// Maximum rows.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

/// Counter increments applied atomically with an append.
#[derive(Clone, Copy, Debug, Default)]
pub struct IncrementCounters {
    /// Event count delta.
    pub event_count: Option<i64>,
    /// Message count delta.
    pub message_count: Option<i64>,
    /// Input token delta.
    pub input_tokens: Option<i64>,
    /// Output token delta.
    pub output_tokens: Option<i64>,
    /// Cache read token delta.
    pub cache_read_tokens: Option<i64>,
    /// Cache creation token delta.
    pub cache_creation_tokens: Option<i64>,
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session row.
    pub fn create(conn: &Connection, opts: &CreateSessionOptions<'_>) -> Result<SessionRow> {
        let id = format!("sess_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();

        let _ = conn.execute(
            "INSERT INTO sessions (id, workspace_id, latest_model, working_directory, title,
                                   parent_session_id, fork_from_event_id, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                opts.workspace_id,
                opts.model,
                opts.working_directory,
                opts.title,
                opts.parent_session_id,
                opts.fork_from_event_id,
                now,
            ],
        )?;

        Ok(SessionRow {
            id,
            workspace_id: opts.workspace_id.to_owned(),
            head_event_id: None,
            root_event_id: None,
            title: opts.title.map(str::to_owned),
            latest_model: opts.model.to_owned(),
            latest_reasoning_level: None,
            working_directory: opts.working_directory.to_owned(),
            parent_session_id: opts.parent_session_id.map(str::to_owned),
            fork_from_event_id: opts.fork_from_event_id.map(str::to_owned),
            created_at: now.clone(),
            last_activity_at: now,
            ended_at: None,
            event_count: 0,
            message_count: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_read_tokens: 0,
            total_cache_creation_tokens: 0,
        })
    }

    /// Get session by ID.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List sessions ordered by last activity, newest first.
    pub fn list(conn: &Connection, opts: ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ws) = opts.workspace_id {
            sql.push_str(&format!(" AND workspace_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(ws.to_owned()));
        }
        match opts.is_active {
            Some(true) => sql.push_str(" AND ended_at IS NULL"),
            Some(false) => sql.push_str(" AND ended_at IS NOT NULL"),
            None => {}
        }
        sql.push_str(" ORDER BY last_activity_at DESC");
        if let Some(limit) = opts.limit {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }
        if let Some(offset) = opts.offset {
            use std::fmt::Write;
            let _ = write!(sql, " OFFSET {offset}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(Box::as_ref).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Set the root event pointer.
    pub fn update_root(conn: &Connection, session_id: &str, event_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET root_event_id = ?1 WHERE id = ?2",
            params![event_id, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Set the head event pointer.
    pub fn update_head(conn: &Connection, session_id: &str, event_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET head_event_id = ?1 WHERE id = ?2",
            params![event_id, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Bump `last_activity_at` to now.
    pub fn touch(conn: &Connection, session_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE sessions SET last_activity_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Apply counter increments.
    pub fn increment_counters(
        conn: &Connection,
        session_id: &str,
        inc: &IncrementCounters,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET
               event_count = event_count + ?1,
               message_count = message_count + ?2,
               total_input_tokens = total_input_tokens + ?3,
               total_output_tokens = total_output_tokens + ?4,
               total_cache_read_tokens = total_cache_read_tokens + ?5,
               total_cache_creation_tokens = total_cache_creation_tokens + ?6
             WHERE id = ?7",
            params![
                inc.event_count.unwrap_or(0),
                inc.message_count.unwrap_or(0),
                inc.input_tokens.unwrap_or(0),
                inc.output_tokens.unwrap_or(0),
                inc.cache_read_tokens.unwrap_or(0),
                inc.cache_creation_tokens.unwrap_or(0),
                session_id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Record the latest model.
    pub fn update_latest_model(conn: &Connection, session_id: &str, model: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET latest_model = ?1 WHERE id = ?2",
            params![model, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Record the latest reasoning level.
    pub fn update_latest_reasoning_level(
        conn: &Connection,
        session_id: &str,
        level: &str,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET latest_reasoning_level = ?1 WHERE id = ?2",
            params![level, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Flip the end flag.
    pub fn mark_ended(conn: &Connection, session_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE sessions SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
            params![now, session_id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            head_event_id: row.get(2)?,
            root_event_id: row.get(3)?,
            title: row.get(4)?,
            latest_model: row.get(5)?,
            latest_reasoning_level: row.get(6)?,
            working_directory: row.get(7)?,
            parent_session_id: row.get(8)?,
            fork_from_event_id: row.get(9)?,
            created_at: row.get(10)?,
            last_activity_at: row.get(11)?,
            ended_at: row.get(12)?,
            event_count: row.get(13)?,
            message_count: row.get(14)?,
            total_input_tokens: row.get(15)?,
            total_output_tokens: row.get(16)?,
            total_cache_read_tokens: row.get(17)?,
            total_cache_creation_tokens: row.get(18)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
