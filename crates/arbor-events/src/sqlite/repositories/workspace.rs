//! Workspace repository — get-or-create by canonical path, activity tracking.
//!
//! Workspaces are created on the first session that references their path and
//! never deleted. `last_activity_at` is bumped on every append in any session
//! belonging to the workspace.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::sqlite::row_types::WorkspaceRow;

const WORKSPACE_COLUMNS: &str = "id, path, name, created_at, last_activity_at";

/// Workspace repository — stateless, every method takes `&Connection`.
pub struct WorkspaceRepo;

impl WorkspaceRepo {
    /// Get a workspace by canonical path.
    pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<WorkspaceRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE path = ?1"),
                params![path],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get a workspace by ID.
    pub fn get_by_id(conn: &Connection, workspace_id: &str) -> Result<Option<WorkspaceRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
                params![workspace_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get an existing workspace for the path or create a new one.
    pub fn get_or_create(
        conn: &Connection,
        path: &str,
        name: Option<&str>,
    ) -> Result<WorkspaceRow> {
        if let Some(existing) = Self::get_by_path(conn, path)? {
            return Ok(existing);
        }

        let id = format!("ws_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let display_name = name
            .map(str::to_owned)
            .or_else(|| path.rsplit('/').next().map(str::to_owned));

        let _ = conn.execute(
            "INSERT INTO workspaces (id, path, name, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, path, display_name, now],
        )?;

        Ok(WorkspaceRow {
            id,
            path: path.to_owned(),
            name: display_name,
            created_at: now.clone(),
            last_activity_at: now,
        })
    }

    /// Bump `last_activity_at` to now.
    pub fn touch(conn: &Connection, workspace_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE workspaces SET last_activity_at = ?1 WHERE id = ?2",
            params![now, workspace_id],
        )?;
        Ok(changed > 0)
    }

    /// List all workspaces ordered by last activity, newest first.
    pub fn list(conn: &Connection) -> Result<Vec<WorkspaceRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces ORDER BY last_activity_at DESC"
        ))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceRow> {
        Ok(WorkspaceRow {
            id: row.get(0)?,
            path: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            last_activity_at: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
