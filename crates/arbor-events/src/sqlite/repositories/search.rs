//! Full-text search over the event log.
//!
//! The `events_fts` virtual table is kept in sync by insert/delete triggers
//! on `events` (see the v001 migration), so queries never need a rebuild in
//! normal operation. [`SearchRepo::rebuild_session_index`] re-derives the
//! rows for a session from scratch for recovery.

use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::types::SearchResult;

/// Options for a search query.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchOptions<'a> {
    /// Restrict to a workspace.
    pub workspace_id: Option<&'a str>,
    /// Restrict to a session.
    pub session_id: Option<&'a str>,
    /// Restrict to event types.
    pub types: Option<&'a [&'a str]>,
    /// Maximum hits (default 20).
    pub limit: Option<i64>,
}

/// Search repository — stateless, every method takes `&Connection`.
pub struct SearchRepo;

impl SearchRepo {
    /// Full-text search, ranked by bm25 (best match first).
    pub fn search(
        conn: &Connection,
        query: &str,
        opts: SearchOptions<'_>,
    ) -> Result<Vec<SearchResult>> {
        let mut sql = String::from(
            "SELECT f.event_id, f.session_id, e.type,
                    snippet(events_fts, 3, '[', ']', '…', 12),
                    bm25(events_fts)
             FROM events_fts f
             JOIN events e ON e.id = f.event_id
             WHERE events_fts MATCH ?1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        params_vec.push(Box::new(query.to_owned()));

        if let Some(ws) = opts.workspace_id {
            sql.push_str(&format!(" AND f.workspace_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(ws.to_owned()));
        }
        if let Some(sid) = opts.session_id {
            sql.push_str(&format!(" AND f.session_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(sid.to_owned()));
        }
        if let Some(types) = opts.types {
            if types.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = (0..types.len())
                .map(|i| format!("?{}", params_vec.len() + 1 + i))
                .collect();
            sql.push_str(&format!(" AND e.type IN ({})", placeholders.join(", ")));
            for t in types {
                params_vec.push(Box::new((*t).to_owned()));
            }
        }

        sql.push_str(" ORDER BY bm25(events_fts) ASC");
        sql.push_str(&format!(" LIMIT {}", opts.limit.unwrap_or(20)));

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(Box::as_ref).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(SearchResult {
                    event_id: row.get(0)?,
                    session_id: row.get(1)?,
                    event_type: row.get(2)?,
                    snippet: row.get(3)?,
                    rank: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Re-derive the FTS rows for one session from its event rows.
    ///
    /// Returns the number of events re-indexed.
    pub fn rebuild_session_index(conn: &Connection, session_id: &str) -> Result<usize> {
        let _ = conn.execute(
            "DELETE FROM events_fts WHERE session_id = ?1",
            params![session_id],
        )?;
        let inserted = conn.execute(
            "INSERT INTO events_fts (event_id, session_id, workspace_id, event_text)
             SELECT id, session_id, workspace_id,
                    TRIM(
                      COALESCE(json_extract(payload, '$.content'), '') || ' ' ||
                      COALESCE(json_extract(payload, '$.summary'), '') || ' ' ||
                      COALESCE(tool_name, '') || ' ' ||
                      COALESCE(json_extract(payload, '$.arguments'), '')
                    )
             FROM events WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(inserted)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
