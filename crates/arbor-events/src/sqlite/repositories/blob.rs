//! Blob repository — content-addressed storage for large payloads.
//!
//! Blobs are deduplicated by SHA-256: storing identical content twice
//! returns the same blob ID.

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::Result;
use crate::sqlite::row_types::BlobRow;

/// Blob repository — stateless, every method takes `&Connection`.
pub struct BlobRepo;

impl BlobRepo {
    /// Store content, returning the blob ID (existing ID if deduplicated).
    pub fn store(conn: &Connection, content: &[u8], mime_type: &str) -> Result<String> {
        let hash = hex_digest(content);

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM blobs WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let id = format!("blob_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO blobs (id, hash, content, mime_type, size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, hash, content, mime_type, content.len() as i64, now],
        )?;
        Ok(id)
    }

    /// Get blob content by ID.
    pub fn get_content(conn: &Connection, blob_id: &str) -> Result<Option<Vec<u8>>> {
        let content = conn
            .query_row(
                "SELECT content FROM blobs WHERE id = ?1",
                params![blob_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    /// Get full blob metadata by ID.
    pub fn get_by_id(conn: &Connection, blob_id: &str) -> Result<Option<BlobRow>> {
        let row = conn
            .query_row(
                "SELECT id, hash, content, mime_type, size, created_at FROM blobs WHERE id = ?1",
                params![blob_id],
                |row| {
                    Ok(BlobRow {
                        id: row.get(0)?,
                        hash: row.get(1)?,
                        content: row.get(2)?,
                        mime_type: row.get(3)?,
                        size: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn hex_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
