//! # Database Schema Module
//!
//! Three tables:
//! 1. `documents` - one row per scraped URL with its text, category and quality
//! 2. `cache_entries` - fetched bodies keyed by the SHA-256 of the URL, with an expiry
//! 3. `proxies` - delivery method statistics so the rotator survives restarts

use crate::index::error::DbError;
use libsql::{Connection, params};

const STATEMENTS: &[(&str, &str)] = &[
    (
        "documents table",
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            domain TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0,
            matched_terms TEXT NOT NULL DEFAULT '[]',
            quality REAL NOT NULL DEFAULT 0,
            grade TEXT NOT NULL DEFAULT 'F',
            quality_breakdown TEXT NOT NULL DEFAULT '{}',
            metadata TEXT NOT NULL DEFAULT '{}',
            publication_date TEXT,
            fetch_method TEXT NOT NULL,
            extraction_method TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    ),
    (
        "documents domain index",
        "CREATE INDEX IF NOT EXISTS idx_documents_domain ON documents(domain)",
    ),
    (
        "documents category index",
        "CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category)",
    ),
    (
        "documents content hash index",
        "CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash)",
    ),
    (
        "cache_entries table",
        "CREATE TABLE IF NOT EXISTS cache_entries (
            url_hash TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            body TEXT NOT NULL,
            method TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            last_access INTEGER NOT NULL
        )",
    ),
    (
        "cache expiry index",
        "CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache_entries(expires_at)",
    ),
    (
        "proxies table",
        "CREATE TABLE IF NOT EXISTS proxies (
            label TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            address TEXT NOT NULL,
            successes INTEGER NOT NULL DEFAULT 0,
            failures INTEGER NOT NULL DEFAULT 0,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            avg_latency_ms REAL NOT NULL DEFAULT 0,
            last_success INTEGER,
            last_failure INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        )",
    ),
];

/// Initialize the database schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    for (name, sql) in STATEMENTS {
        conn.execute(sql, params![])
            .await
            .map_err(|e| DbError::Schema(format!("Failed to create {}: {}", name, e)))?;
    }
    Ok(())
}
