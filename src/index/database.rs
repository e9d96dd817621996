//! Database operations for the index module

use crate::index::error::DbError;
use crate::index::schema;
use crate::index::{CacheEntry, Document, DocumentFilter, ProxyRecord, Stats};
use libsql::params::Params;
use libsql::{Connection, Row, Rows, Value, params};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub(crate) const DOCUMENT_COLUMNS: &str = "id, url, domain, title, content, content_hash, category, confidence, \
     matched_terms, quality_breakdown, metadata, fetch_method, extraction_method, created_at, updated_at";

const CACHE_COLUMNS: &str =
    "url_hash, url, status, body, method, created_at, expires_at, access_count, last_access";

const PROXY_COLUMNS: &str = "label, kind, address, successes, failures, consecutive_failures, \
     avg_latency_ms, last_success, last_failure, active";

/// Database manager for the index
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Create a new database manager
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self, DbError> {
        schema::initialize_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Create a new database manager from a path
    pub async fn new_from_path(path: &str) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::new(conn).await
    }

    /// Database that lives as long as this manager and its clones
    pub async fn new_in_memory() -> Result<Self, DbError> {
        Self::new_from_path(":memory:").await
    }

    /// Cheap liveness probe
    pub async fn ping(&self) -> Result<(), DbError> {
        let mut rows = self
            .conn
            .query("SELECT 1", params![])
            .await
            .map_err(|e| DbError::Connection(format!("Ping failed: {}", e)))?;
        rows.next()
            .await
            .map_err(|e| DbError::Connection(format!("Ping failed: {}", e)))?;
        Ok(())
    }

    /// Execute a custom query with parameters
    pub async fn execute_query<P>(&self, sql: &str, params: P) -> Result<Rows, DbError>
    where
        P: libsql::params::IntoParams,
    {
        self.conn
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to execute query: {}", e)))
    }

    // Documents

    /// Insert a document or replace the stored one with the same URL.
    /// The original `created_at` survives replacement. Returns the row id.
    #[instrument(skip(self, document), fields(url = %document.url))]
    pub async fn upsert_document(&self, document: &Document) -> Result<i64, DbError> {
        let matched_terms = serde_json::to_string(&document.matched_terms)?;
        let breakdown = serde_json::to_string(&document.quality)?;
        let metadata = serde_json::to_string(&document.metadata)?;

        let mut rows = self
            .conn
            .query(
                "INSERT INTO documents (url, domain, title, content, content_hash, category, confidence,
                     matched_terms, quality, grade, quality_breakdown, metadata, publication_date,
                     fetch_method, extraction_method, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(url) DO UPDATE SET
                     domain = excluded.domain,
                     title = excluded.title,
                     content = excluded.content,
                     content_hash = excluded.content_hash,
                     category = excluded.category,
                     confidence = excluded.confidence,
                     matched_terms = excluded.matched_terms,
                     quality = excluded.quality,
                     grade = excluded.grade,
                     quality_breakdown = excluded.quality_breakdown,
                     metadata = excluded.metadata,
                     publication_date = excluded.publication_date,
                     fetch_method = excluded.fetch_method,
                     extraction_method = excluded.extraction_method,
                     updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    document.url.clone(),
                    document.domain.clone(),
                    document.title.clone(),
                    document.content.clone(),
                    document.content_hash.clone(),
                    document.category.as_str(),
                    document.confidence,
                    matched_terms,
                    document.quality.total,
                    document.quality.grade.as_str(),
                    breakdown,
                    metadata,
                    document.metadata.publication_date.clone(),
                    document.fetch_method.clone(),
                    document.extraction_method.clone(),
                    document.created_at,
                    document.updated_at,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to upsert document: {}", e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Err(DbError::Data("No ID returned from upsert".to_string())),
            Err(e) => return Err(DbError::Data(format!("Failed to get ID: {}", e))),
        };

        let id = row
            .get::<i64>(0)
            .map_err(|e| DbError::Data(format!("Failed to get ID: {}", e)))?;
        debug!(id, "Stored document");
        Ok(id)
    }

    /// Get a document by row id
    pub async fn get_document(&self, id: i64) -> Result<Option<Document>, DbError> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let mut rows = self.execute_query(&sql, params![id]).await?;
        match rows.next().await {
            Ok(Some(row)) => Ok(Some(document_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get document: {}", e))),
        }
    }

    /// Get a document by URL
    pub async fn get_document_by_url(&self, url: &str) -> Result<Option<Document>, DbError> {
        let sql = format!("SELECT {} FROM documents WHERE url = ?", DOCUMENT_COLUMNS);
        let mut rows = self.execute_query(&sql, params![url]).await?;
        match rows.next().await {
            Ok(Some(row)) => Ok(Some(document_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get document: {}", e))),
        }
    }

    /// Documents matching `filter`, best quality first
    #[instrument(skip(self))]
    pub async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, DbError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = filter.category {
            clauses.push("category = ?");
            values.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(domain) = &filter.domain {
            clauses.push("domain = ?");
            values.push(Value::Text(domain.to_lowercase()));
        }
        if let Some(min_quality) = filter.min_quality {
            clauses.push("quality >= ?");
            values.push(Value::Real(min_quality));
        }
        if let Some(grade) = filter.grade {
            clauses.push("grade = ?");
            values.push(Value::Text(grade.as_str().to_string()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        values.push(Value::Integer(filter.limit as i64));
        values.push(Value::Integer(filter.offset as i64));

        let sql = format!(
            "SELECT {} FROM documents {} ORDER BY quality DESC, id ASC LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS, where_clause
        );
        let rows = self.execute_query(&sql, Params::Positional(values)).await?;
        collect_rows(rows, document_from_row).await
    }

    /// Documents whose content hashes to `hash`
    pub async fn find_by_content_hash(&self, hash: &str) -> Result<Vec<Document>, DbError> {
        let sql = format!(
            "SELECT {} FROM documents WHERE content_hash = ? ORDER BY id",
            DOCUMENT_COLUMNS
        );
        let rows = self.execute_query(&sql, params![hash]).await?;
        collect_rows(rows, document_from_row).await
    }

    /// Delete a document, returning whether it existed
    pub async fn delete_document(&self, id: i64) -> Result<bool, DbError> {
        let affected = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?", params![id])
            .await
            .map_err(|e| DbError::Query(format!("Failed to delete document: {}", e)))?;
        Ok(affected > 0)
    }

    pub async fn count_documents(&self) -> Result<i64, DbError> {
        self.count("SELECT COUNT(*) FROM documents").await
    }

    /// Totals and distributions over the whole store
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<Stats, DbError> {
        let average = {
            let mut rows = self
                .execute_query("SELECT AVG(quality) FROM documents", params![])
                .await?;
            match rows.next().await {
                Ok(Some(row)) => real_or_zero(&row, 0)?,
                Ok(None) => 0.0,
                Err(e) => return Err(DbError::Data(format!("Failed to read average: {}", e))),
            }
        };

        Ok(Stats {
            total_documents: self.count_documents().await?,
            by_category: self.group_count("category").await?,
            by_domain: self.group_count("domain").await?,
            by_grade: self.group_count("grade").await?,
            average_quality: (average * 10.0).round() / 10.0,
            cache_entries: self.cache_count().await?,
            proxies: self.count("SELECT COUNT(*) FROM proxies").await?,
        })
    }

    async fn group_count(&self, column: &str) -> Result<BTreeMap<String, i64>, DbError> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM documents GROUP BY {column}",
            column = column
        );
        let rows = self.execute_query(&sql, params![]).await?;
        let pairs = collect_rows(rows, |row| {
            let key: String = row
                .get(0)
                .map_err(|e| DbError::Data(format!("Failed to get {}: {}", column, e)))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DbError::Data(format!("Failed to get count: {}", e)))?;
            Ok((key, count))
        })
        .await?;
        Ok(pairs.into_iter().collect())
    }

    async fn count(&self, sql: &str) -> Result<i64, DbError> {
        let mut rows = self.execute_query(sql, params![]).await?;
        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DbError::Data(format!("Failed to get count: {}", e))),
            Ok(None) => Ok(0),
            Err(e) => Err(DbError::Data(format!("Failed to count: {}", e))),
        }
    }

    // Cache entries

    pub async fn cache_get(&self, url_hash: &str) -> Result<Option<CacheEntry>, DbError> {
        let sql = format!(
            "SELECT {} FROM cache_entries WHERE url_hash = ?",
            CACHE_COLUMNS
        );
        let mut rows = self.execute_query(&sql, params![url_hash]).await?;
        match rows.next().await {
            Ok(Some(row)) => Ok(Some(cache_entry_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get cache entry: {}", e))),
        }
    }

    /// Insert or replace a cache entry
    pub async fn cache_put(&self, entry: &CacheEntry) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO cache_entries (url_hash, url, status, body, method, created_at,
                     expires_at, access_count, last_access)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(url_hash) DO UPDATE SET
                     url = excluded.url,
                     status = excluded.status,
                     body = excluded.body,
                     method = excluded.method,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at,
                     access_count = excluded.access_count,
                     last_access = excluded.last_access",
                params![
                    entry.url_hash.clone(),
                    entry.url.clone(),
                    entry.status as i64,
                    entry.body.clone(),
                    entry.method.clone(),
                    entry.created_at,
                    entry.expires_at,
                    entry.access_count,
                    entry.last_access,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to store cache entry: {}", e)))?;
        Ok(())
    }

    /// Count one more access to an entry
    pub async fn cache_touch(&self, url_hash: &str, now: i64) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE cache_entries SET access_count = access_count + 1, last_access = ?
                 WHERE url_hash = ?",
                params![now, url_hash],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to touch cache entry: {}", e)))?;
        Ok(())
    }

    pub async fn cache_delete(&self, url_hash: &str) -> Result<bool, DbError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE url_hash = ?",
                params![url_hash],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to delete cache entry: {}", e)))?;
        Ok(affected > 0)
    }

    /// Remove entries that expired at or before `now`
    pub async fn cache_evict_expired(&self, now: i64) -> Result<u64, DbError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?",
                params![now],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to evict cache entries: {}", e)))?;
        debug!(affected, "Evicted expired cache entries");
        Ok(affected)
    }

    pub async fn cache_clear(&self) -> Result<u64, DbError> {
        self.conn
            .execute("DELETE FROM cache_entries", params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to clear cache: {}", e)))
    }

    pub async fn cache_count(&self) -> Result<i64, DbError> {
        self.count("SELECT COUNT(*) FROM cache_entries").await
    }

    // Proxies

    /// Insert or replace the statistics of one delivery method
    pub async fn upsert_proxy(&self, record: &ProxyRecord) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO proxies (label, kind, address, successes, failures, consecutive_failures,
                     avg_latency_ms, last_success, last_failure, active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(label) DO UPDATE SET
                     kind = excluded.kind,
                     address = excluded.address,
                     successes = excluded.successes,
                     failures = excluded.failures,
                     consecutive_failures = excluded.consecutive_failures,
                     avg_latency_ms = excluded.avg_latency_ms,
                     last_success = excluded.last_success,
                     last_failure = excluded.last_failure,
                     active = excluded.active,
                     updated_at = excluded.updated_at",
                params![
                    record.label.clone(),
                    record.kind.clone(),
                    record.address.clone(),
                    record.successes,
                    record.failures,
                    record.consecutive_failures,
                    record.avg_latency_ms,
                    record.last_success,
                    record.last_failure,
                    record.active as i64,
                    crate::index::now(),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to store proxy: {}", e)))?;
        Ok(())
    }

    /// All delivery methods, ordered by label
    pub async fn list_proxies(&self) -> Result<Vec<ProxyRecord>, DbError> {
        let sql = format!("SELECT {} FROM proxies ORDER BY label", PROXY_COLUMNS);
        let rows = self.execute_query(&sql, params![]).await?;
        collect_rows(rows, proxy_from_row).await
    }

    /// Enable or disable a delivery method, returning whether it exists
    pub async fn set_proxy_active(&self, label: &str, active: bool) -> Result<bool, DbError> {
        let affected = self
            .conn
            .execute(
                "UPDATE proxies SET active = ?, updated_at = ? WHERE label = ?",
                params![active as i64, crate::index::now(), label],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update proxy: {}", e)))?;
        Ok(affected > 0)
    }

    /// Enable or disable a delivery method, adding a row for one never used
    pub async fn set_method_enabled(&self, label: &str, active: bool) -> Result<(), DbError> {
        if self.set_proxy_active(label, active).await? {
            return Ok(());
        }
        let (kind, address) = label.split_once(':').unwrap_or((label, ""));
        self.upsert_proxy(&ProxyRecord {
            label: label.to_string(),
            kind: kind.to_string(),
            address: address.to_string(),
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            avg_latency_ms: 0.0,
            last_success: None,
            last_failure: None,
            active,
        })
        .await
    }
}

async fn collect_rows<T>(
    mut rows: Rows,
    convert: impl Fn(&Row) -> Result<T, DbError>,
) -> Result<Vec<T>, DbError> {
    let mut out = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => out.push(convert(&row)?),
            Ok(None) => break,
            Err(e) => return Err(DbError::Data(format!("Failed to read row: {}", e))),
        }
    }
    Ok(out)
}

fn text(row: &Row, idx: i32, name: &str) -> Result<String, DbError> {
    match row.get_value(idx) {
        Ok(Value::Text(v)) => Ok(v),
        Ok(other) => Err(DbError::Data(format!(
            "Unexpected value for {}: {:?}",
            name, other
        ))),
        Err(e) => Err(DbError::Data(format!("Failed to get {}: {}", name, e))),
    }
}

fn int(row: &Row, idx: i32, name: &str) -> Result<i64, DbError> {
    int_or_null(row, idx, name)?
        .ok_or_else(|| DbError::Data(format!("Missing value for {}", name)))
}

fn int_or_null(row: &Row, idx: i32, name: &str) -> Result<Option<i64>, DbError> {
    match row.get_value(idx) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Integer(v)) => Ok(Some(v)),
        Ok(other) => Err(DbError::Data(format!(
            "Unexpected value for {}: {:?}",
            name, other
        ))),
        Err(e) => Err(DbError::Data(format!("Failed to get {}: {}", name, e))),
    }
}

fn real_or_zero(row: &Row, idx: i32) -> Result<f64, DbError> {
    match row.get_value(idx) {
        Ok(Value::Null) => Ok(0.0),
        Ok(Value::Real(v)) => Ok(v),
        Ok(Value::Integer(v)) => Ok(v as f64),
        Ok(other) => Err(DbError::Data(format!("Unexpected number: {:?}", other))),
        Err(e) => Err(DbError::Data(format!("Failed to get number: {}", e))),
    }
}

/// Convert a row selected with `DOCUMENT_COLUMNS`
pub(crate) fn document_from_row(row: &Row) -> Result<Document, DbError> {
    let category = text(row, 6, "category")?;
    let matched_terms = text(row, 8, "matched_terms")?;
    let breakdown = text(row, 9, "quality_breakdown")?;
    let metadata = text(row, 10, "metadata")?;

    Ok(Document {
        id: int(row, 0, "id")?,
        url: text(row, 1, "url")?,
        domain: text(row, 2, "domain")?,
        title: text(row, 3, "title")?,
        content: text(row, 4, "content")?,
        content_hash: text(row, 5, "content_hash")?,
        category: category
            .parse()
            .map_err(|e| DbError::Data(format!("Bad category {}: {}", category, e)))?,
        confidence: real_or_zero(row, 7)?,
        matched_terms: serde_json::from_str(&matched_terms)?,
        quality: serde_json::from_str(&breakdown)?,
        metadata: serde_json::from_str(&metadata)?,
        fetch_method: text(row, 11, "fetch_method")?,
        extraction_method: text(row, 12, "extraction_method")?,
        created_at: int(row, 13, "created_at")?,
        updated_at: int(row, 14, "updated_at")?,
    })
}

fn cache_entry_from_row(row: &Row) -> Result<CacheEntry, DbError> {
    let status = int(row, 2, "status")?;
    Ok(CacheEntry {
        url_hash: text(row, 0, "url_hash")?,
        url: text(row, 1, "url")?,
        status: u16::try_from(status)
            .map_err(|_| DbError::Data(format!("Bad status code {}", status)))?,
        body: text(row, 3, "body")?,
        method: text(row, 4, "method")?,
        created_at: int(row, 5, "created_at")?,
        expires_at: int(row, 6, "expires_at")?,
        access_count: int(row, 7, "access_count")?,
        last_access: int(row, 8, "last_access")?,
    })
}

fn proxy_from_row(row: &Row) -> Result<ProxyRecord, DbError> {
    let active = int(row, 9, "active")?;
    Ok(ProxyRecord {
        label: text(row, 0, "label")?,
        kind: text(row, 1, "kind")?,
        address: text(row, 2, "address")?,
        successes: int(row, 3, "successes")?,
        failures: int(row, 4, "failures")?,
        consecutive_failures: int(row, 5, "consecutive_failures")?,
        avg_latency_ms: real_or_zero(row, 6)?,
        last_success: int_or_null(row, 7, "last_success")?,
        last_failure: int_or_null(row, 8, "last_failure")?,
        active: active != 0,
    })
}
