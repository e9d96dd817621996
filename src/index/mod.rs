//! Persistent store for scraped documents
//!
//! Documents, cached responses and proxy statistics live in one libSQL
//! database file.

mod database;
pub mod error;
mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classifier::{Grade, QualityScore};
use crate::crawler::PageMetadata;
use crate::registry::DocumentCategory;

pub use database::Database;
pub(crate) use database::{DOCUMENT_COLUMNS, document_from_row};
pub use error::DbError;

/// Current Unix time in seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Row id; ignored on upsert
    pub id: i64,

    pub url: String,

    pub domain: String,

    pub title: String,

    /// Normalised text
    pub content: String,

    /// Hex SHA-256 of `content`
    pub content_hash: String,

    pub category: DocumentCategory,

    /// Classification confidence, 0 to 1
    pub confidence: f64,

    pub matched_terms: Vec<String>,

    pub quality: QualityScore,

    pub metadata: PageMetadata,

    /// Label of the delivery method that produced the page
    pub fetch_method: String,

    /// How the text was located in the page
    pub extraction_method: String,

    pub created_at: i64,

    pub updated_at: i64,
}

impl Document {
    pub fn grade(&self) -> Grade {
        self.quality.grade
    }
}

/// Criteria for listing documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentFilter {
    pub category: Option<DocumentCategory>,
    /// Exact domain
    pub domain: Option<String>,
    pub min_quality: Option<f64>,
    pub grade: Option<Grade>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            category: None,
            domain: None,
            min_quality: None,
            grade: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// A cached response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex SHA-256 of the normalised URL
    pub url_hash: String,
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Delivery method label
    pub method: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub access_count: i64,
    pub last_access: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Persisted statistics of one delivery method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Rotator label, e.g. `proxy:http://127.0.0.1:8080`
    pub label: String,
    /// Tier, e.g. `cors` or `proxy`
    pub kind: String,
    /// Proxy address or relay template
    pub address: String,
    pub successes: i64,
    pub failures: i64,
    pub consecutive_failures: i64,
    pub avg_latency_ms: f64,
    pub last_success: Option<i64>,
    pub last_failure: Option<i64>,
    pub active: bool,
}

/// Aggregate numbers for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_documents: i64,
    pub by_category: BTreeMap<String, i64>,
    pub by_domain: BTreeMap<String, i64>,
    pub by_grade: BTreeMap<String, i64>,
    pub average_quality: f64,
    pub cache_entries: i64,
    pub proxies: i64,
}
