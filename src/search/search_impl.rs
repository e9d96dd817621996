//! Keyword search over stored documents

use super::error::SearchError;
use crate::crawler::{fold_char, normalize_persian};
use crate::index::{DOCUMENT_COLUMNS, Database, Document, document_from_row};
use crate::registry::DocumentCategory;
use libsql::Value;
use libsql::params::Params;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, instrument};

/// Title hits rank this many times over content hits
const TITLE_WEIGHT: usize = 3;

/// Characters of context on each side of the first hit
const SNIPPET_RADIUS: usize = 80;

/// Options for search queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Maximum number of results to return
    pub limit: usize,

    /// Only documents of this category
    pub category: Option<DocumentCategory>,

    /// Filter by source domain (sub-domains included)
    pub source_filter: Option<String>,

    /// Minimum quality total
    pub min_quality: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            category: None,
            source_filter: None,
            min_quality: None,
        }
    }
}

/// Search result with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: i64,

    pub url: String,

    pub title: String,

    pub domain: String,

    pub category: DocumentCategory,

    /// Quality total of the document
    pub quality: f64,

    /// Weighted occurrence count of the query terms
    pub score: f64,

    /// Text around the first hit
    pub snippet: String,
}

/// Split a query into normalised, lowercased terms
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in normalize_persian(query).split_whitespace() {
        let term = term.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Search stored documents for `query`
#[instrument(skip(db))]
pub async fn search_documents(
    db: &Database,
    query: &str,
    options: SearchOptions,
) -> Result<Vec<SearchResult>, SearchError> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Err(SearchError::InvalidParameters(
            "query must contain at least one term".to_string(),
        ));
    }
    if options.limit == 0 {
        return Err(SearchError::InvalidParameters(
            "limit must be positive".to_string(),
        ));
    }

    let mut values: Vec<Value> = Vec::new();
    let mut term_clauses: Vec<&str> = Vec::new();
    for term in &terms {
        term_clauses.push("(title LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\')");
        let pattern = escape_like(term);
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }

    let mut clauses = vec![format!("({})", term_clauses.join(" OR "))];
    if let Some(category) = options.category {
        clauses.push("category = ?".to_string());
        values.push(Value::Text(category.as_str().to_string()));
    }
    if let Some(domain) = &options.source_filter {
        let domain = domain.trim().to_lowercase();
        clauses.push("(domain = ? OR domain LIKE ?)".to_string());
        values.push(Value::Text(domain.clone()));
        values.push(Value::Text(format!("%.{}", domain)));
    }
    if let Some(min_quality) = options.min_quality {
        clauses.push("quality >= ?".to_string());
        values.push(Value::Real(min_quality));
    }
    let sql = format!(
        "SELECT {} FROM documents WHERE {}",
        DOCUMENT_COLUMNS,
        clauses.join(" AND ")
    );

    // Every LIKE match is ranked; only the best `limit` are held at a time
    let mut rows = db.execute_query(&sql, Params::Positional(values)).await?;
    let mut results: Vec<SearchResult> = Vec::new();
    let mut candidates = 0usize;
    while let Some(row) = rows.next().await? {
        let document = document_from_row(&row)?;
        if let Some(result) = rank(&document, &terms) {
            candidates += 1;
            results.push(result);
            if results.len() >= 2 * options.limit {
                results.sort_by(ranking);
                results.truncate(options.limit);
            }
        }
    }

    results.sort_by(ranking);
    results.truncate(options.limit);
    debug!(candidates, count = results.len(), "Search finished");

    Ok(results)
}

/// Higher score first, then higher quality, then older row
fn ranking(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then(b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal))
        .then(a.id.cmp(&b.id))
}

/// Score a candidate; `None` when no term occurs after normalisation
fn rank(document: &Document, terms: &[String]) -> Option<SearchResult> {
    let title = normalize_persian(&document.title).to_lowercase();
    let content = normalize_persian(&document.content).to_lowercase();

    let score: usize = terms
        .iter()
        .map(|t| TITLE_WEIGHT * title.matches(t.as_str()).count() + content.matches(t.as_str()).count())
        .sum();
    if score == 0 {
        return None;
    }

    Some(SearchResult {
        id: document.id,
        url: document.url.clone(),
        title: document.title.clone(),
        domain: document.domain.clone(),
        category: document.category,
        quality: document.quality.total,
        score: score as f64,
        snippet: snippet(&document.content, terms),
    })
}

/// Up to `SNIPPET_RADIUS` characters of `content` either side of the
/// earliest hit. Terms are matched against a folded copy, the text
/// returned is the stored original.
pub(crate) fn snippet(content: &str, terms: &[String]) -> String {
    // Byte offset in `folded` -> char index in `content`
    let mut folded = String::with_capacity(content.len());
    let mut origin: Vec<usize> = Vec::with_capacity(content.len());
    for (index, c) in content.chars().enumerate() {
        let Some(c) = fold_char(c) else { continue };
        for lower in c.to_lowercase() {
            folded.push(lower);
            origin.resize(folded.len(), index);
        }
    }
    let first_hit = terms
        .iter()
        .filter_map(|t| folded.find(t.as_str()))
        .min()
        .map(|byte_pos| origin[byte_pos]);

    let chars: Vec<char> = content.chars().collect();
    let (start, end) = match first_hit {
        Some(char_pos) => (
            char_pos.saturating_sub(SNIPPET_RADIUS),
            (char_pos + SNIPPET_RADIUS).min(chars.len()),
        ),
        None => (0, (2 * SNIPPET_RADIUS).min(chars.len())),
    };

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_terms_dedupes_and_normalizes() {
        let terms = query_terms("  قانون   ماليات قانون ");
        assert_eq!(terms, vec!["قانون".to_string(), "مالیات".to_string()]);
        assert!(query_terms("   ").is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%"), "%50\\%%");
        assert_eq!(escape_like("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_snippet_is_char_safe() {
        let content = "الف ".repeat(100) + "قانون" + &" ب".repeat(100);
        let s = snippet(&content, &["قانون".to_string()]);
        assert!(s.starts_with('…'));
        assert!(s.ends_with('…'));
        assert!(s.contains("قانون"));
        assert!(s.chars().count() <= 2 * SNIPPET_RADIUS + 2);
    }

    #[test]
    fn test_snippet_keeps_original_text() {
        // Arabic kaf and yeh, tatweel and capitals survive in the output
        let content = "Article 5 of the ACT: مالـيات بر درآمد كشاورزي";
        let s = snippet(content, &["مالیات".to_string(), "act".to_string()]);
        assert_eq!(s, content);

        let long = "x".repeat(200) + " بانك مركزي";
        let s = snippet(&long, &["بانک".to_string()]);
        assert!(s.ends_with("بانك مركزي"));
        assert!(s.starts_with('…'));
    }

    #[test]
    fn test_snippet_short_text() {
        let s = snippet("ماده ۱", &["ماده".to_string()]);
        assert_eq!(s, "ماده ۱");
    }
}
