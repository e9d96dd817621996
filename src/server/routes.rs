//! REST handlers

use axum::Json;
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::Html;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::AppState;
use super::error::ApiError;
use crate::cache::CacheStats;
use crate::classifier::Grade;
use crate::crawler::ProxyStats;
use crate::index::{Document, DocumentFilter, Stats};
use crate::pipeline::{BatchReport, ScrapeOptions, target_domain};
use crate::registry::{DocumentCategory, LegalSource};
use crate::search::{SearchOptions, SearchResult, search_documents};

/// Largest page the listing endpoints return
const MAX_PAGE: usize = 500;

const DASHBOARD: &str = include_str!("dashboard.html");

pub async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD)
}

/// 200 when the database answers, 503 otherwise
pub async fn health(Extension(state): Extension<AppState>) -> (StatusCode, Json<Value>) {
    match state.scraper.database().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "ok" })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "database": e.to_string() })),
        ),
    }
}

/// Listing row without the document text
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub category: DocumentCategory,
    pub confidence: f64,
    pub quality: f64,
    pub grade: Grade,
    pub publication_date: Option<String>,
    pub fetch_method: String,
    pub updated_at: i64,
}

impl From<Document> for DocumentSummary {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            url: doc.url,
            domain: doc.domain,
            title: doc.title,
            category: doc.category,
            confidence: doc.confidence,
            quality: doc.quality.total,
            grade: doc.quality.grade,
            publication_date: doc.metadata.publication_date,
            fetch_method: doc.fetch_method,
            updated_at: doc.updated_at,
        }
    }
}

pub async fn list_documents(
    Extension(state): Extension<AppState>,
    Query(mut filter): Query<DocumentFilter>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    filter.limit = filter.limit.clamp(1, MAX_PAGE);
    let documents = state.scraper.database().list_documents(&filter).await?;
    Ok(Json(documents.into_iter().map(DocumentSummary::from).collect()))
}

pub async fn get_document(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Document>, ApiError> {
    state
        .scraper
        .database()
        .get_document(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("document {} not found", id)))
}

pub async fn delete_document(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.scraper.database().delete_document(id).await? {
        info!(id, "Deleted document");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("document {} not found", id)))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub category: Option<DocumentCategory>,
    pub source: Option<String>,
    pub min_quality: Option<f64>,
    pub limit: Option<usize>,
}

pub async fn search(
    Extension(state): Extension<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let options = SearchOptions {
        limit: query.limit.unwrap_or(20).min(MAX_PAGE),
        category: query.category,
        source_filter: query.source,
        min_quality: query.min_quality,
    };
    let results = search_documents(state.scraper.database(), &query.q, options).await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn scrape(
    Extension(state): Extension<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    if request.urls.iter().all(|u| u.trim().is_empty()) {
        return Err(ApiError::BadRequest("urls must not be empty".to_string()));
    }
    for url in request.urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        target_domain(url)?;
    }

    let report = state
        .scraper
        .scrape_batch(
            request.urls,
            ScrapeOptions {
                force: request.force,
            },
        )
        .await;
    if let Err(e) = state.scraper.persist_proxy_stats().await {
        warn!("Could not persist proxy statistics: {}", e);
    }
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub documents: Stats,
    pub cache: CacheStats,
}

pub async fn stats(
    Extension(state): Extension<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    Ok(Json(StatsResponse {
        documents: state.scraper.database().stats().await?,
        cache: state.scraper.cache().stats().await?,
    }))
}

pub async fn sources(Extension(state): Extension<AppState>) -> Json<Vec<LegalSource>> {
    Json(state.scraper.registry().sources().cloned().collect())
}

/// Live rotator view of one delivery method
#[derive(Debug, Serialize)]
pub struct ProxyView {
    pub label: String,
    pub score: f64,
    pub cooling_down: bool,
    pub stats: ProxyStats,
}

pub async fn proxies(Extension(state): Extension<AppState>) -> Json<Vec<ProxyView>> {
    let rotator = state.scraper.rotator();
    let views = rotator
        .snapshot()
        .into_iter()
        .map(|(label, stats)| ProxyView {
            score: stats.score(),
            cooling_down: rotator.is_cooling_down(&label),
            label,
            stats,
        })
        .collect();
    Json(views)
}

pub async fn prune_cache(Extension(state): Extension<AppState>) -> Result<Json<Value>, ApiError> {
    let removed = state.scraper.cache().prune().await?;
    Ok(Json(json!({ "removed": removed })))
}
