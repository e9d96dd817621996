//! # Scrape Pipeline Module
//!
//! Ties the other modules together: a URL is fetched (or read from the
//! response cache), its text extracted, classified, scored and stored.
//! Progress is published on a broadcast channel so the CLI and the
//! WebSocket endpoint can follow along.
//!
//! Batches run with bounded concurrency. A semaphore caps the number of
//! scrapes in flight and a governor limiter spaces their starts by the
//! configured request delay.

mod error;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use error::PipelineError;

use crate::cache::{CachedResponse, ResponseCache};
use crate::classifier::{Classifier, Grade};
use crate::crawler::{AttemptRecord, Fetcher, ProxyRotator, ProxyStats, extract_document};
use crate::index::{Database, Document, ProxyRecord, now};
use crate::registry::{DocumentCategory, SourceRegistry};

/// Events buffered per subscriber before old ones are dropped
const EVENT_CAPACITY: usize = 256;

/// Scrapes in flight unless configured otherwise
const DEFAULT_CONCURRENCY: usize = 4;

/// Per-scrape switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeOptions {
    /// Ignore the response cache and fetch again
    pub force: bool,
}

/// Progress notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScrapeEvent {
    Started {
        url: String,
    },
    Fetched {
        url: String,
        method: String,
        from_cache: bool,
    },
    Completed {
        url: String,
        id: i64,
        title: String,
        category: DocumentCategory,
        quality: f64,
        grade: Grade,
    },
    Failed {
        url: String,
        error: String,
    },
    BatchFinished {
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}

/// Result of scraping one URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedDocument {
    pub document: Document,

    /// Body came from the response cache
    pub from_cache: bool,

    /// Delivery attempts; empty when served from cache
    pub attempts: Vec<AttemptRecord>,

    /// Another stored document with identical text
    pub duplicate_of: Option<i64>,
}

/// A URL of a batch that could not be scraped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub from_cache: usize,
    pub documents: Vec<ScrapedDocument>,
    pub errors: Vec<BatchFailure>,
}

/// Lowercased host of a URL the pipeline can scrape
pub fn target_domain(url: &str) -> Result<String, PipelineError> {
    let parsed = Url::parse(url).map_err(|e| PipelineError::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| PipelineError::InvalidUrl(format!("{} has no host", url)))
}

/// Scrape orchestrator, cheap to clone
#[derive(Debug, Clone)]
pub struct Scraper {
    fetcher: Arc<Fetcher>,
    cache: ResponseCache,
    classifier: Classifier,
    db: Database,
    registry: Arc<SourceRegistry>,
    events: broadcast::Sender<ScrapeEvent>,
    concurrency: usize,
}

impl Scraper {
    pub fn new(
        fetcher: Fetcher,
        cache: ResponseCache,
        classifier: Classifier,
        db: Database,
        registry: SourceRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            fetcher: Arc::new(fetcher),
            cache,
            classifier,
            db,
            registry: Arc::new(registry),
            events,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Scrapes allowed in flight during a batch
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.events.subscribe()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn rotator(&self) -> &ProxyRotator {
        self.fetcher.rotator()
    }

    fn emit(&self, event: ScrapeEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Fetch, extract, classify, score and store one URL
    #[instrument(skip(self))]
    pub async fn scrape_url(
        &self,
        url: &str,
        options: ScrapeOptions,
    ) -> Result<ScrapedDocument, PipelineError> {
        self.emit(ScrapeEvent::Started {
            url: url.to_string(),
        });

        match self.scrape_inner(url, options).await {
            Ok(scraped) => {
                let doc = &scraped.document;
                info!(
                    id = doc.id,
                    category = %doc.category,
                    quality = doc.quality.total,
                    "Scraped {}",
                    url
                );
                self.emit(ScrapeEvent::Completed {
                    url: url.to_string(),
                    id: doc.id,
                    title: doc.title.clone(),
                    category: doc.category,
                    quality: doc.quality.total,
                    grade: doc.quality.grade,
                });
                Ok(scraped)
            }
            Err(e) => {
                warn!("Failed to scrape {}: {}", url, e);
                self.emit(ScrapeEvent::Failed {
                    url: url.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn scrape_inner(
        &self,
        url: &str,
        options: ScrapeOptions,
    ) -> Result<ScrapedDocument, PipelineError> {
        let domain = target_domain(url)?;

        let cached = if options.force {
            None
        } else {
            self.cache.get(url).await?
        };

        let (body, method, attempts, from_cache) = match cached {
            Some(entry) => {
                debug!("Using cached body for {}", url);
                (entry.body, entry.method, Vec::new(), true)
            }
            None => {
                let outcome = self.fetcher.fetch(url).await?;
                let method = outcome.method.label();
                self.cache
                    .put(
                        url,
                        CachedResponse {
                            status: outcome.status,
                            body: outcome.body.clone(),
                            method: method.clone(),
                        },
                    )
                    .await?;
                (outcome.body, method, outcome.attempts, false)
            }
        };

        self.emit(ScrapeEvent::Fetched {
            url: url.to_string(),
            method: method.clone(),
            from_cache,
        });

        let source = self.registry.lookup(url);
        let extracted = extract_document(url, &body, source)?;
        let title = extracted
            .title
            .clone()
            .or_else(|| extracted.metadata.title.clone())
            .unwrap_or_else(|| url.to_string());

        let assessment = self
            .classifier
            .assess(&title, &extracted.content, source)
            .await;
        let content_hash = hex::encode(Sha256::digest(extracted.content.as_bytes()));

        let duplicate_of = self
            .db
            .find_by_content_hash(&content_hash)
            .await?
            .into_iter()
            .find(|d| d.url != url)
            .map(|d| d.id);
        if let Some(id) = duplicate_of {
            info!("{} has the same text as document {}", url, id);
        }

        let timestamp = now();
        let created_at = self
            .db
            .get_document_by_url(url)
            .await?
            .map_or(timestamp, |stored| stored.created_at);
        let mut document = Document {
            id: 0,
            url: url.to_string(),
            domain,
            title,
            content: extracted.content,
            content_hash,
            category: assessment.classification.category,
            confidence: assessment.classification.confidence,
            matched_terms: assessment.classification.matched_terms,
            quality: assessment.quality,
            metadata: extracted.metadata,
            fetch_method: method,
            extraction_method: extracted.extraction_method.label(),
            created_at,
            updated_at: timestamp,
        };
        document.id = self.db.upsert_document(&document).await?;

        Ok(ScrapedDocument {
            document,
            from_cache,
            attempts,
            duplicate_of,
        })
    }

    /// Scrape every URL once, a few at a time
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn scrape_batch(&self, urls: Vec<String>, options: ScrapeOptions) -> BatchReport {
        let mut seen = HashSet::new();
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let limiter = Quota::with_period(self.fetcher.config().delay())
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().cloned().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if let Some(limiter) = &limiter {
                limiter.until_ready().await;
            }
            let scraper = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = scraper.scrape_url(&url, options).await;
                (index, url, result)
            });
        }

        let mut results = Vec::with_capacity(urls.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("Scrape task ended abnormally: {}", e),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport {
            total: urls.len(),
            ..Default::default()
        };
        for (_, url, result) in results {
            match result {
                Ok(scraped) => {
                    report.succeeded += 1;
                    if scraped.from_cache {
                        report.from_cache += 1;
                    }
                    report.documents.push(scraped);
                }
                Err(e) => {
                    report.errors.push(BatchFailure {
                        url,
                        error: e.to_string(),
                    });
                }
            }
        }
        // Tasks that never reported count as failures
        report.failed = report.total - report.succeeded;

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "Batch finished"
        );
        self.emit(ScrapeEvent::BatchFinished {
            total: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
        });
        report
    }

    /// Write the rotator's statistics to the `proxies` table.
    /// Methods disabled in the table stay disabled.
    pub async fn persist_proxy_stats(&self) -> Result<usize, PipelineError> {
        let active: HashMap<String, bool> = self
            .db
            .list_proxies()
            .await?
            .into_iter()
            .map(|p| (p.label, p.active))
            .collect();

        let snapshot = self.rotator().snapshot();
        for (label, stats) in &snapshot {
            let (kind, address) = label.split_once(':').unwrap_or((label.as_str(), ""));
            let record = ProxyRecord {
                label: label.clone(),
                kind: kind.to_string(),
                address: address.to_string(),
                successes: stats.successes as i64,
                failures: stats.failures as i64,
                consecutive_failures: i64::from(stats.consecutive_failures),
                avg_latency_ms: stats.avg_latency_ms,
                last_success: stats.last_success,
                last_failure: stats.last_failure,
                active: active.get(label).copied().unwrap_or(true),
            };
            self.db.upsert_proxy(&record).await?;
        }
        debug!(count = snapshot.len(), "Persisted proxy statistics");
        Ok(snapshot.len())
    }

    /// Load statistics saved by `persist_proxy_stats` into the rotator
    pub async fn restore_proxy_stats(&self) -> Result<usize, PipelineError> {
        let records = self.db.list_proxies().await?;
        let count = records.len();
        self.rotator().restore(records.into_iter().map(|r| {
            (
                r.label,
                ProxyStats {
                    successes: r.successes.max(0) as u64,
                    failures: r.failures.max(0) as u64,
                    consecutive_failures: u32::try_from(r.consecutive_failures.max(0))
                        .unwrap_or(u32::MAX),
                    avg_latency_ms: r.avg_latency_ms,
                    last_success: r.last_success,
                    last_failure: r.last_failure,
                },
            )
        }));
        debug!(count, "Restored proxy statistics");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::crawler::CrawlerConfig;
    use mockito::Server;
    use std::time::Duration;

    fn legal_page() -> String {
        format!(
            "<html><head><title>قانون نمونه</title></head><body>\
             <h1>قانون حمایت از خانواده</h1><div class=\"content\">{}</div></body></html>",
            "ماده ۱ - این قانون از تاریخ تصویب لازم‌الاجرا است و آیین‌نامه اجرایی آن ظرف سه ماه تهیه می‌شود. "
                .repeat(10)
        )
    }

    async fn scraper() -> Scraper {
        let config = CrawlerConfig::builder()
            .direct_only()
            .delay_ms(0)
            .retry_backoff_ms(0)
            .max_retries(1)
            .request_timeout(Duration::from_secs(5))
            .min_content_length(100)
            .build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let cache = ResponseCache::new(db.clone(), CacheConfig::default());
        Scraper::new(
            fetcher,
            cache,
            Classifier::default(),
            db,
            SourceRegistry::empty(),
        )
    }

    #[tokio::test]
    async fn test_scrape_url_stores_document() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/law/1")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(legal_page())
            .expect(1)
            .create_async()
            .await;

        let scraper = scraper().await;
        let mut events = scraper.subscribe();
        let url = format!("{}/law/1", server.url());

        let scraped = scraper.scrape_url(&url, ScrapeOptions::default()).await.unwrap();
        assert!(!scraped.from_cache);
        assert_eq!(scraped.attempts.len(), 1);
        assert_eq!(scraped.document.title, "قانون حمایت از خانواده");
        assert_eq!(scraped.document.category, DocumentCategory::Law);
        assert_eq!(scraped.document.fetch_method, "direct");
        assert_eq!(scraped.document.content_hash.len(), 64);
        assert!(scraped.duplicate_of.is_none());

        let stored = scraper
            .database()
            .get_document_by_url(&url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, scraped.document.id);

        assert!(matches!(events.recv().await.unwrap(), ScrapeEvent::Started { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            ScrapeEvent::Fetched { from_cache: false, .. }
        ));
        match events.recv().await.unwrap() {
            ScrapeEvent::Completed { id, category, .. } => {
                assert_eq!(id, scraped.document.id);
                assert_eq!(category, DocumentCategory::Law);
            }
            other => panic!("unexpected event {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_scrape_uses_cache_unless_forced() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/law/2")
            .with_status(200)
            .with_body(legal_page())
            .expect(2)
            .create_async()
            .await;

        let scraper = scraper().await;
        let url = format!("{}/law/2", server.url());

        let first = scraper.scrape_url(&url, ScrapeOptions::default()).await.unwrap();
        let second = scraper.scrape_url(&url, ScrapeOptions::default()).await.unwrap();
        assert!(second.from_cache);
        assert!(second.attempts.is_empty());
        assert_eq!(first.document.id, second.document.id);

        let forced = scraper
            .scrape_url(&url, ScrapeOptions { force: true })
            .await
            .unwrap();
        assert!(!forced.from_cache);
        assert_eq!(scraper.database().count_documents().await.unwrap(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rescrape_keeps_creation_time() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/law/3")
            .with_status(200)
            .with_body(legal_page())
            .create_async()
            .await;

        let scraper = scraper().await;
        let url = format!("{}/law/3", server.url());
        let first = scraper.scrape_url(&url, ScrapeOptions::default()).await.unwrap();

        assert!(first.document.created_at > 1);

        // Backdate the stored row as if it had been scraped long ago
        scraper
            .database()
            .execute_query(
                "UPDATE documents SET created_at = 1 WHERE url = ?",
                libsql::params![url.clone()],
            )
            .await
            .unwrap();

        let again = scraper
            .scrape_url(&url, ScrapeOptions { force: true })
            .await
            .unwrap();
        assert_eq!(again.document.created_at, 1);
        assert!(again.document.updated_at > 1);

        let stored = scraper
            .database()
            .get_document_by_url(&url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.created_at, again.document.created_at);
    }

    #[tokio::test]
    async fn test_duplicate_text_is_reported() {
        let mut server = Server::new_async().await;
        for path in ["/a/1", "/b/1"] {
            server
                .mock("GET", path)
                .with_status(200)
                .with_body(legal_page())
                .create_async()
                .await;
        }

        let scraper = scraper().await;
        let first = scraper
            .scrape_url(&format!("{}/a/1", server.url()), ScrapeOptions::default())
            .await
            .unwrap();
        let second = scraper
            .scrape_url(&format!("{}/b/1", server.url()), ScrapeOptions::default())
            .await
            .unwrap();
        assert_eq!(second.duplicate_of, Some(first.document.id));
    }

    #[tokio::test]
    async fn test_failed_scrape_emits_event() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let scraper = scraper().await;
        let mut events = scraper.subscribe();
        let url = format!("{}/missing", server.url());

        let err = scraper
            .scrape_url(&url, ScrapeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Crawl(_)));

        assert!(matches!(events.recv().await.unwrap(), ScrapeEvent::Started { .. }));
        assert!(matches!(events.recv().await.unwrap(), ScrapeEvent::Failed { .. }));
        assert_eq!(scraper.database().count_documents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let scraper = scraper().await;
        let err = scraper
            .scrape_url("not a url", ScrapeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_batch_report() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/law/10")
            .with_status(200)
            .with_body(legal_page())
            .create_async()
            .await;
        server
            .mock("GET", "/law/11")
            .with_status(500)
            .create_async()
            .await;

        let scraper = scraper().await.with_concurrency(2);
        let mut events = scraper.subscribe();
        let good = format!("{}/law/10", server.url());
        let bad = format!("{}/law/11", server.url());

        let report = scraper
            .scrape_batch(
                vec![good.clone(), bad.clone(), good.clone()],
                ScrapeOptions::default(),
            )
            .await;

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.documents[0].document.url, good);
        assert_eq!(report.errors[0].url, bad);

        let mut finished = None;
        while let Ok(event) = events.try_recv() {
            if let ScrapeEvent::BatchFinished { .. } = event {
                finished = Some(event);
            }
        }
        assert_eq!(
            finished,
            Some(ScrapeEvent::BatchFinished {
                total: 2,
                succeeded: 1,
                failed: 1
            })
        );
    }

    #[tokio::test]
    async fn test_proxy_stats_round_trip_through_database() {
        let scraper = scraper().await;
        scraper.rotator().record_success("proxy:http://127.0.0.1:8080", 120);
        scraper.rotator().record_failure("cors:https://relay.test/?url={url}");

        assert_eq!(scraper.persist_proxy_stats().await.unwrap(), 2);
        let stored = scraper.database().list_proxies().await.unwrap();
        assert_eq!(stored[0].kind, "cors");
        assert_eq!(stored[1].address, "http://127.0.0.1:8080");

        let fresh = Scraper::new(
            Fetcher::new(CrawlerConfig::default(), ProxyRotator::new()).unwrap(),
            scraper.cache().clone(),
            Classifier::default(),
            scraper.database().clone(),
            SourceRegistry::empty(),
        );
        assert_eq!(fresh.restore_proxy_stats().await.unwrap(), 2);
        let stats = fresh.rotator().stats("proxy:http://127.0.0.1:8080").unwrap();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.avg_latency_ms, 120.0);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = ScrapeEvent::Failed {
            url: "https://rc.majlis.ir/".to_string(),
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["error"], "boom");
    }
}
