//! # Fetch and Extraction Module
//!
//! This module gets legal pages off the network and turns them into clean
//! Persian text. Government sites are frequently unreachable from outside
//! Iran (and sometimes from inside), so a page is fetched through a chain of
//! delivery methods that is walked until one of them returns content that
//! passes a plausibility check.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: timeouts, retry counts, proxy/resolver/mirror lists
//! - `DeliveryMethod`: one way of getting a URL's body (direct, DoH, CORS relay, proxy, mirror)
//! - `Fetcher`: walks the delivery chain and reports every attempt
//! - `ProxyRotator`: success/latency bookkeeping used to order relays and proxies
//! - `extract_document`: selector-driven text extraction with Persian heuristics
//! - `discover_links`: spider-based discovery of document URLs on a source
//! - `storage`: XML export of scraped documents
//!
//! ## Chain order
//!
//! 1. Direct request
//! 2. Direct request with the host resolved over DNS-over-HTTPS
//! 3. CORS relays, best-scoring first
//! 4. HTTP proxies, best-scoring first
//! 5. Archive, cache and translate mirrors

mod config;
mod content_extraction;
mod doh;
mod error;
mod fetcher;
mod rotator;
mod spider_integration;
pub mod storage;
mod strategy;
mod validate;

pub use config::{CrawlerConfig, CrawlerConfigBuilder};
pub use content_extraction::{
    ExtractedDocument, ExtractionMethod, extract_document, extract_metadata, fold_char,
    normalize_persian,
};
pub use doh::DohResolver;
pub use error::CrawlError;
pub use fetcher::{AttemptRecord, FetchOutcome, Fetcher};
pub use rotator::{ProxyRotator, ProxyStats};
pub use spider_integration::{discover_links, looks_like_document_url};
pub use strategy::{DeliveryMethod, MirrorKind, method_label};
pub use validate::{ContentVerdict, assess_content, persian_ratio};

use serde::{Deserialize, Serialize};

/// Metadata for a fetched page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Title of the page
    pub title: Option<String>,

    /// Description of the page
    pub description: Option<String>,

    /// Publication or approval date as written on the page (often Jalali)
    pub publication_date: Option<String>,

    /// Author or issuing body
    pub author: Option<String>,

    /// Keywords from the `keywords` meta tag
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Domain of the page
    pub domain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_metadata() {
        let metadata = PageMetadata {
            title: Some("قانون مدنی".to_string()),
            description: Some("متن کامل قانون مدنی".to_string()),
            publication_date: Some("۱۳۰۷/۰۲/۱۸".to_string()),
            author: Some("مجلس شورای ملی".to_string()),
            keywords: vec!["قانون".to_string()],
            domain: "rc.majlis.ir".to_string(),
        };

        assert_eq!(metadata.title.as_deref().unwrap(), "قانون مدنی");
        assert_eq!(metadata.author.as_deref().unwrap(), "مجلس شورای ملی");
        assert_eq!(metadata.domain, "rc.majlis.ir");

        let json = serde_json::to_string(&metadata).unwrap();
        let back: PageMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
