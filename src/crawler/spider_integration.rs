//! Integration with spider library for discovering document URLs on a source

use std::collections::BTreeSet;

use spider::tokio;
use spider::website::Website;
use tracing::{debug, info, instrument};
use url::Url;

use crate::crawler::CrawlerConfig;
use crate::crawler::error::CrawlError;

/// Path fragments used by Iranian legal portals for document pages
const DOCUMENT_MARKERS: &[&str] = &[
    "/law",
    "/show",
    "/detail",
    "/document",
    "/news",
    "/verdict",
    "/approval",
    "/mosavab",
    "treetext",
    "lawid",
    "docid",
];

/// Files that are never HTML documents
const SKIPPED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".css", ".js", ".ico", ".zip", ".rar", ".mp4",
    ".mp3", ".woff", ".woff2",
];

/// Whether `url` looks like a single legal document rather than a listing or asset
pub fn looks_like_document_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();

    if SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }

    let query = parsed.query().unwrap_or("").to_ascii_lowercase();
    let has_marker = DOCUMENT_MARKERS
        .iter()
        .any(|m| path.contains(m) || query.contains(m.trim_start_matches('/')));

    // Numeric ids of three or more digits, in a path segment or a query value
    let query_values: Vec<String> = parsed.query_pairs().map(|(_, v)| v.into_owned()).collect();
    let has_numeric_id = path
        .split('/')
        .chain(query_values.iter().map(String::as_str))
        .any(|segment| segment.len() >= 3 && segment.chars().all(|c| c.is_ascii_digit()));

    (has_marker && has_numeric_id) || path.contains("treetext") || query.contains("lawid=")
}

/// Keep in-domain document links, without fragments, deduplicated and sorted
pub(crate) fn filter_document_links(
    base: &Url,
    links: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let Some(base_host) = base.host_str().map(|h| h.trim_start_matches("www.").to_string()) else {
        return Vec::new();
    };

    let mut found = BTreeSet::new();
    for link in links {
        let Ok(mut url) = Url::parse(&link) else {
            continue;
        };
        url.set_fragment(None);

        let in_domain = url.host_str().is_some_and(|h| {
            let h = h.trim_start_matches("www.");
            h == base_host || h.ends_with(&format!(".{}", base_host))
        });
        if in_domain && looks_like_document_url(url.as_str()) {
            found.insert(url.to_string());
        }
    }

    found.into_iter().collect()
}

/// Crawl a source and return the URLs of document pages found on it
///
/// # Arguments
///
/// * `url` - Landing page to start from
/// * `config` - Depth, page limit, robots and delay settings
///
/// # Returns
///
/// Sorted, deduplicated in-domain document URLs
#[instrument(skip(config))]
pub async fn discover_links(url: &str, config: &CrawlerConfig) -> Result<Vec<String>, CrawlError> {
    let base = Url::parse(url)?;
    info!("Starting discovery for {}", url);

    let mut website = Website::new(url);
    website
        .configuration
        .with_respect_robots_txt(config.respect_robots_txt)
        .with_user_agent(Some(config.next_user_agent()))
        .with_delay(config.delay_ms)
        .with_depth(config.max_depth.try_into().unwrap_or(0))
        .with_limit(config.max_pages);

    let mut rx = website
        .subscribe(16)
        .ok_or_else(|| CrawlError::Other("Failed to subscribe to website".to_string()))?;
    let handle = tokio::spawn(async move {
        let mut visited = Vec::new();
        while let Ok(page) = rx.recv().await {
            debug!("Visited {}", page.get_url());
            visited.push(page.get_url().to_string());
        }
        visited
    });

    website.crawl().await;
    website.unsubscribe();
    let visited = handle
        .await
        .map_err(|e| CrawlError::Other(format!("Task join error: {}", e)))?;

    let documents = filter_document_links(&base, visited);

    info!("Discovered {} document URLs on {}", documents.len(), url);
    Ok(documents)
}
