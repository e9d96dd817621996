//! # Crawler Configuration Module
//!
//! Configuration for the fetch chain and for link discovery. Uses the same
//! builder pattern as the other configuration structs in the crate.
//!
//! ## Features
//!
//! - Defaults tuned for slow, filtered government sites (long timeouts, one retry)
//! - Per-tier switches so individual delivery methods can be disabled
//! - Public CORS relays, DoH resolvers and mirrors preconfigured
//! - Round-robin user agents

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::strategy::MirrorKind;

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Timeout for a single request
    pub request_timeout: Duration,

    /// Pause between requests, in milliseconds
    pub delay_ms: u64,

    /// Attempts per delivery method before moving on
    pub max_retries: u32,

    /// Backoff added per retry, in milliseconds
    pub retry_backoff_ms: u64,

    /// User agents, rotated per request
    pub user_agents: Vec<String>,

    /// Bodies shorter than this are rejected
    pub min_content_length: usize,

    /// CORS relay templates; `{url}` is replaced by the encoded target,
    /// otherwise the encoded target is appended
    pub cors_proxies: Vec<String>,

    /// DNS-over-HTTPS JSON endpoints
    pub doh_resolvers: Vec<String>,

    /// HTTP(S)/SOCKS proxies, e.g. `http://127.0.0.1:8080`
    pub http_proxies: Vec<String>,

    /// Mirrors tried last
    pub mirrors: Vec<MirrorKind>,

    pub enable_direct: bool,
    pub enable_dns: bool,
    pub enable_cors: bool,
    pub enable_proxies: bool,
    pub enable_mirrors: bool,

    /// Labels of delivery methods left out of the chain, e.g. `cors:...`
    pub disabled_methods: HashSet<String>,

    /// Maximum depth for link discovery
    pub max_depth: u32,

    /// Maximum number of pages visited during link discovery
    pub max_pages: u32,

    /// Whether discovery respects robots.txt
    pub respect_robots_txt: bool,

    /// Accept self-signed and expired certificates (common on government hosts)
    pub accept_invalid_certs: bool,

    ua_cursor: Arc<AtomicUsize>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            delay_ms: 1000,
            max_retries: 1,
            retry_backoff_ms: 500,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
                format!("qavanin/{}", env!("CARGO_PKG_VERSION")),
            ],
            min_content_length: 500,
            cors_proxies: vec![
                "https://api.allorigins.win/raw?url={url}".to_string(),
                "https://corsproxy.io/?{url}".to_string(),
                "https://api.codetabs.com/v1/proxy?quest={url}".to_string(),
                "https://thingproxy.freeboard.io/fetch/{raw}".to_string(),
            ],
            doh_resolvers: vec![
                "https://cloudflare-dns.com/dns-query".to_string(),
                "https://dns.google/resolve".to_string(),
                "https://dns.quad9.net:5053/dns-query".to_string(),
            ],
            http_proxies: Vec::new(),
            mirrors: vec![
                MirrorKind::Wayback,
                MirrorKind::GoogleCache,
                MirrorKind::GoogleTranslate,
                MirrorKind::ArchiveToday,
            ],
            enable_direct: true,
            enable_dns: true,
            enable_cors: true,
            enable_proxies: true,
            enable_mirrors: true,
            disabled_methods: HashSet::new(),
            max_depth: 2,
            max_pages: 100,
            respect_robots_txt: true,
            accept_invalid_certs: false,
            ua_cursor: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the pause between requests in milliseconds
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.delay_ms = delay_ms;
        self
    }

    /// Set the number of attempts per delivery method
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries.max(1);
        self
    }

    /// Set the backoff added per retry
    pub fn retry_backoff_ms(mut self, backoff: u64) -> Self {
        self.config.retry_backoff_ms = backoff;
        self
    }

    /// Replace the user agent pool
    pub fn user_agents(mut self, user_agents: Vec<String>) -> Self {
        if !user_agents.is_empty() {
            self.config.user_agents = user_agents;
        }
        self
    }

    /// Set the minimum acceptable body length
    pub fn min_content_length(mut self, len: usize) -> Self {
        self.config.min_content_length = len;
        self
    }

    /// Replace the CORS relay templates
    pub fn cors_proxies(mut self, proxies: Vec<String>) -> Self {
        self.config.cors_proxies = proxies;
        self
    }

    /// Replace the DoH resolver endpoints
    pub fn doh_resolvers(mut self, resolvers: Vec<String>) -> Self {
        self.config.doh_resolvers = resolvers;
        self
    }

    /// Replace the HTTP proxy list
    pub fn http_proxies(mut self, proxies: Vec<String>) -> Self {
        self.config.http_proxies = proxies;
        self
    }

    /// Replace the mirror list
    pub fn mirrors(mut self, mirrors: Vec<MirrorKind>) -> Self {
        self.config.mirrors = mirrors;
        self
    }

    pub fn enable_direct(mut self, enabled: bool) -> Self {
        self.config.enable_direct = enabled;
        self
    }

    pub fn enable_dns(mut self, enabled: bool) -> Self {
        self.config.enable_dns = enabled;
        self
    }

    pub fn enable_cors(mut self, enabled: bool) -> Self {
        self.config.enable_cors = enabled;
        self
    }

    pub fn enable_proxies(mut self, enabled: bool) -> Self {
        self.config.enable_proxies = enabled;
        self
    }

    pub fn enable_mirrors(mut self, enabled: bool) -> Self {
        self.config.enable_mirrors = enabled;
        self
    }

    /// Leave these delivery methods out, by label
    pub fn disabled_methods(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.config.disabled_methods.extend(labels);
        self
    }

    /// Only try a direct request
    pub fn direct_only(self) -> Self {
        self.enable_direct(true)
            .enable_dns(false)
            .enable_cors(false)
            .enable_proxies(false)
            .enable_mirrors(false)
    }

    /// Set the maximum discovery depth
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the maximum number of pages visited during discovery
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    /// Set whether discovery respects robots.txt
    pub fn respect_robots_txt(mut self, respect_robots_txt: bool) -> Self {
        self.config.respect_robots_txt = respect_robots_txt;
        self
    }

    /// Set whether invalid TLS certificates are accepted
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Get the inter-request delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }

    /// Next user agent in round-robin order
    pub fn next_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return "qavanin";
        }
        let i = self.ua_cursor.fetch_add(1, Ordering::Relaxed);
        &self.user_agents[i % self.user_agents.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = CrawlerConfig::builder()
            .delay_ms(0)
            .max_retries(0)
            .min_content_length(10)
            .direct_only()
            .build();

        assert_eq!(config.delay_ms, 0);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.min_content_length, 10);
        assert!(config.enable_direct);
        assert!(!config.enable_dns && !config.enable_cors && !config.enable_proxies && !config.enable_mirrors);
    }

    #[test]
    fn test_user_agents_rotate() {
        let config = CrawlerConfig::builder()
            .user_agents(vec!["a".to_string(), "b".to_string()])
            .build();

        assert_eq!(config.next_user_agent(), "a");
        assert_eq!(config.next_user_agent(), "b");
        assert_eq!(config.next_user_agent(), "a");
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let config = CrawlerConfig::builder().retry_backoff_ms(200).build();
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(600));
    }
}
