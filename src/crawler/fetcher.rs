//! The fallback chain: try each delivery method until one returns a plausible page

use std::net::SocketAddr;
use std::time::Instant;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy, redirect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use url::Url;

use crate::crawler::config::CrawlerConfig;
use crate::crawler::doh::DohResolver;
use crate::crawler::error::CrawlError;
use crate::crawler::rotator::ProxyRotator;
use crate::crawler::strategy::DeliveryMethod;
use crate::crawler::validate::{ContentVerdict, assess_content};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANG_FA: &str = "fa-IR,fa;q=0.9,en-US;q=0.6,en;q=0.4";

/// One try of one delivery method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Label of the delivery method
    pub method: String,

    /// URL actually requested
    pub request_url: String,

    /// HTTP status, when a response arrived
    pub status: Option<u16>,

    /// Verdict or transport error
    pub outcome: String,

    pub elapsed_ms: u64,
}

/// A successfully fetched page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// URL that was asked for
    pub url: String,

    /// Origin URL after redirects (the relay's URL is never reported here)
    pub final_url: String,

    /// Method that produced the body
    pub method: DeliveryMethod,

    pub status: u16,

    pub body: String,

    /// Wall time for the whole chain
    pub elapsed_ms: u64,

    /// Every attempt made, in order, including the successful one
    pub attempts: Vec<AttemptRecord>,
}

/// Walks the delivery chain for a URL
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: CrawlerConfig,
    rotator: ProxyRotator,
    resolvers: Vec<DohResolver>,
}

impl Fetcher {
    /// Create a fetcher; the rotator is shared so its statistics can be persisted
    pub fn new(config: CrawlerConfig, rotator: ProxyRotator) -> Result<Self, CrawlError> {
        let client = Self::client_builder(&config).build()?;
        let resolvers = config
            .doh_resolvers
            .iter()
            .map(|endpoint| DohResolver::new(endpoint.clone(), config.request_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            client,
            config,
            rotator,
            resolvers,
        })
    }

    fn client_builder(config: &CrawlerConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(config.request_timeout)
            .redirect(redirect::Policy::limited(10))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn rotator(&self) -> &ProxyRotator {
        &self.rotator
    }

    /// Delivery methods in the order they will be tried
    pub fn chain(&self) -> Vec<DeliveryMethod> {
        let config = &self.config;
        let mut chain = Vec::new();

        if config.enable_direct {
            chain.push(DeliveryMethod::Direct);
        }
        if config.enable_dns {
            chain.extend(self.resolvers.iter().map(|r| DeliveryMethod::DnsOverride {
                resolver: r.endpoint().to_string(),
            }));
        }
        if config.enable_cors {
            let relays = config
                .cors_proxies
                .iter()
                .map(|template| DeliveryMethod::CorsProxy {
                    template: template.clone(),
                })
                .collect();
            chain.extend(self.rotator.rank(relays));
        }
        if config.enable_proxies {
            let proxies = config
                .http_proxies
                .iter()
                .map(|proxy| DeliveryMethod::HttpProxy {
                    proxy: proxy.clone(),
                })
                .collect();
            chain.extend(self.rotator.rank(proxies));
        }
        if config.enable_mirrors {
            chain.extend(
                config
                    .mirrors
                    .iter()
                    .map(|&mirror| DeliveryMethod::Mirror { mirror }),
            );
        }

        chain.retain(|method| !config.disabled_methods.contains(&method.label()));
        chain
    }

    /// Fetch `url`, falling back through the chain
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, CrawlError> {
        let target = Url::parse(url)?;
        let started = Instant::now();
        let chain = self.chain();
        let mut attempts = Vec::new();

        if chain.is_empty() {
            return Err(CrawlError::Other("Every delivery method is disabled".to_string()));
        }

        for (i, method) in chain.iter().enumerate() {
            if i > 0 && self.config.delay_ms > 0 {
                tokio::time::sleep(self.config.delay()).await;
            }

            let label = method.label();
            for attempt in 1..=self.config.max_retries {
                if attempt > 1 {
                    tokio::time::sleep(self.config.backoff(attempt - 1)).await;
                }

                let t0 = Instant::now();
                let result = self
                    .attempt(method, &target)
                    .instrument(info_span!("attempt", method = %label, attempt))
                    .await;
                let elapsed_ms = t0.elapsed().as_millis() as u64;

                let (request_url, retryable) = match result {
                    Ok(response) => {
                        let verdict = assess_content(
                            response.status,
                            &response.body,
                            self.config.min_content_length,
                        );
                        attempts.push(AttemptRecord {
                            method: label.clone(),
                            request_url: response.request_url.clone(),
                            status: Some(response.status),
                            outcome: verdict.to_string(),
                            elapsed_ms,
                        });

                        if verdict.is_plausible() {
                            self.rotator.record_success(&label, elapsed_ms);
                            info!(
                                "Fetched {} via {} in {}ms ({} attempts)",
                                url,
                                label,
                                started.elapsed().as_millis(),
                                attempts.len()
                            );
                            let final_url = if method.is_relayed() {
                                target.to_string()
                            } else {
                                response.final_url
                            };
                            return Ok(FetchOutcome {
                                url: url.to_string(),
                                final_url,
                                method: method.clone(),
                                status: response.status,
                                body: response.body,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                                attempts,
                            });
                        }

                        debug!("{} via {}: {}", url, label, verdict);
                        (response.request_url, is_retryable(&verdict))
                    }
                    Err(e) => {
                        debug!("{} via {} failed: {}", url, label, e);
                        let request_url = method
                            .request_url(&target)
                            .map(|u| u.to_string())
                            .unwrap_or_else(|_| target.to_string());
                        attempts.push(AttemptRecord {
                            method: label.clone(),
                            request_url: request_url.clone(),
                            status: None,
                            outcome: e.to_string(),
                            elapsed_ms,
                        });
                        (request_url, true)
                    }
                };

                self.rotator.record_failure(&label);
                if !retryable {
                    debug!("Not retrying {} via {}", request_url, label);
                    break;
                }
            }
        }

        warn!("All {} delivery methods failed for {}", chain.len(), url);
        Err(CrawlError::AllMethodsFailed {
            url: url.to_string(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        method: &DeliveryMethod,
        target: &Url,
    ) -> Result<RawResponse, CrawlError> {
        let request_url = method.request_url(target)?;

        let client = match method {
            DeliveryMethod::Direct
            | DeliveryMethod::CorsProxy { .. }
            | DeliveryMethod::Mirror { .. } => self.client.clone(),
            DeliveryMethod::DnsOverride { resolver } => self.dns_client(resolver, target).await?,
            DeliveryMethod::HttpProxy { proxy } => Self::client_builder(&self.config)
                .proxy(Proxy::all(proxy.as_str())?)
                .build()?,
        };

        let response = client
            .get(request_url.clone())
            .header(USER_AGENT, self.config.next_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANG_FA)
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(RawResponse {
            request_url: request_url.to_string(),
            final_url,
            status,
            body,
        })
    }

    /// Client that connects to the address a DoH resolver gives for the target host
    async fn dns_client(&self, endpoint: &str, target: &Url) -> Result<Client, CrawlError> {
        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.endpoint() == endpoint)
            .ok_or_else(|| CrawlError::Dns(format!("Unknown resolver {}", endpoint)))?;
        let host = target
            .host_str()
            .ok_or_else(|| CrawlError::Other(format!("URL has no host: {}", target)))?;
        let port = target.port_or_known_default().unwrap_or(443);
        let ip = resolver.resolve(host).await?;

        Ok(Self::client_builder(&self.config)
            .resolve(host, SocketAddr::new(ip, port))
            .build()?)
    }
}

struct RawResponse {
    request_url: String,
    final_url: String,
    status: u16,
    body: String,
}

/// Server errors and throttling may clear up; everything else will not
fn is_retryable(verdict: &ContentVerdict) -> bool {
    match verdict {
        ContentVerdict::HttpStatus(code) => *code >= 500 || *code == 429 || *code == 408,
        ContentVerdict::Empty => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn legal_page() -> String {
        format!(
            "<html><body><div class=\"content\">{}</div></body></html>",
            "ماده ۱ - این قانون از تاریخ تصویب لازم‌الاجرا است. ".repeat(20)
        )
    }

    fn test_config() -> crate::crawler::CrawlerConfigBuilder {
        CrawlerConfig::builder()
            .delay_ms(0)
            .retry_backoff_ms(0)
            .request_timeout(Duration::from_secs(5))
            .min_content_length(100)
            .cors_proxies(Vec::new())
            .doh_resolvers(Vec::new())
            .http_proxies(Vec::new())
            .mirrors(Vec::new())
    }

    #[tokio::test]
    async fn test_direct_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/fa/law/show/1")
            .match_header("accept-language", Matcher::Regex("^fa-IR".into()))
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(legal_page())
            .expect(1)
            .create_async()
            .await;

        let fetcher = Fetcher::new(test_config().build(), ProxyRotator::new()).unwrap();
        let url = format!("{}/fa/law/show/1", server.url());
        let outcome = fetcher.fetch(&url).await.unwrap();

        assert_eq!(outcome.method, DeliveryMethod::Direct);
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.final_url, url);
        assert!(outcome.body.contains("ماده ۱"));
        assert_eq!(fetcher.rotator().stats("direct").unwrap().successes, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_cors_relay() {
        let mut server = Server::new_async().await;
        let _blocked = server
            .mock("GET", "/law/2")
            .with_status(200)
            .with_body(r#"<html><iframe src="http://10.10.34.34?type=Invalid Site"></iframe></html>"#)
            .create_async()
            .await;
        let relay = server
            .mock("GET", "/relay")
            .match_query(Matcher::Regex("url=http".into()))
            .with_status(200)
            .with_body(legal_page())
            .expect(1)
            .create_async()
            .await;

        let template = format!("{}/relay?url={{url}}", server.url());
        let config = test_config().cors_proxies(vec![template.clone()]).build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();

        let url = format!("{}/law/2", server.url());
        let outcome = fetcher.fetch(&url).await.unwrap();

        assert_eq!(outcome.method, DeliveryMethod::CorsProxy { template: template.clone() });
        assert_eq!(outcome.final_url, url);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].outcome, "blocked: filtering page");
        assert_eq!(fetcher.rotator().stats("direct").unwrap().failures, 1);
        relay.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let config = test_config().max_retries(3).build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();
        let result = fetcher.fetch(&format!("{}/missing", server.url())).await;

        match result {
            Err(CrawlError::AllMethodsFailed { attempts, .. }) => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].status, Some(404));
            }
            other => panic!("Expected AllMethodsFailed, got {:?}", other.map(|o| o.method)),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let config = test_config().max_retries(2).build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();
        let result = fetcher.fetch(&format!("{}/flaky", server.url())).await;

        assert!(matches!(result, Err(CrawlError::AllMethodsFailed { ref attempts, .. }) if attempts.len() == 2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dns_override_connects_to_resolved_address() {
        let mut server = Server::new_async().await;
        let port = server.socket_address().port();
        let _doh = server
            .mock("GET", "/dns-query")
            .match_query(Matcher::UrlEncoded("name".into(), "legal.test".into()))
            .with_status(200)
            .with_body(r#"{"Status":0,"Answer":[{"type":1,"data":"127.0.0.1"}]}"#)
            .create_async()
            .await;
        let page = server
            .mock("GET", "/doc")
            .with_status(200)
            .with_body(legal_page())
            .expect(1)
            .create_async()
            .await;

        let resolver = format!("{}/dns-query", server.url());
        let config = test_config()
            .enable_direct(false)
            .doh_resolvers(vec![resolver.clone()])
            .build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();

        let outcome = fetcher
            .fetch(&format!("http://legal.test:{}/doc", port))
            .await
            .unwrap();

        assert_eq!(outcome.method, DeliveryMethod::DnsOverride { resolver });
        page.assert_async().await;
    }

    #[tokio::test]
    async fn test_chain_order() {
        let config = CrawlerConfig::builder()
            .cors_proxies(vec!["https://relay.example/?".to_string()])
            .doh_resolvers(vec!["https://dns.example/resolve".to_string()])
            .http_proxies(vec!["http://127.0.0.1:3128".to_string()])
            .mirrors(vec![crate::crawler::MirrorKind::Wayback])
            .build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();

        let tiers: Vec<_> = fetcher.chain().iter().map(|m| m.tier()).collect();
        assert_eq!(tiers, vec!["direct", "dns", "cors", "proxy", "mirror"]);
    }

    #[tokio::test]
    async fn test_chain_skips_disabled_methods() {
        let config = CrawlerConfig::builder()
            .cors_proxies(vec![
                "https://relay.example/?".to_string(),
                "https://other.example/{url}".to_string(),
            ])
            .doh_resolvers(Vec::new())
            .http_proxies(vec!["http://127.0.0.1:3128".to_string()])
            .mirrors(Vec::new())
            .disabled_methods([
                "cors:https://relay.example/?".to_string(),
                "proxy:http://127.0.0.1:3128".to_string(),
            ])
            .build();
        let fetcher = Fetcher::new(config, ProxyRotator::new()).unwrap();

        assert_eq!(
            fetcher.chain(),
            vec![
                DeliveryMethod::Direct,
                DeliveryMethod::CorsProxy {
                    template: "https://other.example/{url}".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let fetcher = Fetcher::new(test_config().build(), ProxyRotator::new()).unwrap();
        assert!(matches!(fetcher.fetch("not a url").await, Err(CrawlError::UrlParse(_))));
    }
}
