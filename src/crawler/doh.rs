//! DNS-over-HTTPS lookups using the JSON API spoken by Cloudflare, Google and Quad9

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::crawler::error::CrawlError;

/// DNS record type for IPv4 addresses
const RECORD_A: u16 = 1;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,

    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// Resolver bound to a single DoH endpoint
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CrawlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolve `host` to its first IPv4 address
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, CrawlError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", host), ("type", "A")])
            .header("accept", "application/dns-json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CrawlError::Dns(format!(
                "{} answered {} for {}",
                self.endpoint,
                response.status(),
                host
            )));
        }

        let body: DohResponse = response.json().await?;
        if body.status != 0 {
            return Err(CrawlError::Dns(format!(
                "{} returned DNS status {} for {}",
                self.endpoint, body.status, host
            )));
        }

        let ip = body
            .answer
            .iter()
            .filter(|a| a.record_type == RECORD_A)
            .find_map(|a| a.data.parse::<IpAddr>().ok())
            .ok_or_else(|| CrawlError::Dns(format!("No A record for {}", host)))?;

        debug!("Resolved {} to {}", host, ip);
        Ok(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_resolve_skips_cname_records() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/dns-query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "rc.majlis.ir".into()),
                Matcher::UrlEncoded("type".into(), "A".into()),
            ]))
            .match_header("accept", "application/dns-json")
            .with_status(200)
            .with_body(
                r#"{"Status":0,"Answer":[
                    {"name":"rc.majlis.ir","type":5,"TTL":300,"data":"edge.majlis.ir."},
                    {"name":"edge.majlis.ir","type":1,"TTL":300,"data":"185.112.33.10"}
                ]}"#,
            )
            .create_async()
            .await;

        let resolver =
            DohResolver::new(format!("{}/dns-query", server.url()), Duration::from_secs(5)).unwrap();
        let ip = resolver.resolve("rc.majlis.ir").await.unwrap();

        assert_eq!(ip, "185.112.33.10".parse::<IpAddr>().unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_nxdomain() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/dns-query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Status":3}"#)
            .create_async()
            .await;

        let resolver =
            DohResolver::new(format!("{}/dns-query", server.url()), Duration::from_secs(5)).unwrap();
        let result = resolver.resolve("missing.ir").await;
        assert!(matches!(result, Err(CrawlError::Dns(_))));
    }

    #[tokio::test]
    async fn test_ip_literal_short_circuits() {
        let resolver = DohResolver::new("http://127.0.0.1:9/unused", Duration::from_secs(1)).unwrap();
        let ip = resolver.resolve("10.0.0.1").await.unwrap();
        assert_eq!(ip.to_string(), "10.0.0.1");
    }
}
