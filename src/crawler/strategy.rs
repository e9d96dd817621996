//! Delivery methods: the different ways a page body can be obtained

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::crawler::error::CrawlError;

/// Third-party services that serve a copy of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorKind {
    /// Internet Archive, latest snapshot, raw original bytes
    Wayback,
    /// Google's page cache
    GoogleCache,
    /// Google Translate's `translate.goog` proxy with the target language set to Persian
    GoogleTranslate,
    /// archive.today latest snapshot
    ArchiveToday,
}

impl MirrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorKind::Wayback => "wayback",
            MirrorKind::GoogleCache => "google_cache",
            MirrorKind::GoogleTranslate => "google_translate",
            MirrorKind::ArchiveToday => "archive_today",
        }
    }

    /// URL at which the mirror serves `target`
    pub fn mirror_url(&self, target: &Url) -> Result<Url, CrawlError> {
        let raw = target.as_str();
        let rewritten = match self {
            MirrorKind::Wayback => format!("https://web.archive.org/web/2id_/{}", raw),
            MirrorKind::GoogleCache => format!(
                "https://webcache.googleusercontent.com/search?q=cache:{}",
                encode(raw)
            ),
            MirrorKind::ArchiveToday => format!("https://archive.ph/newest/{}", raw),
            MirrorKind::GoogleTranslate => return translate_goog_url(target),
        };
        Ok(Url::parse(&rewritten)?)
    }
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MirrorKind {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wayback" | "archive_org" => Ok(MirrorKind::Wayback),
            "google_cache" | "cache" => Ok(MirrorKind::GoogleCache),
            "google_translate" | "translate" => Ok(MirrorKind::GoogleTranslate),
            "archive_today" | "archive_ph" => Ok(MirrorKind::ArchiveToday),
            other => Err(CrawlError::Other(format!("Unknown mirror: {}", other))),
        }
    }
}

/// `www.example-site.ir/a?b=1` becomes
/// `www-example--site-ir.translate.goog/a?b=1&_x_tr_sl=auto&_x_tr_tl=fa`
fn translate_goog_url(target: &Url) -> Result<Url, CrawlError> {
    let host = target
        .host_str()
        .ok_or_else(|| CrawlError::Other(format!("URL has no host: {}", target)))?;
    let encoded_host = host.replace('-', "--").replace('.', "-");

    let mut url = Url::parse(&format!("https://{}.translate.goog", encoded_host))?;
    url.set_path(target.path());
    url.set_query(target.query());
    url.query_pairs_mut()
        .append_pair("_x_tr_sl", "auto")
        .append_pair("_x_tr_tl", "fa")
        .append_pair("_x_tr_hl", "fa");
    Ok(url)
}

fn encode(raw: &str) -> String {
    byte_serialize(raw.as_bytes()).collect()
}

/// A single way of getting a URL's body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Plain request to the origin
    Direct,
    /// Request to the origin with the host resolved through a DoH endpoint
    DnsOverride { resolver: String },
    /// Request relayed by a CORS proxy
    CorsProxy { template: String },
    /// Request sent through an HTTP/SOCKS proxy
    HttpProxy { proxy: String },
    /// Copy served by a mirror
    Mirror { mirror: MirrorKind },
}

impl DeliveryMethod {
    /// Stable key for logs and rotator statistics
    pub fn label(&self) -> String {
        match self {
            DeliveryMethod::Direct => "direct".to_string(),
            DeliveryMethod::DnsOverride { resolver } => format!("dns:{}", resolver),
            DeliveryMethod::CorsProxy { template } => format!("cors:{}", template),
            DeliveryMethod::HttpProxy { proxy } => format!("proxy:{}", proxy),
            DeliveryMethod::Mirror { mirror } => format!("mirror:{}", mirror),
        }
    }

    /// Short tier name
    pub fn tier(&self) -> &'static str {
        match self {
            DeliveryMethod::Direct => "direct",
            DeliveryMethod::DnsOverride { .. } => "dns",
            DeliveryMethod::CorsProxy { .. } => "cors",
            DeliveryMethod::HttpProxy { .. } => "proxy",
            DeliveryMethod::Mirror { .. } => "mirror",
        }
    }

    /// Whether the request goes to a third party rather than the origin
    pub fn is_relayed(&self) -> bool {
        matches!(
            self,
            DeliveryMethod::CorsProxy { .. } | DeliveryMethod::Mirror { .. }
        )
    }

    /// The URL actually requested for `target`
    pub fn request_url(&self, target: &Url) -> Result<Url, CrawlError> {
        match self {
            DeliveryMethod::Direct
            | DeliveryMethod::DnsOverride { .. }
            | DeliveryMethod::HttpProxy { .. } => Ok(target.clone()),
            DeliveryMethod::CorsProxy { template } => {
                let raw = target.as_str();
                let rewritten = if template.contains("{url}") {
                    template.replace("{url}", &encode(raw))
                } else if template.contains("{raw}") {
                    template.replace("{raw}", raw)
                } else {
                    format!("{}{}", template, encode(raw))
                };
                Ok(Url::parse(&rewritten)?)
            }
            DeliveryMethod::Mirror { mirror } => mirror.mirror_url(target),
        }
    }
}

/// Complete a user-supplied label: known tier prefixes are kept, anything
/// else is taken to be a proxy address
pub fn method_label(label: &str) -> String {
    let label = label.trim();
    let tier = label.split_once(':').map_or(label, |(tier, _)| tier);
    match tier {
        "direct" | "dns" | "cors" | "proxy" | "mirror" => label.to_string(),
        _ => format!("proxy:{}", label),
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://rc.majlis.ir/fa/law/show/94202?x=1").unwrap()
    }

    #[test]
    fn test_direct_keeps_url() {
        let url = DeliveryMethod::Direct.request_url(&target()).unwrap();
        assert_eq!(url, target());
    }

    #[test]
    fn test_cors_template_encodes_target() {
        let method = DeliveryMethod::CorsProxy {
            template: "https://api.allorigins.win/raw?url={url}".to_string(),
        };
        let url = method.request_url(&target()).unwrap();
        let (_, value) = url.query_pairs().find(|(k, _)| k == "url").unwrap();
        assert_eq!(value, target().as_str());
    }

    #[test]
    fn test_cors_prefix_template() {
        let method = DeliveryMethod::CorsProxy {
            template: "https://corsproxy.io/?".to_string(),
        };
        let url = method.request_url(&target()).unwrap();
        assert!(url.as_str().starts_with("https://corsproxy.io/?https%3A%2F%2Frc.majlis.ir"));
    }

    #[test]
    fn test_cors_raw_template() {
        let method = DeliveryMethod::CorsProxy {
            template: "https://thingproxy.freeboard.io/fetch/{raw}".to_string(),
        };
        let url = method.request_url(&target()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://thingproxy.freeboard.io/fetch/https://rc.majlis.ir/fa/law/show/94202?x=1"
        );
    }

    #[test]
    fn test_translate_goog_rewrites_host() {
        let target = Url::parse("https://www.shora-gc.ir/fa/news/1?id=2").unwrap();
        let url = MirrorKind::GoogleTranslate.mirror_url(&target).unwrap();
        assert_eq!(url.host_str(), Some("www-shora--gc-ir.translate.goog"));
        assert_eq!(url.path(), "/fa/news/1");
        let pairs: Vec<_> = url.query_pairs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert!(pairs.contains(&("id".to_string(), "2".to_string())));
        assert!(pairs.contains(&("_x_tr_tl".to_string(), "fa".to_string())));
    }

    #[test]
    fn test_wayback_and_archive_urls() {
        let wayback = MirrorKind::Wayback.mirror_url(&target()).unwrap();
        assert!(wayback.as_str().starts_with("https://web.archive.org/web/2id_/https://rc.majlis.ir"));

        let archive = MirrorKind::ArchiveToday.mirror_url(&target()).unwrap();
        assert_eq!(archive.host_str(), Some("archive.ph"));
    }

    #[test]
    fn test_labels_are_distinct() {
        let methods = [
            DeliveryMethod::Direct,
            DeliveryMethod::DnsOverride { resolver: "https://dns.google/resolve".to_string() },
            DeliveryMethod::CorsProxy { template: "https://corsproxy.io/?".to_string() },
            DeliveryMethod::HttpProxy { proxy: "http://127.0.0.1:8080".to_string() },
            DeliveryMethod::Mirror { mirror: MirrorKind::Wayback },
        ];
        let labels: std::collections::HashSet<_> = methods.iter().map(|m| m.label()).collect();
        assert_eq!(labels.len(), methods.len());
        assert_eq!(methods[4].label(), "mirror:wayback");
        assert!(methods[2].is_relayed());
        assert!(!methods[3].is_relayed());
    }

    #[test]
    fn test_mirror_from_str() {
        assert_eq!("archive-ph".parse::<MirrorKind>().unwrap(), MirrorKind::ArchiveToday);
        assert!("nope".parse::<MirrorKind>().is_err());
    }

    #[test]
    fn test_method_label() {
        assert_eq!(method_label("direct"), "direct");
        assert_eq!(
            method_label(" cors:https://corsproxy.io/?{url} "),
            "cors:https://corsproxy.io/?{url}"
        );
        assert_eq!(
            method_label("socks5://127.0.0.1:9050"),
            "proxy:socks5://127.0.0.1:9050"
        );
        assert_eq!(
            method_label("proxy:http://127.0.0.1:8080"),
            "proxy:http://127.0.0.1:8080"
        );
    }
}
