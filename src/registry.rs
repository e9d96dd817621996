//! # Legal Source Registry
//!
//! Static table of Iranian government and legal publishers. Each entry
//! carries the CSS selectors that locate the document body on that site,
//! a reliability weight used by quality scoring, and the category most of
//! its documents fall into.
//!
//! The built-in table can be overlaid with a JSON file, so selectors can be
//! fixed without a rebuild when a site changes its markup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Reliability assumed for hosts missing from the registry
pub const DEFAULT_RELIABILITY: f64 = 0.5;

/// Category of a legal document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    /// Acts passed by parliament
    Law,
    /// Executive by-laws (آیین‌نامه)
    Regulation,
    /// Cabinet or council resolutions (مصوبه)
    Resolution,
    /// Circulars and directives (بخشنامه، دستورالعمل)
    Directive,
    /// Court rulings and unifying precedents
    JudicialRuling,
    /// International agreements
    Treaty,
    /// Official news and announcements
    News,
    /// Nothing matched
    Unknown,
}

impl DocumentCategory {
    /// All categories, in display order
    pub const ALL: [DocumentCategory; 8] = [
        DocumentCategory::Law,
        DocumentCategory::Regulation,
        DocumentCategory::Resolution,
        DocumentCategory::Directive,
        DocumentCategory::JudicialRuling,
        DocumentCategory::Treaty,
        DocumentCategory::News,
        DocumentCategory::Unknown,
    ];

    /// Stable snake_case identifier, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Law => "law",
            DocumentCategory::Regulation => "regulation",
            DocumentCategory::Resolution => "resolution",
            DocumentCategory::Directive => "directive",
            DocumentCategory::JudicialRuling => "judicial_ruling",
            DocumentCategory::Treaty => "treaty",
            DocumentCategory::News => "news",
            DocumentCategory::Unknown => "unknown",
        }
    }

    /// Persian label shown in the dashboard
    pub fn label_fa(&self) -> &'static str {
        match self {
            DocumentCategory::Law => "قانون",
            DocumentCategory::Regulation => "آیین‌نامه",
            DocumentCategory::Resolution => "مصوبه",
            DocumentCategory::Directive => "بخشنامه",
            DocumentCategory::JudicialRuling => "رأی قضایی",
            DocumentCategory::Treaty => "معاهده",
            DocumentCategory::News => "خبر",
            DocumentCategory::Unknown => "نامشخص",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DocumentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| Error::Config(format!("Unknown document category: {}", s)))
    }
}

/// CSS selectors used to pull content out of a source's pages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSelectors {
    /// Selectors for the document body, tried in order
    pub content: Vec<String>,

    /// Selectors for the document title
    pub title: Vec<String>,

    /// Selectors for the publication/approval date
    pub date: Vec<String>,

    /// Site-specific boilerplate to skip
    pub exclude: Vec<String>,
}

/// A known legal publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalSource {
    /// Registrable domain, e.g. `rc.majlis.ir`
    pub domain: String,

    /// Human readable name
    pub name: String,

    /// Landing page used for discovery
    pub base_url: String,

    /// Extraction selectors
    #[serde(default)]
    pub selectors: SourceSelectors,

    /// Trust weight in `[0, 1]`
    pub reliability: f64,

    /// Category most documents on this site belong to
    pub category: DocumentCategory,

    /// Paths under `base_url` worth seeding discovery with
    #[serde(default)]
    pub seed_paths: Vec<String>,
}

impl LegalSource {
    fn new(
        domain: &str,
        name: &str,
        reliability: f64,
        category: DocumentCategory,
        content: &[&str],
        title: &[&str],
    ) -> Self {
        Self {
            domain: domain.to_string(),
            name: name.to_string(),
            base_url: format!("https://{}", domain),
            selectors: SourceSelectors {
                content: content.iter().map(|s| s.to_string()).collect(),
                title: title.iter().map(|s| s.to_string()).collect(),
                date: vec![".date".to_string(), ".approval-date".to_string()],
                exclude: Vec::new(),
            },
            reliability,
            category,
            seed_paths: Vec::new(),
        }
    }

    fn with_seed_paths(mut self, paths: &[&str]) -> Self {
        self.seed_paths = paths.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Whether `host` is this source's domain or one of its sub-domains
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let domain = self.domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

/// Registry of known legal sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRegistry {
    sources: Vec<LegalSource>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        use DocumentCategory::*;

        let sources = vec![
            LegalSource::new(
                "rc.majlis.ir",
                "مرکز پژوهش‌های مجلس",
                0.95,
                Law,
                &[".law-content", "#lawContent", ".main-content", "article"],
                &["h1.law-title", "h1", "title"],
            )
            .with_seed_paths(&["/fa/law", "/fa/law/search"]),
            LegalSource::new(
                "qavanin.ir",
                "سامانه ملی قوانین و مقررات",
                0.9,
                Law,
                &["#treeText", ".law-text", ".content"],
                &[".law-title", "h1", "title"],
            )
            .with_seed_paths(&["/Law/TreeText"]),
            LegalSource::new(
                "dotic.ir",
                "پایگاه اطلاع‌رسانی قوانین",
                0.85,
                Law,
                &[".portal-body", ".content", "article"],
                &["h1", "title"],
            ),
            LegalSource::new(
                "rrk.ir",
                "روزنامه رسمی",
                0.9,
                Resolution,
                &[".news-body", ".laws-content", ".content"],
                &["h1", ".title", "title"],
            )
            .with_seed_paths(&["/Laws"]),
            LegalSource::new(
                "eadl.ir",
                "پایگاه اطلاع‌رسانی قوه قضاییه",
                0.85,
                JudicialRuling,
                &[".verdict-text", ".content", "article"],
                &["h1", "title"],
            ),
            LegalSource::new(
                "dolat.ir",
                "پایگاه اطلاع‌رسانی دولت",
                0.75,
                Resolution,
                &[".news-body", ".body", "article"],
                &["h1", "title"],
            ),
            LegalSource::new(
                "president.ir",
                "نهاد ریاست جمهوری",
                0.7,
                News,
                &[".news-content", ".body", "article"],
                &["h1", "title"],
            ),
            LegalSource::new(
                "shora-gc.ir",
                "شورای نگهبان",
                0.9,
                JudicialRuling,
                &[".content", ".news-body", "article"],
                &["h1", "title"],
            ),
        ];

        Self { sources }
    }
}

impl SourceRegistry {
    /// Create a registry from an explicit list of sources
    pub fn new(sources: Vec<LegalSource>) -> Self {
        let sources = sources.into_iter().map(Self::sanitize).collect();
        Self { sources }
    }

    /// An empty registry
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    fn sanitize(mut source: LegalSource) -> LegalSource {
        source.domain = source.domain.trim().to_ascii_lowercase();
        source.reliability = if source.reliability.is_finite() {
            source.reliability.clamp(0.0, 1.0)
        } else {
            DEFAULT_RELIABILITY
        };
        source
    }

    /// Load sources from a JSON file containing an array of `LegalSource`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let sources: Vec<LegalSource> = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Invalid registry file {}: {}", path.display(), e))
        })?;
        Ok(Self::new(sources))
    }

    /// Overlay `other` on top of this registry; same domain replaces
    pub fn merge(mut self, other: SourceRegistry) -> Self {
        let mut by_domain: BTreeMap<String, usize> = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.domain.clone(), i))
            .collect();

        for source in other.sources {
            match by_domain.get(&source.domain) {
                Some(&i) => self.sources[i] = source,
                None => {
                    by_domain.insert(source.domain.clone(), self.sources.len());
                    self.sources.push(source);
                }
            }
        }
        self
    }

    /// Find the source serving `url`, most specific domain first
    pub fn lookup(&self, url: &str) -> Option<&LegalSource> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.sources
            .iter()
            .filter(|s| s.matches_host(host))
            .max_by_key(|s| s.domain.len())
    }

    /// Lookup by exact domain
    pub fn get(&self, domain: &str) -> Option<&LegalSource> {
        let domain = domain.trim().to_ascii_lowercase();
        self.sources.iter().find(|s| s.domain == domain)
    }

    /// Reliability of the source serving `url`
    pub fn reliability_for(&self, url: &str) -> f64 {
        self.lookup(url)
            .map(|s| s.reliability)
            .unwrap_or(DEFAULT_RELIABILITY)
    }

    /// All sources
    pub fn sources(&self) -> impl Iterator<Item = &LegalSource> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lookup_matches_subdomains() {
        let registry = SourceRegistry::default();

        let source = registry.lookup("https://www.qavanin.ir/Law/TreeText/123").unwrap();
        assert_eq!(source.domain, "qavanin.ir");

        let source = registry.lookup("https://rc.majlis.ir/fa/law/show/94202").unwrap();
        assert_eq!(source.category, DocumentCategory::Law);

        assert!(registry.lookup("https://example.com/page").is_none());
        assert!(registry.lookup("not a url").is_none());
    }

    #[test]
    fn test_lookup_does_not_match_suffix_only() {
        let registry = SourceRegistry::default();
        assert!(registry.lookup("https://fakeqavanin.ir/").is_none());
    }

    #[test]
    fn test_reliability_defaults() {
        let registry = SourceRegistry::default();
        assert_eq!(registry.reliability_for("https://unknown.example/"), DEFAULT_RELIABILITY);
        assert!(registry.reliability_for("https://rc.majlis.ir/") > 0.9);
    }

    #[test]
    fn test_category_round_trip_from_str() {
        assert_eq!(
            "judicial-ruling".parse::<DocumentCategory>().unwrap(),
            DocumentCategory::JudicialRuling
        );
        assert_eq!("LAW".parse::<DocumentCategory>().unwrap(), DocumentCategory::Law);
        assert!("poetry".parse::<DocumentCategory>().is_err());
    }

    #[test]
    fn test_merge_replaces_and_appends() {
        let overlay = SourceRegistry::new(vec![
            LegalSource {
                domain: "QAVANIN.IR".to_string(),
                name: "override".to_string(),
                base_url: "https://qavanin.ir".to_string(),
                selectors: SourceSelectors::default(),
                reliability: 3.0,
                category: DocumentCategory::Regulation,
                seed_paths: Vec::new(),
            },
            LegalSource {
                domain: "example.ir".to_string(),
                name: "new".to_string(),
                base_url: "https://example.ir".to_string(),
                selectors: SourceSelectors::default(),
                reliability: 0.4,
                category: DocumentCategory::News,
                seed_paths: Vec::new(),
            },
        ]);

        let base_len = SourceRegistry::default().len();
        let merged = SourceRegistry::default().merge(overlay);

        assert_eq!(merged.len(), base_len + 1);
        let replaced = merged.get("qavanin.ir").unwrap();
        assert_eq!(replaced.name, "override");
        assert_eq!(replaced.reliability, 1.0);
        assert!(merged.get("example.ir").is_some());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"domain":"mporg.ir","name":"سازمان برنامه","base_url":"https://mporg.ir","reliability":0.8,"category":"directive","selectors":{{"content":[".body"]}}}}]"#
        )
        .unwrap();

        let registry = SourceRegistry::from_json_file(file.path()).unwrap();
        let source = registry.get("mporg.ir").unwrap();
        assert_eq!(source.category, DocumentCategory::Directive);
        assert_eq!(source.selectors.content, vec![".body".to_string()]);
        assert!(source.selectors.exclude.is_empty());
    }

    #[test]
    fn test_from_json_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            SourceRegistry::from_json_file(file.path()),
            Err(Error::Config(_))
        ));
    }
}
