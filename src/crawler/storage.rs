//! XML export archive: one file per document, grouped by domain

use quick_xml::{de::from_str, se::to_string};
use serde::{Deserialize, Serialize};
use std::{io, path::Path, path::PathBuf};
use tokio::fs;
use tracing::warn;
use url::Url;

use super::PageMetadata;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base path for storage
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("qavanin-export"),
        }
    }
}

/// XML root element
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "documents")]
pub struct Documents {
    #[serde(rename = "document")]
    pub documents: Vec<DocumentEntry>,
}

/// XML representation of a single scraped document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    /// URL of the document
    pub url: String,

    pub title: String,

    /// Category key, e.g. `law`
    pub category: String,

    /// Quality score, 0 to 100
    pub quality: f64,

    /// Letter grade for `quality`
    pub grade: String,

    /// Normalised text
    pub content: String,

    /// Metadata extracted from the page
    pub metadata: PageMetadata,
}

impl AsRef<DocumentEntry> for DocumentEntry {
    fn as_ref(&self) -> &DocumentEntry {
        self
    }
}

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("XML serialization error: {0}")]
    SerializeError(#[from] quick_xml::errors::serialize::SeError),

    #[error("XML deserialization error: {0}")]
    DeserializeError(#[from] quick_xml::errors::serialize::DeError),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid URL for storage: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for crate::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => crate::Error::Io(e),
            StorageError::NotFound(msg) => crate::Error::NotFound(msg),
            other => crate::Error::Other(other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, StorageError>;

/// Export archive rooted at a directory
#[derive(Debug, Clone, Default)]
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new storage with custom configuration
    pub fn with_config(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Create a storage rooted at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::with_config(StorageConfig {
            base_path: path.into(),
        })
    }

    /// Extracts the domain from a URL for use in storage path
    fn extract_domain(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
        Ok(host.to_string())
    }

    /// Gets the storage path for a given URL
    ///
    /// The path and query are folded into a single file name; the URL itself
    /// is stored inside the file so nothing has to be reversed from the name.
    pub fn get_storage_path(&self, url: &str) -> Result<PathBuf> {
        let domain = self.extract_domain(url)?;
        let parsed = Url::parse(url)?;

        let mut key = parsed.path().trim_matches('/').to_string();
        if let Some(query) = parsed.query() {
            key.push('_');
            key.push_str(query);
        }

        let filename = if key.is_empty() {
            "index.xml".to_string()
        } else {
            let safe = key
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect::<String>();
            format!("{}.xml", safe)
        };

        Ok(self.config.base_path.join(domain).join(filename))
    }

    /// Creates necessary directories for storage
    async fn ensure_directories(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Stores a single document to its XML file, returning the path written
    pub async fn store(&self, entry: &DocumentEntry) -> Result<PathBuf> {
        let storage_path = self.get_storage_path(&entry.url)?;
        self.ensure_directories(&storage_path).await?;

        let documents = Documents {
            documents: vec![entry.clone()],
        };
        let xml = to_string(&documents)?;

        fs::write(
            &storage_path,
            format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml),
        )
        .await?;
        Ok(storage_path)
    }

    /// Stores multiple documents in their respective XML files
    pub async fn store_batch<I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: AsRef<DocumentEntry>,
    {
        let mut written = 0;
        for entry in entries {
            self.store(entry.as_ref()).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn load_file(&self, path: &Path) -> Result<DocumentEntry> {
        let xml_content = fs::read_to_string(path).await?;
        let documents: Documents = from_str(&xml_content)?;

        documents.documents.into_iter().next().ok_or_else(|| {
            StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "XML file contains no documents",
            ))
        })
    }

    /// Loads the document stored for `url`
    pub async fn load(&self, url: &str) -> Result<DocumentEntry> {
        let storage_path = self.get_storage_path(url)?;
        if !fs::try_exists(&storage_path).await? {
            return Err(StorageError::NotFound(url.to_string()));
        }
        self.load_file(&storage_path).await
    }

    /// Loads all documents for a given domain
    ///
    /// The domain parameter can be either a domain name (e.g., "rc.majlis.ir") or a full URL.
    pub async fn load_domain(&self, domain_or_url: &str) -> Result<Vec<DocumentEntry>> {
        let domain = if domain_or_url.contains("://") {
            self.extract_domain(domain_or_url)?
        } else {
            domain_or_url.to_string()
        };

        let base_path = self.config.base_path.join(&domain);
        if !fs::try_exists(&base_path).await? {
            return Err(StorageError::NotFound(format!(
                "No documents found for domain {}",
                domain
            )));
        }

        let mut entries = Vec::new();
        let mut dir_entries = fs::read_dir(base_path).await?;

        while let Some(entry) = dir_entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "xml") {
                match self.load_file(&path).await {
                    Ok(document) => entries.push(document),
                    Err(e) => warn!("Failed to load {}: {}", path.display(), e),
                }
            }
        }

        entries.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(entries)
    }
}
