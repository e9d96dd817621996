//! # qavanin - Iranian Legal Text Scraper for Rust
//!
//! This crate collects Persian legal documents (laws, regulations, cabinet
//! resolutions, court rulings) from government portals, classifies them,
//! scores their quality and keeps them in a local SQLite database that can
//! be searched from the command line or through a small web dashboard.
//!
//! ## Features
//!
//! - Fetch chain that falls back from direct requests to DNS-over-HTTPS,
//!   CORS relays, HTTP proxies and public mirrors
//! - Proxy rotation driven by success rate and latency
//! - Selector-based extraction with Persian text normalisation
//! - Keyword categorisation, optionally blended with an LLM prediction
//! - Quality scoring with letter grades
//! - Two-tier response cache with expiry
//! - Keyword search, REST API and WebSocket progress events
//!
//! ## Example
//!
//! ```rust,no_run
//! use qavanin::cache::{CacheConfig, ResponseCache};
//! use qavanin::classifier::Classifier;
//! use qavanin::crawler::{CrawlerConfig, Fetcher, ProxyRotator};
//! use qavanin::index::Database;
//! use qavanin::pipeline::{ScrapeOptions, Scraper};
//! use qavanin::registry::SourceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new_from_path("qavanin.db").await?;
//!     let fetcher = Fetcher::new(CrawlerConfig::default(), ProxyRotator::new())?;
//!     let cache = ResponseCache::new(db.clone(), CacheConfig::default());
//!     let scraper = Scraper::new(
//!         fetcher,
//!         cache,
//!         Classifier::default(),
//!         db,
//!         SourceRegistry::default(),
//!     );
//!
//!     let scraped = scraper
//!         .scrape_url("https://rc.majlis.ir/fa/law/show/94202", ScrapeOptions::default())
//!         .await?;
//!     println!(
//!         "{} [{}] {}",
//!         scraped.document.title,
//!         scraped.document.grade(),
//!         scraped.document.category
//!     );
//!     Ok(())
//! }
//! ```

mod error;
pub mod model;
pub mod registry;

pub mod cache;
pub mod classifier;
pub mod crawler;
pub mod index;
pub mod pipeline;
pub mod search;
pub mod server;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::index::{Database, Document};
    pub use crate::pipeline::{ScrapeOptions, Scraper};
    pub use crate::registry::DocumentCategory;
}
