//! Process settings read from the environment (and `.env`), before CLI flags

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

/// Settings shared by every subcommand
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: PathBuf,
    pub bind: SocketAddr,
    pub registry: Option<PathBuf>,
    pub delay_ms: u64,
    pub concurrency: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub http_proxies: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("qavanin.db"),
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            registry: None,
            delay_ms: 1000,
            concurrency: 4,
            cache_ttl_secs: 24 * 60 * 60,
            cache_capacity: 256,
            http_proxies: Vec::new(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read `QAVANIN_*` variables
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env file is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset or blank keys keep defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(path) = get("QAVANIN_DB") {
            settings.database = PathBuf::from(path);
        }
        if let Some(bind) = parse(&get, "QAVANIN_BIND")? {
            settings.bind = bind;
        }
        settings.registry = get("QAVANIN_REGISTRY").map(PathBuf::from);
        if let Some(delay) = parse(&get, "QAVANIN_DELAY_MS")? {
            settings.delay_ms = delay;
        }
        if let Some(concurrency) = parse(&get, "QAVANIN_CONCURRENCY")? {
            settings.concurrency = concurrency;
        }
        if let Some(ttl) = parse(&get, "QAVANIN_CACHE_TTL_SECS")? {
            settings.cache_ttl_secs = ttl;
        }
        if let Some(capacity) = parse(&get, "QAVANIN_CACHE_CAPACITY")? {
            settings.cache_capacity = capacity;
        }
        if let Some(proxies) = get("QAVANIN_HTTP_PROXIES") {
            settings.http_proxies = split_list(&proxies);
        }

        Ok(settings)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {}", key, value))
        })
        .transpose()
}

/// Comma or whitespace separated list
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
