//! # qavanin CLI Application
//!
//! Command-line front end for the scraper: fetch and classify legal pages,
//! browse and search what has been stored, run the dashboard server and
//! manage the response cache and proxy list.
//!
//! ## Subcommands
//!
//! - `scrape`: scrape URLs (arguments or a file) into the database
//! - `discover`: find document URLs on a source, optionally scraping them
//! - `serve`: REST API, WebSocket events and dashboard
//! - `list`, `show`, `search`, `stats`, `sources`: inspect stored documents
//! - `export`: write documents to an XML archive
//! - `cache`, `proxies`: maintenance
//!
//! Settings come from `.env` and `QAVANIN_*` variables; flags override them.

mod settings;
mod telemetry;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use qavanin::cache::{CacheConfig, ResponseCache};
use qavanin::classifier::{Classifier, ClassifierConfig, LlmClassifier};
use qavanin::crawler::storage::{DocumentEntry, Storage};
use qavanin::crawler::{CrawlerConfig, Fetcher, ProxyRotator, discover_links, method_label};
use qavanin::index::{Database, Document, DocumentFilter};
use qavanin::pipeline::{BatchReport, ScrapeEvent, ScrapeOptions, Scraper};
use qavanin::registry::{DocumentCategory, SourceRegistry};
use qavanin::search::{SearchOptions, search_documents};
use qavanin::server::AppState;
use settings::{Settings, split_list};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

/// Model requests per minute for the optional model classifier
const MODEL_REQUESTS_PER_MINUTE: u32 = 15;

#[derive(Parser)]
#[command(author, version, about = "Scrape, classify and search Iranian legal texts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Database path (overrides QAVANIN_DB)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Source registry JSON merged over the built-in table
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape URLs and store the classified documents
    Scrape(ScrapeArgs),

    /// Find document URLs on a source site
    Discover(DiscoverArgs),

    /// Run the API server and dashboard
    Serve(ServeArgs),

    /// List stored documents
    List(ListArgs),

    /// Show one stored document
    Show(ShowArgs),

    /// Search stored documents
    Search(SearchArgs),

    /// Document and cache statistics
    Stats(FormatArgs),

    /// Known legal sources
    Sources(FormatArgs),

    /// Export stored documents as XML
    Export(ExportArgs),

    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Delivery method statistics and proxies
    Proxies {
        #[command(subcommand)]
        command: ProxyCommand,
    },
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug, Clone)]
struct FetchArgs {
    /// Delay between request starts in milliseconds
    #[arg(long)]
    delay: Option<u64>,

    /// Scrapes in flight
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Extra HTTP/SOCKS proxy, may be repeated
    #[arg(long = "proxy")]
    proxies: Vec<String>,

    /// Only try direct requests
    #[arg(long)]
    direct_only: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Classify with the keyword lists only, even if GEMINI_API_KEY is set
    #[arg(long)]
    no_model: bool,
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// URLs to scrape
    urls: Vec<String>,

    /// File with one URL per line
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Bypass the response cache
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    fetch: FetchArgs,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Start URL or a registry domain such as rc.majlis.ir
    target: String,

    /// Link depth
    #[arg(short, long, default_value = "2")]
    depth: u32,

    /// Maximum pages to visit
    #[arg(short, long, default_value = "100")]
    max_pages: u32,

    /// Scrape the discovered documents
    #[arg(long)]
    scrape: bool,

    /// Scrape at most this many of them
    #[arg(short, long)]
    limit: Option<usize>,

    /// Bypass the response cache when scraping
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address (overrides QAVANIN_BIND)
    #[arg(short, long)]
    bind: Option<std::net::SocketAddr>,

    /// Also write logs to qavanin.log in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Filter by category, e.g. law or judicial_ruling
    #[arg(short, long)]
    category: Option<DocumentCategory>,

    /// Filter by source domain
    #[arg(short, long)]
    source: Option<String>,

    /// Minimum quality score
    #[arg(short, long)]
    min_quality: Option<f64>,

    /// Limit results
    #[arg(short, long, default_value = "50")]
    limit: usize,

    /// Skip this many results
    #[arg(long, default_value = "0")]
    offset: usize,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Document id or URL
    document: String,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Search query
    #[arg(required = true)]
    query: String,

    /// Filter by category
    #[arg(short, long)]
    category: Option<DocumentCategory>,

    /// Filter by source domain
    #[arg(short, long)]
    source: Option<String>,

    /// Minimum quality score
    #[arg(short, long)]
    min_quality: Option<f64>,

    /// Limit results
    #[arg(short, long, default_value = "15")]
    limit: usize,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output directory
    #[arg(short, long, default_value = "qavanin-export")]
    output: PathBuf,

    /// Filter by category
    #[arg(short, long)]
    category: Option<DocumentCategory>,

    /// Filter by source domain
    #[arg(short, long)]
    source: Option<String>,

    /// Minimum quality score
    #[arg(short, long)]
    min_quality: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Entry counts
    Stats,
    /// Remove expired entries
    Prune,
    /// Remove every entry
    Clear,
}

#[derive(Subcommand, Debug)]
enum ProxyCommand {
    /// Statistics of every delivery method seen so far
    List(FormatArgs),
    /// Register an HTTP/SOCKS proxy used by later scrapes
    Add {
        /// Proxy URL, e.g. socks5://127.0.0.1:9050
        address: String,
    },
    /// Use a delivery method again
    Enable {
        /// Label such as cors:https://corsproxy.io/?{url}, or a proxy URL
        label: String,
    },
    /// Leave a delivery method out of later scrapes
    Disable {
        /// Label such as cors:https://corsproxy.io/?{url}, or a proxy URL
        label: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Some(Commands::Serve(args)) => args.log_dir.clone(),
        _ => None,
    };
    let _otel = telemetry::init_tracing_subscriber(log_dir.as_deref())?;

    let mut settings = Settings::load()?;
    if let Some(database) = cli.database {
        settings.database = database;
    }
    if let Some(registry) = cli.registry {
        settings.registry = Some(registry);
    }

    match cli.command {
        Some(Commands::Scrape(args)) => scrape_command(&settings, args).await?,
        Some(Commands::Discover(args)) => discover_command(&settings, args).await?,
        Some(Commands::Serve(args)) => serve_command(&settings, args).await?,
        Some(Commands::List(args)) => list_command(&settings, args).await?,
        Some(Commands::Show(args)) => show_command(&settings, args).await?,
        Some(Commands::Search(args)) => search_command(&settings, args).await?,
        Some(Commands::Stats(args)) => stats_command(&settings, args).await?,
        Some(Commands::Sources(args)) => sources_command(&settings, args)?,
        Some(Commands::Export(args)) => export_command(&settings, args).await?,
        Some(Commands::Cache { command }) => cache_command(&settings, command).await?,
        Some(Commands::Proxies { command }) => proxies_command(&settings, command).await?,
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["qavanin", "--help"]);
        }
    }

    Ok(())
}

async fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    let path = settings.database.to_string_lossy();
    Database::new_from_path(&path)
        .await
        .with_context(|| format!("could not open database {}", path))
}

fn load_registry(settings: &Settings) -> anyhow::Result<SourceRegistry> {
    let registry = SourceRegistry::default();
    match &settings.registry {
        Some(path) => {
            let extra = SourceRegistry::from_json_file(path)
                .with_context(|| format!("could not load registry {}", path.display()))?;
            Ok(registry.merge(extra))
        }
        None => Ok(registry),
    }
}

/// Wire the fetcher, cache and classifier into a scraper
async fn build_scraper(settings: &Settings, fetch: &FetchArgs) -> anyhow::Result<Scraper> {
    let db = open_database(settings).await?;
    let registry = load_registry(settings)?;

    // Proxies registered with `proxies add`; anything disabled stays out of the chain
    let mut proxies = settings.http_proxies.clone();
    proxies.extend(fetch.proxies.iter().cloned());
    let mut disabled = Vec::new();
    for record in db.list_proxies().await? {
        if !record.active {
            disabled.push(record.label);
        } else if record.kind == "proxy" && !proxies.contains(&record.address) {
            proxies.push(record.address);
        }
    }

    let mut builder = CrawlerConfig::builder()
        .delay_ms(fetch.delay.unwrap_or(settings.delay_ms))
        .http_proxies(proxies)
        .disabled_methods(disabled)
        .accept_invalid_certs(fetch.insecure);
    if fetch.direct_only {
        builder = builder.direct_only();
    }
    let fetcher = Fetcher::new(builder.build(), ProxyRotator::new())?;

    let cache_config = CacheConfig::builder()
        .capacity(settings.cache_capacity)
        .ttl(Duration::from_secs(settings.cache_ttl_secs))
        .build()?;
    let cache = ResponseCache::new(db.clone(), cache_config);

    let config = ClassifierConfig::default();
    let mut classifier = Classifier::new(config.clone());
    if !fetch.no_model {
        if let Some(model) = qavanin::model::gemini_completion_from_env(MODEL_REQUESTS_PER_MINUTE)? {
            info!("Using Gemini to assist classification");
            classifier = classifier
                .with_model(LlmClassifier::new(model).with_max_chars(config.max_model_chars));
        }
    }

    let scraper = Scraper::new(fetcher, cache, classifier, db, registry)
        .with_concurrency(fetch.concurrency.unwrap_or(settings.concurrency));
    if let Err(e) = scraper.restore_proxy_stats().await {
        warn!("Could not restore proxy statistics: {}", e);
    }
    Ok(scraper)
}

fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(len);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    Ok(progress_bar)
}

/// Run a batch with a progress bar fed from the scraper's events
async fn run_batch(
    scraper: &Scraper,
    urls: Vec<String>,
    options: ScrapeOptions,
) -> anyhow::Result<BatchReport> {
    let progress_bar = progress_bar(urls.len() as u64)?;
    let mut events = scraper.subscribe();
    let bar = progress_bar.clone();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ScrapeEvent::Fetched { url, method, .. }) => {
                    bar.set_message(format!("{} via {}", url, method));
                }
                Ok(ScrapeEvent::Completed { .. }) | Ok(ScrapeEvent::Failed { .. }) => bar.inc(1),
                Ok(ScrapeEvent::BatchFinished { .. }) | Err(RecvError::Closed) => break,
                Ok(ScrapeEvent::Started { .. }) | Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let report = scraper.scrape_batch(urls, options).await;
    let _ = listener.await;
    progress_bar.finish_with_message("done");

    if let Err(e) = scraper.persist_proxy_stats().await {
        warn!("Could not persist proxy statistics: {}", e);
    }
    Ok(report)
}

fn print_report(report: &BatchReport, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Scraped {}/{} URLs ({} from cache, {} failed)",
        report.succeeded, report.total, report.from_cache, report.failed
    );
    for scraped in &report.documents {
        let doc = &scraped.document;
        println!(
            "  #{} [{}] {} {:.1} {} {}",
            doc.id,
            doc.grade(),
            doc.category,
            doc.quality.total,
            doc.title,
            doc.url
        );
        if let Some(original) = scraped.duplicate_of {
            println!("      same text as #{}", original);
        }
    }
    for failure in &report.errors {
        println!("  failed {}: {}", failure.url, failure.error);
    }
    Ok(())
}

async fn read_url_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

#[instrument(skip(settings))]
async fn scrape_command(settings: &Settings, args: ScrapeArgs) -> anyhow::Result<()> {
    let mut urls = args.urls;
    if let Some(path) = &args.input {
        urls.extend(read_url_file(path).await?);
    }
    if urls.is_empty() {
        return Err(anyhow!("no URLs given"));
    }

    let scraper = build_scraper(settings, &args.fetch).await?;
    let report = run_batch(&scraper, urls, ScrapeOptions { force: args.force }).await?;
    print_report(&report, &args.format)
}

#[instrument(skip(settings))]
async fn discover_command(settings: &Settings, args: DiscoverArgs) -> anyhow::Result<()> {
    let registry = load_registry(settings)?;
    let starts: Vec<String> = if args.target.starts_with("http") {
        vec![args.target.clone()]
    } else {
        let source = registry
            .get(&args.target)
            .ok_or_else(|| anyhow!("unknown source {}", args.target))?;
        if source.seed_paths.is_empty() {
            vec![source.base_url.clone()]
        } else {
            let base = url::Url::parse(&source.base_url)?;
            source
                .seed_paths
                .iter()
                .map(|path| base.join(path).map(String::from))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let config = CrawlerConfig::builder()
        .max_depth(args.depth)
        .max_pages(args.max_pages)
        .delay_ms(args.fetch.delay.unwrap_or(settings.delay_ms))
        .build();

    let mut links = Vec::new();
    for start in &starts {
        println!("Discovering from {}...", start);
        for link in discover_links(start, &config).await? {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    println!("Found {} document links", links.len());

    if !args.scrape {
        for link in &links {
            println!("{}", link);
        }
        return Ok(());
    }

    if let Some(limit) = args.limit {
        links.truncate(limit);
    }
    if links.is_empty() {
        return Ok(());
    }
    let scraper = build_scraper(settings, &args.fetch).await?;
    let report = run_batch(&scraper, links, ScrapeOptions { force: args.force }).await?;
    print_report(&report, "text")
}

async fn serve_command(settings: &Settings, args: ServeArgs) -> anyhow::Result<()> {
    let scraper = build_scraper(settings, &args.fetch).await?;
    let addr = args.bind.unwrap_or(settings.bind);
    qavanin::server::serve(AppState { scraper }, addr).await?;
    Ok(())
}

#[instrument(skip(settings))]
async fn list_command(settings: &Settings, args: ListArgs) -> anyhow::Result<()> {
    let db = open_database(settings).await?;
    let filter = DocumentFilter {
        category: args.category,
        domain: args.source,
        min_quality: args.min_quality,
        limit: args.limit,
        offset: args.offset,
        ..DocumentFilter::default()
    };
    let documents = db.list_documents(&filter).await?;

    if args.format == "json" {
        let summaries: Vec<qavanin::server::DocumentSummary> =
            documents.into_iter().map(Into::into).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("Documents: {}", documents.len());
    for doc in documents {
        println!(
            "#{:<5} [{}] {:>5.1} {:<16} {} ({})",
            doc.id,
            doc.grade(),
            doc.quality.total,
            doc.category,
            doc.title,
            doc.domain
        );
    }
    Ok(())
}

#[instrument(skip(settings))]
async fn show_command(settings: &Settings, args: ShowArgs) -> anyhow::Result<()> {
    let db = open_database(settings).await?;
    let document = match args.document.parse::<i64>() {
        Ok(id) => db.get_document(id).await?,
        Err(_) => db.get_document_by_url(&args.document).await?,
    }
    .ok_or_else(|| anyhow!("document {} not found", args.document))?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_document(&document);
    }
    Ok(())
}

fn print_document(doc: &Document) {
    let format_timestamp = |ts: i64| -> String {
        chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| ts.to_string())
    };

    println!("#{} {}", doc.id, doc.title);
    println!("URL: {}", doc.url);
    println!(
        "Category: {} ({}), confidence {:.2}",
        doc.category,
        doc.category.label_fa(),
        doc.confidence
    );
    if !doc.matched_terms.is_empty() {
        println!("Matched terms: {}", doc.matched_terms.join("، "));
    }
    println!(
        "Quality: {:.1} [{}] (legal density {:.1}, structure {:.1}, reliability {:.1}, readability {:.1})",
        doc.quality.total,
        doc.grade(),
        doc.quality.legal_density,
        doc.quality.structure,
        doc.quality.reliability,
        doc.quality.readability
    );
    if let Some(date) = &doc.metadata.publication_date {
        println!("Published: {}", date);
    }
    println!(
        "Fetched via {}, extracted by {}",
        doc.fetch_method, doc.extraction_method
    );
    println!("Updated: {}", format_timestamp(doc.updated_at));
    println!();
    println!("{}", doc.content);
}

#[instrument(skip(settings))]
async fn search_command(settings: &Settings, args: SearchArgs) -> anyhow::Result<()> {
    let db = open_database(settings).await?;
    let options = SearchOptions {
        limit: args.limit,
        category: args.category,
        source_filter: args.source,
        min_quality: args.min_quality,
    };
    let results = search_documents(&db, &args.query, options).await?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => {
            println!("Found {} results", results.len());
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. {} [{} {:.1}]",
                    i + 1,
                    result.title,
                    result.category,
                    result.quality
                );
                println!("   URL: {}", result.url);
                println!("   {}", result.snippet);
                println!();
            }
        }
    }
    Ok(())
}

async fn stats_command(settings: &Settings, args: FormatArgs) -> anyhow::Result<()> {
    let db = open_database(settings).await?;
    let stats = db.stats().await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Documents: {}", stats.total_documents);
    println!("Average quality: {:.1}", stats.average_quality);
    println!("By category:");
    for (category, count) in &stats.by_category {
        println!("  {:<16} {}", category, count);
    }
    println!("By grade:");
    for (grade, count) in &stats.by_grade {
        println!("  {:<16} {}", grade, count);
    }
    println!("By source:");
    for (domain, count) in &stats.by_domain {
        println!("  {:<24} {}", domain, count);
    }
    println!("Cache entries: {}", stats.cache_entries);
    println!("Known delivery methods: {}", stats.proxies);
    Ok(())
}

fn sources_command(settings: &Settings, args: FormatArgs) -> anyhow::Result<()> {
    let registry = load_registry(settings)?;
    if args.format == "json" {
        let sources: Vec<_> = registry.sources().collect();
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    for source in registry.sources() {
        println!(
            "{:<20} {:<12} reliability {:.2}  {}",
            source.domain, source.category, source.reliability, source.name
        );
    }
    Ok(())
}

#[instrument(skip(settings))]
async fn export_command(settings: &Settings, args: ExportArgs) -> anyhow::Result<()> {
    const PAGE: usize = 200;

    let db = open_database(settings).await?;
    let storage = Storage::at(&args.output);
    let mut filter = DocumentFilter {
        category: args.category,
        domain: args.source,
        min_quality: args.min_quality,
        limit: PAGE,
        offset: 0,
        ..DocumentFilter::default()
    };

    let mut written = 0;
    loop {
        let documents = db.list_documents(&filter).await?;
        if documents.is_empty() {
            break;
        }
        let count = documents.len();
        let entries: Vec<DocumentEntry> = documents
            .into_iter()
            .map(|doc| DocumentEntry {
                grade: doc.grade().to_string(),
                category: doc.category.to_string(),
                quality: doc.quality.total,
                url: doc.url,
                title: doc.title,
                content: doc.content,
                metadata: doc.metadata,
            })
            .collect();
        written += storage.store_batch(&entries).await?;
        if count < PAGE {
            break;
        }
        filter.offset += PAGE;
    }

    println!("Exported {} documents to {}", written, args.output.display());
    Ok(())
}

async fn cache_command(settings: &Settings, command: CacheCommand) -> anyhow::Result<()> {
    let db = open_database(settings).await?;
    let cache_config = CacheConfig::builder()
        .capacity(settings.cache_capacity)
        .ttl(Duration::from_secs(settings.cache_ttl_secs))
        .build()?;
    let cache = ResponseCache::new(db, cache_config);

    match command {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            println!("Stored entries: {}", stats.stored_entries);
        }
        CacheCommand::Prune => {
            let removed = cache.prune().await?;
            println!("Removed {} expired entries", removed);
        }
        CacheCommand::Clear => {
            let removed = cache.clear().await?;
            println!("Removed {} entries", removed);
        }
    }
    Ok(())
}

async fn proxies_command(settings: &Settings, command: ProxyCommand) -> anyhow::Result<()> {
    let db = open_database(settings).await?;

    match command {
        ProxyCommand::List(args) => {
            let records = db.list_proxies().await?;
            if args.format == "json" {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            for record in records {
                let total = record.successes + record.failures;
                println!(
                    "{:<8} {:<50} {:>4}/{:<4} ok  {:>7.0} ms{}",
                    record.kind,
                    record.address,
                    record.successes,
                    total,
                    record.avg_latency_ms,
                    if record.active { "" } else { "  (disabled)" }
                );
            }
        }
        ProxyCommand::Add { address } => {
            let addresses = split_list(&address);
            for address in addresses {
                url::Url::parse(&address)
                    .with_context(|| format!("invalid proxy URL {}", address))?;
                // Re-adding keeps the statistics and re-enables it
                db.set_method_enabled(&format!("proxy:{}", address), true)
                    .await?;
                println!("Added {}", address);
            }
        }
        ProxyCommand::Enable { label } => {
            let label = method_label(&label);
            db.set_method_enabled(&label, true).await?;
            println!("Enabled {}", label);
        }
        ProxyCommand::Disable { label } => {
            let label = method_label(&label);
            db.set_method_enabled(&label, false).await?;
            println!("Disabled {}", label);
        }
    }
    Ok(())
}
