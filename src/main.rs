mod adapter;
mod config;
mod database;
mod error;
mod export;
mod extractor;
mod http_client;
mod markup;
mod models;
mod pipeline;
mod registry;
mod walker;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use database::Database;
use http_client::{Fetcher, HttpFetcher};
use pipeline::{RunOptions, RunSummary};
use registry::AdapterRegistry;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "carscout")]
#[command(about = "Scrapes used-car listing sites into a local document store", long_about = None)]
struct Args {
    /// Site to scrape (repeatable); defaults to the configured sites, or all of them
    #[arg(long = "site")]
    sites: Vec<String>,

    /// Maximum number of index pages per site
    #[arg(long)]
    max_pages: Option<u32>,

    /// Write the dashboard CSV after scraping (to PATH, or the configured export_path)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    export: Option<String>,

    /// Only write the dashboard CSV from what is already stored
    #[arg(long)]
    export_only: bool,

    /// List the available sites and exit
    #[arg(long)]
    list_sites: bool,

    /// Write a default data/config.yaml and exit
    #[arg(long)]
    init_config: bool,

    /// Test URL fetching - fetch and print HTML from a URL
    #[arg(long)]
    test_url: Option<String>,

    /// Save HTML to file when using --test-url
    #[arg(long)]
    save_html: Option<String>,

    /// Walk and extract one site without storing anything
    #[arg(long)]
    test_site: Option<String>,

    /// Print the stored document for a listing URL
    #[arg(long)]
    lookup: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        Config::create_default()?;
        println!("Wrote default {}", config::CONFIG_PATH);
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
        config.validate()?;
    }

    init_logging(&config);

    let mut registry = AdapterRegistry::builtin()?;
    if let Some(path) = &config.adapters_file {
        let count = registry.load_file(path)?;
        tracing::info!("Loaded {} adapters from {}", count, path);
    }

    if args.list_sites {
        for adapter in registry.iter() {
            println!("{:<10} {}", adapter.source_name, adapter.base_url);
        }
        return Ok(());
    }

    if let Some(url) = args.test_url {
        return test_url_fetch(&url, args.save_html.as_deref(), &config).await;
    }

    if let Some(site) = args.test_site {
        return test_site(&site, &registry, &config).await;
    }

    let site_names = if args.sites.is_empty() {
        config.sites.clone()
    } else {
        args.sites.clone()
    };
    let adapters = registry.select(&site_names)?;

    // Persistence must be reachable before any scraping starts
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(&config.database_path)?;
    tracing::info!("Database opened at {}", config.database_path);

    if let Some(url) = args.lookup {
        return lookup(&url, &registry, &db);
    }

    if !args.export_only {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current request");
                on_signal.cancel();
            }
        });

        let options = RunOptions {
            max_pages: config.max_pages,
            dry_run: false,
        };

        let mut summaries: Vec<RunSummary> = Vec::new();
        for adapter in &adapters {
            if cancel.is_cancelled() {
                break;
            }

            let delay = config.request_delay_ms.unwrap_or(adapter.request_delay_ms);
            let fetcher = HttpFetcher::new(&config.user_agent, delay)
                .context("Failed to create HTTP client")?;

            let (summary, _) = pipeline::run_site(*adapter, &fetcher, &db, &options, &cancel).await;
            tracing::info!(
                "{} collection now holds {} documents",
                adapter.collection(),
                db.count(&adapter.collection())?
            );
            summaries.push(summary);
        }

        print_summaries(&summaries);
    }

    if args.export_only || args.export.is_some() {
        let path = match args.export.as_deref() {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => config.export_path.clone(),
        };
        let collections: Vec<String> = adapters.iter().map(|a| a.collection()).collect();
        let records = db.records(&collections)?;
        export::export_to_path(&records, &path)?;
    }

    Ok(())
}

/// Use RUST_LOG when set, otherwise the configured level
fn init_logging(config: &Config) {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = config.tracing_level.to_lowercase();
        let max_level = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt()
            .with_max_level(max_level)
            .init();
    }
}

fn print_summaries(summaries: &[RunSummary]) {
    println!("{}", "=".repeat(80));
    for summary in summaries {
        println!("{}", summary);
        for skipped in &summary.skipped {
            println!("  skipped {}: {}", skipped.url, skipped.reason);
        }
    }
    println!("{}", "=".repeat(80));
}

/// Test URL fetching - downloads and prints HTML response
async fn test_url_fetch(url: &str, save_path: Option<&str>, config: &Config) -> Result<()> {
    println!("Testing URL fetch: {}", url);
    println!("User-Agent: {}", config.user_agent);
    println!("{}", "=".repeat(80));

    let fetcher = HttpFetcher::new(&config.user_agent, 0)?;
    let body = match fetcher.fetch(url).await {
        Ok(body) => body,
        Err(e) => {
            eprintln!("Fetch failed: {}", e);
            return Ok(());
        }
    };

    if let Some(path) = save_path {
        std::fs::write(path, &body)?;
        println!("HTML saved to: {}", path);
    } else {
        println!("{}", body);
    }

    println!("{}", "=".repeat(80));
    println!("Total length: {} bytes", body.len());
    Ok(())
}

/// Test a specific site: walk and extract, print the records, store nothing
async fn test_site(name: &str, registry: &AdapterRegistry, config: &Config) -> Result<()> {
    let Some(adapter) = registry.get(name) else {
        eprintln!("Unknown site: {}", name);
        eprintln!("Available sites: {}", registry.list_sites().join(", "));
        return Ok(());
    };

    let delay = config.request_delay_ms.unwrap_or(adapter.request_delay_ms);
    let fetcher = HttpFetcher::new(&config.user_agent, delay)?;

    println!("Testing site: {}", adapter.source_name);
    println!("Start URL: {}", adapter.base_url);
    println!("Request delay: {:?}, max pages: {}", fetcher.delay(), config.max_pages);
    println!("{}", "=".repeat(80));

    let db = Database::open_in_memory()?;
    let options = RunOptions {
        max_pages: config.max_pages,
        dry_run: true,
    };

    let (summary, records) =
        pipeline::run_site(adapter, &fetcher, &db, &options, &CancellationToken::new()).await;

    for (i, record) in records.iter().enumerate() {
        println!("\nRecord #{}: {} ({})", i + 1, record.listing(), record.price());
        for (key, value) in record.iter() {
            println!("{}: {}", key, value);
        }
        println!("{}", "-".repeat(80));
    }

    print_summaries(std::slice::from_ref(&summary));

    if records.is_empty() {
        println!("No records extracted. This might mean:");
        println!("  - The adapter selectors need updating");
        println!("  - The website structure has changed");
    }

    Ok(())
}

/// Show what the store holds for one listing URL
fn lookup(url: &str, registry: &AdapterRegistry, db: &Database) -> Result<()> {
    let mut found = false;
    for adapter in registry.iter() {
        let Some(doc) = db.get(&adapter.collection(), url)? else {
            continue;
        };
        found = true;

        println!("Document {} in {}", doc.id, doc.collection);
        println!("First seen: {}", doc.first_seen_at.to_rfc3339());
        println!("Scraped:    {}", doc.scraped_at.to_rfc3339());
        println!("Source:     {}", doc.record.source());
        println!("{}", "-".repeat(80));
        for (key, value) in doc.record.iter() {
            println!("{}: {}", key, value);
        }
    }

    if !found {
        println!("No stored document for {}", url);
    }
    Ok(())
}
