//! Sumi-Seek main entry point
//!
//! This is the command-line interface for crawling, indexing and searching.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_seek::config::{load_config_with_hash, Config};
use sumi_seek::crawler::crawl;
use sumi_seek::output::{load_statistics, print_statistics};
use sumi_seek::ranking::Ranker;
use sumi_seek::storage::Database;
use tracing_subscriber::EnvFilter;

/// Sumi-Seek: a polite crawler with a TF-IDF search index
///
/// Sumi-Seek crawls a website from a seed URL, indexes the paragraph text of
/// every page it visits, and answers ranked free-text queries over the index.
#[derive(Parser, Debug)]
#[command(name = "sumi-seek")]
#[command(version = "1.0.0")]
#[command(about = "A polite crawler with a TF-IDF search index", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Clear the index and visit log before crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "serve", "search"])]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "serve", "search"])]
    dry_run: bool,

    /// Show index statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "serve", "search"])]
    stats: bool,

    /// Run the query service
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "search"])]
    serve: bool,

    /// Run one query against the index and print the ranked results
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["dry_run", "stats", "serve"])]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.serve {
        sumi_seek::server::run_server(&config).await?;
    } else if let Some(query) = &cli.search {
        handle_search(&config, query)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_seek=info,warn"),
            1 => EnvFilter::new("sumi_seek=debug,info"),
            2 => EnvFilter::new("sumi_seek=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    let delay = crawler.politeness_delay();

    println!("=== Sumi-Seek Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed URL: {}", crawler.seed_url);
    println!("  Max pages: {}", crawler.max_pages);
    println!("  Concurrency: {}", crawler.concurrency);
    println!("  Politeness delay: {:?} - {:?}", delay.min, delay.max);
    println!("  Request timeout: {:?}", crawler.request_timeout());
    println!("  Max redirects: {}", crawler.max_redirects);
    match crawler.deadline() {
        Some(deadline) => println!("  Deadline: {:?}", deadline),
        None => println!("  Deadline: none"),
    }
    println!("  Re-index existing pages: {}", crawler.reindex_existing);

    println!("\nScope:");
    if config.scope.allowed_domains.is_empty() {
        println!("  Domains: seed host only");
    } else {
        for pattern in &config.scope.allowed_domains {
            println!("  - {}", pattern);
        }
    }
    for prefix in &config.scope.path_prefixes {
        println!("  Path prefix: {}", prefix);
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nQuery Service:");
    println!("  Bind: {}", config.server.bind);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = Database::from_config(&config.storage)?.open()?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --search mode: prints one ranked result list
fn handle_search(config: &Config, query: &str) -> anyhow::Result<()> {
    let mut storage = Database::from_config(&config.storage)?.open()?;
    let hits = Ranker::default()
        .search(&mut storage, query)
        .with_context(|| format!("Search for {:?} failed", query))?;

    if hits.is_empty() {
        println!("No results for {:?}", query);
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{:>3}. {:.4}  {}", rank + 1, hit.score, hit.title);
        println!("     {}", hit.url);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (clearing existing index)");
    } else {
        tracing::info!("Starting crawl (already indexed pages are kept)");
    }

    match crawl(config, config_hash, fresh).await {
        Ok(summary) => {
            println!(
                "Crawl run {} finished in {:.1}s: {} indexed, {} failed, {} skipped",
                summary.run_id,
                summary.duration.as_secs_f64(),
                summary.pages_visited,
                summary.pages_failed,
                summary.pages_skipped
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
