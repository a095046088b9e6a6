mod db;
mod discover;
mod enrich;
mod error;
mod export;
mod html;
mod record;
mod settings;
mod text;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use db::WorkSelection;
use discover::browser::BrowserSurface;
use discover::Discoverer;
use enrich::fetch::HttpFetcher;
use enrich::{EnrichStats, Enricher};
use settings::Settings;

#[derive(Parser)]
#[command(name = "catalog_scraper", about = "Incremental product catalog scraper")]
struct Cli {
    /// Settings file (default: ./scraper.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the product table if it does not exist
    Setup,
    /// Scroll the listing page and record every product card
    Discover,
    /// Fetch product pages for records missing details
    Enrich {
        /// Also retry pages whose description was not found last time
        #[arg(long)]
        force: bool,
        /// Max pages to fetch (default: all outstanding)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Write the cleaned dataset to CSV
    Export {
        /// Output path (default: store.csv_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// setup → discover → enrich → export
    Run {
        #[arg(long)]
        force: bool,
    },
    /// Show store counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received: stopping discovery, finishing in-flight fetches only");
                cancel.cancel();
            }
        });
    }

    let conn = open_store(&settings)?;

    let result = match cli.command {
        Commands::Setup => {
            println!("Store ready at {}", settings.store.db_path.display());
            Ok(())
        }
        Commands::Discover => {
            let (cards, inserted) = discover(&conn, &settings, &cancel).await?;
            println!("Discovered {} products ({} new).", cards, inserted);
            Ok(())
        }
        Commands::Enrich { force, limit } => {
            let selection = WorkSelection::from_force(force || settings.enrich.force_refresh);
            let stats = enrich(&conn, &settings, selection, limit, &cancel).await?;
            print_enrich_stats(&stats);
            Ok(())
        }
        Commands::Export { output } => {
            let path = output.unwrap_or_else(|| settings.store.csv_path.clone());
            let n = export::export_csv(&conn, &path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            println!("Exported {} products to {}", n, path.display());
            Ok(())
        }
        Commands::Run { force } => {
            let selection = WorkSelection::from_force(force || settings.enrich.force_refresh);

            let t_discover = Instant::now();
            let (cards, inserted) = discover(&conn, &settings, &cancel).await?;
            println!(
                "Discovered {} products ({} new) in {:.1}s",
                cards,
                inserted,
                t_discover.elapsed().as_secs_f64()
            );

            let t_enrich = Instant::now();
            let stats = enrich(&conn, &settings, selection, None, &cancel).await?;
            println!("Enrichment finished in {:.1}s", t_enrich.elapsed().as_secs_f64());

            let path = &settings.store.csv_path;
            let exported = export::export_csv(&conn, path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;

            println!(
                "\nSummary: {} discovered, {} enriched, {} failed to enrich, {} skipped; {} rows in {}",
                cards,
                stats.enriched,
                stats.failed,
                stats.skipped,
                exported,
                path.display()
            );
            print_failures(&stats);
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Total:            {}", s.total);
            println!("Enriched:         {}", s.enriched);
            println!("Not found:        {}", s.attempted_absent);
            println!("Never attempted:  {}", s.never_attempted);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<Connection> {
    let path = &settings.store.db_path;
    let conn = db::connect(path).with_context(|| format!("Failed to open {}", path.display()))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

async fn discover(
    conn: &Connection,
    settings: &Settings,
    cancel: &CancellationToken,
) -> anyhow::Result<(usize, usize)> {
    let discoverer = Discoverer::new(&settings.discover)?;
    let mut surface = BrowserSurface::launch(&settings.discover)
        .await
        .context("Failed to launch browser")?;
    let stats = discoverer.run(&mut surface, conn, cancel).await?;
    info!(
        probes = stats.history.len().saturating_sub(1),
        known = stats.known,
        "discovery complete"
    );
    Ok((stats.cards, stats.inserted))
}

async fn enrich(
    conn: &Connection,
    settings: &Settings,
    selection: WorkSelection,
    limit: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<EnrichStats> {
    let urls = db::urls_missing_details(conn, selection, limit)?;
    if urls.is_empty() {
        println!("No products need details. All data is up to date.");
        return Ok(EnrichStats::default());
    }
    println!("Enriching {} products (streaming to DB)...", urls.len());

    let fetcher = HttpFetcher::new(settings.enrich.user_agents.clone(), settings.enrich.task_timeout())?;
    let enricher = Enricher::new(fetcher, &settings.enrich)?;
    Ok(enricher.run(conn, urls, cancel).await?)
}

fn print_enrich_stats(stats: &EnrichStats) {
    println!(
        "Done: {} attempted ({} enriched, {} failed, {} skipped).",
        stats.total, stats.enriched, stats.failed, stats.skipped
    );
    print_failures(stats);
}

fn print_failures(stats: &EnrichStats) {
    if stats.failures.is_empty() {
        return;
    }
    println!("\n--- Failed ---");
    for (url, reason) in &stats.failures {
        println!("  {}: {}", url, reason);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
