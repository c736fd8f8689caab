use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::*;
use reqwest::Client;
use tracing::error;

use songs_sync::bucket::{B2Lister, BucketLister, S3Lister};
use songs_sync::config::{self, Args, Config, Credentials};
use songs_sync::cover::CoverStore;
use songs_sync::logging;
use songs_sync::manifest::PersistOutcome;
use songs_sync::metadata::{HttpFetcher, LoftyParser, MetadataExtractor};
use songs_sync::{Result, SongSync, SyncError, SyncReport};

const USER_AGENT: &str = concat!("songs-sync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    config::load_dotenv();
    logging::init(args.verbose);

    println!("Songs Sync");
    println!("==========");
    if args.force {
        println!("Mode      : force (re-extract existing songs)");
    }
    if args.dry_run {
        println!("Mode      : dry run (manifest is not written)");
    }
    println!();

    let start = Instant::now();
    match run(args).await {
        Ok(report) => {
            print_summary(&report, start.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Sync aborted");
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<SyncReport> {
    let config = Config::from_env(args)?;

    let client = Client::builder()
        .timeout(config.http_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let lister: Box<dyn BucketLister> = match &config.credentials {
        Credentials::B2 { key_id, app_key } => {
            Box::new(B2Lister::connect(client.clone(), key_id, app_key).await?)
        }
        Credentials::S3(settings) => Box::new(S3Lister::connect(settings).await),
    };

    let extractor = MetadataExtractor::new(
        Arc::new(HttpFetcher::new(client, config.max_object_bytes)),
        Arc::new(LoftyParser),
        CoverStore::new(&config.covers_dir, config.cover_url_prefix.as_str()),
    );

    SongSync::new(lister.as_ref(), &extractor, config.sync.clone())
        .run()
        .await
}

fn print_summary(report: &SyncReport, elapsed: Duration) {
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!();
    println!("{} {:.1}s", "Completed in:".white().bold(), elapsed.as_secs_f64());
    println!("  {} {}", "Bucket:".white(), report.bucket.bright_cyan());
    println!(
        "  {} {} objects in {} pages",
        "Listed:".white(),
        report.listed,
        report.pages
    );
    println!("  {} {}", "Carried:".bright_black(), report.carried);
    println!("  {} {}", "Added:".green(), report.appended);
    if report.refreshed > 0 {
        println!("  {} {}", "Refreshed:".green(), report.refreshed);
    }
    if report.covers_written > 0 || report.sidecar_covers > 0 {
        println!(
            "  {} {} new thumbnails, {} sidecar images",
            "Covers:".white(),
            report.covers_written,
            report.sidecar_covers
        );
    }
    if report.extraction_failures > 0 {
        println!(
            "  {} {} (written with placeholder metadata)",
            "Unreadable:".yellow(),
            report.extraction_failures
        );
    }
    println!("  {} {}", "Total:".white(), report.total);

    match report.persisted {
        Some(PersistOutcome::Written) => println!("  {} manifest written", "✓".green()),
        Some(PersistOutcome::Unchanged) => println!("  {} manifest unchanged", "✓".green()),
        None => println!("  {} dry run, nothing written", "↷".bright_black()),
    }
}
