use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gator::config::{parse_interval, Config};
use gator::feed::{FeedClient, Ingestor};
use gator::scheduler::Scheduler;
use gator::storage::{Database, DatabaseError};
use gator::util::validate_feed_url;

/// Number of posts `browse` shows when no limit is given
const DEFAULT_BROWSE_LIMIT: u32 = 2;

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", about = "RSS aggregator that collects feeds into SQLite")]
struct Args {
    /// Config file (defaults to ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh feeds on a fixed cadence until interrupted
    Agg {
        /// Time between refreshes, e.g. "30s" or "1m0s" (overrides the config file)
        interval: Option<String>,
    },
    /// Register a feed
    AddFeed { name: String, url: String },
    /// List registered feeds
    Feeds,
    /// Show the most recently published posts
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    // Validate the interval before touching the database or the network
    let interval = match &args.command {
        Command::Agg { interval } => Some(match interval {
            Some(value) => parse_interval(value)?,
            None => config.refresh_interval()?,
        }),
        _ => None,
    };

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
            }
            config_dir.join("gator.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!("Database is locked by another gator process; close it and try again")
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let result = match args.command {
        Command::Agg { .. } => {
            let interval = interval.context("Refresh interval not resolved")?;
            run_aggregator(db.clone(), &config, interval).await
        }
        Command::AddFeed { name, url } => add_feed(&db, &config, &name, &url).await,
        Command::Feeds => list_feeds(&db).await,
        Command::Browse { limit } => browse(&db, limit).await,
    };

    db.close().await;
    result
}

async fn run_aggregator(db: Database, config: &Config, interval: std::time::Duration) -> Result<()> {
    let client = FeedClient::new(config.request_timeout()).context("Failed to build HTTP client")?;
    let scheduler = Scheduler::new(Ingestor::new(db, client), interval)?;

    println!("Collecting feeds every {interval:?}");
    let cycles = scheduler.run(shutdown_signal()).await;
    println!("Stopped after {cycles} refresh cycles");
    Ok(())
}

async fn add_feed(db: &Database, config: &Config, name: &str, url: &str) -> Result<()> {
    let url = validate_feed_url(url).with_context(|| format!("Invalid feed URL: {url}"))?;
    let id = db
        .insert_feed(name, url.as_str(), &config.current_user)
        .await
        .context("Failed to register feed")?;
    println!("Feed {id} registered: {name} ({url})");
    Ok(())
}

async fn list_feeds(db: &Database) -> Result<()> {
    let feeds = db.get_feeds().await.context("Failed to load feeds")?;
    if feeds.is_empty() {
        println!("No feeds registered. Add one with: gator add-feed NAME URL");
        return Ok(());
    }
    for feed in feeds {
        let refreshed = feed
            .last_refreshed_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());
        println!("* {} ({})", feed.name, feed.url);
        println!("  owner: {}, last refreshed: {}", feed.owner, refreshed);
    }
    Ok(())
}

async fn browse(db: &Database, limit: u32) -> Result<()> {
    let posts = db
        .get_recent_posts(limit)
        .await
        .context("Failed to load posts")?;
    if posts.is_empty() {
        println!("No posts yet. Run `gator agg` to collect some.");
        return Ok(());
    }
    for post in posts {
        println!("{} | {}", format_timestamp(post.published_at), post.title);
        println!("    {}", post.url);
        if !post.description.is_empty() {
            println!("    {}", post.description);
        }
    }
    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Resolves on SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}
