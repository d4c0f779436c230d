use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use ytfeed::app::{build_api_client, App};
use ytfeed::config::Config;
use ytfeed::output::{write_error, write_feed};
use ytfeed::request::RequestParameters;
use ytfeed::storage::Database;

/// Get the config directory path (~/.config/ytfeed/)
///
/// CGI environments often run without `HOME`; the working directory is used then.
fn get_config_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".config").join("ytfeed"),
        None => PathBuf::from("."),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ytfeed",
    about = "Generate RSS, Atom or JSON feeds for YouTube channels and playlists",
    long_about = "Generate RSS, Atom or JSON feeds for YouTube channels and playlists.\n\n\
                  Without --channel-id/--playlist-id, parameters are read from the CGI \
                  QUERY_STRING and a full CGI response is written."
)]
struct Args {
    /// Channel id (UC...)
    #[arg(long, value_name = "ID", conflicts_with = "playlist_id")]
    channel_id: Option<String>,

    /// Playlist id (PL...)
    #[arg(long, value_name = "ID")]
    playlist_id: Option<String>,

    /// Output format: rss, atom or json (default from config)
    #[arg(long)]
    format: Option<String>,

    /// Embed players instead of linked thumbnails
    #[arg(long)]
    embed_videos: bool,

    /// Config file (default: ~/.config/ytfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Remove cached entities not refreshed for this many days, then exit
    #[arg(long, value_name = "DAYS")]
    evict_older_than_days: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the feed; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match &config.database_path {
        Some(path) => PathBuf::from(path),
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
            }
            config_dir.join("cache.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open cache database {}", db_path.display()))?;

    let upstream = build_api_client(&config).context("Failed to create HTTP client")?;
    let app = App::new(&config, db, upstream).context("Invalid configuration")?;

    // Handle --evict-older-than-days flag
    if let Some(days) = args.evict_older_than_days {
        let cutoff = Utc::now() - TimeDelta::days(i64::from(days));
        let evicted = app
            .evict_older_than(cutoff)
            .await
            .context("Failed to evict cached entities")?;
        tracing::info!(evicted = evicted, days = days, "Evicted stale entities");
        println!("Evicted {} cached entities", evicted);
        return Ok(());
    }

    let cli_request = args.channel_id.is_some() || args.playlist_id.is_some();
    let query = std::env::var("QUERY_STRING").ok();

    let mut stdout = std::io::stdout().lock();

    match (cli_request, query) {
        (false, Some(query)) => {
            let result = match RequestParameters::from_query(&query) {
                Ok(params) => app.generate(&params, Utc::now()).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(feed) => write_feed(&mut stdout, &feed)?,
                Err(e) => {
                    tracing::warn!(error = %e, status = e.status(), "Request failed");
                    write_error(&mut stdout, &e)?;
                }
            }
        }
        _ => {
            let params = RequestParameters::new(
                args.channel_id.as_deref(),
                args.playlist_id.as_deref(),
                args.format.as_deref(),
                args.embed_videos.then_some("true"),
            )?;
            let feed = app.generate(&params, Utc::now()).await?;
            stdout.write_all(&feed.body)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
