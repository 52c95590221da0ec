//! Command-line interface definitions for the comment fetcher.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! The API key and the output directory can also come from environment variables.

use crate::models::{Order, SortBy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Where comments are fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// No API key needed; crawls the public watch page
    #[default]
    Scraper,
    /// YouTube Data API v3; requires --api_key
    Api,
}

/// Download the comments of one YouTube video to a CSV file.
///
/// # Examples
///
/// ```sh
/// # Scrape up to 1000 top comments
/// yt_comments_fetcher SzXMacu80o8
///
/// # Newest 200 comments through the Data API
/// yt_comments_fetcher SzXMacu80o8 --mode api --api_key YOUR_KEY --max 200 --order time
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// YouTube video ID (e.g. SzXMacu80o8)
    pub video_id: String,

    /// scraper = no API key (default), api = YouTube Data API v3
    #[arg(long, value_enum, default_value_t = Mode::Scraper)]
    pub mode: Mode,

    /// Google API key (required with --mode api)
    #[arg(long = "api_key", env = "YOUTUBE_API_KEY", hide_env_values = true, required_if_eq("mode", "api"))]
    pub api_key: Option<String>,

    /// Maximum number of comments to fetch
    #[arg(long, default_value_t = 1000)]
    pub max: usize,

    /// Comment ordering when scraping
    #[arg(long, value_enum, default_value_t = SortBy::Popular)]
    pub sort: SortBy,

    /// Comment ordering when using the API
    #[arg(long, value_enum, default_value_t = Order::Relevance)]
    pub order: Order,

    /// Interface language for scraped timestamps (e.g. en, id)
    #[arg(long)]
    pub language: Option<String>,

    /// Directory the CSV file is written to
    #[arg(long, env = "YT_COMMENTS_DATA_DIR", default_value = "data")]
    pub output_dir: PathBuf,
}
