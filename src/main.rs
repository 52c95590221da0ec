//! # YouTube Comments Fetcher
//!
//! Downloads the comments of a single YouTube video, normalizes each one to
//! author / published / text, adds a cleaned copy of the text, and saves the
//! result as a CSV file.
//!
//! ## Modes
//!
//! - **scraper** (default): no API key; crawls the public watch page the way
//!   the web client does
//! - **api**: YouTube Data API v3 `commentThreads.list`; requires `--api_key`
//!
//! ## Usage
//!
//! ```sh
//! yt_comments_fetcher SzXMacu80o8
//! yt_comments_fetcher SzXMacu80o8 --mode api --api_key YOUR_KEY --max 500
//! ```
//!
//! ## Architecture
//!
//! The application is a single sequential pass:
//! 1. **Fetch**: The selected acquirer pages through the comments
//! 2. **Normalize**: Each source comment is projected into a `CommentRecord`
//! 3. **Clean**: `clean_text` derives the analysis-ready text
//! 4. **Persist**: Rows are written to `data/youtube_comments_<video_id>.csv`
//!
//! Any failure after argument parsing aborts the run without writing a file.

use clap::Parser;
use std::error::Error;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod acquire;
mod api;
mod cli;
mod models;
mod outputs;
mod progress;
mod scrapers;
mod utils;

use acquire::Acquirer;
use cli::Cli;
use outputs::csv_file;
use utils::ensure_writable_dir;

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    // Parse CLI
    let args = Cli::parse();
    debug!(video_id = %args.video_id, mode = ?args.mode, max = args.max, output_dir = %args.output_dir.display(), "Parsed CLI arguments");

    let acquirer = match Acquirer::from_cli(&args) {
        Ok(acquirer) => acquirer,
        Err(e) => {
            use clap::CommandFactory;
            Cli::command()
                .error(clap::error::ErrorKind::MissingRequiredArgument, e.to_string())
                .exit();
        }
    };

    // Early check: a bad output path should fail before any network work
    ensure_writable_dir(&args.output_dir).await?;

    info!(video_id = %args.video_id, ?acquirer, "Fetching comments");
    let comments = acquirer.fetch(&args.video_id).await?;

    let path = csv_file::write_comments(&comments, &args.video_id, &args.output_dir).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        comments = comments.len(),
        "Execution complete"
    );

    println!("Done! Comments saved to →  {}", path.display());
    Ok(())
}
