//! Utility functions for text cleanup, timestamps, string manipulation, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Comment text cleanup for downstream analysis
//! - Run timestamp formatting for the `extracted_at` column
//! - String truncation for logging upstream payloads
//! - File system validation for the output directory

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
static DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.,!?]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Derive the `clean_text` column from a raw comment body.
///
/// Steps, in order:
/// 1. Drop URL-like runs (`http://…`, `https://…`, `www.…` up to the next whitespace)
/// 2. Replace every character that is not a word character, whitespace, or one
///    of `. , ! ?` with a space
/// 3. Collapse whitespace runs to one space and trim
///
/// `\w` is Unicode-aware: letters and digits of any script survive, emoji and
/// other symbols are replaced by spaces and then collapsed away.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(clean_text("Check this out: https://example.com/x?y=1  great!!"), "Check this out great!!");
/// assert_eq!(clean_text("   "), "");
/// ```
pub fn clean_text(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, "");
    let plain = DISALLOWED_RE.replace_all(&without_urls, " ");
    WHITESPACE_RE.replace_all(&plain, " ").trim().to_string()
}

/// Format a run timestamp the way the `extracted_at` column stores it.
pub fn format_extracted_at(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to the previous
/// char boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory (and parents) if it doesn't exist, then performs
/// a write test by creating and immediately deleting a scratch file. Called
/// before any network work so a bad output path fails the run early.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
