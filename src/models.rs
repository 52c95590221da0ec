//! Data models for fetched comments and their persisted representation.
//!
//! This module defines the core data structures used throughout the application:
//! - [`CommentRecord`]: A comment normalized to author / published / text
//! - [`OutputRow`]: A CSV row, the record plus derived and metadata columns
//! - [`SortBy`] and [`Order`]: ordering selectors for the two acquisition paths
//! - [`FetchError`]: Domain failures raised while acquiring or projecting comments

use clap::ValueEnum;
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// A single comment as produced by an acquirer.
///
/// `published` is passed through exactly as the source reports it: ISO 8601
/// on the Data API path, a relative string such as `"2 days ago"` when
/// scraping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    /// Display name of the comment author.
    pub author: String,
    /// Publish time in the source's own format.
    pub published: String,
    /// Raw comment body. May contain markup, URLs and any unicode.
    pub text: String,
}

/// Column names of the persisted CSV file, in order.
pub const COLUMNS: [&str; 9] = [
    "video_id",
    "author",
    "published",
    "text",
    "clean_text",
    "sentiment_label",
    "sentiment_score",
    "sentiment_analysis_at",
    "extracted_at",
];

/// One row of the output CSV.
///
/// Field order matches [`COLUMNS`]; the `csv` serializer writes struct fields
/// in declaration order. The three `sentiment_*` columns are filled by a
/// separate downstream process and are always empty here.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRow {
    pub video_id: String,
    pub author: String,
    pub published: String,
    pub text: String,
    pub clean_text: String,
    pub sentiment_label: String,
    pub sentiment_score: String,
    pub sentiment_analysis_at: String,
    pub extracted_at: String,
}

/// Comment ordering for the scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortBy {
    /// Top comments first.
    #[default]
    Popular,
    /// Newest comments first.
    Recent,
}

impl SortBy {
    /// Position of this ordering in the watch page's sort menu.
    pub fn menu_index(self) -> usize {
        match self {
            SortBy::Popular => 0,
            SortBy::Recent => 1,
        }
    }
}

/// Comment ordering for the Data API `commentThreads.list` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Order {
    #[default]
    Relevance,
    Time,
}

impl Order {
    pub fn as_str(self) -> &'static str {
        match self {
            Order::Relevance => "relevance",
            Order::Time => "time",
        }
    }
}

/// Failures that are specific to this application's domain.
///
/// Transport, JSON and IO errors are boxed as-is and never wrapped in this type.
#[derive(Debug)]
pub enum FetchError {
    /// A required command-line value is missing.
    Usage(String),
    /// The watch page no longer has the shape the scraper expects.
    PageStructure(String),
    /// The video exists but exposes no comment section.
    CommentsDisabled { video_id: String },
    /// The page's comment sort menu has no entry for the requested ordering.
    SortUnavailable { requested: SortBy },
    /// The comment endpoint reported an error or answered with an unexpected status.
    Upstream(String),
    /// The Data API answered with an error envelope.
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    /// A comment payload is missing one of the fields we extract.
    MalformedPayload(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Usage(msg) => write!(f, "usage error: {msg}"),
            FetchError::PageStructure(msg) => write!(f, "watch page structure changed: {msg}"),
            FetchError::CommentsDisabled { video_id } => {
                write!(f, "comments are disabled or unavailable for video {video_id}")
            }
            FetchError::SortUnavailable { requested } => {
                write!(f, "failed to set comment sorting to {requested:?}")
            }
            FetchError::Upstream(msg) => write!(f, "server returned an error: {msg}"),
            FetchError::Api {
                status,
                reason,
                message,
            } => match reason {
                Some(reason) => write!(f, "YouTube Data API error {status} ({reason}): {message}"),
                None => write!(f, "YouTube Data API error {status}: {message}"),
            },
            FetchError::MalformedPayload(msg) => write!(f, "malformed comment payload: {msg}"),
        }
    }
}

impl Error for FetchError {}
