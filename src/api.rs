//! YouTube Data API v3 comment download.
//!
//! This module pages through `commentThreads.list` for one video and
//! projects each thread's top-level comment into a [`CommentRecord`].
//!
//! # Architecture
//!
//! - [`CommentThreadsApi`]: Trait for one `commentThreads.list` page request
//! - [`DataApiClient`]: `reqwest`-backed implementation against the real endpoint
//! - [`fetch_comments_api`]: Pagination loop, generic over the trait
//!
//! # Pagination
//!
//! Pages hold at most [`PAGE_SIZE`] threads. The loop stops once `max`
//! records are collected or a page arrives without `nextPageToken`. Failed
//! calls are not retried.

use crate::models::{CommentRecord, FetchError, Order};
use crate::progress::{ClearOnDrop, make_count_progress};
use crate::utils::truncate_for_log;
use serde::Deserialize;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Base URL of the Data API v3.
pub const DATA_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Largest `maxResults` the endpoint accepts.
pub const PAGE_SIZE: u32 = 100;

/// Parameters of a single `commentThreads.list` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThreadsRequest {
    pub video_id: String,
    pub max_results: u32,
    pub order: Order,
    /// Continuation token from the previous page, passed through verbatim.
    pub page_token: Option<String>,
}

/// A `commentThreadListResponse`, reduced to what we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadListResponse {
    pub items: Vec<CommentThread>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentThread {
    pub snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadSnippet {
    pub top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
pub struct TopLevelComment {
    pub snippet: CommentSnippet,
}

/// The three fields pulled out of every top-level comment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    pub author_display_name: String,
    pub published_at: String,
    pub text_display: String,
}

impl From<CommentThread> for CommentRecord {
    fn from(thread: CommentThread) -> Self {
        let snippet = thread.snippet.top_level_comment.snippet;
        CommentRecord {
            author: snippet.author_display_name,
            published: snippet.published_at,
            text: snippet.text_display,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: u16,
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    reason: Option<String>,
}

/// Turn a non-success response body into a [`FetchError::Api`].
///
/// Bodies that are not a Data API error envelope keep the HTTP status and
/// carry a shortened copy of the body as the message.
pub fn decode_api_error(status: u16, body: &str) -> FetchError {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => FetchError::Api {
            status: envelope.error.code,
            reason: envelope
                .error
                .errors
                .into_iter()
                .find_map(|detail| detail.reason),
            message: envelope.error.message,
        },
        Err(_) => FetchError::Api {
            status,
            reason: None,
            message: truncate_for_log(body, 300),
        },
    }
}

/// Trait for fetching one page of comment threads.
///
/// Implementors perform exactly one request per call; pagination state lives
/// in the caller.
pub trait CommentThreadsApi {
    async fn list_comment_threads(
        &self,
        request: &CommentThreadsRequest,
    ) -> Result<CommentThreadListResponse, Box<dyn Error>>;
}

/// Data API client authenticated with an API key.
pub struct DataApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for DataApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl DataApiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DATA_API_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build the full request URL, key included.
    pub fn request_url(&self, request: &CommentThreadsRequest) -> Result<Url, Box<dyn Error>> {
        let mut url = Url::parse(&format!(
            "{}/commentThreads",
            self.base_url.trim_end_matches('/')
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("part", "snippet")
                .append_pair("videoId", &request.video_id)
                .append_pair("maxResults", &request.max_results.to_string())
                .append_pair("order", request.order.as_str());
            if let Some(token) = &request.page_token {
                query.append_pair("pageToken", token);
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url)
    }
}

impl CommentThreadsApi for DataApiClient {
    #[instrument(level = "info", skip_all, fields(video_id = %request.video_id, has_token = request.page_token.is_some()))]
    async fn list_comment_threads(
        &self,
        request: &CommentThreadsRequest,
    ) -> Result<CommentThreadListResponse, Box<dyn Error>> {
        let t0 = Instant::now();
        let url = self.request_url(request)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            let err = decode_api_error(status.as_u16(), &body);
            warn!(elapsed_ms = dt.as_millis() as u128, error = %err, "commentThreads.list failed");
            return Err(Box::new(err));
        }

        debug!(elapsed_ms = dt.as_millis() as u128, bytes = body.len(), "commentThreads.list succeeded");
        Ok(serde_json::from_str(&body)?)
    }
}

/// Download up to `max` top-level comments through the Data API.
///
/// # Arguments
///
/// * `api` - Page source, usually a [`DataApiClient`]
/// * `video_id` - Video whose comment threads are listed
/// * `max` - Upper bound on returned records; `0` makes no calls
/// * `order` - `relevance` or `time`
///
/// # Errors
///
/// The first failed page (auth, quota, unknown video, malformed item) aborts
/// the download; records from earlier pages are dropped with it.
#[instrument(level = "info", skip(api))]
pub async fn fetch_comments_api<A: CommentThreadsApi>(
    api: &A,
    video_id: &str,
    max: usize,
    order: Order,
) -> Result<Vec<CommentRecord>, Box<dyn Error>> {
    let mut rows: Vec<CommentRecord> = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;
    let bar = ClearOnDrop::new(make_count_progress(max as u64, "Downloading"));

    while rows.len() < max {
        let request = CommentThreadsRequest {
            video_id: video_id.to_string(),
            max_results: PAGE_SIZE,
            order,
            page_token: next_token.take(),
        };
        let page = api.list_comment_threads(&request).await?;
        pages += 1;
        debug!(page = pages, items = page.items.len(), "Received comment thread page");

        for thread in page.items {
            rows.push(CommentRecord::from(thread));
            bar.inc(1);
            if rows.len() >= max {
                break;
            }
        }

        match page.next_page_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    info!(count = rows.len(), pages, "Fetched comments via Data API");
    Ok(rows)
}
