//! YouTube comment scraper.
//!
//! This module crawls the comment section of a video the way the web client
//! does, without any credentials:
//!
//! 1. Fetch `https://www.youtube.com/watch?v=<id>` and pull the client config
//!    (`ytcfg.set({...})`) and the initial data (`ytInitialData = {...}`) out
//!    of the page's `<script>` elements
//! 2. Pick the continuation for the requested ordering from the comment sort menu
//! 3. POST continuation tokens to the innertube endpoint until none are left
//!
//! Continuations are kept on a stack: page continuations go to the bottom,
//! "show more replies" commands to the top. Comments come from
//! `commentEntityPayload` objects, or `commentRenderer` objects on the older
//! page layout.

use crate::models::{CommentRecord, FetchError, SortBy};
use crate::progress::{ClearOnDrop, make_spinner};
use crate::utils::truncate_for_log;
use futures::stream::{self, Stream, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::error::Error;
use std::pin::pin;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.130 Safari/537.36";

/// Skips the EU cookie consent interstitial.
const CONSENT_COOKIE: &str = "CONSENT=YES+cb";

/// `targetId`s of continuation actions that belong to the comment section itself.
const COMMENT_SECTION_TARGETS: [&str; 3] = [
    "comments-section",
    "engagement-panel-comments-section",
    "shorts-engagement-panel-comments-section",
];

static YT_CFG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ytcfg\.set\s*\(\s*(\{.+?\})\s*\)\s*;").unwrap());
static YT_INITIAL_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:window\s*\[\s*["']ytInitialData["']\s*\]|ytInitialData)\s*=\s*(\{.+?\})\s*;\s*(?:var\s+meta|</script|\n|$)"#,
    )
    .unwrap()
});

/// Client settings needed to talk to the innertube endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InnertubeConfig {
    #[serde(rename = "INNERTUBE_API_KEY")]
    pub api_key: String,
    #[serde(rename = "INNERTUBE_CONTEXT")]
    pub context: Value,
}

impl InnertubeConfig {
    /// Override the interface language, which drives the wording of relative timestamps.
    pub fn set_language(&mut self, language: &str) {
        if let Some(client) = self.context.get_mut("client").and_then(Value::as_object_mut) {
            client.insert("hl".to_string(), Value::String(language.to_string()));
        }
    }
}

/// Collect every value stored under `key`, at any depth.
///
/// Walks depth-first with an explicit stack, so objects and arrays are
/// visited last-child-first. Matched values are not searched further.
pub fn search_dict<'a>(root: &'a Value, key: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                for (k, v) in map {
                    if k == key {
                        found.push(v);
                    } else {
                        stack.push(v);
                    }
                }
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }
    found
}

fn script_bodies(html: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script")?;
    Ok(document
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .collect())
}

/// Extract the innertube config and the initial data object from a watch page.
pub fn extract_page_state(html: &str) -> Result<(InnertubeConfig, Value), Box<dyn Error>> {
    let scripts = script_bodies(html)?;

    let config = scripts
        .iter()
        .flat_map(|script| YT_CFG_RE.captures_iter(script))
        .find_map(|caps| serde_json::from_str::<InnertubeConfig>(&caps[1]).ok())
        .ok_or_else(|| {
            FetchError::PageStructure("no ytcfg.set(...) block carrying INNERTUBE_API_KEY".into())
        })?;

    let data = scripts
        .iter()
        .filter_map(|script| YT_INITIAL_DATA_RE.captures(script))
        .find_map(|caps| serde_json::from_str::<Value>(&caps[1]).ok())
        .ok_or_else(|| FetchError::PageStructure("no ytInitialData object".into()))?;

    debug!(scripts = scripts.len(), "Extracted watch page state");
    Ok((config, data))
}

fn sort_menu(data: &Value) -> Vec<Value> {
    search_dict(data, "sortFilterSubMenuRenderer")
        .first()
        .and_then(|renderer| renderer.get("subMenuItems"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn has_comment_section(data: &Value) -> bool {
    search_dict(data, "itemSectionRenderer")
        .first()
        .is_some_and(|section| !search_dict(section, "continuationItemRenderer").is_empty())
}

/// Queue the continuations announced by one response.
///
/// Comment section continuations go to the front of `queue` (popped last),
/// reply continuations to the back (popped next).
pub fn queue_continuations(response: &Value, queue: &mut VecDeque<Value>) -> Result<(), FetchError> {
    let mut actions = search_dict(response, "reloadContinuationItemsCommand");
    actions.extend(search_dict(response, "appendContinuationItemsAction"));

    for action in actions {
        let target = action.get("targetId").and_then(Value::as_str).unwrap_or_default();
        let items = action.get("continuationItems").and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            if COMMENT_SECTION_TARGETS.contains(&target) {
                let endpoints: Vec<Value> = search_dict(item, "continuationEndpoint")
                    .into_iter()
                    .cloned()
                    .collect();
                for endpoint in endpoints.into_iter().rev() {
                    queue.push_front(endpoint);
                }
            }
            if target.starts_with("comment-replies-item") && item.get("continuationItemRenderer").is_some() {
                let command = search_dict(item, "buttonRenderer")
                    .first()
                    .and_then(|button| button.get("command"))
                    .cloned()
                    .ok_or_else(|| {
                        FetchError::MalformedPayload(format!("{target}: replies continuation without a button command"))
                    })?;
                queue.push_back(command);
            }
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct CommentEntityPayload {
    properties: EntityProperties,
    author: EntityAuthor,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityProperties {
    published_time: String,
    content: EntityContent,
}

#[derive(Deserialize)]
struct EntityContent {
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAuthor {
    display_name: String,
}

/// Older page layout.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRenderer {
    author_text: SimpleText,
    published_time_text: Runs,
    content_text: Runs,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimpleText {
    simple_text: String,
}

#[derive(Deserialize)]
struct Runs {
    runs: Vec<Run>,
}

#[derive(Deserialize)]
struct Run {
    text: String,
}

fn project_entity_payload(payload: &Value) -> Result<CommentRecord, FetchError> {
    let entity = CommentEntityPayload::deserialize(payload)
        .map_err(|e| FetchError::MalformedPayload(format!("commentEntityPayload: {e}")))?;
    Ok(CommentRecord {
        author: entity.author.display_name,
        published: entity.properties.published_time,
        text: entity.properties.content.content,
    })
}

fn project_renderer(renderer: &Value) -> Result<CommentRecord, FetchError> {
    let comment = CommentRenderer::deserialize(renderer)
        .map_err(|e| FetchError::MalformedPayload(format!("commentRenderer: {e}")))?;
    let published = comment
        .published_time_text
        .runs
        .into_iter()
        .next()
        .map(|run| run.text)
        .ok_or_else(|| FetchError::MalformedPayload("commentRenderer: empty publishedTimeText".into()))?;
    Ok(CommentRecord {
        author: comment.author_text.simple_text,
        published,
        text: comment.content_text.runs.into_iter().map(|run| run.text).collect(),
    })
}

/// Project every comment in one continuation response, in page order.
pub fn extract_comments(response: &Value) -> Result<Vec<CommentRecord>, FetchError> {
    let payloads = search_dict(response, "commentEntityPayload");
    if !payloads.is_empty() {
        return payloads.into_iter().rev().map(project_entity_payload).collect();
    }
    search_dict(response, "commentRenderer")
        .into_iter()
        .rev()
        .map(project_renderer)
        .collect()
}

/// Trait for the two kinds of request the crawl makes.
pub trait InnertubeTransport {
    /// Fetch the HTML of the watch page for `video_id`.
    async fn watch_page(&self, video_id: &str) -> Result<String, Box<dyn Error>>;

    /// POST one continuation. `Ok(None)` means the server refused to continue
    /// (HTTP 403 or 413), which ends the crawl.
    async fn post_continuation(
        &self,
        api_url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<Option<Value>, Box<dyn Error>>;
}

/// `reqwest`-backed transport posing as a desktop browser.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        Self::with_base_url(YOUTUBE_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(COOKIE, HeaderValue::from_static(CONSENT_COOKIE));
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl InnertubeTransport for HttpTransport {
    #[instrument(level = "info", skip(self))]
    async fn watch_page(&self, video_id: &str) -> Result<String, Box<dyn Error>> {
        let url = Url::parse_with_params(&format!("{}/watch", self.base_url), &[("v", video_id)])?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        if response.url().as_str().contains("consent") {
            return Err(Box::new(FetchError::PageStructure(
                "redirected to the cookie consent page".into(),
            )));
        }
        let html = response.text().await?;
        info!(bytes = html.len(), "Fetched watch page");
        Ok(html)
    }

    #[instrument(level = "info", skip(self, api_key, body))]
    async fn post_continuation(
        &self,
        api_url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<Option<Value>, Box<dyn Error>> {
        let t0 = Instant::now();
        let url = Url::parse_with_params(&format!("{}{}", self.base_url, api_url), &[("key", api_key)])?;
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let dt = t0.elapsed();

        if status == StatusCode::FORBIDDEN || status == StatusCode::PAYLOAD_TOO_LARGE {
            warn!(%status, elapsed_ms = dt.as_millis() as u128, "Continuation refused; ending crawl");
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Box::new(FetchError::Upstream(format!(
                "HTTP {status} from {api_url}: {}",
                truncate_for_log(&text, 200)
            ))));
        }
        debug!(%status, elapsed_ms = dt.as_millis() as u128, "Continuation answered");
        Ok(Some(response.json().await?))
    }
}

async fn request_continuation<T: InnertubeTransport>(
    transport: &T,
    config: &InnertubeConfig,
    endpoint: &Value,
) -> Result<Option<Value>, Box<dyn Error>> {
    let api_url = endpoint
        .pointer("/commandMetadata/webCommandMetadata/apiUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::PageStructure("continuation endpoint without apiUrl".into()))?;
    let token = endpoint
        .pointer("/continuationCommand/token")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::PageStructure("continuation endpoint without token".into()))?;
    let body = json!({
        "context": config.context,
        "continuation": token,
    });
    transport.post_continuation(api_url, &config.api_key, &body).await
}

/// State of one crawl, threaded through [`stream::try_unfold`].
struct Crawl<'a, T> {
    transport: &'a T,
    video_id: String,
    sort: SortBy,
    language: Option<String>,
    config: Option<InnertubeConfig>,
    continuations: VecDeque<Value>,
    buffered: VecDeque<CommentRecord>,
    pages: usize,
}

impl<'a, T: InnertubeTransport> Crawl<'a, T> {
    async fn start(&mut self) -> Result<InnertubeConfig, Box<dyn Error>> {
        let html = self.transport.watch_page(&self.video_id).await?;
        let (mut config, data) = extract_page_state(&html)?;
        if let Some(language) = &self.language {
            config.set_language(language);
        }

        if !has_comment_section(&data) {
            return Err(Box::new(FetchError::CommentsDisabled {
                video_id: self.video_id.clone(),
            }));
        }

        let mut menu = sort_menu(&data);
        if menu.is_empty() {
            // Sort menu is only rendered after the first section continuation.
            let first = search_dict(&data, "sectionListRenderer")
                .first()
                .and_then(|section| search_dict(section, "continuationEndpoint").first().copied())
                .cloned();
            if let Some(endpoint) = first {
                if let Some(response) = request_continuation(self.transport, &config, &endpoint).await? {
                    menu = sort_menu(&response);
                }
            }
        }

        let endpoint = menu
            .get(self.sort.menu_index())
            .and_then(|item| item.get("serviceEndpoint"))
            .cloned()
            .ok_or(FetchError::SortUnavailable { requested: self.sort })?;
        self.continuations.push_back(endpoint);
        info!(sort = ?self.sort, "Comment section located");
        Ok(config)
    }

    /// Fetch the next continuation. Returns `false` once the crawl is over.
    async fn fetch_next_page(&mut self) -> Result<bool, Box<dyn Error>> {
        let config = match &self.config {
            Some(config) => config,
            None => return Err(Box::new(FetchError::PageStructure("crawl not started".into()))),
        };
        let Some(endpoint) = self.continuations.pop_back() else {
            return Ok(false);
        };
        let Some(response) = request_continuation(self.transport, config, &endpoint).await? else {
            self.continuations.clear();
            return Ok(false);
        };

        if let Some(error) = search_dict(&response, "externalErrorMessage").first() {
            let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
            return Err(Box::new(FetchError::Upstream(message)));
        }

        queue_continuations(&response, &mut self.continuations)?;
        let comments = extract_comments(&response)?;
        self.pages += 1;
        debug!(
            page = self.pages,
            comments = comments.len(),
            pending = self.continuations.len(),
            "Scraped continuation page"
        );
        self.buffered.extend(comments);
        Ok(true)
    }

    async fn step(mut self) -> Result<Option<(CommentRecord, Self)>, Box<dyn Error>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Ok(Some((record, self)));
            }
            if self.config.is_none() {
                let config = self.start().await?;
                self.config = Some(config);
                continue;
            }
            if !self.fetch_next_page().await? {
                return Ok(None);
            }
        }
    }
}

/// Lazy sequence of the comments of `video_id`, in crawl order.
///
/// Nothing is requested until the stream is polled, and each continuation is
/// fetched only once the comments of the previous one have been consumed.
pub fn comment_stream<'a, T: InnertubeTransport>(
    transport: &'a T,
    video_id: &str,
    sort: SortBy,
    language: Option<&str>,
) -> impl Stream<Item = Result<CommentRecord, Box<dyn Error>>> + use<'a, T> {
    let crawl = Crawl {
        transport,
        video_id: video_id.to_string(),
        sort,
        language: language.map(str::to_string),
        config: None,
        continuations: VecDeque::new(),
        buffered: VecDeque::new(),
        pages: 0,
    };
    stream::try_unfold(crawl, Crawl::step)
}

/// Scrape up to `max` comments (all of them when `None`).
///
/// Iteration stops as soon as `max` records are collected, so later
/// continuations are never requested.
#[instrument(level = "info", skip(transport))]
pub async fn fetch_comments_scraper<T: InnertubeTransport>(
    transport: &T,
    video_id: &str,
    max: Option<usize>,
    sort: SortBy,
    language: Option<&str>,
) -> Result<Vec<CommentRecord>, Box<dyn Error>> {
    let mut rows: Vec<CommentRecord> = Vec::new();
    if max == Some(0) {
        return Ok(rows);
    }

    let bar = ClearOnDrop::new(make_spinner("Downloading"));
    let mut comments = pin!(comment_stream(transport, video_id, sort, language));
    while let Some(record) = comments.try_next().await? {
        rows.push(record);
        bar.inc(1);
        if max.is_some_and(|max| rows.len() >= max) {
            break;
        }
    }

    info!(count = rows.len(), "Scraped comments");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn endpoint(token: &str) -> Value {
        json!({
            "commandMetadata": {"webCommandMetadata": {"apiUrl": "/youtubei/v1/next"}},
            "continuationCommand": {"token": token}
        })
    }

    fn entity(author: &str, time: &str, text: &str) -> Value {
        json!({
            "payload": {
                "commentEntityPayload": {
                    "properties": {
                        "commentId": format!("id-{author}"),
                        "content": {"content": text},
                        "publishedTime": time
                    },
                    "author": {"displayName": author, "channelId": "UC123"},
                    "toolbar": {"likeCountNotliked": "3", "replyCount": "0"}
                }
            }
        })
    }

    fn initial_data(with_comments: bool) -> Value {
        let section = if with_comments {
            json!([{"continuationItemRenderer": {"continuationEndpoint": endpoint("SECTION")}}])
        } else {
            json!([{"messageRenderer": {"text": {"simpleText": "Comments are turned off."}}}])
        };
        json!({
            "contents": {"twoColumnWatchNextResults": {"results": {"results": {"contents": [
                {"itemSectionRenderer": {"contents": section, "sectionIdentifier": "comment-item-section"}}
            ]}}}},
            "engagementPanels": [{"engagementPanelSectionListRenderer": {"header": {
                "engagementPanelTitleHeaderRenderer": {"menu": {"sortFilterSubMenuRenderer": {"subMenuItems": [
                    {"title": "Top comments", "serviceEndpoint": endpoint("TOP")},
                    {"title": "Newest first", "serviceEndpoint": endpoint("NEW")}
                ]}}}
            }}}]
        })
    }

    fn watch_html(data: &Value) -> String {
        let config = json!({
            "INNERTUBE_API_KEY": "INNERTUBE_KEY",
            "INNERTUBE_CONTEXT": {"client": {"hl": "en", "clientName": "WEB"}}
        });
        format!(
            "<html><head><script>ytcfg.set({{\"CSI\": 1}}); ytcfg.set({config});</script></head>\
             <body><script>var ytInitialData = {data};</script></body></html>"
        )
    }

    fn first_page() -> Value {
        json!({
            "onResponseReceivedEndpoints": [{"reloadContinuationItemsCommand": {
                "targetId": "comments-section",
                "continuationItems": [
                    {"commentThreadRenderer": {"commentViewModel": {}}},
                    {"continuationItemRenderer": {"continuationEndpoint": endpoint("PAGE2")}}
                ]
            }}],
            "frameworkUpdates": {"entityBatchUpdate": {"mutations": [
                entity("@alice", "2 days ago", "first"),
                entity("@bob", "1 day ago", "second")
            ]}}
        })
    }

    fn last_page() -> Value {
        json!({
            "onResponseReceivedEndpoints": [{"appendContinuationItemsAction": {
                "targetId": "comments-section",
                "continuationItems": []
            }}],
            "frameworkUpdates": {"entityBatchUpdate": {"mutations": [
                entity("@carol", "5 hours ago", "third")
            ]}}
        })
    }

    /// Serves one watch page and a queue of continuation responses.
    struct FakeTransport {
        html: String,
        responses: RefCell<VecDeque<Option<Value>>>,
        page_loads: RefCell<usize>,
        posts: RefCell<Vec<Value>>,
    }

    impl FakeTransport {
        fn new(html: String, responses: Vec<Option<Value>>) -> Self {
            Self {
                html,
                responses: RefCell::new(responses.into()),
                page_loads: RefCell::new(0),
                posts: RefCell::new(Vec::new()),
            }
        }

        fn posted_tokens(&self) -> Vec<String> {
            self.posts
                .borrow()
                .iter()
                .map(|body| body["continuation"].as_str().unwrap_or_default().to_string())
                .collect()
        }
    }

    impl InnertubeTransport for FakeTransport {
        async fn watch_page(&self, _video_id: &str) -> Result<String, Box<dyn Error>> {
            *self.page_loads.borrow_mut() += 1;
            Ok(self.html.clone())
        }

        async fn post_continuation(
            &self,
            api_url: &str,
            api_key: &str,
            body: &Value,
        ) -> Result<Option<Value>, Box<dyn Error>> {
            assert_eq!(api_url, "/youtubei/v1/next");
            assert_eq!(api_key, "INNERTUBE_KEY");
            self.posts.borrow_mut().push(body.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| "unexpected continuation request".into())
        }
    }

    #[test]
    fn test_search_dict_finds_nested_keys() {
        let value = json!({"a": {"target": 1, "b": [{"target": 2}, {"c": {"target": 3}}]}});
        let mut found: Vec<i64> = search_dict(&value, "target")
            .into_iter()
            .filter_map(Value::as_i64)
            .collect();
        found.sort();
        assert_eq!(found, vec![1, 2, 3]);
    }

    #[test]
    fn test_search_dict_does_not_descend_into_matches() {
        let value = json!({"target": {"target": 2}});
        assert_eq!(search_dict(&value, "target").len(), 1);
    }

    #[test]
    fn test_extract_page_state() {
        let html = watch_html(&initial_data(true));
        let (config, data) = extract_page_state(&html).unwrap();
        assert_eq!(config.api_key, "INNERTUBE_KEY");
        assert_eq!(config.context["client"]["clientName"], "WEB");
        assert_eq!(sort_menu(&data).len(), 2);
        assert!(has_comment_section(&data));
    }

    #[test]
    fn test_extract_page_state_without_config() {
        let html = "<html><script>var ytInitialData = {};</script></html>";
        let err = extract_page_state(html).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::PageStructure(_))
        ));
    }

    #[test]
    fn test_set_language() {
        let mut config: InnertubeConfig = serde_json::from_value(json!({
            "INNERTUBE_API_KEY": "k",
            "INNERTUBE_CONTEXT": {"client": {"hl": "en"}}
        }))
        .unwrap();
        config.set_language("de");
        assert_eq!(config.context["client"]["hl"], "de");
    }

    #[test]
    fn test_extract_comments_keeps_page_order() {
        let comments = extract_comments(&first_page()).unwrap();
        let authors: Vec<&str> = comments.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, vec!["@alice", "@bob"]);
        assert_eq!(comments[0].published, "2 days ago");
        assert_eq!(comments[0].text, "first");
    }

    #[test]
    fn test_extract_comments_legacy_renderer() {
        let response = json!({"continuationItems": [{"commentThreadRenderer": {"comment": {"commentRenderer": {
            "authorText": {"simpleText": "@legacy"},
            "publishedTimeText": {"runs": [{"text": "3 weeks ago"}]},
            "contentText": {"runs": [{"text": "hello "}, {"text": "world"}]}
        }}}}]});
        let comments = extract_comments(&response).unwrap();
        assert_eq!(
            comments,
            vec![CommentRecord {
                author: "@legacy".to_string(),
                published: "3 weeks ago".to_string(),
                text: "hello world".to_string(),
            }]
        );
    }

    #[test]
    fn test_extract_comments_malformed_payload() {
        let response = json!({"commentEntityPayload": {"properties": {"publishedTime": "now"}}});
        assert!(matches!(
            extract_comments(&response),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_extract_comments_legacy_renderer_missing_fields() {
        let without_author = json!({"commentRenderer": {
            "publishedTimeText": {"runs": [{"text": "1 day ago"}]},
            "contentText": {"runs": [{"text": "hi"}]}
        }});
        assert!(matches!(
            extract_comments(&without_author),
            Err(FetchError::MalformedPayload(_))
        ));

        let without_text = json!({"commentRenderer": {
            "authorText": {"simpleText": "@legacy"},
            "publishedTimeText": {"runs": [{"text": "1 day ago"}]}
        }});
        assert!(matches!(
            extract_comments(&without_text),
            Err(FetchError::MalformedPayload(_))
        ));

        let empty_time = json!({"commentRenderer": {
            "authorText": {"simpleText": "@legacy"},
            "publishedTimeText": {"runs": []},
            "contentText": {"runs": [{"text": "hi"}]}
        }});
        assert!(matches!(
            extract_comments(&empty_time),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_queue_continuations_ordering() {
        let response = json!({
            "onResponseReceivedEndpoints": [
                {"appendContinuationItemsAction": {
                    "targetId": "comments-section",
                    "continuationItems": [
                        {"continuationItemRenderer": {"continuationEndpoint": endpoint("NEXT")}}
                    ]
                }},
                {"appendContinuationItemsAction": {
                    "targetId": "comment-replies-item-Ugx",
                    "continuationItems": [
                        {"continuationItemRenderer": {"button": {"buttonRenderer": {"command": endpoint("MORE_REPLIES")}}}}
                    ]
                }}
            ]
        });
        let mut queue = VecDeque::from(vec![endpoint("OLD")]);
        queue_continuations(&response, &mut queue).unwrap();

        let tokens: Vec<&str> = queue
            .iter()
            .filter_map(|e| e.pointer("/continuationCommand/token").and_then(Value::as_str))
            .collect();
        assert_eq!(tokens, vec!["NEXT", "OLD", "MORE_REPLIES"]);
    }

    #[tokio::test]
    async fn test_scrapes_all_pages() {
        let transport = FakeTransport::new(
            watch_html(&initial_data(true)),
            vec![Some(first_page()), Some(last_page())],
        );
        let rows = fetch_comments_scraper(&transport, "vid", None, SortBy::Popular, None)
            .await
            .unwrap();

        let texts: Vec<&str> = rows.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(transport.posted_tokens(), vec!["TOP", "PAGE2"]);
    }

    #[tokio::test]
    async fn test_recent_sort_uses_second_menu_entry() {
        let transport = FakeTransport::new(watch_html(&initial_data(true)), vec![Some(last_page())]);
        let rows = fetch_comments_scraper(&transport, "vid", None, SortBy::Recent, Some("de"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(transport.posted_tokens(), vec!["NEW"]);
        assert_eq!(transport.posts.borrow()[0]["context"]["client"]["hl"], "de");
    }

    #[tokio::test]
    async fn test_sort_menu_from_section_continuation() {
        let data = json!({"contents": {"sectionListRenderer": {"contents": [
            {"itemSectionRenderer": {"contents": [
                {"continuationItemRenderer": {"continuationEndpoint": endpoint("SECTION")}}
            ]}}
        ]}}});
        let header = json!({"onResponseReceivedEndpoints": [{"reloadContinuationItemsCommand": {
            "targetId": "comments-section",
            "continuationItems": [{"commentsHeaderRenderer": {"sortMenu": {"sortFilterSubMenuRenderer": {
                "subMenuItems": [
                    {"title": "Top comments", "serviceEndpoint": endpoint("TOP")},
                    {"title": "Newest first", "serviceEndpoint": endpoint("NEW")}
                ]
            }}}}]
        }}]});
        let transport = FakeTransport::new(watch_html(&data), vec![Some(header), Some(last_page())]);
        let rows = fetch_comments_scraper(&transport, "vid", None, SortBy::Recent, None)
            .await
            .unwrap();

        assert_eq!(transport.posted_tokens(), vec!["SECTION", "NEW"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].author, "@carol");
    }

    #[tokio::test]
    async fn test_short_sort_menu_is_fatal() {
        let data = json!({
            "contents": {"itemSectionRenderer": {"contents": [
                {"continuationItemRenderer": {"continuationEndpoint": endpoint("SECTION")}}
            ]}},
            "header": {"sortFilterSubMenuRenderer": {"subMenuItems": [
                {"title": "Top comments", "serviceEndpoint": endpoint("TOP")}
            ]}}
        });
        let transport = FakeTransport::new(watch_html(&data), vec![]);
        let err = fetch_comments_scraper(&transport, "vid", None, SortBy::Recent, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::SortUnavailable { requested: SortBy::Recent })
        ));
        assert!(transport.posts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_max_stops_before_next_page() {
        let transport = FakeTransport::new(
            watch_html(&initial_data(true)),
            vec![Some(first_page()), Some(last_page())],
        );
        let rows = fetch_comments_scraper(&transport, "vid", Some(2), SortBy::Popular, None)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(transport.posted_tokens(), vec!["TOP"]);
    }

    #[tokio::test]
    async fn test_max_larger_than_available() {
        let transport = FakeTransport::new(
            watch_html(&initial_data(true)),
            vec![Some(first_page()), Some(last_page())],
        );
        let rows = fetch_comments_scraper(&transport, "vid", Some(1000), SortBy::Popular, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_max_zero_makes_no_requests() {
        let transport = FakeTransport::new(watch_html(&initial_data(true)), vec![]);
        let rows = fetch_comments_scraper(&transport, "vid", Some(0), SortBy::Popular, None)
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(*transport.page_loads.borrow(), 0);
    }

    #[tokio::test]
    async fn test_refused_continuation_ends_quietly() {
        let transport = FakeTransport::new(watch_html(&initial_data(true)), vec![None]);
        let rows = fetch_comments_scraper(&transport, "vid", None, SortBy::Popular, None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_comments_disabled_is_fatal() {
        let transport = FakeTransport::new(watch_html(&initial_data(false)), vec![]);
        let err = fetch_comments_scraper(&transport, "vid", None, SortBy::Popular, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::CommentsDisabled { .. })
        ));
    }

    #[tokio::test]
    async fn test_external_error_message_is_fatal() {
        let transport = FakeTransport::new(
            watch_html(&initial_data(true)),
            vec![Some(json!({"error": {"externalErrorMessage": "Video unavailable"}}))],
        );
        let err = fetch_comments_scraper(&transport, "vid", None, SortBy::Popular, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Video unavailable"));
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let transport = FakeTransport::new(watch_html(&initial_data(true)), vec![Some(first_page())]);
        let mut comments = pin!(comment_stream(&transport, "vid", SortBy::Popular, None));
        assert_eq!(*transport.page_loads.borrow(), 0);

        let first = comments.try_next().await.unwrap().unwrap();
        assert_eq!(first.author, "@alice");
        assert_eq!(*transport.page_loads.borrow(), 1);
        assert_eq!(transport.posts.borrow().len(), 1);
    }
}
