//! Selection between the two comment sources.

use crate::api::{DataApiClient, fetch_comments_api};
use crate::cli::{Cli, Mode};
use crate::models::{CommentRecord, FetchError, Order, SortBy};
use crate::scrapers::youtube::{HttpTransport, fetch_comments_scraper};
use std::error::Error;
use tracing::{info, instrument};

/// The acquisition strategy for one run.
#[derive(PartialEq, Eq)]
pub enum Acquirer {
    /// Credential-free crawl of the watch page.
    Scraper {
        max: Option<usize>,
        sort: SortBy,
        language: Option<String>,
    },
    /// YouTube Data API v3 with an API key.
    Api {
        api_key: String,
        max: usize,
        order: Order,
    },
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Acquirer::Scraper {
                max,
                sort,
                language,
            } => f
                .debug_struct("Scraper")
                .field("max", max)
                .field("sort", sort)
                .field("language", language)
                .finish(),
            Acquirer::Api { max, order, .. } => f
                .debug_struct("Api")
                .field("api_key", &"<redacted>")
                .field("max", max)
                .field("order", order)
                .finish(),
        }
    }
}

impl Acquirer {
    /// Build the acquirer selected on the command line.
    ///
    /// # Errors
    ///
    /// [`FetchError::Usage`] when `--mode api` is given without an API key.
    pub fn from_cli(cli: &Cli) -> Result<Self, FetchError> {
        match cli.mode {
            Mode::Scraper => Ok(Acquirer::Scraper {
                max: Some(cli.max),
                sort: cli.sort,
                language: cli.language.clone(),
            }),
            Mode::Api => match &cli.api_key {
                Some(api_key) if !api_key.is_empty() => Ok(Acquirer::Api {
                    api_key: api_key.clone(),
                    max: cli.max,
                    order: cli.order,
                }),
                _ => Err(FetchError::Usage("--mode api requires --api_key".into())),
            },
        }
    }

    /// Download the comments of `video_id` with this strategy.
    #[instrument(level = "info", skip(self), fields(acquirer = ?self))]
    pub async fn fetch(&self, video_id: &str) -> Result<Vec<CommentRecord>, Box<dyn Error>> {
        let comments = match self {
            Acquirer::Scraper {
                max,
                sort,
                language,
            } => {
                let transport = HttpTransport::new()?;
                fetch_comments_scraper(&transport, video_id, *max, *sort, language.as_deref()).await?
            }
            Acquirer::Api {
                api_key,
                max,
                order,
            } => {
                let client = DataApiClient::new(api_key.as_str());
                fetch_comments_api(&client, video_id, *max, *order).await?
            }
        };
        info!(count = comments.len(), "Acquisition complete");
        Ok(comments)
    }
}
