use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;

use crate::core::scrape::{RedditFeed, ScrapeError, Submission};

/// Minimal reddit client over the public JSON listings. It deliberately
/// exposes only the calls the core layer needs.
pub struct RedditApiClient {
    client: Client,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(user_agent: &str) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "User-Agent",
            HeaderValue::from_str(user_agent).map_err(|e| ScrapeError::Api(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ScrapeError::Api(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://www.reddit.com".to_string(),
        })
    }

    fn map_submission(api: ApiSubmission) -> Submission {
        let mut image_urls = Vec::new();

        // Galleries carry their images in media_metadata; single-image posts
        // carry a direct url instead.
        if let Some(media) = api.media_metadata {
            for item in media.into_values() {
                if item.e.as_deref() == Some("Image") {
                    if let Some(url) = item.s.and_then(|s| s.u) {
                        image_urls.push(url);
                    }
                }
            }
        } else if let Some(url) = api.url_overridden_by_dest {
            if url.starts_with("http://") || url.starts_with("https://") {
                image_urls.push(url);
            }
        }

        let created_at = api
            .created_utc
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Submission {
            title: api.title.unwrap_or_else(|| "Untitled".to_string()),
            permalink: format!(
                "https://www.reddit.com{}",
                api.permalink.unwrap_or_default()
            ),
            created_at,
            image_urls,
        }
    }
}

#[async_trait]
impl RedditFeed for RedditApiClient {
    async fn subreddit_exists(&self, name: &str) -> Result<bool, ScrapeError> {
        let url = format!("{}/r/{}/", self.base_url, name);
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Api(e.to_string()))?;

        Ok(resp.status().is_success())
    }

    async fn new_submissions(
        &self,
        subreddit: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, ScrapeError> {
        let url = format!("{}/r/{}/new.json", self.base_url, subreddit);
        let resp = self
            .client
            .get(url)
            .query(&[("raw_json", "1"), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| ScrapeError::Api(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScrapeError::Api(format!(
                "listing for r/{} returned {}",
                subreddit,
                resp.status()
            )));
        }

        let listing: ApiListing = resp
            .json()
            .await
            .map_err(|e| ScrapeError::Api(e.to_string()))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| Self::map_submission(child.data))
            .collect())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Api(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScrapeError::Api(format!(
                "image url {} returned {}",
                url,
                resp.status()
            )));
        }

        let is_image = resp
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("image"))
            .unwrap_or(false);
        if !is_image {
            return Err(ScrapeError::Image(format!("{url} is not an image")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ScrapeError::Api(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct ApiListing {
    data: ApiListingData,
}

#[derive(Debug, Deserialize)]
struct ApiListingData {
    #[serde(default)]
    children: Vec<ApiChild>,
}

#[derive(Debug, Deserialize)]
struct ApiChild {
    data: ApiSubmission,
}

#[derive(Debug, Deserialize)]
struct ApiSubmission {
    title: Option<String>,
    permalink: Option<String>,
    created_utc: Option<f64>,
    url_overridden_by_dest: Option<String>,
    media_metadata: Option<HashMap<String, ApiMediaItem>>,
}

#[derive(Debug, Deserialize)]
struct ApiMediaItem {
    e: Option<String>,
    s: Option<ApiMediaSource>,
}

#[derive(Debug, Deserialize)]
struct ApiMediaSource {
    u: Option<String>,
}
