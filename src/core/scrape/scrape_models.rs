use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the scrape workflow.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("reddit API error: {0}")]
    Api(String),

    #[error("registry store error: {0}")]
    Store(String),

    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("image error: {0}")]
    Image(String),
}

/// One tracked subreddit row.
#[derive(Debug, Clone)]
pub struct SubredditEntry {
    pub id: i64,
    pub name: String,
    pub webhook_id: Option<i64>,
}

/// One registered webhook row.
#[derive(Debug, Clone)]
pub struct WebhookEntry {
    pub id: i64,
    pub name: String,
    pub url: String,
}

/// How a webhook may be looked up: numeric id, full url, or friendly name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookQuery {
    Id(i64),
    Url(String),
    Name(String),
}

impl WebhookQuery {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            WebhookQuery::Id(id)
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            WebhookQuery::Url(trimmed.to_string())
        } else {
            WebhookQuery::Name(trimmed.to_string())
        }
    }
}

/// One submission pulled from a subreddit's new listing, already reduced to
/// the fields the poll cycle needs.
#[derive(Debug, Clone)]
pub struct Submission {
    pub title: String,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
}

/// Summary of one poll cycle, used for logging and the force-check command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub subreddits_checked: usize,
    pub posted: usize,
    pub duplicates: usize,
    pub failures: usize,
}

/// Outcome of trying to track a new subreddit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Added,
    AlreadyTracked,
    NotFound,
}

/// Minimal reddit surface the poll cycle needs. The implementation owns all
/// HTTP concerns; the core never sees a URL beyond plain strings.
#[async_trait]
pub trait RedditFeed: Send + Sync {
    /// Cheap existence probe used before tracking a subreddit.
    async fn subreddit_exists(&self, name: &str) -> Result<bool, ScrapeError>;

    /// Newest submissions for a subreddit, most recent first.
    async fn new_submissions(
        &self,
        subreddit: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, ScrapeError>;

    /// Download a candidate image, validating it actually is one.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ScrapeError>;
}

/// Persistence for the subreddit/webhook registry and the poll watermark.
#[async_trait]
pub trait ScrapeRegistry: Send + Sync {
    async fn get_subreddit(&self, name: &str) -> Result<Option<SubredditEntry>, ScrapeError>;

    /// Returns None when the subreddit is already tracked.
    async fn add_subreddit(&self, name: &str) -> Result<Option<SubredditEntry>, ScrapeError>;

    /// Returns the number of rows removed.
    async fn remove_subreddit(&self, name: &str) -> Result<u64, ScrapeError>;

    async fn list_subreddits(&self) -> Result<Vec<SubredditEntry>, ScrapeError>;

    /// Point a subreddit at a webhook (or clear it). Returns false when the
    /// subreddit does not exist.
    async fn assign_webhook(
        &self,
        subreddit: &str,
        webhook_id: Option<i64>,
    ) -> Result<bool, ScrapeError>;

    async fn get_webhook(&self, query: &WebhookQuery) -> Result<Option<WebhookEntry>, ScrapeError>;

    /// Returns None when a webhook with that url already exists.
    async fn add_webhook(&self, name: &str, url: &str)
        -> Result<Option<WebhookEntry>, ScrapeError>;

    /// Removes the webhook and clears it from any subreddit referencing it.
    /// Returns the number of webhook rows removed.
    async fn remove_webhook(&self, query: &WebhookQuery) -> Result<u64, ScrapeError>;

    async fn list_webhooks(&self) -> Result<Vec<WebhookEntry>, ScrapeError>;

    async fn load_watermark(&self) -> Result<Option<DateTime<Utc>>, ScrapeError>;

    async fn save_watermark(&self, at: DateTime<Utc>) -> Result<(), ScrapeError>;
}

/// Delivery side: posts content to a Discord webhook url.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, url: &str, content: &str) -> Result<(), ScrapeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_query_parses_ids_urls_and_names() {
        assert_eq!(WebhookQuery::parse("42"), WebhookQuery::Id(42));
        assert_eq!(
            WebhookQuery::parse("https://discord.com/api/webhooks/1/abc"),
            WebhookQuery::Url("https://discord.com/api/webhooks/1/abc".to_string())
        );
        assert_eq!(
            WebhookQuery::parse("art-channel"),
            WebhookQuery::Name("art-channel".to_string())
        );
        assert_eq!(WebhookQuery::parse("  7 "), WebhookQuery::Id(7));
    }
}
