use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::scrape::{ScrapeError, WebhookSink};

/// Grows the inter-send pause when Discord rate-limits us and slowly shrinks
/// it back after a run of clean deliveries.
#[derive(Debug, Clone, Copy)]
struct AdaptiveDelay {
    base: Duration,
    current: Duration,
    successes: u32,
}

const DELAY_STEP: Duration = Duration::from_millis(100);
const SUCCESSES_BEFORE_SHRINK: u32 = 10;

impl AdaptiveDelay {
    fn new(base: Duration) -> Self {
        Self {
            base,
            current: base,
            successes: 0,
        }
    }

    fn current(&self) -> Duration {
        self.current
    }

    fn on_rate_limited(&mut self) {
        self.current += DELAY_STEP;
        self.successes = 0;
    }

    fn on_success(&mut self) {
        self.successes += 1;
        if self.successes >= SUCCESSES_BEFORE_SHRINK {
            self.current = self.current.saturating_sub(DELAY_STEP).max(self.base);
            self.successes = 0;
        }
    }
}

/// Posts scraper content to Discord webhook urls.
pub struct HttpWebhookSink {
    client: Client,
    username: String,
    delay: Mutex<AdaptiveDelay>,
}

impl HttpWebhookSink {
    pub fn new(username: impl Into<String>) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ScrapeError::Webhook(e.to_string()))?;

        Ok(Self {
            client,
            username: username.into(),
            delay: Mutex::new(AdaptiveDelay::new(Duration::from_secs(1))),
        })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, url: &str, content: &str) -> Result<(), ScrapeError> {
        // Soft buffer between sends to stay under Discord's webhook limits.
        let pause = { self.delay.lock().await.current() };
        tokio::time::sleep(pause).await;

        let body = serde_json::json!({
            "content": content,
            "username": self.username,
        });

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScrapeError::Webhook(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            self.delay.lock().await.on_success();
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let mut delay = self.delay.lock().await;
            delay.on_rate_limited();
            warn!(delay_ms = delay.current().as_millis() as u64, "Webhook rate limited, backing off");
        }

        Err(ScrapeError::Webhook(format!(
            "webhook returned {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_on_rate_limits_and_recovers() {
        let base = Duration::from_secs(1);
        let mut delay = AdaptiveDelay::new(base);

        delay.on_rate_limited();
        delay.on_rate_limited();
        assert_eq!(delay.current(), base + DELAY_STEP * 2);

        // Ten clean sends claw back one step.
        for _ in 0..SUCCESSES_BEFORE_SHRINK {
            delay.on_success();
        }
        assert_eq!(delay.current(), base + DELAY_STEP);

        // It never shrinks below the base pause.
        for _ in 0..SUCCESSES_BEFORE_SHRINK * 5 {
            delay.on_success();
        }
        assert_eq!(delay.current(), base);
    }

    #[test]
    fn rate_limit_resets_the_success_streak() {
        let mut delay = AdaptiveDelay::new(Duration::from_secs(1));

        for _ in 0..SUCCESSES_BEFORE_SHRINK - 1 {
            delay.on_success();
        }
        delay.on_rate_limited();
        assert_eq!(delay.successes, 0);
    }
}
