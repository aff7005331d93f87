// Discord commands module.
// Each feature gets its own command file.

pub mod eval;
pub mod moderation;
pub mod scrape;
pub mod utility;

use std::sync::Arc;
use std::time::Instant;

use crate::core::moderation::ModerationService;
use crate::core::scrape::ScrapeService;
use crate::infra::dedup::SqliteFingerprintStore;
use crate::infra::moderation::SqliteModerationStore;
use crate::infra::paste::PasteClient;
use crate::infra::scrape::{HttpWebhookSink, RedditApiClient, SqliteScrapeRegistry};

/// Concrete scraper wiring used by the running bot.
pub type LiveScrapeService =
    ScrapeService<RedditApiClient, SqliteScrapeRegistry, HttpWebhookSink, SqliteFingerprintStore>;

/// Shared state handed to every command invocation.
pub struct Data {
    pub scraper: Arc<LiveScrapeService>,
    pub moderation: Arc<ModerationService<SqliteModerationStore>>,
    pub paste: Arc<PasteClient>,
    pub started_at: Instant,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
