pub mod reddit_client;
pub mod sqlite_registry;
pub mod webhook_sender;

pub use reddit_client::RedditApiClient;
pub use sqlite_registry::SqliteScrapeRegistry;
pub use webhook_sender::HttpWebhookSink;
