// Subreddit scraping: registry management plus the poll cycle that feeds
// candidate images through the duplicate gate and out to webhooks.

mod scrape_models;
mod scrape_service;

pub use scrape_models::*;
pub use scrape_service::*;
