// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, APIs)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Spawn the background scrape loop

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::sync::Arc;
use std::time::Instant;

use poise::serenity_prelude as serenity;
use tracing::{debug, info, warn};

use crate::core::dedup::{DuplicateGate, EdgeDetector, SimilarityConfig};
use crate::core::moderation::ModerationService;
use crate::core::scrape::ScrapeService;
use crate::discord::{Data, Error};
use crate::infra::dedup::SqliteFingerprintStore;
use crate::infra::moderation::SqliteModerationStore;
use crate::infra::paste::PasteClient;
use crate::infra::scrape::{HttpWebhookSink, RedditApiClient, SqliteScrapeRegistry};

const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 300;
const DEFAULT_SUBMISSION_LIMIT: usize = 30;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = discord::events::handle_message(ctx, data, new_message).await {
                tracing::error!("Error handling message event: {}", e);
            }
        }
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                guilds = data_about_bot.guilds.len(),
                "Connected as {}", data_about_bot.user.name
            );
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = env_or("DATA_DIR", "data");
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory for SQLite files");

    let scrape_interval = std::env::var("SCRAPE_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SCRAPE_INTERVAL_SECS);
    let submission_limit = std::env::var("SCRAPE_SUBMISSION_LIMIT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_SUBMISSION_LIMIT);
    let user_agent = env_or("SCRAPE_USER_AGENT", concat!("magpie-bot/", env!("CARGO_PKG_VERSION")));
    let scrape_username = env_or("SCRAPE_USERNAME", "Subreddit Scraper");
    let default_prefix = env_or("DEFAULT_PREFIX", "!");
    let paste_api_url = env_or("PASTE_API_URL", "https://mystb.in/api/paste");
    let paste_public_url = env_or("PASTE_PUBLIC_URL", "https://mystb.in");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let fingerprint_store =
        SqliteFingerprintStore::new(&format!("{}/fingerprints.db", data_dir))
            .await
            .expect("Failed to initialize fingerprint store");
    let gate = DuplicateGate::new(fingerprint_store);

    let registry = SqliteScrapeRegistry::new(&format!("{}/scrape.db", data_dir))
        .await
        .expect("Failed to initialize scrape registry");

    let feed = RedditApiClient::new(&user_agent).expect("Failed to create reddit client");
    let sink = HttpWebhookSink::new(scrape_username).expect("Failed to create webhook sender");
    let detector = EdgeDetector::new(SimilarityConfig::default());

    let scraper = Arc::new(
        ScrapeService::new(feed, registry, sink, gate, detector, submission_limit)
            .await
            .expect("Failed to initialize scrape service"),
    );

    let moderation_store = SqliteModerationStore::new(&format!("{}/moderation.db", data_dir))
        .await
        .expect("Failed to initialize moderation store");
    let moderation = Arc::new(ModerationService::new(moderation_store, default_prefix.clone()));

    let paste = Arc::new(PasteClient::new(paste_api_url, paste_public_url));

    // Create the data structure that will be shared across all commands
    let data = Data {
        scraper: Arc::clone(&scraper),
        moderation: Arc::clone(&moderation),
        paste,
        started_at: Instant::now(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            // Register all our commands here
            commands: vec![
                discord::commands::scrape::reddit(),
                discord::commands::eval::eval(),
                discord::commands::moderation::prefix(),
                discord::commands::moderation::trusted(),
                discord::commands::moderation::clear(),
                discord::commands::moderation::sync(),
                discord::commands::utility::ping(),
                discord::commands::utility::about(),
                discord::commands::utility::charinfo(),
                discord::commands::utility::webhooks(),
                discord::commands::utility::link(),
            ],
            // Event handler for messages and other events
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(default_prefix),
                // Guilds can override the prefix; stored ones win.
                dynamic_prefix: Some(|ctx| {
                    Box::pin(async move {
                        let Some(guild_id) = ctx.guild_id else {
                            return Ok(None);
                        };
                        let prefixes =
                            ctx.data.moderation.guild_prefixes(guild_id.get()).await;
                        Ok(prefixes.into_iter().next())
                    })
                }),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                // Register slash commands globally (can take up to an hour to propagate).
                // Use the `sync` prefix command for instant updates in one guild.
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Commands registered");

                // Application owners are always trusted.
                for owner in &framework.options().owners {
                    data.moderation.add_base_owner(owner.get()).await;
                }

                // Background scrape loop. Runs until the process exits; the
                // watch command only pauses the work, not the task.
                let scraper = Arc::clone(&scraper);
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        if scraper.is_running() {
                            debug!("Starting scrape cycle...");
                            match scraper.poll_once().await {
                                Ok(report) if report.posted > 0 => {
                                    info!(
                                        "Finished sending {} image{}",
                                        report.posted,
                                        if report.posted == 1 { "" } else { "s" }
                                    );
                                }
                                Ok(_) => debug!("Scrape cycle found nothing new"),
                                Err(err) => warn!("Scrape cycle failed: {}", err),
                            }
                        }

                        sleep(StdDuration::from_secs(scrape_interval)).await;
                    }
                });

                Ok(data)
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
