// Discord commands for the subreddit scraper.
//
// Same pattern as every other command file: pull primitives out of Discord
// types, call the core service, format whatever comes back.

use crate::core::scrape::{AssignOutcome, TrackOutcome};
use crate::discord::commands::moderation::trusted_check;
use crate::discord::commands::{Context, Error};

/// Root `/reddit` command. Subcommands handle all configuration tasks.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    subcommands(
        "add",
        "remove",
        "list",
        "info",
        "assign",
        "webhook_add",
        "webhook_remove",
        "webhook_list",
        "watch",
        "check",
        "hashcheck"
    )
)]
pub async fn reddit(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "Subreddit scraper commands:\n\
        `/reddit add <subreddit>` - Track a subreddit\n\
        `/reddit remove <subreddit>` - Stop tracking a subreddit\n\
        `/reddit assign <subreddit> [webhook]` - Point a subreddit at a webhook\n\
        `/reddit list` / `/reddit info <subreddit>` - Show what is tracked\n\
        `/reddit webhook_add <name> <url>` - Register a webhook\n\
        `/reddit webhook_remove <webhook>` / `/reddit webhook_list`\n\
        `/reddit watch <start|stop|status>` - Control the scrape loop\n\
        `/reddit check` - Force one scrape cycle now\n\
        `/reddit hashcheck <url> [url]` - Digest one or compare two images",
    )
    .await?;
    Ok(())
}

/// Start tracking a subreddit.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Subreddit name, without the /r/"] subreddit: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    match ctx.data().scraper.track_subreddit(&subreddit).await? {
        TrackOutcome::Added => {
            ctx.say(format!(
                "Now tracking `/r/{subreddit}`. Assign it a webhook so the loop picks it up."
            ))
            .await?
        }
        TrackOutcome::AlreadyTracked => {
            ctx.say(format!("`/r/{subreddit}` is already tracked.")).await?
        }
        TrackOutcome::NotFound => {
            ctx.say(format!("Could not find `/r/{subreddit}` on reddit."))
                .await?
        }
    };
    Ok(())
}

/// Stop tracking a subreddit.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Subreddit name, without the /r/"] subreddit: String,
) -> Result<(), Error> {
    let removed = ctx.data().scraper.untrack_subreddit(&subreddit).await?;
    if removed > 0 {
        ctx.say(format!("Removed `/r/{subreddit}` from tracking."))
            .await?;
    } else {
        ctx.say(format!("`/r/{subreddit}` was not tracked.")).await?;
    }
    Ok(())
}

/// List tracked subreddits and whether they can actually post.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let overview = ctx.data().scraper.subreddit_overview().await?;
    if overview.is_empty() {
        ctx.say("No subreddits are tracked yet. Start with `/reddit add`.")
            .await?;
        return Ok(());
    }

    let lines: Vec<String> = overview
        .iter()
        .map(|(entry, webhook)| {
            let marker = if webhook.is_some() { "✅" } else { "❌" };
            format!("{marker} - **/r/**`{}`", entry.name)
        })
        .collect();

    ctx.say(format!("**Tracked subreddits:**\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

/// Show tracking details for one subreddit.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn info(
    ctx: Context<'_>,
    #[description = "Subreddit name, without the /r/"] subreddit: String,
) -> Result<(), Error> {
    match ctx.data().scraper.subreddit_info(&subreddit).await? {
        None => {
            ctx.say(format!("`/r/{subreddit}` is not tracked.")).await?;
        }
        Some((entry, None)) => {
            ctx.say(format!(
                "**/r/{}**\nNo webhook assigned; the loop skips it.",
                entry.name
            ))
            .await?;
        }
        Some((entry, Some(webhook))) => {
            ctx.say(format!(
                "**/r/{}**\n> Webhook: {} (id {})\n> {}",
                entry.name, webhook.name, webhook.id, webhook.url
            ))
            .await?;
        }
    }
    Ok(())
}

/// Point a subreddit at a registered webhook, or clear the assignment.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn assign(
    ctx: Context<'_>,
    #[description = "Subreddit name, without the /r/"] subreddit: String,
    #[description = "Webhook name, id, or url; omit to clear"] webhook: Option<String>,
) -> Result<(), Error> {
    let outcome = ctx
        .data()
        .scraper
        .assign_webhook(&subreddit, webhook.as_deref())
        .await?;

    match outcome {
        AssignOutcome::Updated => match webhook {
            Some(webhook) => {
                ctx.say(format!("`/r/{subreddit}` now posts through `{webhook}`."))
                    .await?
            }
            None => {
                ctx.say(format!("Cleared the webhook for `/r/{subreddit}`."))
                    .await?
            }
        },
        AssignOutcome::SubredditMissing => {
            ctx.say(format!("`/r/{subreddit}` is not tracked.")).await?
        }
        AssignOutcome::WebhookMissing => {
            ctx.say("No webhook matches that name, id, or url.").await?
        }
    };
    Ok(())
}

/// Register a webhook after a successful test delivery.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn webhook_add(
    ctx: Context<'_>,
    #[description = "Friendly name for the webhook"] name: String,
    #[description = "Discord webhook url"] url: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    match ctx.data().scraper.register_webhook(&name, &url).await {
        Ok(Some(entry)) => {
            ctx.say(format!("Registered **{}** (id {}).", entry.name, entry.id))
                .await?;
        }
        Ok(None) => {
            ctx.say("A webhook with that url is already registered.")
                .await?;
        }
        Err(err) => {
            ctx.say(format!("Test delivery failed, webhook not saved: {err}"))
                .await?;
        }
    }
    Ok(())
}

/// Remove a webhook by name, id, or url.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn webhook_remove(
    ctx: Context<'_>,
    #[description = "Webhook name, id, or url"] webhook: String,
) -> Result<(), Error> {
    let removed = ctx.data().scraper.drop_webhook(&webhook).await?;
    ctx.say(format!(
        "Removed {removed} webhook{}.",
        if removed == 1 { "" } else { "s" }
    ))
    .await?;
    Ok(())
}

/// List registered webhooks.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn webhook_list(ctx: Context<'_>) -> Result<(), Error> {
    let webhooks = ctx.data().scraper.webhooks().await?;
    if webhooks.is_empty() {
        ctx.say("No webhooks registered yet.").await?;
        return Ok(());
    }

    let lines: Vec<String> = webhooks
        .iter()
        .map(|w| format!("**{}** ({})\n> `{}`", w.name, w.id, w.url))
        .collect();
    ctx.say(format!("**Webhooks:**\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

#[derive(poise::ChoiceParameter)]
pub enum WatchAction {
    #[name = "start"]
    Start,
    #[name = "stop"]
    Stop,
    #[name = "status"]
    Status,
}

/// Control the background scrape loop.
#[poise::command(slash_command, prefix_command, guild_only, check = "trusted_check")]
pub async fn watch(
    ctx: Context<'_>,
    #[description = "start, stop, or status"] action: WatchAction,
) -> Result<(), Error> {
    let scraper = &ctx.data().scraper;
    let message = match action {
        WatchAction::Start => {
            if scraper.is_running() {
                "The scrape loop is already running."
            } else {
                scraper.set_running(true);
                "The scrape loop is starting."
            }
        }
        WatchAction::Stop => {
            if scraper.is_running() {
                scraper.set_running(false);
                "The scrape loop is stopping."
            } else {
                "The scrape loop is not currently running."
            }
        }
        WatchAction::Status => {
            if scraper.is_running() {
                "The scrape loop is running."
            } else {
                "The scrape loop is stopped."
            }
        }
    };
    ctx.say(message).await?;
    Ok(())
}

/// Force one scrape cycle right now.
#[poise::command(slash_command, prefix_command, guild_only, check = "trusted_check")]
pub async fn check(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let report = ctx.data().scraper.poll_once().await?;
    ctx.say(format!(
        "Checked {} subreddit{}: posted {}, duplicates {}, failures {}.",
        report.subreddits_checked,
        if report.subreddits_checked == 1 { "" } else { "s" },
        report.posted,
        report.duplicates,
        report.failures
    ))
    .await?;
    Ok(())
}

/// Digest one image url, or compare two.
#[poise::command(slash_command, prefix_command)]
pub async fn hashcheck(
    ctx: Context<'_>,
    #[description = "Image url"] url_one: String,
    #[description = "Optional second url to compare against"] url_two: Option<String>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let digest_one = match ctx.data().scraper.digest_url(&url_one).await {
        Ok(digest) => digest,
        Err(err) => {
            ctx.say(format!("Unable to hash the first url: {err}")).await?;
            return Ok(());
        }
    };

    let Some(url_two) = url_two else {
        ctx.say(format!("Digest: `{digest_one}`")).await?;
        return Ok(());
    };

    match ctx.data().scraper.digest_url(&url_two).await {
        Ok(digest_two) if digest_two == digest_one => {
            ctx.say("The images match!").await?;
        }
        Ok(digest_two) => {
            ctx.say(format!(
                "The images do not match.\n`{digest_one}`\n`{digest_two}`"
            ))
            .await?;
        }
        Err(err) => {
            ctx.say(format!("Unable to hash the second url: {err}"))
                .await?;
        }
    }
    Ok(())
}
