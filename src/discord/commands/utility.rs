// Small quality-of-life commands: latency, bot info, character inspection,
// channel webhooks, and a curated link directory.

use std::time::Duration;

use poise::serenity_prelude as serenity;

use crate::discord::commands::{Context, Error};

/// Pong...
#[poise::command(slash_command, prefix_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let latency = ctx.ping().await;
    ctx.say(format!("Pong `{}ms`", latency.as_millis())).await?;
    Ok(())
}

/// Tells you information about the bot itself.
#[poise::command(slash_command, prefix_command, aliases("botinfo", "info"))]
pub async fn about(ctx: Context<'_>) -> Result<(), Error> {
    let uptime = format_uptime(ctx.data().started_at.elapsed());
    let guild_count = ctx.cache().guilds().len();

    let seen = match ctx.data().scraper.seen_count().await {
        Ok(count) => count.to_string(),
        Err(_) => "unavailable".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("About")
        .color(0x5865F2) // Blurple
        .field("Version", env!("CARGO_PKG_VERSION"), true)
        .field("Uptime", uptime, true)
        .field("Servers", guild_count.to_string(), true)
        .field("Images fingerprinted", seen, true)
        .timestamp(serenity::Timestamp::now());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}h {minutes}m {seconds}s")
}

/// Shows you information about a number of characters.
/// Only up to 25 characters at a time.
#[poise::command(slash_command, prefix_command)]
pub async fn charinfo(
    ctx: Context<'_>,
    #[description = "Characters to inspect"]
    #[rest]
    characters: String,
) -> Result<(), Error> {
    let lines: Vec<String> = characters
        .chars()
        .take(25)
        .map(|c| {
            let digit = format!("{:x}", c as u32);
            format!(
                "`\\U{digit:0>8}`: `{c}` - <https://www.fileformat.info/info/unicode/char/{digit}>"
            )
        })
        .collect();

    let msg = lines.join("\n");
    if msg.len() > 2000 {
        ctx.say("Output too long to display.").await?;
    } else {
        ctx.say(msg).await?;
    }
    Ok(())
}

/// Displays a channel's webhooks by name and id.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_WEBHOOKS"
)]
pub async fn webhooks(
    ctx: Context<'_>,
    #[description = "Channel to inspect (defaults to here)"] channel: Option<serenity::Channel>,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id()).unwrap_or_else(|| ctx.channel_id());
    let hooks = channel_id.webhooks(ctx.http()).await?;

    if hooks.is_empty() {
        ctx.say(format!("<#{channel_id}> has no webhooks.")).await?;
        return Ok(());
    }

    let lines: Vec<String> = hooks
        .iter()
        .map(|hook| {
            format!(
                "**{}** | ID: `{}`",
                hook.name.as_deref().unwrap_or("unnamed"),
                hook.id
            )
        })
        .collect();
    ctx.say(format!("> <#{channel_id}> webhooks\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

const LINKS: &[(&str, &str)] = &[
    ("serenity", "https://github.com/serenity-rs/serenity"),
    ("poise", "https://docs.rs/poise"),
    ("discord-devs", "https://discord.com/developers/docs"),
    ("devs", "https://discord.com/developers/docs"),
    ("reddit-api", "https://www.reddit.com/dev/api/"),
    ("sqlx", "https://docs.rs/sqlx"),
    ("webhook-guide", "https://support.discord.com/hc/en-us/articles/228383668"),
];

fn lookup_link(name: &str) -> Option<&'static str> {
    LINKS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, url)| *url)
}

/// Provides a useful url by keyword; `?` lists the keywords.
#[poise::command(slash_command, prefix_command)]
pub async fn link(
    ctx: Context<'_>,
    #[description = "Which link, or ? for the list"] name: String,
) -> Result<(), Error> {
    if name == "?" {
        let keys: Vec<&str> = LINKS.iter().map(|(key, _)| *key).collect();
        ctx.say(format!("Possible entries:\n> {}", keys.join(", ")))
            .await?;
        return Ok(());
    }

    match lookup_link(&name) {
        Some(url) => ctx.say(url).await?,
        None => {
            ctx.say(format!("No link for `{name}`. Try `/link ?`."))
                .await?
        }
    };
    Ok(())
}
