// Moderation commands: message cleanup, per-guild prefixes, the trusted
// list, and guild command sync.

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::Mentionable;

use crate::discord::commands::{Context, Error};

/// Shared check for commands restricted to application owners and the
/// persisted trusted list.
pub async fn trusted_check(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(ctx.data().moderation.is_trusted(ctx.author().id.get()).await)
}

/// Show or manage this guild's command prefixes.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    subcommands("prefix_list", "prefix_add", "prefix_remove", "prefix_clear")
)]
pub async fn prefix(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let prefixes = ctx.data().moderation.guild_prefixes(guild_id).await;
    ctx.say(format!("**Current prefixes:**\n{}", prefixes.join("\n")))
        .await?;
    Ok(())
}

/// List the current prefixes for this guild.
#[poise::command(slash_command, prefix_command, guild_only, rename = "list")]
pub async fn prefix_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let prefixes = ctx.data().moderation.guild_prefixes(guild_id).await;
    ctx.say(format!("**Current prefixes:**\n{}", prefixes.join("\n")))
        .await?;
    Ok(())
}

/// Add a prefix for this guild.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "add",
    check = "trusted_check"
)]
pub async fn prefix_add(
    ctx: Context<'_>,
    #[description = "Prefix to add"] prefix: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let stored = ctx.data().moderation.add_prefix(guild_id, &prefix).await?;
    ctx.say(format!("Added the prefix `{stored}` for this server."))
        .await?;
    Ok(())
}

/// Remove a prefix from this guild.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "remove",
    check = "trusted_check"
)]
pub async fn prefix_remove(
    ctx: Context<'_>,
    #[description = "Prefix to remove"] prefix: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let removed = ctx
        .data()
        .moderation
        .remove_prefix(guild_id, &prefix)
        .await?;
    if removed > 0 {
        ctx.say(format!("Removed the prefix `{prefix}`.")).await?;
    } else {
        ctx.say(format!("`{prefix}` was not a prefix here.")).await?;
    }
    Ok(())
}

/// Clear every prefix for this guild, falling back to the default.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "clear",
    check = "trusted_check"
)]
pub async fn prefix_clear(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let removed = ctx.data().moderation.clear_prefixes(guild_id).await?;
    ctx.say(format!(
        "Removed {removed} prefix{} for this server.",
        if removed == 1 { "" } else { "es" }
    ))
    .await?;
    Ok(())
}

/// Manage the trusted-user list.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "trusted_check",
    subcommands("trusted_add", "trusted_remove", "trusted_list")
)]
pub async fn trusted(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "Trusted-list commands:\n\
        `/trusted add <user>` - Trust a user with owner-level commands\n\
        `/trusted remove <user>` - Remove a user from the list\n\
        `/trusted list` - Show the current list",
    )
    .await?;
    Ok(())
}

/// Trust a user with owner-level bot commands.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "add",
    check = "trusted_check"
)]
pub async fn trusted_add(
    ctx: Context<'_>,
    #[description = "User to trust"] user: serenity::User,
) -> Result<(), Error> {
    if ctx.data().moderation.trust(user.id.get()).await? {
        ctx.say(format!("Added {} to the trusted list.", user.mention()))
            .await?;
    } else {
        ctx.say(format!("{} is already trusted.", user.mention()))
            .await?;
    }
    Ok(())
}

/// Remove a user from the trusted list.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "remove",
    check = "trusted_check"
)]
pub async fn trusted_remove(
    ctx: Context<'_>,
    #[description = "User to remove"] user: serenity::User,
) -> Result<(), Error> {
    let removed = ctx.data().moderation.untrust(user.id.get()).await?;
    ctx.say(format!(
        "Removed {removed} user{} from the trusted list.",
        if removed == 1 { "" } else { "s" }
    ))
    .await?;
    Ok(())
}

/// List trusted users.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "list",
    check = "trusted_check"
)]
pub async fn trusted_list(ctx: Context<'_>) -> Result<(), Error> {
    let ids = ctx.data().moderation.trusted_list().await?;
    if ids.is_empty() {
        ctx.say("No extra users are trusted; application owners always are.")
            .await?;
        return Ok(());
    }

    let mentions: Vec<String> = ids.iter().map(|id| format!("<@{id}>")).collect();
    ctx.say(format!("**Trusted users:**\n{}", mentions.join("\n")))
        .await?;
    Ok(())
}

/// Remove recent messages from this channel. Limit 100.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "How many messages to scan (default 15)"]
    #[min = 1]
    #[max = 100]
    amount: Option<u8>,
    #[description = "Remove everyone's messages, not just the bot's (trusted only)"]
    everyone: Option<bool>,
) -> Result<(), Error> {
    let amount = amount.unwrap_or(15);
    let everyone = everyone.unwrap_or(false);

    if everyone && !ctx.data().moderation.is_trusted(ctx.author().id.get()).await {
        ctx.say("Only trusted users may purge everyone's messages.")
            .await?;
        return Ok(());
    }

    ctx.defer_ephemeral().await?;

    let channel_id = ctx.channel_id();
    let messages = channel_id
        .messages(ctx.http(), serenity::GetMessages::new().limit(amount))
        .await?;

    let bot_id = ctx.framework().bot_id;
    let mut deleted = 0usize;
    for message in messages {
        if everyone || message.author.id == bot_id {
            if channel_id
                .delete_message(ctx.http(), message.id)
                .await
                .is_ok()
            {
                deleted += 1;
            }
        }
    }

    ctx.say(format!(
        "Cleaned up **{deleted} message{}**. Wow, look at all this space!",
        if deleted == 1 { "" } else { "s" }
    ))
    .await?;
    Ok(())
}

/// Re-register the command tree in this guild.
#[poise::command(prefix_command, guild_only, check = "trusted_check")]
pub async fn sync(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    poise::builtins::register_in_guild(
        ctx.serenity_context(),
        &ctx.framework().options().commands,
        guild_id,
    )
    .await?;
    ctx.say("Commands synced to this guild.").await?;
    Ok(())
}
