// Non-command event glue. Currently just the long-codeblock mover: guild
// messages drowning a channel in code get mirrored to the paste service.

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::Mentionable;
use tracing::{debug, warn};

use crate::discord::codeblocks;
use crate::discord::commands::{Data, Error};

/// Messages longer than this are candidates for the paste mover.
const MESSAGE_LIMIT: usize = 1000;
/// At least one block must be this long before we bother uploading.
const BLOCK_LIMIT: usize = 1100;

pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
) -> Result<(), Error> {
    // Ignore bot messages (including our own)
    if message.author.bot {
        return Ok(());
    }
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };
    if message.content.len() <= MESSAGE_LIMIT {
        return Ok(());
    }

    // Command invocations are handled by the framework, not us.
    let prefixes = data.moderation.guild_prefixes(guild_id.get()).await;
    if prefixes.iter().any(|p| message.content.starts_with(p)) {
        return Ok(());
    }

    let (rewritten, files) = codeblocks::extract_paste_files(&message.content);
    if !files.iter().any(|f| f.content.len() > BLOCK_LIMIT) {
        return Ok(());
    }

    let url = match data.paste.create_paste(&files).await {
        Ok(url) => url,
        Err(err) => {
            warn!(error = %err, "Paste upload failed, leaving message alone");
            return Ok(());
        }
    };

    let mut summary = rewritten;
    if summary.len() > 1500 {
        let mut cut = 1500;
        while !summary.is_char_boundary(cut) {
            cut -= 1;
        }
        summary.truncate(cut);
        summary.push_str("...");
    }

    message
        .channel_id
        .say(
            &ctx.http,
            format!(
                "Hey {}, your codeblock(s) were getting long so I moved them here: {}\n\n{}",
                message.author.mention(),
                url,
                summary
            ),
        )
        .await?;

    // Needs Manage Messages in the channel; losing the original is fine.
    if let Err(err) = message.delete(&ctx.http).await {
        debug!(error = %err, "Could not delete the original message");
    }

    Ok(())
}
