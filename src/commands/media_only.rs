use super::require;
use crate::gateway::Capability;
use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude as serenity;

/// Manage channels where only images may be posted
#[command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "mediaonly",
    aliases("mo"),
    subcommands("list", "add", "remove"),
    subcommand_required
)]
pub async fn media_only(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// List media-only channels
#[command(prefix_command, slash_command, guild_only, aliases("l", "?"))]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild = require(ctx, Capability::MediaOnlyRead)?;
    let channels = ctx.data().moderation.list_media_only(guild).await;

    if channels.is_empty() {
        ctx.say("There are no media-only channels.").await?;
        return Ok(());
    }
    let lines: Vec<String> = channels.iter().map(|id| format!("- <#{id}>")).collect();
    ctx.say(format!("Media-only channels:\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

/// Make a channel media-only
#[command(prefix_command, slash_command, guild_only, aliases("a", "+"))]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Channel to restrict (defaults to this one)"] channel: Option<
        serenity::GuildChannel,
    >,
) -> Result<(), Error> {
    let guild = require(ctx, Capability::MediaOnlyWrite)?;
    let channel = channel.map_or_else(|| ctx.channel_id(), |c| c.id).get();

    ctx.data()
        .moderation
        .enroll_media_only(guild, channel)
        .await?;
    ctx.say(format!("<#{channel}> is now media-only.")).await?;
    Ok(())
}

/// Allow any message in a channel again
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("del", "r", "d", "-")
)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Channel to release (defaults to this one)"] channel: Option<
        serenity::GuildChannel,
    >,
) -> Result<(), Error> {
    let guild = require(ctx, Capability::MediaOnlyWrite)?;
    let channel = channel.map_or_else(|| ctx.channel_id(), |c| c.id).get();

    ctx.data()
        .moderation
        .unenroll_media_only(guild, channel)
        .await?;
    ctx.say(format!("<#{channel}> is no longer media-only."))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_only_group() {
        let cmd = media_only();
        assert_eq!(cmd.name, "mediaonly");
        assert!(cmd.subcommand_required);
        let subcommands: Vec<&str> = cmd.subcommands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(subcommands, vec!["list", "add", "remove"]);
    }

    #[test]
    fn test_aliases() {
        assert_eq!(media_only().aliases, vec!["mo"]);
        assert_eq!(list().aliases, vec!["l", "?"]);
        assert_eq!(add().aliases, vec!["a", "+"]);
        assert_eq!(remove().aliases, vec!["del", "r", "d", "-"]);
    }
}
