use super::require;
use crate::gateway::Capability;
use crate::{Context, Error};
use poise::command;

/// Manage the regexes posted messages are checked against
#[command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "contentfilter",
    aliases("cf"),
    subcommands("list_bad_words", "add_bad_word", "remove_bad_word"),
    subcommand_required
)]
pub async fn content_filter(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// List filtered regexes
#[command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "list",
    aliases("l", "?")
)]
pub async fn list_bad_words(ctx: Context<'_>) -> Result<(), Error> {
    require(ctx, Capability::ContentFilterRead)?;
    let words = ctx.data().moderation.list_bad_words();

    if words.is_empty() {
        ctx.say("The content filter is empty.").await?;
        return Ok(());
    }
    let lines: Vec<String> = words
        .iter()
        .map(|word| {
            let mode = if word.delete { "delete" } else { "alert" };
            format!("#{} {}: `{}` ({mode})", word.id, word.description, word.regex)
        })
        .collect();
    ctx.say(format!("Filtered regexes:\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

/// Add a regex to the content filter
#[command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "add",
    aliases("a", "+")
)]
pub async fn add_bad_word(
    ctx: Context<'_>,
    #[description = "Regular expression to match"] regex: String,
    #[description = "Delete matching messages instead of only alerting"] delete: bool,
    #[description = "What the regex catches"]
    #[rest]
    description: String,
) -> Result<(), Error> {
    let guild = require(ctx, Capability::ContentFilterWrite)?;
    let word = ctx
        .data()
        .moderation
        .add_bad_word(guild, &regex, &description, delete)
        .await?;
    ctx.say(format!("Added `{}` to the content filter as #{}.", word.regex, word.id))
        .await?;
    Ok(())
}

/// Remove a regex from the content filter
#[command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "remove",
    aliases("del", "r", "d", "-")
)]
pub async fn remove_bad_word(
    ctx: Context<'_>,
    #[description = "Id shown by the list command"] id: u64,
) -> Result<(), Error> {
    let guild = require(ctx, Capability::ContentFilterWrite)?;
    let word = ctx
        .data()
        .moderation
        .remove_bad_word(guild, id)
        .await?;
    ctx.say(format!("Removed `{}` from the content filter.", word.regex))
        .await?;
    Ok(())
}
