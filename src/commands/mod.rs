mod content_filter;
mod media_only;
mod moderation;

use crate::gateway::{Capability, ensure_capability};
use crate::{Context, Data, Error};
use poise::command;

pub use content_filter::content_filter;
pub use media_only::media_only;
pub use moderation::{ban, kick, mute, report, unban, unmute, warn};

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        ping(),
        media_only(),
        content_filter(),
        warn(),
        report(),
        kick(),
        mute(),
        unmute(),
        ban(),
        unban(),
    ]
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Check that the invoking user holds `capability`; returns the guild id
pub(crate) fn require(ctx: Context<'_>, capability: Capability) -> Result<u64, Error> {
    let guild = ctx
        .guild_id()
        .ok_or("This command only works in a server")?
        .get();
    ensure_capability(
        ctx.data().moderation.permissions(),
        guild,
        ctx.author().id.get(),
        capability,
    )?;
    Ok(guild)
}
