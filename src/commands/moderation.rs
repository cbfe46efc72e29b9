use super::require;
use crate::gateway::Capability;
use crate::moderation::{RestrictionKind, parse_days};
use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude as serenity;

/// "permanently" or "for N day(s)"
fn describe_days(days: u32) -> String {
    match days {
        0 => "permanently".to_string(),
        1 => "for 1 day".to_string(),
        n => format!("for {n} days"),
    }
}

async fn restrict(
    ctx: Context<'_>,
    kind: RestrictionKind,
    capability: Capability,
    user: serenity::User,
    duration: String,
    reason: String,
) -> Result<(), Error> {
    require(ctx, capability)?;
    let days = parse_days(&duration)?;

    let record = ctx
        .data()
        .moderation
        .restrict(kind, user.id.get(), &user.name, ctx.author().id.get(), days, &reason)
        .await?;

    let verb = match kind {
        RestrictionKind::Mute => "Muted",
        RestrictionKind::Ban => "Banned",
    };
    let upgrade = if record.is_upgrade { " (upgraded)" } else { "" };
    ctx.say(format!(
        "{verb} <@{}> {}{upgrade}. Record #{}.",
        record.member,
        describe_days(record.days),
        record.id
    ))
    .await?;
    Ok(())
}

async fn lift(
    ctx: Context<'_>,
    kind: RestrictionKind,
    capability: Capability,
    user: serenity::User,
    reason: String,
) -> Result<(), Error> {
    require(ctx, capability)?;

    let record = ctx
        .data()
        .moderation
        .lift(kind, user.id.get(), ctx.author().id.get(), &reason)
        .await?;

    let verb = match kind {
        RestrictionKind::Mute => "Unmuted",
        RestrictionKind::Ban => "Unbanned",
    };
    ctx.say(format!("{verb} <@{}>. Record #{} closed.", record.member, record.id))
        .await?;
    Ok(())
}

/// Warn a member
#[command(prefix_command, slash_command, guild_only)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Reason for the warning"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    require(ctx, Capability::Warn)?;
    let warn = ctx
        .data()
        .moderation
        .warn(user.id.get(), &user.name, ctx.author().id.get(), &reason)
        .await?;
    ctx.say(format!("Warned <@{}>. Record #{}.", warn.member, warn.id))
        .await?;
    Ok(())
}

/// Report a member to the moderators
#[command(prefix_command, slash_command, guild_only, ephemeral)]
pub async fn report(
    ctx: Context<'_>,
    #[description = "Member to report"] user: serenity::User,
    #[description = "What happened"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    let report = ctx
        .data()
        .moderation
        .report(user.id.get(), &user.name, ctx.author().id.get(), &reason)
        .await?;
    ctx.say(format!("Thanks, your report #{} was recorded.", report.id))
        .await?;
    Ok(())
}

/// Kick a member from the server
#[command(prefix_command, slash_command, guild_only)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: serenity::User,
    #[description = "Reason for the kick"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    require(ctx, Capability::Kick)?;
    let kick = ctx
        .data()
        .moderation
        .kick(user.id.get(), &user.name, Some(ctx.author().id.get()), reason)
        .await?;
    ctx.say(format!("Kicked <@{}>. Record #{}.", kick.member, kick.id))
        .await?;
    Ok(())
}

/// Mute a member for a number of days (0 or "inf" for permanent)
#[command(prefix_command, slash_command, guild_only)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] user: serenity::User,
    #[description = "Days, or 0/inf for permanent"] duration: String,
    #[description = "Reason for the mute"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    restrict(ctx, RestrictionKind::Mute, Capability::Mute, user, duration, reason).await
}

/// Lift a member's mute
#[command(prefix_command, slash_command, guild_only)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: serenity::User,
    #[description = "Reason for lifting the mute"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    lift(ctx, RestrictionKind::Mute, Capability::Mute, user, reason).await
}

/// Ban a member for a number of days (0 or "inf" for permanent)
#[command(prefix_command, slash_command, guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: serenity::User,
    #[description = "Days, or 0/inf for permanent"] duration: String,
    #[description = "Reason for the ban"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    restrict(ctx, RestrictionKind::Ban, Capability::Ban, user, duration, reason).await
}

/// Lift a member's ban
#[command(prefix_command, slash_command, guild_only)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: serenity::User,
    #[description = "Reason for lifting the ban"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    lift(ctx, RestrictionKind::Ban, Capability::Ban, user, reason).await
}
