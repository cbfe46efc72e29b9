use crate::gateway::IncomingMessage;
use crate::moderation::{EventFlow, ModerationService};
use crate::{Context, Data, EVENT_TARGET, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, FullEvent};
use tracing::{debug, error, info, warn};

/// A detected name change: `(old, new, nick)`
pub type NameChange = (String, String, bool);

/// Poise event hook; feeds gateway events into the moderation service
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!(
                target: EVENT_TARGET,
                "Connected as {}, shard {}", data_about_bot.user.name, ctx.shard_id
            );
        }
        FullEvent::CacheReady { guilds } => {
            let guild_count_cache = ctx.cache.guild_count();
            if guilds.len() != guild_count_cache {
                warn!(
                    "Cache guild count mismatch: {guild_count_cache} (cache) vs {} (actual)",
                    guilds.len()
                );
            }
            info!(target: EVENT_TARGET, "Cache ready! The bot is in {} guild(s)", guilds.len());
            data.request_expiry_check().await;
        }
        FullEvent::Message { new_message } => {
            let message = incoming_message(new_message);
            match data.moderation.on_message(&message).await {
                Ok(EventFlow::Stop) => {
                    debug!(target: EVENT_TARGET, message_id = message.id, "Message handled by media-only policy");
                }
                Ok(EventFlow::Continue) => {}
                Err(e) => {
                    error!(target: EVENT_TARGET, message_id = message.id, "Media-only check failed: {e}");
                }
            }
        }
        FullEvent::GuildMemberAddition { new_member } => {
            if new_member.guild_id.get() != data.moderation.guild() {
                return Ok(());
            }
            let joined_at = new_member
                .joined_at
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.unix_timestamp(), 0))
                .unwrap_or_else(Utc::now);
            let recorded = data
                .moderation
                .on_member_join(new_member.user.id.get(), &new_member.user.name, joined_at)
                .await;
            if recorded.is_none() {
                debug!(target: EVENT_TARGET, member = new_member.user.id.get(), "Dropped replayed join");
            }
        }
        FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if guild_id.get() == data.moderation.guild() {
                data.moderation
                    .on_member_leave(user.id.get(), &user.name)
                    .await;
            }
        }
        FullEvent::GuildMemberUpdate {
            old_if_available,
            event,
            ..
        } => {
            if event.guild_id.get() != data.moderation.guild() {
                return Ok(());
            }
            // Without the cached member there is nothing to compare against
            let Some(old) = old_if_available else {
                return Ok(());
            };
            let changes = name_changes(
                &old.user.name,
                old.nick.as_deref(),
                &event.user.name,
                event.nick.as_deref(),
            );
            for (old_name, new_name, nick) in changes {
                data.moderation
                    .on_member_rename(event.user.id.get(), &old_name, &new_name, nick)
                    .await;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Framework-wide command check. Prefix commands run before the event
/// handler sees their message, so a message the moderation policies will
/// delete must not run its command either.
pub async fn command_check(ctx: Context<'_>) -> Result<bool, Error> {
    let message = match ctx {
        poise::Context::Prefix(prefix) => Some(incoming_message(prefix.msg)),
        poise::Context::Application(_) => None,
    };
    Ok(admits_command(&ctx.data().moderation, message.as_ref()).await)
}

/// Slash commands carry no message and always pass
pub async fn admits_command(
    service: &ModerationService,
    message: Option<&IncomingMessage>,
) -> bool {
    match message {
        Some(message) => {
            let admitted = service.admits(message).await;
            if !admitted {
                debug!(target: EVENT_TARGET, message_id = message.id, "Command blocked by moderation policy");
            }
            admitted
        }
        None => true,
    }
}

/// Reduce a serenity message to what the moderation core inspects
#[must_use]
pub fn incoming_message(message: &serenity::Message) -> IncomingMessage {
    IncomingMessage {
        id: message.id.get(),
        channel_id: message.channel_id.get(),
        guild_id: message.guild_id.map(serenity::GuildId::get),
        author_id: message.author.id.get(),
        author_name: message.author.name.clone(),
        author_is_bot: message.author.bot,
        content: message.content.clone(),
        attachment_urls: message
            .attachments
            .iter()
            .map(|attachment| attachment.url.clone())
            .collect(),
    }
}

/// Account renames and nickname changes between two member states. A
/// cleared nickname is reported as a change back to the account name.
#[must_use]
pub fn name_changes(
    old_name: &str,
    old_nick: Option<&str>,
    new_name: &str,
    new_nick: Option<&str>,
) -> Vec<NameChange> {
    let mut changes = Vec::new();
    if old_name != new_name {
        changes.push((old_name.to_string(), new_name.to_string(), false));
    }
    if old_nick != new_nick {
        changes.push((
            old_nick.unwrap_or(old_name).to_string(),
            new_nick.unwrap_or(new_name).to_string(),
            true,
        ));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, MockPermissionOracle};
    use crate::media_only::{ContentGate, MediaOnlyChannels, MockMediaProbe, ProbeFailurePolicy};
    use crate::moderation::RecordStore;
    use std::sync::Arc;

    const GUILD: u64 = 100;
    const CHANNEL: u64 = 200;

    fn service(store: RecordStore) -> ModerationService {
        let mut oracle = MockPermissionOracle::new();
        oracle.expect_check().returning(|_, _, _| false);
        ModerationService::new(
            GUILD,
            store,
            ContentGate::new(Arc::new(MockMediaProbe::new()), ProbeFailurePolicy::Abort),
            Arc::new(MockGateway::new()),
            Arc::new(oracle),
        )
    }

    fn prefix_command(content: &str) -> IncomingMessage {
        IncomingMessage {
            id: 1,
            channel_id: CHANNEL,
            guild_id: Some(GUILD),
            author_id: 5,
            author_name: "carol".to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_command_in_media_only_channel_is_blocked() {
        let store = RecordStore::new();
        let service = service(store.clone());
        let message = prefix_command("!warn <@6> rude");

        assert!(admits_command(&service, Some(&message)).await);

        MediaOnlyChannels::new(store).enroll(CHANNEL).unwrap();
        assert!(!admits_command(&service, Some(&message)).await);
        // Slash invocations have no message to delete
        assert!(admits_command(&service, None).await);
    }

    #[test]
    fn test_account_rename() {
        assert_eq!(
            name_changes("alice", None, "ally", None),
            vec![("alice".to_string(), "ally".to_string(), false)]
        );
    }

    #[test]
    fn test_nick_set_and_cleared() {
        assert_eq!(
            name_changes("alice", None, "alice", Some("Al")),
            vec![("alice".to_string(), "Al".to_string(), true)]
        );
        assert_eq!(
            name_changes("alice", Some("Al"), "alice", None),
            vec![("Al".to_string(), "alice".to_string(), true)]
        );
    }

    #[test]
    fn test_unchanged_member() {
        assert!(name_changes("alice", Some("Al"), "alice", Some("Al")).is_empty());
    }
}
