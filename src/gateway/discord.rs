//! Serenity-backed gateway and permission oracle

use crate::gateway::{Capability, Gateway, PermissionOracle};
use crate::moderation::{ModerationError, ModerationResult, RestrictionKind};
use async_trait::async_trait;
use poise::serenity_prelude::{
    Cache, ChannelId, GuildId, Http, MessageId, Permissions, RoleId, UserId,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Gateway that acts through the Discord HTTP API and reads the cache
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
    alert_channel: Option<u64>,
    changelog_channel: Option<u64>,
    mute_role: Option<u64>,
}

impl DiscordGateway {
    #[must_use]
    pub fn new(
        http: Arc<Http>,
        cache: Arc<Cache>,
        alert_channel: Option<u64>,
        changelog_channel: Option<u64>,
        mute_role: Option<u64>,
    ) -> Self {
        Self {
            http,
            cache,
            alert_channel,
            changelog_channel,
            mute_role,
        }
    }

    async fn post(&self, channel: Option<u64>, purpose: &str, content: String) -> ModerationResult<()> {
        match channel {
            Some(channel) => self.send_message(channel, content).await,
            None => {
                warn!(purpose, "No channel configured, dropping message: {content}");
                Ok(())
            }
        }
    }

    fn mute_role(&self) -> ModerationResult<RoleId> {
        self.mute_role
            .map(RoleId::new)
            .ok_or_else(|| ModerationError::validation("no mute role configured"))
    }
}

#[async_trait]
impl Gateway for DiscordGateway {
    async fn delete_message(&self, channel: u64, message: u64) -> ModerationResult<()> {
        ChannelId::new(channel)
            .delete_message(&self.http, MessageId::new(message))
            .await?;
        Ok(())
    }

    async fn send_message(&self, channel: u64, content: String) -> ModerationResult<()> {
        ChannelId::new(channel)
            .say(self.http.as_ref(), content)
            .await?;
        Ok(())
    }

    async fn send_alert(&self, _guild: u64, content: String) -> ModerationResult<()> {
        self.post(self.alert_channel, "alert", content).await
    }

    async fn send_changelog(&self, _guild: u64, content: String) -> ModerationResult<()> {
        self.post(self.changelog_channel, "changelog", content).await
    }

    fn channel_exists(&self, guild: u64, channel: u64) -> bool {
        // An uncached guild tells us nothing, so keep the channel
        self.cache
            .guild(GuildId::new(guild))
            .is_none_or(|guild| guild.channels.contains_key(&ChannelId::new(channel)))
    }

    fn can_manage_messages(&self, guild: u64, channel: u64) -> bool {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(GuildId::new(guild)) else {
            return false;
        };
        let (Some(channel), Some(member)) = (
            guild.channels.get(&ChannelId::new(channel)),
            guild.members.get(&bot_id),
        ) else {
            return false;
        };

        guild.user_permissions_in(channel, member).manage_messages()
    }

    async fn apply_restriction(
        &self,
        guild: u64,
        member: u64,
        kind: RestrictionKind,
        reason: String,
    ) -> ModerationResult<()> {
        let guild_id = GuildId::new(guild);
        let user_id = UserId::new(member);

        match kind {
            RestrictionKind::Mute => {
                let role = self.mute_role()?;
                self.http
                    .add_member_role(guild_id, user_id, role, Some(&reason))
                    .await?;
            }
            RestrictionKind::Ban => {
                guild_id
                    .ban_with_reason(&self.http, user_id, 0, &reason)
                    .await?;
            }
        }

        info!("Applied {kind} to user {user_id} in guild {guild_id}");
        Ok(())
    }

    async fn lift_restriction(
        &self,
        guild: u64,
        member: u64,
        kind: RestrictionKind,
    ) -> ModerationResult<()> {
        let guild_id = GuildId::new(guild);
        let user_id = UserId::new(member);

        match kind {
            RestrictionKind::Mute => {
                let role = self.mute_role()?;
                self.http
                    .remove_member_role(guild_id, user_id, role, Some("Mute lifted"))
                    .await?;
            }
            RestrictionKind::Ban => {
                guild_id.unban(&self.http, user_id).await?;
            }
        }

        info!("Lifted {kind} from user {user_id} in guild {guild_id}");
        Ok(())
    }

    async fn kick_member(
        &self,
        guild: u64,
        member: u64,
        reason: Option<String>,
    ) -> ModerationResult<()> {
        let guild_id = GuildId::new(guild);
        let user_id = UserId::new(member);

        match reason {
            Some(reason) => guild_id.kick_with_reason(&self.http, user_id, &reason).await?,
            None => guild_id.kick(&self.http, user_id).await?,
        }

        info!("Kicked user {user_id} from guild {guild_id}");
        Ok(())
    }
}

/// Permission oracle that derives guild permissions from cached roles
#[derive(Clone)]
pub struct CachePermissionOracle {
    cache: Arc<Cache>,
}

impl CachePermissionOracle {
    #[must_use]
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl PermissionOracle for CachePermissionOracle {
    fn check(&self, guild: u64, user: u64, capability: Capability) -> bool {
        let guild_id = GuildId::new(guild);
        let user_id = UserId::new(user);
        let Some(guild) = self.cache.guild(guild_id) else {
            return false;
        };
        if guild.owner_id == user_id {
            return true;
        }
        let Some(member) = guild.members.get(&user_id) else {
            return false;
        };

        let everyone = guild
            .roles
            .get(&RoleId::new(guild_id.get()))
            .map_or_else(Permissions::empty, |role| role.permissions);
        let permissions = member
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .fold(everyone, |acc, role| acc | role.permissions);

        permissions.administrator() || permissions.contains(capability.permissions())
    }
}
