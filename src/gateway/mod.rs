//! Collaborator seams
//!
//! The moderation core talks to Discord only through these traits, which keeps
//! it testable with mocks. [`discord`] holds the serenity-backed versions.

pub mod discord;

use crate::moderation::{ModerationError, ModerationResult, RestrictionKind};
use async_trait::async_trait;
use derive_more::Display;
use poise::serenity_prelude::Permissions;

pub use discord::{CachePermissionOracle, DiscordGateway};

/// A posted message, reduced to what the moderation core looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: u64,
    pub channel_id: u64,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub attachment_urls: Vec<String>,
}

/// Capabilities the permission oracle can be asked about
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// See the list of media-only channels
    MediaOnlyRead,
    /// Enroll or remove media-only channels
    MediaOnlyWrite,
    /// Post anything in media-only channels
    MediaOnlyBypass,
    /// See the content filter's regex list
    ContentFilterRead,
    /// Add or remove content filter regexes
    ContentFilterWrite,
    /// Not checked against the content filter
    ContentFilterBypass,
    Warn,
    Mute,
    Kick,
    Ban,
}

impl Capability {
    /// Discord permissions that grant this capability
    #[must_use]
    pub fn permissions(self) -> Permissions {
        match self {
            Self::MediaOnlyRead
            | Self::MediaOnlyBypass
            | Self::ContentFilterRead
            | Self::ContentFilterBypass => Permissions::MANAGE_MESSAGES,
            Self::MediaOnlyWrite => Permissions::MANAGE_CHANNELS,
            Self::ContentFilterWrite => Permissions::MANAGE_GUILD,
            Self::Warn | Self::Mute => Permissions::MODERATE_MEMBERS,
            Self::Kick => Permissions::KICK_MEMBERS,
            Self::Ban => Permissions::BAN_MEMBERS,
        }
    }
}

/// Answers yes/no capability checks
#[cfg_attr(test, mockall::automock)]
pub trait PermissionOracle: Send + Sync {
    fn check(&self, guild: u64, user: u64, capability: Capability) -> bool;
}

/// Precondition run before a command reaches the moderation service
///
/// # Errors
/// Returns `PermissionDenied` if the oracle says no
pub fn ensure_capability(
    oracle: &dyn PermissionOracle,
    guild: u64,
    user: u64,
    capability: Capability,
) -> ModerationResult<()> {
    if oracle.check(guild, user, capability) {
        Ok(())
    } else {
        Err(ModerationError::PermissionDenied(format!(
            "user {user} lacks {capability}"
        )))
    }
}

/// Actions the moderation core can take on the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn delete_message(&self, channel: u64, message: u64) -> ModerationResult<()>;

    async fn send_message(&self, channel: u64, content: String) -> ModerationResult<()>;

    /// Post to the guild's alert channel
    async fn send_alert(&self, guild: u64, content: String) -> ModerationResult<()>;

    /// Post to the guild's changelog channel
    async fn send_changelog(&self, guild: u64, content: String) -> ModerationResult<()>;

    /// Whether the channel still exists in the guild
    fn channel_exists(&self, guild: u64, channel: u64) -> bool;

    /// Whether the bot itself may delete messages in the channel
    fn can_manage_messages(&self, guild: u64, channel: u64) -> bool;

    async fn apply_restriction(
        &self,
        guild: u64,
        member: u64,
        kind: RestrictionKind,
        reason: String,
    ) -> ModerationResult<()>;

    async fn lift_restriction(
        &self,
        guild: u64,
        member: u64,
        kind: RestrictionKind,
    ) -> ModerationResult<()>;

    async fn kick_member(
        &self,
        guild: u64,
        member: u64,
        reason: Option<String>,
    ) -> ModerationResult<()>;
}
