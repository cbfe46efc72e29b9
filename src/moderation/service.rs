//! Moderation service
//!
//! The facade the command surface and the gateway event handler call into. It
//! owns the media-only policy and the content filter, enforces "one active mute and one active ban
//! per member" on top of the lifecycle engine, and mirrors restrictions onto
//! the platform through the [`Gateway`].

use crate::content_filter::{BadWordList, describe_matches};
use crate::gateway::{Capability, Gateway, IncomingMessage, PermissionOracle};
use crate::media_only::{ContentGate, MediaOnlyChannels};
use crate::moderation::record::{
    BadWord, BadWordPost, Join, Kick, Leave, MediaOnlyChannel, PendingUpgrade, Report,
    Restriction, RestrictionKind, UsernameUpdate, Warn,
};
use crate::moderation::{ModerationError, ModerationResult, RecordStore, RestrictionEngine};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Longest accepted reason text
pub const MAX_REASON_LEN: usize = 900;

/// Longest accepted temporary restriction
pub const MAX_RESTRICTION_DAYS: u32 = 36_500;

/// Whether other handlers may still see an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlow {
    Continue,
    /// The message was removed; nothing else should process it
    Stop,
}

/// Parse a restriction duration in days. `0`, `inf` and `permanent` mean
/// permanent.
///
/// # Errors
/// Returns `Validation` for anything that is not a day count between 0 and
/// [`MAX_RESTRICTION_DAYS`]
pub fn parse_days(input: &str) -> ModerationResult<u32> {
    let input = input.trim().to_lowercase();
    let days = match input.as_str() {
        "inf" | "permanent" | "perm" | "-1" => return Ok(0),
        _ => input
            .parse::<u32>()
            .map_err(|_| ModerationError::validation(format!("invalid duration: {input}")))?,
    };
    if days > MAX_RESTRICTION_DAYS {
        return Err(ModerationError::validation(format!(
            "duration must be at most {MAX_RESTRICTION_DAYS} days, use 0 for permanent"
        )));
    }
    Ok(days)
}

fn validate_reason(reason: &str) -> ModerationResult<()> {
    if reason.trim().is_empty() {
        return Err(ModerationError::validation("reason must not be empty"));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ModerationError::validation(format!(
            "reason must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(())
}

/// Whether a new restriction of `days` outlasts `active`. Temporary ones are
/// compared by the UTC calendar day they end on.
fn outlasts(days: u32, active: &Restriction, now: DateTime<Utc>) -> bool {
    match active.expires_at() {
        None => false,
        Some(_) if days == 0 => true,
        Some(expires_at) => now
            .checked_add_signed(Duration::days(i64::from(days)))
            .is_none_or(|ends| ends.date_naive() > expires_at.date_naive()),
    }
}

/// Service for moderation operations
#[derive(Clone)]
pub struct ModerationService {
    /// Guild whose members the restrictions apply to
    guild: u64,
    store: RecordStore,
    mutes: RestrictionEngine,
    bans: RestrictionEngine,
    channels: MediaOnlyChannels,
    bad_words: BadWordList,
    gate: ContentGate,
    gateway: Arc<dyn Gateway>,
    permissions: Arc<dyn PermissionOracle>,
}

impl ModerationService {
    /// Create a moderation service on top of an explicit store handle
    #[must_use]
    pub fn new(
        guild: u64,
        store: RecordStore,
        gate: ContentGate,
        gateway: Arc<dyn Gateway>,
        permissions: Arc<dyn PermissionOracle>,
    ) -> Self {
        Self {
            guild,
            mutes: RestrictionEngine::new(RestrictionKind::Mute, store.clone()),
            bans: RestrictionEngine::new(RestrictionKind::Ban, store.clone()),
            channels: MediaOnlyChannels::new(store.clone()),
            bad_words: BadWordList::new(store.clone()),
            store,
            gate,
            gateway,
            permissions,
        }
    }

    #[must_use]
    pub fn guild(&self) -> u64 {
        self.guild
    }

    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[must_use]
    pub fn permissions(&self) -> &dyn PermissionOracle {
        self.permissions.as_ref()
    }

    /// The lifecycle engine for one restriction kind
    #[must_use]
    pub fn engine(&self, kind: RestrictionKind) -> &RestrictionEngine {
        match kind {
            RestrictionKind::Mute => &self.mutes,
            RestrictionKind::Ban => &self.bans,
        }
    }

    async fn persist(&self) -> ModerationResult<()> {
        self.store.flush().await.inspect_err(|e| {
            error!("Failed to flush moderation records: {e}");
        })
    }

    /// Flush for event paths, where there is no caller to report to
    async fn persist_logged(&self) {
        let _ = self.persist().await;
    }

    async fn breaks_media_only(&self, guild: u64, message: &IncomingMessage) -> bool {
        !self
            .permissions
            .check(guild, message.author_id, Capability::MediaOnlyBypass)
            && self.channels.is_enrolled(message.channel_id)
            && !self.gate.contains_media(message).await
    }

    /// Filter regexes matching the message, empty for exempt authors
    fn filtered(&self, guild: u64, message: &IncomingMessage) -> Vec<BadWord> {
        if message.content.is_empty()
            || self
                .permissions
                .check(guild, message.author_id, Capability::ContentFilterBypass)
        {
            return Vec::new();
        }
        self.bad_words.matches(&message.content)
    }

    /// Whether a message survives every policy that deletes messages. Commands
    /// in a message that does not are never run.
    pub async fn admits(&self, message: &IncomingMessage) -> bool {
        let Some(guild) = message.guild_id else {
            return true;
        };
        if message.author_is_bot {
            return true;
        }
        !(self.filtered(guild, message).iter().any(|word| word.delete)
            || self.breaks_media_only(guild, message).await)
    }

    /// Apply the media-only policy and the content filter to a posted message
    ///
    /// # Errors
    /// Returns an error if the offending message could not be deleted
    pub async fn on_message(&self, message: &IncomingMessage) -> ModerationResult<EventFlow> {
        let Some(guild) = message.guild_id else {
            return Ok(EventFlow::Continue);
        };
        if message.author_is_bot {
            return Ok(EventFlow::Continue);
        }
        if !self.breaks_media_only(guild, message).await {
            return self.apply_content_filter(guild, message).await;
        }

        self.gateway
            .delete_message(message.channel_id, message.id)
            .await?;
        info!(
            message_id = message.id,
            channel = message.channel_id,
            author = message.author_id,
            "Deleted message without media"
        );

        let notice = format!(
            "<@{}> only images may be posted in this channel.",
            message.author_id
        );
        if let Err(e) = self.gateway.send_message(message.channel_id, notice).await {
            warn!("Failed to notify channel {}: {e}", message.channel_id);
        }
        let alert = format!(
            "Deleted a message without media from <@{}> in <#{}>.",
            message.author_id, message.channel_id
        );
        if let Err(e) = self.gateway.send_alert(guild, alert).await {
            warn!("Failed to send media-only alert: {e}");
        }

        Ok(EventFlow::Stop)
    }

    async fn apply_content_filter(
        &self,
        guild: u64,
        message: &IncomingMessage,
    ) -> ModerationResult<EventFlow> {
        let matched = self.filtered(guild, message);
        if matched.is_empty() {
            return Ok(EventFlow::Continue);
        }

        let delete = matched.iter().any(|word| word.delete);
        if delete {
            self.gateway
                .delete_message(message.channel_id, message.id)
                .await?;
        }
        let post = self.store.add(BadWordPost::new(
            message.author_id,
            message.author_name.as_str(),
            message.channel_id,
            message.content.as_str(),
            delete,
        ));
        self.persist_logged().await;
        info!(
            record_id = post.id,
            author = message.author_id,
            channel = message.channel_id,
            deleted = delete,
            "Message matched the content filter"
        );

        let action = if delete { "Deleted" } else { "Flagged" };
        let alert = format!(
            "{action} a message from <@{}> in <#{}> matching: {}",
            message.author_id,
            message.channel_id,
            describe_matches(&matched)
        );
        if let Err(e) = self.gateway.send_alert(guild, alert).await {
            warn!("Failed to send content filter alert: {e}");
        }

        Ok(if delete {
            EventFlow::Stop
        } else {
            EventFlow::Continue
        })
    }

    /// Record a member join, dropping gateway replays
    pub async fn on_member_join(
        &self,
        member: u64,
        member_name: &str,
        joined_at: DateTime<Utc>,
    ) -> Option<Join> {
        let join = Join::update(&self.store, member, member_name, joined_at);
        if join.is_some() {
            self.persist_logged().await;
        }
        join
    }

    pub async fn on_member_leave(&self, member: u64, member_name: &str) -> Leave {
        let leave = self.store.add(Leave::new(member, member_name));
        self.persist_logged().await;
        leave
    }

    /// Record a rename; unchanged names are ignored
    pub async fn on_member_rename(
        &self,
        member: u64,
        old_name: &str,
        new_name: &str,
        nick: bool,
    ) -> Option<UsernameUpdate> {
        if old_name == new_name {
            return None;
        }
        let update = self
            .store
            .add(UsernameUpdate::new(member, old_name, new_name, nick));
        self.persist_logged().await;
        Some(update)
    }

    /// Reaction replies are suppressed in media-only channels
    #[must_use]
    pub fn can_respond_on_reaction(&self, channel: u64) -> bool {
        !self.channels.is_enrolled(channel)
    }

    /// Enrolled channels that still exist in `guild`
    pub async fn list_media_only(&self, guild: u64) -> Vec<u64> {
        let before = self.store.count::<MediaOnlyChannel>();
        let channels = self
            .channels
            .list(|channel| self.gateway.channel_exists(guild, channel));
        if channels.len() != before {
            self.persist_logged().await;
        }
        channels
    }

    /// # Errors
    /// `AlreadyActive` if enrolled, `PermissionDenied` if the bot cannot
    /// delete messages in the channel
    pub async fn enroll_media_only(&self, guild: u64, channel: u64) -> ModerationResult<()> {
        if self.channels.is_enrolled(channel) {
            return Err(ModerationError::AlreadyActive(format!(
                "channel {channel} is already media-only"
            )));
        }
        if !self.gateway.can_manage_messages(guild, channel) {
            return Err(ModerationError::PermissionDenied(format!(
                "cannot manage messages in channel {channel}"
            )));
        }

        self.channels.enroll(channel)?;
        self.persist().await?;
        info!(channel, "Channel enrolled in media-only policy");

        if let Err(e) = self
            .gateway
            .send_changelog(guild, format!("<#{channel}> is now media-only."))
            .await
        {
            warn!("Failed to write changelog: {e}");
        }
        Ok(())
    }

    /// # Errors
    /// `NotFound` if the channel is not enrolled
    pub async fn unenroll_media_only(&self, guild: u64, channel: u64) -> ModerationResult<()> {
        self.channels.unenroll(channel)?;
        self.persist().await?;
        info!(channel, "Channel removed from media-only policy");

        if let Err(e) = self
            .gateway
            .send_changelog(guild, format!("<#{channel}> is no longer media-only."))
            .await
        {
            warn!("Failed to write changelog: {e}");
        }
        Ok(())
    }

    #[must_use]
    pub fn list_bad_words(&self) -> Vec<BadWord> {
        self.bad_words.list()
    }

    /// # Errors
    /// `Validation` for a pattern that does not compile, `AlreadyActive` for
    /// a duplicate pattern, `Storage` if the list could not be saved
    pub async fn add_bad_word(
        &self,
        guild: u64,
        regex: &str,
        description: &str,
        delete: bool,
    ) -> ModerationResult<BadWord> {
        let word = self.bad_words.add(regex, description, delete)?;
        self.persist().await?;
        info!(bad_word_id = word.id, delete, "Content filter regex added");

        let mode = if delete { "deleted" } else { "flagged" };
        if let Err(e) = self
            .gateway
            .send_changelog(
                guild,
                format!("Messages matching `{regex}` ({description}) are now {mode}."),
            )
            .await
        {
            warn!("Failed to write changelog: {e}");
        }
        Ok(word)
    }

    /// # Errors
    /// `NotFound` if no regex has this id, `Storage` if the list could not be
    /// saved
    pub async fn remove_bad_word(&self, guild: u64, id: u64) -> ModerationResult<BadWord> {
        let word = self.bad_words.remove(id)?;
        self.persist().await?;
        info!(bad_word_id = id, "Content filter regex removed");

        if let Err(e) = self
            .gateway
            .send_changelog(
                guild,
                format!("Messages matching `{}` are no longer filtered.", word.regex),
            )
            .await
        {
            warn!("Failed to write changelog: {e}");
        }
        Ok(word)
    }

    /// # Errors
    /// `Validation` for an empty or overlong reason
    pub async fn warn(
        &self,
        member: u64,
        member_name: &str,
        moderator: u64,
        reason: &str,
    ) -> ModerationResult<Warn> {
        validate_reason(reason)?;
        let warn = self
            .store
            .add(Warn::new(member, member_name, moderator, reason));
        self.persist().await?;
        info!(record_id = warn.id, member, moderator, "Member warned");
        Ok(warn)
    }

    /// # Errors
    /// `Validation` for self reports or a bad reason
    pub async fn report(
        &self,
        member: u64,
        member_name: &str,
        reporter: u64,
        reason: &str,
    ) -> ModerationResult<Report> {
        if member == reporter {
            return Err(ModerationError::validation("members cannot report themselves"));
        }
        validate_reason(reason)?;
        let report = self
            .store
            .add(Report::new(member, member_name, reporter, reason));
        self.persist().await?;
        info!(record_id = report.id, member, reporter, "Member reported");
        Ok(report)
    }

    /// Kick on the platform first, then record it
    ///
    /// # Errors
    /// `Validation` for a bad reason, or the platform error if the kick failed
    pub async fn kick(
        &self,
        member: u64,
        member_name: &str,
        moderator: Option<u64>,
        reason: Option<String>,
    ) -> ModerationResult<Kick> {
        if let Some(reason) = &reason {
            validate_reason(reason)?;
        }
        self.gateway
            .kick_member(self.guild, member, reason.clone())
            .await?;

        let kick = self
            .store
            .add(Kick::new(member, member_name, moderator, reason));
        self.persist().await?;
        info!(record_id = kick.id, member, moderator = ?moderator, "Member kicked");
        Ok(kick)
    }

    /// Mute or ban a member. An active restriction of the same kind is
    /// upgraded if the new one outlasts it; banning also upgrades an active
    /// mute.
    ///
    /// # Errors
    /// `AlreadyActive` if an equal or stronger restriction of this kind is in
    /// force, `Validation` for a bad reason
    pub async fn restrict(
        &self,
        kind: RestrictionKind,
        member: u64,
        member_name: &str,
        moderator: u64,
        days: u32,
        reason: &str,
    ) -> ModerationResult<Restriction> {
        validate_reason(reason)?;
        let engine = self.engine(kind);

        let mut superseded = Vec::new();
        if let Some(active) = engine.active_for(member) {
            if !outlasts(days, &active, Utc::now()) {
                return Err(ModerationError::AlreadyActive(format!(
                    "member {member} already has an active {kind} (#{})",
                    active.id
                )));
            }
            superseded.push(active.id);
        }
        let already_enforced = !superseded.is_empty();
        if kind == RestrictionKind::Ban {
            if let Some(mute) = self.mutes.active_for(member) {
                superseded.push(mute.id);
            }
        }

        let record = if superseded.is_empty() {
            engine.create(member, member_name, moderator, days, reason, false)
        } else {
            let intent = self.store.add(PendingUpgrade {
                id: 0,
                superseded,
                successor_kind: kind,
                member,
                member_name: member_name.to_string(),
                moderator,
                days,
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
            self.complete_upgrade(&intent)?
        };
        let flushed = self.persist().await;

        if !already_enforced {
            if let Err(e) = self
                .gateway
                .apply_restriction(self.guild, member, kind, reason.to_string())
                .await
            {
                // The record stays; the platform can be fixed by hand
                error!("Failed to apply {kind} #{} on the platform: {e}", record.id);
            }
        }

        flushed.map(|()| record)
    }

    /// Close every superseded restriction of an upgrade intent and make sure
    /// its successor exists, then drop the intent. Safe to run again on a
    /// partially applied intent.
    fn complete_upgrade(&self, intent: &PendingUpgrade) -> ModerationResult<Restriction> {
        for &id in &intent.superseded {
            let Ok(record) = self.store.get::<Restriction>(id) else {
                warn!(intent_id = intent.id, restriction_id = id, "Superseded restriction is gone");
                continue;
            };
            if record.active {
                self.engine(record.kind).upgrade(id, intent.moderator)?;
            }
        }

        let successor = self
            .store
            .filter::<Restriction>(|r| {
                r.kind == intent.successor_kind
                    && r.member == intent.member
                    && r.is_upgrade
                    && r.timestamp >= intent.timestamp
            })
            .pop();
        let successor = match successor {
            Some(record) => record,
            None => self.engine(intent.successor_kind).create(
                intent.member,
                intent.member_name.as_str(),
                intent.moderator,
                intent.days,
                intent.reason.as_str(),
                true,
            ),
        };

        self.store.remove::<PendingUpgrade>(intent.id);
        Ok(successor)
    }

    /// Finish upgrades that were interrupted between closing the old
    /// restriction and creating the new one. Returns how many were repaired.
    pub async fn reconcile(&self) -> usize {
        let pending = self.store.filter::<PendingUpgrade>(|_| true);
        let mut repaired = 0;
        for intent in &pending {
            match self.complete_upgrade(intent) {
                Ok(successor) => {
                    repaired += 1;
                    warn!(
                        intent_id = intent.id,
                        successor_id = successor.id,
                        member = intent.member,
                        "Repaired interrupted restriction upgrade"
                    );
                }
                Err(e) => error!(intent_id = intent.id, "Failed to repair upgrade: {e}"),
            }
        }
        if !pending.is_empty() {
            self.persist_logged().await;
        }
        repaired
    }

    /// Lift a member's active restriction of `kind`
    ///
    /// # Errors
    /// `NotFound` if the member has no active restriction of this kind,
    /// `Validation` for a bad reason
    pub async fn lift(
        &self,
        kind: RestrictionKind,
        member: u64,
        moderator: u64,
        reason: &str,
    ) -> ModerationResult<Restriction> {
        validate_reason(reason)?;
        let engine = self.engine(kind);
        let active = engine.active_for(member).ok_or_else(|| {
            ModerationError::NotFound(format!("member {member} has no active {kind}"))
        })?;

        let record = engine.deactivate(active.id, Some(moderator), Some(reason.to_string()))?;
        let flushed = self.persist().await;

        if let Err(e) = self.gateway.lift_restriction(self.guild, member, kind).await {
            error!("Failed to lift {kind} #{} on the platform: {e}", record.id);
        }
        flushed.map(|()| record)
    }

    /// Reverse every temporary restriction that has run out by `now`
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Vec<Restriction> {
        let mut expired = Vec::new();

        for engine in [&self.mutes, &self.bans] {
            for id in engine.due_for_expiry(now) {
                // Skip anything closed since the scan
                if !engine.get(id).is_ok_and(|record| record.active) {
                    continue;
                }
                match engine.deactivate(id, None, None) {
                    Ok(record) => expired.push(record),
                    Err(e) => error!("Failed to expire {} #{id}: {e}", engine.kind()),
                }
            }
        }

        if expired.is_empty() {
            return expired;
        }
        self.persist_logged().await;

        for record in &expired {
            if let Err(e) = self
                .gateway
                .lift_restriction(self.guild, record.member, record.kind)
                .await
            {
                error!("Failed to lift expired {} #{}: {e}", record.kind, record.id);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, MockPermissionOracle};
    use crate::media_only::{MockMediaProbe, ProbeFailurePolicy};
    use crate::moderation::record::RestrictionOutcome;

    const GUILD: u64 = 100;
    const CHANNEL: u64 = 200;
    const MOD: u64 = 9;

    fn service_on(
        store: RecordStore,
        gateway: MockGateway,
        oracle: MockPermissionOracle,
        probe: MockMediaProbe,
    ) -> ModerationService {
        ModerationService::new(
            GUILD,
            store,
            ContentGate::new(Arc::new(probe), ProbeFailurePolicy::Abort),
            Arc::new(gateway),
            Arc::new(oracle),
        )
    }

    fn service_with(
        gateway: MockGateway,
        oracle: MockPermissionOracle,
        probe: MockMediaProbe,
    ) -> ModerationService {
        service_on(RecordStore::new(), gateway, oracle, probe)
    }

    fn no_bypass() -> MockPermissionOracle {
        let mut oracle = MockPermissionOracle::new();
        oracle.expect_check().returning(|_, _, _| false);
        oracle
    }

    fn service(gateway: MockGateway) -> ModerationService {
        service_with(gateway, MockPermissionOracle::new(), MockMediaProbe::new())
    }

    fn permissive_gateway() -> MockGateway {
        let mut gateway = MockGateway::new();
        gateway.expect_apply_restriction().returning(|_, _, _, _| Ok(()));
        gateway.expect_lift_restriction().returning(|_, _, _| Ok(()));
        gateway
    }

    fn message(author_is_bot: bool, guild_id: Option<u64>, content: &str) -> IncomingMessage {
        IncomingMessage {
            id: 1,
            channel_id: CHANNEL,
            guild_id,
            author_id: 5,
            author_name: "carol".to_string(),
            author_is_bot,
            content: content.to_string(),
            attachment_urls: Vec::new(),
        }
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days("3").unwrap(), 3);
        assert_eq!(parse_days(" 0 ").unwrap(), 0);
        assert_eq!(parse_days("inf").unwrap(), 0);
        assert_eq!(parse_days("Permanent").unwrap(), 0);
        assert!(matches!(
            parse_days("three"),
            Err(ModerationError::Validation(_))
        ));
        assert!(parse_days("-4").is_err());
        assert_eq!(parse_days("36500").unwrap(), MAX_RESTRICTION_DAYS);
        assert!(matches!(
            parse_days("36501"),
            Err(ModerationError::Validation(_))
        ));
        assert!(parse_days("1000000000").is_err());
    }

    #[test]
    fn test_outlasts() {
        let now = Utc::now();
        let temporary = Restriction::new(RestrictionKind::Mute, 1, "alice", MOD, 3, "spam", false);
        let permanent = Restriction::new(RestrictionKind::Mute, 1, "alice", MOD, 0, "spam", false);

        assert!(outlasts(0, &temporary, now));
        assert!(outlasts(10, &temporary, now));
        assert!(!outlasts(1, &temporary, now));
        assert!(!outlasts(0, &permanent, now));
        assert!(!outlasts(365, &permanent, now));

        // Past the end of the calendar still counts as longer
        assert!(outlasts(u32::MAX, &temporary, now));
    }

    #[tokio::test]
    async fn test_oversized_stored_restriction_does_not_stop_expiry() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_lift_restriction()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = service(gateway);
        // Written before durations were capped
        service.store().add(Restriction::new(
            RestrictionKind::Mute,
            1,
            "alice",
            MOD,
            1_000_000_000,
            "spam",
            false,
        ));
        let due = service.store().add(Restriction::new(
            RestrictionKind::Mute,
            2,
            "bob",
            MOD,
            1,
            "spam",
            false,
        ));

        let expired = service.expire_due(Utc::now() + Duration::days(2)).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, due.id);
    }

    #[tokio::test]
    async fn test_message_skips_bots_and_dms() {
        let service = service(MockGateway::new());
        assert_eq!(
            service.on_message(&message(true, Some(GUILD), "hi")).await.unwrap(),
            EventFlow::Continue
        );
        assert_eq!(
            service.on_message(&message(false, None, "hi")).await.unwrap(),
            EventFlow::Continue
        );
    }

    #[tokio::test]
    async fn test_message_skips_bypass_and_unenrolled() {
        let mut oracle = MockPermissionOracle::new();
        oracle
            .expect_check()
            .returning(|_, user, capability| user == 7 && capability == Capability::MediaOnlyBypass);
        let service = service_with(MockGateway::new(), oracle, MockMediaProbe::new());

        // Not enrolled
        assert_eq!(
            service.on_message(&message(false, Some(GUILD), "hi")).await.unwrap(),
            EventFlow::Continue
        );

        service.channels.enroll(CHANNEL).unwrap();
        let mut bypass = message(false, Some(GUILD), "hi");
        bypass.author_id = 7;
        assert_eq!(service.on_message(&bypass).await.unwrap(), EventFlow::Continue);
    }

    #[tokio::test]
    async fn test_message_without_media_is_deleted() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete_message()
            .withf(|channel, message| *channel == CHANNEL && *message == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_send_message()
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_send_alert()
            .withf(|guild, content| *guild == GUILD && content.contains("<@5>"))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut oracle = MockPermissionOracle::new();
        oracle.expect_check().returning(|_, _, _| false);

        let service = service_with(gateway, oracle, MockMediaProbe::new());
        service.channels.enroll(CHANNEL).unwrap();

        let flow = service
            .on_message(&message(false, Some(GUILD), "no pictures here"))
            .await
            .unwrap();
        assert_eq!(flow, EventFlow::Stop);
    }

    #[tokio::test]
    async fn test_message_with_image_passes() {
        let mut oracle = MockPermissionOracle::new();
        oracle.expect_check().returning(|_, _, _| false);
        let mut probe = MockMediaProbe::new();
        probe
            .expect_content_type()
            .returning(|_| Ok("image/png".to_string()));

        let service = service_with(MockGateway::new(), oracle, probe);
        service.channels.enroll(CHANNEL).unwrap();

        let mut msg = message(false, Some(GUILD), "");
        msg.attachment_urls = vec!["https://cdn.example.com/a.png".to_string()];
        assert_eq!(service.on_message(&msg).await.unwrap(), EventFlow::Continue);
    }

    #[tokio::test]
    async fn test_flagged_message_is_recorded_and_kept() {
        let mut gateway = MockGateway::new();
        gateway.expect_delete_message().never();
        gateway
            .expect_send_alert()
            .withf(|_, content| content.starts_with("Flagged") && content.contains("scam"))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service_with(gateway, no_bypass(), MockMediaProbe::new());
        service.bad_words.add("(?i)free nitro", "scam", false).unwrap();

        let flow = service
            .on_message(&message(false, Some(GUILD), "Free Nitro here"))
            .await
            .unwrap();
        assert_eq!(flow, EventFlow::Continue);

        let posts = service.store().filter::<BadWordPost>(|_| true);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].member, 5);
        assert_eq!(posts[0].member_name, "carol");
        assert_eq!(posts[0].channel, CHANNEL);
        assert!(!posts[0].deleted_message);
    }

    #[tokio::test]
    async fn test_filtered_message_is_deleted() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete_message()
            .withf(|channel, message| *channel == CHANNEL && *message == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_send_alert()
            .withf(|_, content| content.starts_with("Deleted"))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service_with(gateway, no_bypass(), MockMediaProbe::new());
        service
            .bad_words
            .add(r"discord\.gg/\w+", "invite", true)
            .unwrap();

        let msg = message(false, Some(GUILD), "join discord.gg/raid");
        assert!(!service.admits(&msg).await);
        assert_eq!(service.on_message(&msg).await.unwrap(), EventFlow::Stop);
        let post = service.store().filter::<BadWordPost>(|_| true).pop().unwrap();
        assert!(post.deleted_message);
    }

    #[tokio::test]
    async fn test_content_filter_bypass() {
        let mut oracle = MockPermissionOracle::new();
        oracle
            .expect_check()
            .returning(|_, _, capability| capability == Capability::ContentFilterBypass);
        let service = service_with(MockGateway::new(), oracle, MockMediaProbe::new());
        service.bad_words.add("spam", "spam", true).unwrap();

        let msg = message(false, Some(GUILD), "spam spam");
        assert!(service.admits(&msg).await);
        assert_eq!(service.on_message(&msg).await.unwrap(), EventFlow::Continue);
        assert_eq!(service.store().count::<BadWordPost>(), 0);
    }

    #[tokio::test]
    async fn test_admits_rejects_text_in_media_only_channel() {
        let service = service_with(MockGateway::new(), no_bypass(), MockMediaProbe::new());
        let command = message(false, Some(GUILD), "!warn <@6> rude");
        assert!(service.admits(&command).await);

        service.channels.enroll(CHANNEL).unwrap();
        assert!(!service.admits(&command).await);
        assert!(service.admits(&message(true, Some(GUILD), "!ping")).await);
    }

    #[tokio::test]
    async fn test_bad_word_list_management() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_send_changelog()
            .times(2)
            .returning(|_, _| Ok(()));
        let service = service(gateway);

        let word = service
            .add_bad_word(GUILD, "spam", "spam", false)
            .await
            .unwrap();
        assert!(matches!(
            service.add_bad_word(GUILD, "[", "broken", false).await,
            Err(ModerationError::Validation(_))
        ));
        assert_eq!(service.list_bad_words(), vec![word.clone()]);

        service.remove_bad_word(GUILD, word.id).await.unwrap();
        assert!(service.list_bad_words().is_empty());
        assert!(matches!(
            service.remove_bad_word(GUILD, word.id).await,
            Err(ModerationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_flush_failure_reaches_command_callers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.yaml");
        let store = RecordStore::open(&path).await.unwrap();
        // The snapshot can no longer be renamed into place
        std::fs::create_dir(&path).unwrap();

        let mut gateway = permissive_gateway();
        gateway.expect_kick_member().returning(|_, _, _| Ok(()));
        let service = service_on(store, gateway, MockPermissionOracle::new(), MockMediaProbe::new());

        assert!(matches!(
            service.warn(1, "alice", MOD, "rude").await,
            Err(ModerationError::Storage(_))
        ));
        assert!(matches!(
            service
                .restrict(RestrictionKind::Mute, 1, "alice", MOD, 1, "spam")
                .await,
            Err(ModerationError::Storage(_))
        ));
        assert!(service.kick(2, "bob", Some(MOD), None).await.is_err());

        // Event paths still record
        service.on_member_leave(1, "alice").await;
        assert_eq!(service.store().count::<Leave>(), 1);
    }

    #[tokio::test]
    async fn test_member_events() {
        let service = service(MockGateway::new());
        let t = Utc::now();

        assert!(service.on_member_join(1, "Alice", t).await.is_some());
        assert!(
            service
                .on_member_join(1, "Alice", t + Duration::seconds(30))
                .await
                .is_none()
        );
        assert!(
            service
                .on_member_join(1, "Alice", t + Duration::seconds(90))
                .await
                .is_some()
        );
        assert_eq!(service.store().count::<Join>(), 2);

        service.on_member_leave(1, "Alice").await;
        assert_eq!(service.store().count::<Leave>(), 1);

        assert!(service.on_member_rename(1, "Alice", "Alice", false).await.is_none());
        let update = service
            .on_member_rename(1, "Alice", "Ally", true)
            .await
            .unwrap();
        assert_eq!(update.member_name, "Alice");
        assert_eq!(update.new_name, "Ally");
        assert!(update.nick);
    }

    #[tokio::test]
    async fn test_enroll_checks() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_can_manage_messages()
            .returning(|_, channel| channel == CHANNEL);
        gateway
            .expect_send_changelog()
            .times(2)
            .returning(|_, _| Ok(()));
        let service = service(gateway);

        assert!(matches!(
            service.enroll_media_only(GUILD, 999).await,
            Err(ModerationError::PermissionDenied(_))
        ));

        service.enroll_media_only(GUILD, CHANNEL).await.unwrap();
        assert!(!service.can_respond_on_reaction(CHANNEL));
        assert!(matches!(
            service.enroll_media_only(GUILD, CHANNEL).await,
            Err(ModerationError::AlreadyActive(_))
        ));

        service.unenroll_media_only(GUILD, CHANNEL).await.unwrap();
        assert!(service.can_respond_on_reaction(CHANNEL));
        assert!(matches!(
            service.unenroll_media_only(GUILD, CHANNEL).await,
            Err(ModerationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_heals_deleted_channels() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_channel_exists()
            .returning(|_, channel| channel != 201);
        let service = service(gateway);
        service.channels.enroll(CHANNEL).unwrap();
        service.channels.enroll(201).unwrap();

        assert_eq!(service.list_media_only(GUILD).await, vec![CHANNEL]);
        assert!(!service.channels.is_enrolled(201));
    }

    #[tokio::test]
    async fn test_warn_and_report_validation() {
        let service = service(MockGateway::new());

        assert!(matches!(
            service.warn(1, "alice", MOD, "   ").await,
            Err(ModerationError::Validation(_))
        ));
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert!(service.warn(1, "alice", MOD, &long).await.is_err());
        let warn = service.warn(1, "alice", MOD, "be nice").await.unwrap();
        assert_eq!(warn.moderator, MOD);

        assert!(matches!(
            service.report(1, "alice", 1, "me").await,
            Err(ModerationError::Validation(_))
        ));
        let report = service.report(1, "alice", 2, "spam").await.unwrap();
        assert_eq!(report.reporter, 2);
    }

    #[tokio::test]
    async fn test_kick_records_after_platform_kick() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_kick_member()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = service(gateway);

        let kick = service.kick(1, "alice", None, None).await.unwrap();
        assert_eq!(kick.moderator, None);
        assert_eq!(kick.reason, None);
        assert_eq!(service.store().count::<Kick>(), 1);
    }

    #[tokio::test]
    async fn test_restrict_creates_and_applies_once() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_apply_restriction()
            .withf(|guild, member, kind, _| {
                *guild == GUILD && *member == 1 && *kind == RestrictionKind::Mute
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let service = service(gateway);

        let mute = service
            .restrict(RestrictionKind::Mute, 1, "alice", MOD, 3, "spam")
            .await
            .unwrap();
        assert!(mute.active);
        assert!(!mute.is_upgrade);

        // Shorter restriction is refused
        assert!(matches!(
            service
                .restrict(RestrictionKind::Mute, 1, "alice", MOD, 1, "spam")
                .await,
            Err(ModerationError::AlreadyActive(_))
        ));

        // Longer one upgrades without touching the platform again
        let longer = service
            .restrict(RestrictionKind::Mute, 1, "alice", MOD, 0, "spam forever")
            .await
            .unwrap();
        assert!(longer.is_upgrade);
        assert!(longer.is_permanent());

        let old = service.engine(RestrictionKind::Mute).get(mute.id).unwrap();
        assert_eq!(old.outcome(), RestrictionOutcome::Upgraded);
        assert_eq!(old.reversal_mod, Some(MOD));
        assert_eq!(old.reversal_reason, None);

        // Nothing outlasts a permanent mute
        assert!(
            service
                .restrict(RestrictionKind::Mute, 1, "alice", MOD, 365, "spam")
                .await
                .is_err()
        );
        assert_eq!(
            service.store().filter::<Restriction>(|r| r.active).len(),
            1
        );
        assert!(service.store().count::<PendingUpgrade>() == 0);
    }

    #[tokio::test]
    async fn test_ban_upgrades_active_mute() {
        let service = service(permissive_gateway());
        let mute = service
            .restrict(RestrictionKind::Mute, 1, "alice", MOD, 0, "spam")
            .await
            .unwrap();
        let ban = service
            .restrict(RestrictionKind::Ban, 1, "alice", 10, 7, "raid")
            .await
            .unwrap();

        assert!(ban.is_upgrade);
        let mute = service.engine(RestrictionKind::Mute).get(mute.id).unwrap();
        assert!(!mute.active);
        assert!(mute.upgraded);
        assert_eq!(mute.reversal_mod, Some(10));
        assert!(service.engine(RestrictionKind::Mute).active_for(1).is_none());
        assert_eq!(
            service.engine(RestrictionKind::Ban).active_for(1).map(|r| r.id),
            Some(ban.id)
        );
    }

    #[tokio::test]
    async fn test_lift() {
        let mut gateway = MockGateway::new();
        gateway.expect_apply_restriction().returning(|_, _, _, _| Ok(()));
        gateway
            .expect_lift_restriction()
            .withf(|_, member, kind| *member == 1 && *kind == RestrictionKind::Ban)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = service(gateway);

        assert!(matches!(
            service.lift(RestrictionKind::Ban, 1, MOD, "appeal").await,
            Err(ModerationError::NotFound(_))
        ));

        service
            .restrict(RestrictionKind::Ban, 1, "alice", MOD, 0, "raid")
            .await
            .unwrap();
        let lifted = service
            .lift(RestrictionKind::Ban, 1, 11, "appeal accepted")
            .await
            .unwrap();
        assert_eq!(lifted.outcome(), RestrictionOutcome::Lifted);
        assert_eq!(lifted.reversal_mod, Some(11));
        assert_eq!(lifted.reversal_reason.as_deref(), Some("appeal accepted"));
    }

    #[tokio::test]
    async fn test_expire_due_is_exactly_once() {
        let mut gateway = MockGateway::new();
        gateway.expect_apply_restriction().returning(|_, _, _, _| Ok(()));
        gateway
            .expect_lift_restriction()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = service(gateway);

        let temporary = service
            .restrict(RestrictionKind::Mute, 1, "alice", MOD, 1, "spam")
            .await
            .unwrap();
        service
            .restrict(RestrictionKind::Ban, 2, "bob", MOD, 0, "raid")
            .await
            .unwrap();

        assert!(service.expire_due(Utc::now()).await.is_empty());

        let later = Utc::now() + Duration::days(2);
        let expired = service.expire_due(later).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, temporary.id);
        assert_eq!(expired[0].outcome(), RestrictionOutcome::Expired);

        assert!(service.expire_due(later).await.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_finishes_interrupted_upgrade() {
        let service = service(permissive_gateway());
        let mute = service
            .restrict(RestrictionKind::Mute, 1, "alice", MOD, 3, "spam")
            .await
            .unwrap();

        // Old restriction closed, successor never created
        let intent = service.store().add(PendingUpgrade {
            id: 0,
            superseded: vec![mute.id],
            successor_kind: RestrictionKind::Ban,
            member: 1,
            member_name: "alice".to_string(),
            moderator: MOD,
            days: 0,
            reason: "raid".to_string(),
            timestamp: Utc::now(),
        });
        service.engine(RestrictionKind::Mute).upgrade(mute.id, MOD).unwrap();
        assert!(service.engine(RestrictionKind::Ban).active_for(1).is_none());

        assert_eq!(service.reconcile().await, 1);
        let ban = service.engine(RestrictionKind::Ban).active_for(1).unwrap();
        assert!(ban.is_upgrade);
        assert!(service.store().get::<PendingUpgrade>(intent.id).is_err());

        // Nothing left to repair
        assert_eq!(service.reconcile().await, 0);
        assert_eq!(service.engine(RestrictionKind::Ban).history_for(1).len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_clears_intent_with_missing_restriction() {
        let service = service(MockGateway::new());
        let intent = service.store().add(PendingUpgrade {
            id: 0,
            superseded: vec![9_999],
            successor_kind: RestrictionKind::Mute,
            member: 1,
            member_name: "alice".to_string(),
            moderator: MOD,
            days: 7,
            reason: "spam".to_string(),
            timestamp: Utc::now(),
        });

        assert_eq!(service.reconcile().await, 1);
        assert!(service.store().get::<PendingUpgrade>(intent.id).is_err());
        assert!(service.engine(RestrictionKind::Mute).active_for(1).is_some());
        assert_eq!(service.reconcile().await, 0);
    }
}
