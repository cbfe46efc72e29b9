//! Moderation records and the restriction lifecycle state
//!
//! Plain facts (joins, leaves, renames, reports, warns, kicks) are append-only.
//! Mutes and bans share one [`Restriction`] shape parameterized by
//! [`RestrictionKind`]; they carry the lifecycle sub-state that the
//! [`RestrictionEngine`](super::RestrictionEngine) drives.

use crate::moderation::RecordStore;
use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Window in which a second join for the same member counts as a replay
pub const JOIN_DEDUP_WINDOW_SECS: i64 = 60;

/// Which kind of time-bounded restriction a record describes
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestrictionKind {
    /// Member loses the ability to speak
    Mute,
    /// Member is removed from the guild and cannot rejoin
    Ban,
}

/// How a restriction ended (or that it has not)
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionOutcome {
    /// Still in force
    Active,
    /// Served out, reversed by the expiry task
    Expired,
    /// Lifted by a moderator
    Lifted,
    /// Superseded by a stronger restriction
    Upgraded,
}

/// A member joined the guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub id: u64,
    pub member: u64,
    pub member_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Join {
    pub fn new(member: u64, member_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            timestamp,
        }
    }

    /// Record a join unless one for the same member already exists within
    /// the dedup window before `joined_at` (gateway replays, reconnects)
    pub fn update(
        store: &RecordStore,
        member: u64,
        member_name: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Option<Self> {
        if store.exists::<Self>(|join| join.shadows(member, joined_at)) {
            return None;
        }
        Some(store.add(Self::new(member, member_name, joined_at)))
    }

    /// Whether this join shadows another join of the same member at `joined_at`
    #[must_use]
    pub fn shadows(&self, member: u64, joined_at: DateTime<Utc>) -> bool {
        self.member == member
            && self.timestamp >= joined_at - Duration::seconds(JOIN_DEDUP_WINDOW_SECS)
    }
}

/// A member left the guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leave {
    pub id: u64,
    pub member: u64,
    pub member_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Leave {
    pub fn new(member: u64, member_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A member changed their account name or server nickname
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsernameUpdate {
    pub id: u64,
    pub member: u64,
    /// Name before the change
    pub member_name: String,
    pub new_name: String,
    /// True for a nickname change, false for an account rename
    pub nick: bool,
    pub timestamp: DateTime<Utc>,
}

impl UsernameUpdate {
    pub fn new(
        member: u64,
        member_name: impl Into<String>,
        new_name: impl Into<String>,
        nick: bool,
    ) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            new_name: new_name.into(),
            nick,
            timestamp: Utc::now(),
        }
    }
}

/// A member was reported by another member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: u64,
    pub member: u64,
    pub member_name: String,
    pub reporter: u64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl Report {
    pub fn new(
        member: u64,
        member_name: impl Into<String>,
        reporter: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            reporter,
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }
}

/// A moderator warned a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warn {
    pub id: u64,
    pub member: u64,
    pub member_name: String,
    #[serde(rename = "mod")]
    pub moderator: u64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl Warn {
    pub fn new(
        member: u64,
        member_name: impl Into<String>,
        moderator: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            moderator,
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }
}

/// A member was kicked; system kicks carry no moderator or reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kick {
    pub id: u64,
    pub member: u64,
    pub member_name: String,
    #[serde(rename = "mod")]
    pub moderator: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl Kick {
    pub fn new(
        member: u64,
        member_name: impl Into<String>,
        moderator: Option<u64>,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            moderator,
            timestamp: Utc::now(),
            reason,
        }
    }
}

/// A mute or ban together with its lifecycle sub-state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub id: u64,
    pub kind: RestrictionKind,
    pub member: u64,
    /// Display name at the time the restriction was created
    pub member_name: String,
    #[serde(rename = "mod")]
    pub moderator: u64,
    pub timestamp: DateTime<Utc>,
    /// Planned duration in days, 0 means permanent
    pub days: u32,
    pub reason: String,
    pub active: bool,
    pub deactivation_timestamp: Option<DateTime<Utc>>,
    /// `unmute_mod` / `unban_mod`
    pub reversal_mod: Option<u64>,
    /// `unmute_reason` / `unban_reason`
    pub reversal_reason: Option<String>,
    /// Closed because a stronger restriction superseded it
    pub upgraded: bool,
    /// Created by superseding a weaker restriction
    pub is_upgrade: bool,
}

impl Restriction {
    /// Create a new active restriction stamped with the current time
    pub fn new(
        kind: RestrictionKind,
        member: u64,
        member_name: impl Into<String>,
        moderator: u64,
        days: u32,
        reason: impl Into<String>,
        is_upgrade: bool,
    ) -> Self {
        Self {
            id: 0,
            kind,
            member,
            member_name: member_name.into(),
            moderator,
            timestamp: Utc::now(),
            days,
            reason: reason.into(),
            active: true,
            deactivation_timestamp: None,
            reversal_mod: None,
            reversal_reason: None,
            upgraded: false,
            is_upgrade,
        }
    }

    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.days == 0
    }

    /// When the restriction runs out, `None` for permanent ones and for
    /// durations past the end of the calendar
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.is_permanent() {
            return None;
        }
        self.timestamp
            .checked_add_signed(Duration::days(i64::from(self.days)))
    }

    /// Check if this restriction is due for automatic reversal
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at().is_some_and(|expires_at| expires_at <= now)
    }

    /// Close the restriction. Never reactivates; calling it on an inactive
    /// record re-stamps the reversal fields.
    pub fn deactivate(
        &mut self,
        reversal_mod: Option<u64>,
        reversal_reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.active = false;
        self.deactivation_timestamp = Some(at.max(self.timestamp));
        self.reversal_mod = reversal_mod;
        self.reversal_reason = reversal_reason;
    }

    #[must_use]
    pub fn outcome(&self) -> RestrictionOutcome {
        if self.active {
            RestrictionOutcome::Active
        } else if self.upgraded {
            RestrictionOutcome::Upgraded
        } else if self.reversal_mod.is_none() && self.reversal_reason.is_none() {
            RestrictionOutcome::Expired
        } else {
            RestrictionOutcome::Lifted
        }
    }
}

/// A channel enrolled in the media-only policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaOnlyChannel {
    pub id: u64,
    pub channel: u64,
}

/// A regex the content filter matches posted messages against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadWord {
    pub id: u64,
    pub regex: String,
    pub description: String,
    /// Delete matching messages instead of only alerting
    pub delete: bool,
    pub timestamp: DateTime<Utc>,
}

impl BadWord {
    pub fn new(regex: impl Into<String>, description: impl Into<String>, delete: bool) -> Self {
        Self {
            id: 0,
            regex: regex.into(),
            description: description.into(),
            delete,
            timestamp: Utc::now(),
        }
    }
}

/// A message that matched the content filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadWordPost {
    pub id: u64,
    pub member: u64,
    pub member_name: String,
    pub channel: u64,
    pub content: String,
    pub deleted_message: bool,
    pub timestamp: DateTime<Utc>,
}

impl BadWordPost {
    pub fn new(
        member: u64,
        member_name: impl Into<String>,
        channel: u64,
        content: impl Into<String>,
        deleted_message: bool,
    ) -> Self {
        Self {
            id: 0,
            member,
            member_name: member_name.into(),
            channel,
            content: content.into(),
            deleted_message,
            timestamp: Utc::now(),
        }
    }
}

/// Intent row for a two-step upgrade: the superseded restrictions are about
/// to be closed and the successor still has to be created. Removed once the
/// successor exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpgrade {
    pub id: u64,
    pub superseded: Vec<u64>,
    pub successor_kind: RestrictionKind,
    pub member: u64,
    pub member_name: String,
    #[serde(rename = "mod")]
    pub moderator: u64,
    pub days: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
