//! Restriction lifecycle engine
//!
//! Creates, reverses and upgrades mutes and bans. The engine keeps no state of
//! its own: every call is a read-modify-write of one record in the store.
//! Uniqueness of the active restriction per member is the caller's job.

use crate::moderation::record::{Restriction, RestrictionKind};
use crate::moderation::{ModerationError, ModerationResult, RecordStore};
use chrono::{DateTime, Utc};
use tracing::info;

/// Lifecycle operations for one kind of restriction
#[derive(Debug, Clone)]
pub struct RestrictionEngine {
    kind: RestrictionKind,
    store: RecordStore,
}

impl RestrictionEngine {
    /// Create an engine for `kind` operating on `store`
    #[must_use]
    pub fn new(kind: RestrictionKind, store: RecordStore) -> Self {
        Self { kind, store }
    }

    #[must_use]
    pub fn kind(&self) -> RestrictionKind {
        self.kind
    }

    /// Insert a new active restriction
    pub fn create(
        &self,
        member: u64,
        member_name: impl Into<String>,
        moderator: u64,
        days: u32,
        reason: impl Into<String>,
        is_upgrade: bool,
    ) -> Restriction {
        let record = self.store.add(Restriction::new(
            self.kind,
            member,
            member_name,
            moderator,
            days,
            reason,
            is_upgrade,
        ));

        info!(
            record_id = record.id,
            kind = %self.kind,
            member = record.member,
            moderator = record.moderator,
            days = record.days,
            is_upgrade = record.is_upgrade,
            "Restriction created"
        );

        record
    }

    /// Fetch a restriction of this engine's kind
    ///
    /// # Errors
    /// Returns `NotFound` if the id is unknown or belongs to the other kind
    pub fn get(&self, id: u64) -> ModerationResult<Restriction> {
        self.store
            .get::<Restriction>(id)
            .ok()
            .filter(|record| record.kind == self.kind)
            .ok_or_else(|| ModerationError::record_not_found(self.kind, id))
    }

    /// Close a restriction. Both `reversing_mod` and `reason` being `None`
    /// marks an automatic expiry. Not idempotent: an inactive record gets its
    /// reversal fields re-stamped, but `active` never returns to true.
    ///
    /// # Errors
    /// Returns `NotFound` if the id is unknown or belongs to the other kind
    pub fn deactivate(
        &self,
        id: u64,
        reversing_mod: Option<u64>,
        reason: Option<String>,
    ) -> ModerationResult<Restriction> {
        self.get(id)?;
        let record = self.store.update::<Restriction>(id, |record| {
            record.deactivate(reversing_mod, reason, Utc::now());
        })?;

        info!(
            record_id = id,
            kind = %self.kind,
            member = record.member,
            reversal_mod = ?record.reversal_mod,
            "Restriction deactivated"
        );

        Ok(record)
    }

    /// Close a restriction because a stronger one supersedes it
    ///
    /// # Errors
    /// Returns `NotFound` if the id is unknown or belongs to the other kind
    pub fn upgrade(&self, id: u64, upgrading_mod: u64) -> ModerationResult<Restriction> {
        self.deactivate(id, Some(upgrading_mod), None)?;
        let record = self
            .store
            .update::<Restriction>(id, |record| record.upgraded = true)?;

        info!(
            record_id = id,
            kind = %self.kind,
            member = record.member,
            moderator = upgrading_mod,
            "Restriction upgraded"
        );

        Ok(record)
    }

    /// The member's active restriction of this kind, newest first if the
    /// invariant was ever broken
    #[must_use]
    pub fn active_for(&self, member: u64) -> Option<Restriction> {
        self.store
            .filter::<Restriction>(|r| r.kind == self.kind && r.member == member && r.active)
            .pop()
    }

    /// Every restriction of this kind the member has received
    #[must_use]
    pub fn history_for(&self, member: u64) -> Vec<Restriction> {
        self.store
            .filter::<Restriction>(|r| r.kind == self.kind && r.member == member)
    }

    /// Ids of active temporary restrictions that have run out by `now`
    #[must_use]
    pub fn due_for_expiry(&self, now: DateTime<Utc>) -> Vec<u64> {
        self.store
            .filter::<Restriction>(|r| r.kind == self.kind && r.is_due(now))
            .into_iter()
            .map(|r| r.id)
            .collect()
    }
}
