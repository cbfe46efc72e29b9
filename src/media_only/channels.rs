//! Media-only channel enrollment

use crate::moderation::record::MediaOnlyChannel;
use crate::moderation::{ModerationError, ModerationResult, RecordStore};
use tracing::info;

/// The set of channels under the media-only policy
#[derive(Debug, Clone)]
pub struct MediaOnlyChannels {
    store: RecordStore,
}

impl MediaOnlyChannels {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn is_enrolled(&self, channel: u64) -> bool {
        self.store
            .exists::<MediaOnlyChannel>(|row| row.channel == channel)
    }

    /// Enrolled channels in enrollment order. Channels for which `exists`
    /// says no are dropped from the set on the way.
    pub fn list(&self, exists: impl Fn(u64) -> bool) -> Vec<u64> {
        let mut out = Vec::new();
        for id in self.store.stream_all::<MediaOnlyChannel>() {
            let Ok(row) = self.store.get::<MediaOnlyChannel>(id) else {
                continue;
            };
            if exists(row.channel) {
                out.push(row.channel);
            } else {
                self.store.remove::<MediaOnlyChannel>(id);
                info!(channel = row.channel, "Removed vanished channel from media-only set");
            }
        }
        out
    }

    /// # Errors
    /// Returns `AlreadyActive` if the channel is already enrolled
    pub fn enroll(&self, channel: u64) -> ModerationResult<MediaOnlyChannel> {
        if self.is_enrolled(channel) {
            return Err(ModerationError::AlreadyActive(format!(
                "channel {channel} is already media-only"
            )));
        }
        Ok(self.store.add(MediaOnlyChannel { id: 0, channel }))
    }

    /// # Errors
    /// Returns `NotFound` if the channel is not enrolled
    pub fn unenroll(&self, channel: u64) -> ModerationResult<()> {
        let rows = self
            .store
            .filter::<MediaOnlyChannel>(|row| row.channel == channel);
        if rows.is_empty() {
            return Err(ModerationError::NotFound(format!(
                "channel {channel} is not media-only"
            )));
        }
        for row in rows {
            self.store.remove::<MediaOnlyChannel>(row.id);
        }
        Ok(())
    }
}
