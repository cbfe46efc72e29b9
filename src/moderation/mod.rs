//! Moderation core
//!
//! Records, the store that holds them, the mute/ban lifecycle engine and the
//! service facade that commands and gateway events go through.

mod error;
mod expiry;
mod lifecycle;
pub mod record;
mod service;
mod store;

pub use error::{ModerationError, ModerationResult};
pub use expiry::{ExpiryRequest, spawn_expiry_task};
pub use lifecycle::RestrictionEngine;
pub use record::{
    BadWord, BadWordPost, Join, Kick, Leave, MediaOnlyChannel, PendingUpgrade, Report, Restriction, RestrictionKind,
    RestrictionOutcome, UsernameUpdate, Warn,
};
pub use service::{
    EventFlow, MAX_REASON_LEN, MAX_RESTRICTION_DAYS, ModerationService, parse_days,
};
pub use store::{Record, RecordStore};
