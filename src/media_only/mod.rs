//! Media-only channel policy: which channels are enrolled and whether a
//! message posted there carries an image.

mod channels;
mod gate;

pub use channels::MediaOnlyChannels;
pub use gate::{
    ContentGate, HttpMediaProbe, MediaProbe, ProbeError, ProbeFailurePolicy, candidate_urls,
};

#[cfg(test)]
pub use gate::MockMediaProbe;
