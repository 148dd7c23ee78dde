//! Multi-layer router patch.
//!
//! Selects one or more sub-patches by channel/key/velocity interval at
//! note-on. The interval-check strategy is chosen once at load time based
//! on which ranges are actually non-trivial, so a plain key split costs a
//! single comparison pair on the hot path. Routers never nest — enforced
//! when the router is built.

use std::sync::Arc;

use crate::LoadError;
use crate::patch::Patch;

/// One routing entry: a sub-patch and the intervals it responds to.
#[derive(Clone, Debug)]
pub struct PatchInterval {
    /// The leaf patch to start when the intervals match.
    pub patch: Arc<Patch>,
    /// Inclusive key range.
    pub key_range: (u8, u8),
    /// Inclusive velocity range.
    pub vel_range: (u8, u8),
    /// Inclusive channel range.
    pub channel_range: (u8, u8),
}

impl PatchInterval {
    /// An interval matching every channel, key, and velocity.
    pub fn new(patch: Arc<Patch>) -> Self {
        Self {
            patch,
            key_range: (0, 127),
            vel_range: (0, 127),
            channel_range: (0, 15),
        }
    }

    /// Restrict the key range (inclusive).
    pub fn with_keys(mut self, low: u8, high: u8) -> Self {
        self.key_range = (low, high);
        self
    }

    /// Restrict the velocity range (inclusive).
    pub fn with_velocities(mut self, low: u8, high: u8) -> Self {
        self.vel_range = (low, high);
        self
    }

    /// Restrict the channel range (inclusive).
    pub fn with_channels(mut self, low: u8, high: u8) -> Self {
        self.channel_range = (low, high);
        self
    }

    #[inline]
    fn matches_key(&self, key: u8) -> bool {
        key >= self.key_range.0 && key <= self.key_range.1
    }

    #[inline]
    fn matches_velocity(&self, velocity: u8) -> bool {
        velocity >= self.vel_range.0 && velocity <= self.vel_range.1
    }

    #[inline]
    fn matches_channel(&self, channel: u8) -> bool {
        channel >= self.channel_range.0 && channel <= self.channel_range.1
    }
}

/// Interval tests actually needed by this router's entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IntervalCheck {
    Key,
    KeyVelocity,
    Full,
}

/// Router over 1..N sub-patches.
#[derive(Clone, Debug)]
pub struct MultiPatch {
    name: String,
    intervals: Vec<PatchInterval>,
    check: IntervalCheck,
}

impl MultiPatch {
    /// Build a router. Fails on an empty interval list or when any entry
    /// routes to another router.
    pub fn new(
        name: impl Into<String>,
        intervals: Vec<PatchInterval>,
    ) -> Result<Self, LoadError> {
        if intervals.is_empty() {
            return Err(LoadError::EmptyPatch);
        }
        if intervals.iter().any(|interval| interval.patch.is_router()) {
            return Err(LoadError::NestedRouter);
        }

        let velocity_trivial = intervals.iter().all(|i| i.vel_range == (0, 127));
        let channel_trivial = intervals.iter().all(|i| i.channel_range == (0, 15));
        let check = match (channel_trivial, velocity_trivial) {
            (true, true) => IntervalCheck::Key,
            (true, false) => IntervalCheck::KeyVelocity,
            (false, _) => IntervalCheck::Full,
        };

        Ok(Self {
            name: name.into(),
            intervals,
            check,
        })
    }

    /// Router name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All routing entries.
    pub fn intervals(&self) -> &[PatchInterval] {
        &self.intervals
    }

    /// Entries matching a note-on, using the load-time check strategy.
    pub fn matching(
        &self,
        channel: u8,
        key: u8,
        velocity: u8,
    ) -> impl Iterator<Item = &PatchInterval> {
        let check = self.check;
        self.intervals.iter().filter(move |interval| {
            match check {
                IntervalCheck::Key => interval.matches_key(key),
                IntervalCheck::KeyVelocity => {
                    interval.matches_key(key) && interval.matches_velocity(velocity)
                }
                IntervalCheck::Full => {
                    interval.matches_key(key)
                        && interval.matches_velocity(velocity)
                        && interval.matches_channel(channel)
                }
            }
        })
    }
}
