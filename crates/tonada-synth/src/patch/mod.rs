//! Polymorphic instrument definitions.
//!
//! A [`Patch`] wires generators, envelopes, LFOs and filters into a
//! per-note signal path. Patches are immutable and shared by every voice
//! playing the instrument; all mutable state lives in the voice's
//! [`VoiceParameters`](crate::VoiceParameters).
//!
//! The capability set is closed, so the patch is a tagged enum rather
//! than a trait object:
//!
//! - [`SinglePatch`] — one oscillator or sample, envelope, filter, vibrato
//! - [`Fm2Patch`] — 2-operator FM with feedback and phase sync
//! - [`Sf2Patch`] — sampled source with SoundFont modulation routing
//! - [`SfzPatch`] — sampled source with SFZ modulation routing
//! - [`MultiPatch`] — router over sub-patches by channel/key/velocity;
//!   routers must not nest (enforced at load time)
//!
//! Contract: `start` configures the voice's pre-allocated component slots
//! and returns false when the voice would be born finished; `process`
//! runs in fixed-size sub-blocks and flips the voice to `Stopped` when
//! its envelope or generator completes — callers never process a voice
//! past that point; `stop` triggers release unless the governing
//! generator is a one-shot.

mod fm2;
mod multi;
mod sf2;
mod sfz;
mod single;

pub use fm2::{Fm2Patch, SyncMode};
pub use multi::{MultiPatch, PatchInterval};
pub use sf2::Sf2Patch;
pub use sfz::SfzPatch;
pub use single::SinglePatch;


use crate::channel::ChannelParameters;
use crate::voice::{RenderContext, VoiceParameters};

/// Envelope level treated as inaudible: releases at or below this jump
/// straight to the terminal stage.
pub(crate) const ENVELOPE_SILENCE: f32 = 1.0e-4;

/// An immutable instrument definition.
#[derive(Clone, Debug)]
pub enum Patch {
    /// Single-oscillator instrument.
    Single(SinglePatch),
    /// 2-operator FM instrument.
    Fm2(Fm2Patch),
    /// SoundFont-derived sampled instrument.
    Sf2(Sf2Patch),
    /// SFZ-derived sampled instrument.
    Sfz(SfzPatch),
    /// Multi-layer router.
    Multi(MultiPatch),
}

impl Patch {
    /// Instrument name.
    pub fn name(&self) -> &str {
        match self {
            Patch::Single(p) => p.name(),
            Patch::Fm2(p) => p.name(),
            Patch::Sf2(p) => p.name(),
            Patch::Sfz(p) => p.name(),
            Patch::Multi(p) => p.name(),
        }
    }

    /// Exclusive group identifier (0 = none). Routers report 0; their
    /// layers carry their own groups.
    pub fn exclusive_group(&self) -> u32 {
        match self {
            Patch::Single(p) => p.exclusive_group(),
            Patch::Fm2(p) => p.exclusive_group(),
            Patch::Sf2(p) => p.exclusive_group(),
            Patch::Sfz(p) => p.exclusive_group(),
            Patch::Multi(_) => 0,
        }
    }

    /// True for the router variant.
    pub fn is_router(&self) -> bool {
        matches!(self, Patch::Multi(_))
    }

    /// Configure the voice's component slots for a new note.
    ///
    /// Returns false when the voice would already be finished; the caller
    /// must then skip activation. Routers never start voices directly —
    /// their layers do.
    pub fn start(
        &self,
        params: &mut VoiceParameters,
        ctx: &RenderContext,
        channel: &ChannelParameters,
    ) -> bool {
        match self {
            Patch::Single(p) => p.start(params, ctx, channel),
            Patch::Fm2(p) => p.start(params, ctx, channel),
            Patch::Sf2(p) => p.start(params, ctx, channel),
            Patch::Sfz(p) => p.start(params, ctx, channel),
            Patch::Multi(_) => {
                debug_assert!(false, "router patches never bind voices");
                false
            }
        }
    }

    /// Render one sub-block additively into `output`.
    pub fn process(
        &self,
        params: &mut VoiceParameters,
        ctx: &RenderContext,
        channel: &ChannelParameters,
        output: &mut [f32],
    ) {
        match self {
            Patch::Single(p) => p.process(params, ctx, channel, output),
            Patch::Fm2(p) => p.process(params, ctx, channel, output),
            Patch::Sf2(p) => p.process(params, ctx, channel, output),
            Patch::Sfz(p) => p.process(params, ctx, channel, output),
            Patch::Multi(_) => {}
        }
    }

    /// Request a graceful release.
    pub fn stop(&self, params: &mut VoiceParameters) {
        match self {
            Patch::Single(p) => p.stop(params),
            Patch::Fm2(p) => p.stop(params),
            Patch::Sf2(p) => p.stop(params),
            Patch::Sfz(p) => p.stop(params),
            Patch::Multi(_) => {}
        }
    }
}
