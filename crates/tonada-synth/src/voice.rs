//! Per-note voice state.
//!
//! A [`Voice`] binds one [`VoiceParameters`] — the mutable per-note
//! aggregate of generator cursors, envelopes, filters and LFOs — to the
//! immutable [`Patch`](crate::Patch) currently assigned to it. All arrays
//! inside a `VoiceParameters` are sized once at construction
//! ([`MAX_VOICE_COMPONENTS`] slots each) and reused for every note; the
//! render path never allocates.

use std::sync::Arc;

use tonada_core::{Envelope, Filter, GeneratorParameters, Lfo};

use crate::Patch;
use crate::channel::ChannelParameters;

/// Component slots (generators/envelopes/filters/LFOs) per voice. Four
/// covers the widest patch variant (SFZ: three envelopes + three LFOs is
/// the LFO-bound case).
pub const MAX_VOICE_COMPONENTS: usize = 4;

/// Frames per render sub-block: queued events apply at these boundaries,
/// and envelope/LFO updates and mix-gain ramps run at this granularity.
pub const MICRO_BLOCK_FRAMES: usize = 64;

/// Fixed parameters of one render call.
#[derive(Clone, Copy, Debug)]
pub struct RenderContext {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Interleaved output channel count (1 or 2).
    pub channels: usize,
}

/// Voice playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Inert; processing is a no-op. Terminal until the next note start.
    #[default]
    Stopped,
    /// Note-off received, release running; becomes `Stopped` when the
    /// patch observes envelope/generator completion.
    Stopping,
    /// Note held.
    Playing,
}

/// Patch-variant scratch data living inside the voice.
///
/// An explicit tagged type: each variant carries named fields instead of
/// a reinterpreted raw-field union, while keeping the fixed-size,
/// zero-allocation per-voice property.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum PatchScratch {
    /// No patch-specific state.
    #[default]
    None,
    /// 2-operator FM: last modulator output for the feedback path.
    Fm2 {
        /// Previous modulator sample feeding back into its own phase.
        feedback: f32,
    },
    /// Sampled patches: cutoff after key/velocity tracking, the base the
    /// per-block filter modulation multiplies.
    Sampled {
        /// Tracked cutoff in Hz at note start.
        base_cutoff: f32,
    },
}

/// The per-voice mutable aggregate. Owned exclusively by one voice slot;
/// reset, never reallocated, on each note start.
#[derive(Clone, Debug)]
pub struct VoiceParameters {
    /// MIDI channel of the sounding note.
    pub channel: u8,
    /// MIDI key of the sounding note.
    pub note: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Playback state.
    pub state: VoiceState,
    /// Note-off arrived while the hold pedal was down.
    pub note_off_pending: bool,
    /// Exclusive group copied from the patch at start (0 = none).
    pub exclusive_group: u32,
    /// Static per-note pitch offset in cents (patch-level tuning).
    pub pitch_offset_cents: f64,
    /// Static per-note gain offset in dB (patch-level attenuation).
    pub volume_offset_db: f32,
    /// Left mix gain applied at the end of the previous block.
    pub gain_left: f32,
    /// Right mix gain applied at the end of the previous block.
    pub gain_right: f32,
    /// Monotonic allocation stamp for oldest-first stealing.
    pub age: u64,
    /// Generator cursors.
    pub generators: [GeneratorParameters; MAX_VOICE_COMPONENTS],
    /// Envelope instances.
    pub envelopes: [Envelope; MAX_VOICE_COMPONENTS],
    /// Filter instances.
    pub filters: [Filter; MAX_VOICE_COMPONENTS],
    /// LFO instances.
    pub lfos: [Lfo; MAX_VOICE_COMPONENTS],
    /// Patch-variant scratch.
    pub scratch: PatchScratch,
    /// Mono scratch block the patch renders into before mixing.
    pub block_buffer: Vec<f32>,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceParameters {
    /// Allocate the fixed per-voice state. Called once per pool slot.
    pub fn new() -> Self {
        Self {
            channel: 0,
            note: 0,
            velocity: 0,
            state: VoiceState::Stopped,
            note_off_pending: false,
            exclusive_group: 0,
            pitch_offset_cents: 0.0,
            volume_offset_db: 0.0,
            gain_left: 0.0,
            gain_right: 0.0,
            age: 0,
            generators: [GeneratorParameters::new(); MAX_VOICE_COMPONENTS],
            envelopes: [Envelope::new(); MAX_VOICE_COMPONENTS],
            filters: [Filter::new(); MAX_VOICE_COMPONENTS],
            lfos: core::array::from_fn(|_| Lfo::new()),
            scratch: PatchScratch::None,
            block_buffer: vec![0.0; MICRO_BLOCK_FRAMES],
        }
    }

    /// Re-key the voice for a new note. Component slots are reconfigured
    /// by the patch's `start`, not here.
    pub fn configure(&mut self, channel: u8, note: u8, velocity: u8) {
        self.channel = channel;
        self.note = note;
        self.velocity = velocity;
        self.state = VoiceState::Stopped;
        self.note_off_pending = false;
        self.exclusive_group = 0;
        self.pitch_offset_cents = 0.0;
        self.volume_offset_db = 0.0;
        self.gain_left = 0.0;
        self.gain_right = 0.0;
        self.scratch = PatchScratch::None;
    }

    /// Combined mix volume: the stealing heuristic for `Quietest`.
    pub fn combined_gain(&self) -> f32 {
        self.gain_left + self.gain_right
    }
}

/// One pool slot: per-note state plus the currently assigned patch.
#[derive(Clone, Debug, Default)]
pub struct Voice {
    patch: Option<Arc<Patch>>,
    /// The per-note mutable state.
    pub params: VoiceParameters,
}

impl Voice {
    /// A fresh, stopped voice.
    pub fn new() -> Self {
        Self::default()
    }

    /// The patch currently bound to this voice.
    pub fn patch(&self) -> Option<&Arc<Patch>> {
        self.patch.as_ref()
    }

    /// Bind a patch and re-key for a new note.
    pub fn configure(&mut self, channel: u8, note: u8, velocity: u8, patch: Arc<Patch>) {
        self.params.configure(channel, note, velocity);
        self.patch = Some(patch);
    }

    /// Start the bound patch. Returns false when the voice would already
    /// be finished (e.g. a zero-length one-shot) — the caller must then
    /// skip activation.
    pub fn start(&mut self, ctx: &RenderContext, channel: &ChannelParameters) -> bool {
        let Some(patch) = self.patch.clone() else {
            return false;
        };
        patch.start(&mut self.params, ctx, channel)
    }

    /// Request a graceful release. OneShot-governed patches ignore this
    /// and play to completion.
    pub fn stop(&mut self) {
        if self.params.state != VoiceState::Playing {
            return;
        }
        if let Some(patch) = self.patch.clone() {
            patch.stop(&mut self.params);
        }
    }

    /// Force-terminate without running the release envelope.
    pub fn kill(&mut self) {
        self.params.state = VoiceState::Stopped;
        self.params.gain_left = 0.0;
        self.params.gain_right = 0.0;
    }

    /// Render one sub-block additively into `output` (interleaved,
    /// `ctx.channels` wide). A stopped voice is inert.
    pub fn process(
        &mut self,
        ctx: &RenderContext,
        channel: &ChannelParameters,
        output: &mut [f32],
    ) {
        if self.params.state == VoiceState::Stopped {
            return;
        }
        if let Some(patch) = self.patch.clone() {
            patch.process(&mut self.params, ctx, channel, output);
        }
    }
}

/// Accumulate a mono block into an interleaved output with a linear gain
/// ramp from the previous block's gains to the new targets.
///
/// The ramp is the declicking mechanism: gains move once per sub-block,
/// and the per-sample interpolation hides the step.
pub(crate) fn mix_declicked(
    block: &[f32],
    output: &mut [f32],
    channels: usize,
    from: (f32, f32),
    to: (f32, f32),
) {
    let frames = block.len();
    if frames == 0 {
        return;
    }
    debug_assert!(output.len() >= frames * channels);
    let inv = 1.0 / frames as f32;
    let step_left = (to.0 - from.0) * inv;
    let step_right = (to.1 - from.1) * inv;
    let mut gain_left = from.0;
    let mut gain_right = from.1;

    if channels == 2 {
        for (frame, &sample) in block.iter().enumerate() {
            gain_left += step_left;
            gain_right += step_right;
            output[frame * 2] += sample * gain_left;
            output[frame * 2 + 1] += sample * gain_right;
        }
    } else {
        for (frame, &sample) in block.iter().enumerate() {
            gain_left += step_left;
            gain_right += step_right;
            output[frame] += sample * (gain_left + gain_right);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_resets_note_state() {
        let mut params = VoiceParameters::new();
        params.state = VoiceState::Playing;
        params.gain_left = 0.5;
        params.note_off_pending = true;
        params.scratch = PatchScratch::Fm2 { feedback: 0.3 };

        params.configure(3, 64, 90);
        assert_eq!(params.channel, 3);
        assert_eq!(params.note, 64);
        assert_eq!(params.velocity, 90);
        assert_eq!(params.state, VoiceState::Stopped);
        assert_eq!(params.gain_left, 0.0);
        assert!(!params.note_off_pending);
        assert_eq!(params.scratch, PatchScratch::None);
    }

    #[test]
    fn process_on_stopped_voice_is_noop() {
        let mut voice = Voice::new();
        let ctx = RenderContext {
            sample_rate: 48000.0,
            channels: 2,
        };
        let channel = ChannelParameters::new();
        let mut output = [0.0f32; 2 * MICRO_BLOCK_FRAMES];
        voice.process(&ctx, &channel, &mut output);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn mix_ramp_lands_on_target_gain() {
        let block = [1.0f32; 64];
        let mut output = [0.0f32; 128];
        mix_declicked(&block, &mut output, 2, (0.0, 0.0), (0.8, 0.4));
        // Last frame carries the full target gains.
        assert!((output[126] - 0.8).abs() < 1e-6);
        assert!((output[127] - 0.4).abs() < 1e-6);
        // First frame carries one ramp step only.
        assert!((output[0] - 0.8 / 64.0).abs() < 1e-6);
    }

    #[test]
    fn mix_accumulates_into_output() {
        let block = [0.5f32; 16];
        let mut output = [1.0f32; 32];
        mix_declicked(&block, &mut output, 2, (1.0, 1.0), (1.0, 1.0));
        for &sample in &output {
            assert!((sample - 1.5).abs() < 1e-6);
        }
    }

    #[test]
    fn mono_mix_sums_both_gains() {
        let block = [1.0f32; 8];
        let mut output = [0.0f32; 8];
        mix_declicked(&block, &mut output, 1, (0.3, 0.2), (0.3, 0.2));
        for &sample in &output {
            assert!((sample - 0.5).abs() < 1e-6);
        }
    }
}
