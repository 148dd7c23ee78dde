//! Waveform and PCM sample generators with loop-region playback.
//!
//! A [`Generator`] is an immutable description of a signal source: either
//! an analytic waveform (sine/saw/square/triangle/noise) or a shared PCM
//! sample. All per-note playback state lives in [`GeneratorParameters`],
//! a small cursor owned by one voice slot and reset on every note start,
//! so a single generator can be referenced by every voice playing the
//! same instrument.
//!
//! Playback walks segments of the phase range:
//!
//! ```text
//! PreLoop ──▶ Loop ──▶ PostLoop ──▶ Finished
//! ```
//!
//! `Continuous` and `LoopUntilNoteOff` cycle inside `Loop` until released;
//! `NoLoop` and `OneShot` play a single `PostLoop` segment and never enter
//! `Loop`. [`Generator::get_values`] fills a whole block and is required to
//! cross any number of segment boundaries within one call.

use alloc::sync::Arc;

use crate::math::{cents_to_ratio, key_to_frequency, rem_euclid_f64};

/// How the generator treats its loop region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LoopMode {
    /// Play start→end once; note-off releases the governing envelope.
    #[default]
    NoLoop,
    /// Play start→end once, ignoring note-off entirely.
    OneShot,
    /// Cycle the loop region until the voice dies; note-off does not
    /// change the playback segment.
    Continuous,
    /// Cycle the loop region while the note is held, then play out the
    /// post-loop tail on note-off.
    LoopUntilNoteOff,
}

impl LoopMode {
    /// True for modes whose playback enters the `Loop` segment.
    #[inline]
    pub fn is_looping(self) -> bool {
        matches!(self, LoopMode::Continuous | LoopMode::LoopUntilNoteOff)
    }
}

/// Playback segment of a generator cursor. `Finished` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GeneratorState {
    /// Between the start phase and the loop start.
    PreLoop,
    /// Cycling inside the loop region.
    Loop,
    /// Between the loop end (or start, for non-looping modes) and the end
    /// phase.
    PostLoop,
    /// All data consumed; the generator emits silence.
    #[default]
    Finished,
}

/// Interpolation kernel for sampled playback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Interpolation {
    /// Nearest-sample (truncating) lookup.
    None,
    /// Two-point linear interpolation.
    #[default]
    Linear,
    /// Two-point cosine-weighted interpolation.
    Cosine,
    /// Four-point cubic Hermite (Catmull-Rom) interpolation.
    Hermite,
}

/// Analytic waveform shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Waveform {
    /// Pure fundamental tone.
    #[default]
    Sine,
    /// Rising ramp, all harmonics.
    Saw,
    /// 50% duty cycle, odd harmonics.
    Square,
    /// Odd harmonics, softer than saw.
    Triangle,
    /// White noise (phase-hashed, stateless).
    Noise,
}

/// Immutable, shareable PCM data with its native sample rate.
///
/// The sample frames are behind an [`Arc`] so every generator playing the
/// same sample references one allocation; nothing on the render path ever
/// copies PCM.
#[derive(Clone, Debug)]
pub struct SampleData {
    frames: Arc<[f32]>,
    sample_rate: f64,
}

impl SampleData {
    /// Wrap shared PCM frames recorded at `sample_rate` Hz.
    pub fn new(frames: Arc<[f32]>, sample_rate: f64) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when the sample holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Native sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

/// Phase layout and pitch tracking for a sampled generator.
#[derive(Clone, Copy, Debug)]
pub struct SampleLayout {
    /// Loop handling mode.
    pub loop_mode: LoopMode,
    /// First frame of playback.
    pub start: f64,
    /// One past the last playable frame.
    pub end: f64,
    /// Loop region start frame.
    pub loop_start: f64,
    /// Loop region end frame (exclusive).
    pub loop_end: f64,
    /// MIDI key the sample is pitched at.
    pub root_key: u8,
    /// Fine tuning in cents.
    pub tune_cents: f64,
    /// Cents of pitch change per key away from the root (100 = standard).
    pub key_track: f64,
    /// Cents of pitch change per MIDI velocity unit.
    pub vel_track: f64,
    /// Interpolation kernel for fractional phase lookup.
    pub interpolation: Interpolation,
}

/// Errors raised while constructing a generator. These fire at instrument
/// load time; playback itself cannot fail.
#[derive(Debug, PartialEq, Eq)]
pub enum GeneratorError {
    /// The sample holds no frames.
    EmptySample,
    /// `start >= end`, or the segment lies outside the sample data.
    InvalidSegment,
    /// A looping mode was requested with `loop_start >= loop_end`, or the
    /// loop region lies outside the playback segment.
    InvalidLoopRegion,
}

#[cfg(feature = "std")]
impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptySample => write!(f, "sample holds no frames"),
            Self::InvalidSegment => write!(f, "playback segment is empty or out of range"),
            Self::InvalidLoopRegion => write!(f, "loop region is empty or out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GeneratorError {}

#[derive(Clone, Debug)]
enum GeneratorSource {
    Waveform(Waveform),
    Sample(SampleData),
}

/// Immutable signal source shared by every voice playing an instrument.
///
/// Phase is measured in cycles for analytic waveforms (period 1.0) and in
/// sample frames for PCM playback (period = frames per cycle at the root
/// pitch). Phases and increments are `f64`: frame indices into long
/// samples exceed f32 integer precision.
#[derive(Clone, Debug)]
pub struct Generator {
    source: GeneratorSource,
    loop_mode: LoopMode,
    start_phase: f64,
    end_phase: f64,
    loop_start_phase: f64,
    loop_end_phase: f64,
    period: f64,
    root_key: u8,
    tune_cents: f64,
    key_track: f64,
    vel_track: f64,
    interpolation: Interpolation,
}

/// Shared sine generator used as the default LFO shape.
pub static DEFAULT_SINE: Generator = Generator::const_waveform(Waveform::Sine);
/// Shared saw generator.
pub static DEFAULT_SAW: Generator = Generator::const_waveform(Waveform::Saw);
/// Shared square generator.
pub static DEFAULT_SQUARE: Generator = Generator::const_waveform(Waveform::Square);
/// Shared triangle generator.
pub static DEFAULT_TRIANGLE: Generator = Generator::const_waveform(Waveform::Triangle);

impl Generator {
    /// Const constructor for the shared default waveform generators.
    ///
    /// Continuous loop over one cycle, standard pitch tracking rooted at
    /// A4. These are process-wide constants and carry no mutable state.
    const fn const_waveform(waveform: Waveform) -> Self {
        Self {
            source: GeneratorSource::Waveform(waveform),
            loop_mode: LoopMode::Continuous,
            start_phase: 0.0,
            end_phase: 1.0,
            loop_start_phase: 0.0,
            loop_end_phase: 1.0,
            period: 1.0,
            root_key: 69,
            tune_cents: 0.0,
            key_track: 100.0,
            vel_track: 0.0,
            interpolation: Interpolation::Linear,
        }
    }

    /// An analytic waveform generator with the given loop mode.
    ///
    /// The phase range covers one cycle; looping modes cycle it forever,
    /// non-looping modes play a single cycle.
    pub fn from_waveform(waveform: Waveform, loop_mode: LoopMode) -> Self {
        Self {
            loop_mode,
            ..Self::const_waveform(waveform)
        }
    }

    /// A PCM sample generator. Validates the segment and loop region.
    pub fn from_sample(sample: SampleData, layout: SampleLayout) -> Result<Self, GeneratorError> {
        if sample.is_empty() {
            return Err(GeneratorError::EmptySample);
        }
        let len = sample.len() as f64;
        if layout.start < 0.0 || layout.start >= layout.end || layout.end > len {
            return Err(GeneratorError::InvalidSegment);
        }
        if layout.loop_mode.is_looping()
            && (layout.loop_start >= layout.loop_end
                || layout.loop_start < layout.start
                || layout.loop_end > layout.end)
        {
            return Err(GeneratorError::InvalidLoopRegion);
        }

        // Frames per cycle at the root pitch: playing the sample back with
        // an increment of `period * root_freq / output_rate` reproduces it
        // at its native rate.
        let root_freq = key_to_frequency(f64::from(layout.root_key));
        let period = sample.sample_rate() / root_freq;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            frames = sample.len(),
            root_key = layout.root_key,
            ?layout.loop_mode,
            "sample generator built"
        );

        Ok(Self {
            source: GeneratorSource::Sample(sample),
            loop_mode: layout.loop_mode,
            start_phase: layout.start,
            end_phase: layout.end,
            loop_start_phase: layout.loop_start,
            loop_end_phase: layout.loop_end,
            period,
            root_key: layout.root_key,
            tune_cents: layout.tune_cents,
            key_track: layout.key_track,
            vel_track: layout.vel_track,
            interpolation: layout.interpolation,
        })
    }

    /// Loop handling mode.
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Phase units per waveform cycle.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Loop region start phase.
    pub fn loop_start_phase(&self) -> f64 {
        self.loop_start_phase
    }

    /// Loop region end phase (exclusive).
    pub fn loop_end_phase(&self) -> f64 {
        self.loop_end_phase
    }

    /// Playback start phase.
    pub fn start_phase(&self) -> f64 {
        self.start_phase
    }

    /// Playback end phase (exclusive).
    pub fn end_phase(&self) -> f64 {
        self.end_phase
    }

    /// Oscillation frequency in Hz for a note, applying key/velocity
    /// tracking and tuning relative to the root key.
    pub fn frequency(&self, key: u8, velocity: u8) -> f64 {
        let cents = f64::from(i32::from(key) - i32::from(self.root_key)) * self.key_track
            + f64::from(velocity) * self.vel_track
            + self.tune_cents;
        key_to_frequency(f64::from(self.root_key)) * cents_to_ratio(cents)
    }

    /// Phase increment per output sample for playing `frequency` Hz at
    /// `output_rate`.
    #[inline]
    pub fn phase_increment(&self, frequency: f64, output_rate: f64) -> f64 {
        self.period * frequency / output_rate
    }

    /// Evaluate the waveform at one arbitrary phase.
    ///
    /// This is the feedback-modulation entry point (FM operators evaluate
    /// each other at modulated phases); sampled sources use edge
    /// duplication rather than loop wrapping for neighbor frames.
    #[inline]
    pub fn get_value(&self, phase: f64) -> f32 {
        self.evaluate(phase, false)
    }

    /// Fill `buffer` from the cursor, advancing `params.phase` by
    /// `increment` per sample and crossing as many segment boundaries as
    /// the block requires. A finished cursor zero-fills the remainder.
    pub fn get_values(&self, params: &mut GeneratorParameters, buffer: &mut [f32], increment: f64) {
        debug_assert!(increment > 0.0);
        let mut pos = 0;
        while pos < buffer.len() {
            if params.state == GeneratorState::Finished {
                buffer[pos..].fill(0.0);
                return;
            }
            let looped = params.state == GeneratorState::Loop;
            let span = params.current_end - params.phase;
            // Samples until this segment is exhausted, rounded up so the
            // final fractional step still lands inside the segment.
            let available = if span > 0.0 {
                libm::ceil(span / increment) as usize
            } else {
                0
            };
            let remaining = buffer.len() - pos;
            if available > remaining {
                for sample in &mut buffer[pos..] {
                    *sample = self.evaluate(params.phase, looped);
                    params.phase += increment;
                }
                return;
            }
            for sample in &mut buffer[pos..pos + available] {
                *sample = self.evaluate(params.phase, looped);
                params.phase += increment;
            }
            pos += available;
            self.advance_segment(params);
        }
    }

    /// Move the cursor out of the loop on note-off.
    ///
    /// Only `LoopUntilNoteOff` reacts: playback continues from the current
    /// phase through the post-loop tail. `Continuous` keeps looping (its
    /// envelope fades it out) and the non-looping modes have nothing to
    /// leave.
    pub fn release(&self, params: &mut GeneratorParameters) {
        if self.loop_mode == LoopMode::LoopUntilNoteOff && params.state != GeneratorState::Finished
        {
            params.state = GeneratorState::PostLoop;
            params.current_start = self.start_phase;
            params.current_end = self.end_phase;
        }
    }

    /// Segment transition once the cursor reaches `current_end`.
    fn advance_segment(&self, params: &mut GeneratorParameters) {
        match params.state {
            GeneratorState::PreLoop => {
                params.state = GeneratorState::Loop;
                params.current_start = self.loop_start_phase;
                params.current_end = self.loop_end_phase;
            }
            GeneratorState::Loop => {
                // Wrap preserving the fractional overshoot.
                params.phase += params.current_start - params.current_end;
            }
            GeneratorState::PostLoop => {
                params.state = GeneratorState::Finished;
            }
            GeneratorState::Finished => {}
        }
    }

    #[inline]
    fn evaluate(&self, phase: f64, looped: bool) -> f32 {
        match &self.source {
            GeneratorSource::Waveform(waveform) => evaluate_waveform(*waveform, phase),
            GeneratorSource::Sample(sample) => self.evaluate_sample(sample, phase, looped),
        }
    }

    fn evaluate_sample(&self, sample: &SampleData, phase: f64, looped: bool) -> f32 {
        let index = libm::floor(phase);
        let frac = (phase - index) as f32;
        let index = index as i64;

        match self.interpolation {
            Interpolation::None => self.tap(sample, index, looped),
            Interpolation::Linear => {
                let s0 = self.tap(sample, index, looped);
                let s1 = self.tap(sample, index + 1, looped);
                s0 + (s1 - s0) * frac
            }
            Interpolation::Cosine => {
                let s0 = self.tap(sample, index, looped);
                let s1 = self.tap(sample, index + 1, looped);
                let weight = (1.0 - libm::cosf(core::f32::consts::PI * frac)) * 0.5;
                s0 + (s1 - s0) * weight
            }
            Interpolation::Hermite => {
                let p0 = self.tap(sample, index - 1, looped);
                let p1 = self.tap(sample, index, looped);
                let p2 = self.tap(sample, index + 1, looped);
                let p3 = self.tap(sample, index + 2, looped);
                // Catmull-Rom basis.
                let c0 = p1;
                let c1 = 0.5 * (p2 - p0);
                let c2 = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
                let c3 = 0.5 * (p3 - p0) + 1.5 * (p1 - p2);
                ((c3 * frac + c2) * frac + c1) * frac + c0
            }
        }
    }

    /// Read one frame, applying the boundary policy: while the cursor is
    /// inside the loop region the signal is periodic over it, so neighbor
    /// taps wrap to the loop start; elsewhere the edge frame is
    /// duplicated.
    #[inline]
    fn tap(&self, sample: &SampleData, index: i64, looped: bool) -> f32 {
        let index = if looped {
            let loop_start = self.loop_start_phase as i64;
            let loop_len = self.loop_end_phase as i64 - loop_start;
            loop_start + (index - loop_start).rem_euclid(loop_len)
        } else {
            index.clamp(self.start_phase as i64, self.end_phase as i64 - 1)
        };
        let index = (index.max(0) as usize).min(sample.len() - 1);
        sample.frames[index]
    }
}

/// Per-voice playback cursor. Owned exclusively by one voice slot and
/// reset, never reallocated, on each note start.
#[derive(Clone, Copy, Debug)]
pub struct GeneratorParameters {
    /// Current playback phase (real-valued).
    pub phase: f64,
    /// Start of the current segment.
    pub current_start: f64,
    /// End of the current segment (exclusive).
    pub current_end: f64,
    /// Current playback segment.
    pub state: GeneratorState,
}

impl Default for GeneratorParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorParameters {
    /// An inert cursor (already finished).
    pub const fn new() -> Self {
        Self {
            phase: 0.0,
            current_start: 0.0,
            current_end: 0.0,
            state: GeneratorState::Finished,
        }
    }

    /// Reset the cursor to the generator's start phase.
    pub fn quick_setup(&mut self, generator: &Generator) {
        self.phase = generator.start_phase;
        if generator.loop_mode.is_looping() {
            if generator.start_phase < generator.loop_start_phase {
                self.state = GeneratorState::PreLoop;
                self.current_start = generator.start_phase;
                self.current_end = generator.loop_start_phase;
            } else {
                self.state = GeneratorState::Loop;
                self.current_start = generator.loop_start_phase;
                self.current_end = generator.loop_end_phase;
            }
        } else {
            self.state = GeneratorState::PostLoop;
            self.current_start = generator.start_phase;
            self.current_end = generator.end_phase;
        }
    }
}

#[inline]
fn evaluate_waveform(waveform: Waveform, phase: f64) -> f32 {
    let p = rem_euclid_f64(phase, 1.0);
    match waveform {
        Waveform::Sine => libm::sin(core::f64::consts::TAU * p) as f32,
        Waveform::Saw => (2.0 * p - 1.0) as f32,
        Waveform::Square => {
            if p < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => {
            if p < 0.5 {
                (4.0 * p - 1.0) as f32
            } else {
                (3.0 - 4.0 * p) as f32
            }
        }
        Waveform::Noise => noise_from_phase(phase),
    }
}

/// Stateless white noise: a bit-mix of the raw phase bits. Keeps the
/// shared generator immutable while still decorrelating successive
/// samples.
#[inline]
fn noise_from_phase(phase: f64) -> f32 {
    let mut x = phase.to_bits();
    x = x.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 32;
    x = x.wrapping_mul(0xD6E8_FEB8_6659_FD93);
    x ^= x >> 32;
    ((x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32
}
