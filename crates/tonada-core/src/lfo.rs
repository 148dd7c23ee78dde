//! Delay-then-loop low-frequency modulator.
//!
//! An [`Lfo`] sits on top of a [`Generator`] shape: it outputs zero while
//! a delay counter runs down, then cycles the generator's loop region
//! forever. Voices advance it in block-sized steps alongside their
//! envelopes.

use crate::generator::{
    DEFAULT_SAW, DEFAULT_SINE, DEFAULT_SQUARE, DEFAULT_TRIANGLE, Generator, Waveform,
};
use crate::math::rem_euclid_f64;

/// Immutable LFO parameters shared by all voices of an instrument.
///
/// The shape defaults to the process-wide sine generator; a custom
/// generator (for wavetable LFO shapes) overrides the waveform selector.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LfoDescriptor {
    /// Seconds of silence before the LFO starts.
    pub delay_time: f32,
    /// Oscillation frequency in Hz.
    pub frequency: f32,
    /// Output amplitude scaling.
    pub depth: f32,
    /// Analytic shape used when no custom generator is set.
    pub waveform: Waveform,
    /// Optional custom shape (not serialized; wired up by loaders).
    #[cfg_attr(feature = "serde", serde(skip))]
    pub generator: Option<Generator>,
}

impl Default for LfoDescriptor {
    fn default() -> Self {
        Self {
            delay_time: 0.0,
            frequency: 5.0,
            depth: 1.0,
            waveform: Waveform::Sine,
            generator: None,
        }
    }
}

impl LfoDescriptor {
    fn shape(&self) -> Generator {
        if let Some(generator) = &self.generator {
            return generator.clone();
        }
        match self.waveform {
            Waveform::Sine | Waveform::Noise => DEFAULT_SINE.clone(),
            Waveform::Saw => DEFAULT_SAW.clone(),
            Waveform::Square => DEFAULT_SQUARE.clone(),
            Waveform::Triangle => DEFAULT_TRIANGLE.clone(),
        }
    }
}

/// LFO run state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LfoState {
    /// Counting down the delay; output is zero.
    #[default]
    Delay,
    /// Cycling the generator's loop region.
    Sustain,
}

/// Per-voice LFO instance. Reset by [`Lfo::quick_setup`] on note start.
#[derive(Clone, Debug)]
pub struct Lfo {
    generator: Generator,
    state: LfoState,
    phase: f64,
    increment: f64,
    delay_remaining: f64,
    depth: f32,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new()
    }
}

impl Lfo {
    /// An inert LFO (infinite delay, zero depth).
    pub fn new() -> Self {
        Self {
            generator: DEFAULT_SINE.clone(),
            state: LfoState::Delay,
            phase: 0.0,
            increment: 0.0,
            delay_remaining: f64::MAX,
            depth: 0.0,
        }
    }

    /// Reset from a descriptor for a new note.
    pub fn quick_setup(&mut self, sample_rate: f32, descriptor: &LfoDescriptor) {
        self.generator = descriptor.shape();
        self.phase = self.generator.loop_start_phase();
        self.increment =
            self.generator.period() * f64::from(descriptor.frequency) / f64::from(sample_rate);
        self.delay_remaining = f64::from(sample_rate) * f64::from(descriptor.delay_time);
        self.state = if self.delay_remaining > 0.0 {
            LfoState::Delay
        } else {
            LfoState::Sustain
        };
        self.depth = descriptor.depth;
    }

    /// Current run state.
    pub fn state(&self) -> LfoState {
        self.state
    }

    /// Current phase within the shape generator.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current output: zero during the delay, otherwise the shape value
    /// scaled by the descriptor depth.
    #[inline]
    pub fn value(&self) -> f32 {
        match self.state {
            LfoState::Delay => 0.0,
            LfoState::Sustain => self.generator.get_value(self.phase) * self.depth,
        }
    }

    /// Advance by `amount` samples.
    ///
    /// Crossing the end of the delay seeds the phase into the loop region
    /// scaled by the fractional overshoot, so a delay ending mid-block
    /// does not quantize the LFO start to a block boundary.
    pub fn increment(&mut self, amount: u32) {
        match self.state {
            LfoState::Delay => {
                self.delay_remaining -= f64::from(amount);
                if self.delay_remaining <= 0.0 {
                    let overshoot = -self.delay_remaining;
                    self.phase = self.generator.loop_start_phase() + overshoot * self.increment;
                    self.wrap_phase();
                    self.state = LfoState::Sustain;
                }
            }
            LfoState::Sustain => {
                self.phase += self.increment * f64::from(amount);
                self.wrap_phase();
            }
        }
    }

    #[inline]
    fn wrap_phase(&mut self) {
        let loop_start = self.generator.loop_start_phase();
        let loop_end = self.generator.loop_end_phase();
        if self.phase >= loop_end {
            self.phase = loop_start + rem_euclid_f64(self.phase - loop_start, loop_end - loop_start);
        }
    }
}
