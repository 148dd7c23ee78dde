//! Table-driven multi-stage envelope generator.
//!
//! Seven stages — Delay, Attack, Hold, Decay, Sustain, Release and a
//! terminal None — each described by a duration in samples, a shaping
//! curve and a scale/offset pair. The per-voice [`Envelope`] owns a fixed
//! array of stage records that [`Envelope::quick_setup`] re-derives from
//! an [`EnvelopeDescriptor`] and note velocity at voice start; nothing on
//! the render path allocates.
//!
//! Stage output is `table[floor(128 * index / duration)] * scale + offset`
//! with Decay and Release reading the table reversed (`1 - table[i]`).
//! The SoundFont volume-envelope release variant works in the decibel
//! domain so release ramps at a constant dB rate from the current gain.

use crate::curve::{CURVE_TABLE_LEN, CurveShape};
use crate::math::{db_to_gain, gain_to_db};

/// Envelope stage index. `None` is terminal and follows `Release`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvelopeStage {
    /// Output zero while counting down the delay.
    Delay = 0,
    /// Ramp from zero to the peak level.
    Attack = 1,
    /// Hold at the peak level.
    Hold = 2,
    /// Ramp from the peak down to the sustain level (reverse-read).
    Decay = 3,
    /// Hold at the sustain level.
    Sustain = 4,
    /// Ramp from the captured level down to silence (reverse-read).
    Release = 5,
    /// Terminal stage: output zero forever.
    None = 6,
}

const STAGE_COUNT: usize = 7;
const RELEASE: usize = EnvelopeStage::Release as usize;
const TERMINAL: usize = EnvelopeStage::None as usize;

/// Span of the decibel-domain release ramp. 96 dB below the captured
/// level is the SoundFont silence floor.
const SF2_RELEASE_SPAN_DB: f32 = 96.0;

/// Sustain time used by the convenience constructors: long enough to be
/// "until note-off" at any realistic sample rate.
const EFFECTIVELY_FOREVER: f32 = 1.0e8;

/// Immutable per-instrument envelope timing and level parameters.
///
/// Times are in seconds. Each stage's velocity-to-time term adds
/// `vel_to_time * velocity` seconds (velocity normalized to 0..=1), so a
/// negative value shortens the stage for harder hits.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EnvelopeDescriptor {
    /// Stage times in seconds, indexed by [`EnvelopeStage`] (Delay through
    /// Release).
    pub times: [f32; 6],
    /// Velocity-to-time scaling per stage, in seconds per unit velocity.
    pub vel_to_times: [f32; 6],
    /// Level held by Sustain, as a fraction of the peak.
    pub sustain_level: f32,
    /// Level reached at the end of Attack.
    pub peak_level: f32,
    /// Shaping curve per stage.
    pub curves: [CurveShape; 6],
}

impl Default for EnvelopeDescriptor {
    fn default() -> Self {
        Self {
            times: [0.0; 6],
            vel_to_times: [0.0; 6],
            sustain_level: 1.0,
            peak_level: 1.0,
            curves: [
                CurveShape::Sustain, // Delay
                CurveShape::Convex,  // Attack
                CurveShape::Sustain, // Hold
                CurveShape::Linear,  // Decay
                CurveShape::Sustain, // Sustain
                CurveShape::Linear,  // Release
            ],
        }
    }
}

impl EnvelopeDescriptor {
    /// A DAHDSR envelope that sustains until note-off.
    pub fn dahdsr(
        delay: f32,
        attack: f32,
        hold: f32,
        decay: f32,
        sustain_level: f32,
        release: f32,
    ) -> Self {
        Self {
            times: [delay, attack, hold, decay, EFFECTIVELY_FOREVER, release],
            sustain_level,
            ..Self::default()
        }
    }

    /// A plain ADSR envelope that sustains until note-off.
    pub fn adsr(attack: f32, decay: f32, sustain_level: f32, release: f32) -> Self {
        Self::dahdsr(0.0, attack, 0.0, decay, sustain_level, release)
    }

    /// Time in seconds for one stage.
    pub fn time(&self, stage: EnvelopeStage) -> f32 {
        self.times[stage as usize]
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct StageRecord {
    duration: u32,
    curve: CurveShape,
    reverse: bool,
    scale: f32,
    offset: f32,
    decibel: bool,
}

impl StageRecord {
    #[inline]
    fn evaluate(&self, index: u32) -> f32 {
        let table_index = if self.duration == 0 {
            0
        } else {
            (CURVE_TABLE_LEN as u64 * u64::from(index) / u64::from(self.duration)) as usize
        };
        let mut y = self.curve.at(table_index);
        if self.reverse {
            y = 1.0 - y;
        }
        if self.decibel {
            db_to_gain(self.offset + (y - 1.0) * self.scale)
        } else {
            y * self.scale + self.offset
        }
    }
}

/// Per-voice envelope instance: stage records, stage cursor, and output.
///
/// Exactly one lives in each voice slot per envelope role; it is reset by
/// [`Envelope::quick_setup`] on every note start and never reallocated.
#[derive(Clone, Copy, Debug)]
pub struct Envelope {
    stages: [StageRecord; STAGE_COUNT],
    current: usize,
    index: u32,
    value: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// An inert envelope, already in the terminal stage.
    pub const fn new() -> Self {
        Self {
            stages: [StageRecord {
                duration: 0,
                curve: CurveShape::Sustain,
                reverse: false,
                scale: 0.0,
                offset: 0.0,
                decibel: false,
            }; STAGE_COUNT],
            current: TERMINAL,
            index: 0,
            value: 0.0,
        }
    }

    /// Re-derive all stage records from a descriptor and note velocity.
    ///
    /// Stage durations are `max(0, round(rate * (time + vel_to_time *
    /// velocity)))`. The cursor lands on the first stage with a non-zero
    /// duration — possibly Release or even the terminal stage when every
    /// time is zero.
    pub fn quick_setup(&mut self, sample_rate: f32, velocity: u8, descriptor: &EnvelopeDescriptor) {
        let vel = f32::from(velocity) / 127.0;
        let peak = descriptor.peak_level;
        let sustain = descriptor.sustain_level.clamp(0.0, 1.0) * peak;

        let mut durations = [0u32; 6];
        for (i, duration) in durations.iter_mut().enumerate() {
            let seconds = descriptor.times[i] + descriptor.vel_to_times[i] * vel;
            *duration = seconds_to_samples(sample_rate, seconds);
        }

        self.stages[EnvelopeStage::Delay as usize] = StageRecord {
            duration: durations[0],
            curve: CurveShape::Sustain,
            scale: 0.0,
            ..StageRecord::default()
        };
        self.stages[EnvelopeStage::Attack as usize] = StageRecord {
            duration: durations[1],
            curve: descriptor.curves[1],
            scale: peak,
            ..StageRecord::default()
        };
        self.stages[EnvelopeStage::Hold as usize] = StageRecord {
            duration: durations[2],
            curve: CurveShape::Sustain,
            scale: peak,
            ..StageRecord::default()
        };
        self.stages[EnvelopeStage::Decay as usize] = StageRecord {
            duration: durations[3],
            curve: descriptor.curves[3],
            reverse: true,
            scale: peak - sustain,
            offset: sustain,
            ..StageRecord::default()
        };
        self.stages[EnvelopeStage::Sustain as usize] = StageRecord {
            duration: durations[4],
            curve: CurveShape::Sustain,
            scale: sustain,
            ..StageRecord::default()
        };
        // Release defaults to ramping from the sustain level; an early
        // release() recaptures the scale from the live value.
        self.stages[RELEASE] = StageRecord {
            duration: durations[5],
            curve: descriptor.curves[5],
            reverse: true,
            scale: sustain,
            offset: 0.0,
            ..StageRecord::default()
        };
        self.stages[TERMINAL] = StageRecord {
            duration: u32::MAX,
            curve: CurveShape::Sustain,
            scale: 0.0,
            ..StageRecord::default()
        };

        self.current = 0;
        self.index = 0;
        while self.current < TERMINAL && self.stages[self.current].duration == 0 {
            self.current += 1;
        }
        self.update_value();
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        match self.current {
            0 => EnvelopeStage::Delay,
            1 => EnvelopeStage::Attack,
            2 => EnvelopeStage::Hold,
            3 => EnvelopeStage::Decay,
            4 => EnvelopeStage::Sustain,
            5 => EnvelopeStage::Release,
            _ => EnvelopeStage::None,
        }
    }

    /// Current output level.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// True once the terminal stage is reached; the output is zero and
    /// will stay zero.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.current == TERMINAL
    }

    /// Advance by `samples`, crossing as many stage boundaries as needed.
    pub fn increment(&mut self, samples: u32) {
        let mut remaining = samples;
        while self.current < TERMINAL {
            let left = self.stages[self.current].duration - self.index;
            if remaining < left {
                self.index += remaining;
                break;
            }
            remaining -= left;
            self.advance_stage();
        }
        self.update_value();
    }

    /// Begin the release ramp from the current output level.
    ///
    /// A value at or below `lower_limit` jumps straight to the terminal
    /// stage — an inaudible voice must not linger through a release tail.
    /// Calls while already in (or past) Release are ignored.
    pub fn release(&mut self, lower_limit: f32) {
        self.start_release(lower_limit, false);
    }

    /// Decibel-domain release for SoundFont volume envelopes: the ramp
    /// falls at a constant dB rate from the current gain to the 96 dB
    /// floor.
    pub fn release_sf2_volume(&mut self, lower_limit: f32) {
        self.start_release(lower_limit, true);
    }

    fn start_release(&mut self, lower_limit: f32, decibel: bool) {
        if self.value <= lower_limit {
            self.current = TERMINAL;
            self.index = 0;
            self.update_value();
            return;
        }
        if self.current >= RELEASE {
            return;
        }
        let record = &mut self.stages[RELEASE];
        if decibel {
            record.scale = SF2_RELEASE_SPAN_DB;
            record.offset = gain_to_db(self.value);
            record.decibel = true;
        } else {
            record.scale = self.value;
            record.offset = 0.0;
            record.decibel = false;
        }
        self.current = RELEASE;
        self.index = 0;
        if self.stages[RELEASE].duration == 0 {
            self.current = TERMINAL;
        }
        self.update_value();
    }

    fn advance_stage(&mut self) {
        self.index = 0;
        self.current += 1;
        while self.current < TERMINAL && self.stages[self.current].duration == 0 {
            self.current += 1;
        }
    }

    fn update_value(&mut self) {
        self.value = self.stages[self.current].evaluate(self.index);
    }
}

fn seconds_to_samples(sample_rate: f32, seconds: f32) -> u32 {
    let samples = libm::roundf(sample_rate * seconds);
    if samples <= 0.0 {
        0
    } else if samples >= u32::MAX as f32 {
        u32::MAX
    } else {
        samples as u32
    }
}
