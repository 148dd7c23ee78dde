//! 2-operator FM instrument.
//!
//! A phase-accumulator modulator/carrier pair: the modulator (optionally
//! fed back into its own phase) deviates the carrier's phase, scaled by
//! a modulation-index envelope. Phase wrap policy is the audible part:
//! `Soft` wraps each oscillator independently modulo its loop interval,
//! `Hard` forces both back to loop start together when the carrier
//! crosses its loop end.

use tonada_core::{
    EnvelopeDescriptor, Generator, LoopMode, cents_to_ratio, db_to_gain,
};

use crate::LoadError;
use crate::channel::{ChannelParameters, velocity_gain};
use crate::descriptor::DescriptorList;
use crate::patch::ENVELOPE_SILENCE;
use crate::sample::SampleStore;
use crate::voice::{
    MICRO_BLOCK_FRAMES, PatchScratch, RenderContext, VoiceParameters, VoiceState, mix_declicked,
};

/// Phase-sync policy for the operator pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncMode {
    /// Each oscillator wraps independently modulo its own loop interval.
    #[default]
    Soft,
    /// The carrier crossing its loop end snaps both oscillators back to
    /// their loop starts in the same sample. The modulator's own boundary
    /// is deliberately never checked — the carrier drives the reset.
    Hard,
}

/// 2-operator FM patch.
///
/// Component slots: generator 0 = carrier, generator 1 = modulator,
/// envelope 0 = amplitude, envelope 1 = modulation index.
#[derive(Clone, Debug)]
pub struct Fm2Patch {
    name: String,
    exclusive_group: u32,
    tune_cents: f64,
    attenuation_db: f32,
    carrier: Generator,
    modulator: Generator,
    amplitude_envelope: EnvelopeDescriptor,
    index_envelope: EnvelopeDescriptor,
    carrier_ratio: f64,
    modulator_ratio: f64,
    modulation_depth: f64,
    feedback: f64,
    sync: SyncMode,
}

impl Fm2Patch {
    /// Record id carrying the FM parameters in a descriptor list.
    pub const CUSTOM_ID: &'static str = "fm2";

    /// Build from an instrument descriptor list.
    ///
    /// Generator records 0/1 are carrier/modulator (default sine);
    /// envelope records 0/1 are amplitude/index. The `fm2` custom record
    /// supplies `carrier_ratio`, `modulator_ratio`, `depth`, `feedback`
    /// and `sync` (`"soft"`/`"hard"`).
    pub fn load(
        name: impl Into<String>,
        descriptors: &DescriptorList,
        samples: &SampleStore,
    ) -> Result<Self, LoadError> {
        let carrier = match descriptors.generators.first() {
            Some(descriptor) => descriptor.build(samples)?,
            None => Generator::from_waveform(tonada_core::Waveform::Sine, LoopMode::Continuous),
        };
        let modulator = match descriptors.generators.get(1) {
            Some(descriptor) => descriptor.build(samples)?,
            None => Generator::from_waveform(tonada_core::Waveform::Sine, LoopMode::Continuous),
        };

        let custom = descriptors.custom(Self::CUSTOM_ID);
        let number = |key: &str, default: f64| {
            custom.and_then(|c| c.number(key)).unwrap_or(default)
        };
        let sync = match custom.and_then(|c| c.text("sync")) {
            None | Some("soft") => SyncMode::Soft,
            Some("hard") => SyncMode::Hard,
            Some(other) => {
                return Err(LoadError::InvalidDescriptor(format!(
                    "unknown fm2 sync mode: {other}"
                )));
            }
        };

        let modulation_depth = number("depth", 1.0);
        if modulation_depth < 0.0 {
            return Err(LoadError::InvalidDescriptor(
                "fm2 depth must be non-negative".into(),
            ));
        }

        Ok(Self {
            name: name.into(),
            exclusive_group: descriptors.exclusive_group,
            tune_cents: descriptors.tune_cents,
            attenuation_db: descriptors.attenuation_db,
            carrier,
            modulator,
            amplitude_envelope: descriptors
                .envelope(0)
                .copied()
                .unwrap_or_else(|| EnvelopeDescriptor::adsr(0.005, 0.1, 0.7, 0.1)),
            index_envelope: descriptors
                .envelope(1)
                .copied()
                .unwrap_or_else(|| EnvelopeDescriptor::adsr(0.0, 0.0, 1.0, 0.1)),
            carrier_ratio: number("carrier_ratio", 1.0),
            modulator_ratio: number("modulator_ratio", 1.0),
            modulation_depth,
            feedback: number("feedback", 0.0),
            sync,
        })
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive group identifier.
    pub fn exclusive_group(&self) -> u32 {
        self.exclusive_group
    }

    /// Phase-sync policy.
    pub fn sync(&self) -> SyncMode {
        self.sync
    }

    pub(crate) fn start(
        &self,
        params: &mut VoiceParameters,
        ctx: &RenderContext,
        _channel: &ChannelParameters,
    ) -> bool {
        params.generators[0].quick_setup(&self.carrier);
        params.generators[1].quick_setup(&self.modulator);
        params.envelopes[0].quick_setup(ctx.sample_rate, params.velocity, &self.amplitude_envelope);
        params.envelopes[1].quick_setup(ctx.sample_rate, params.velocity, &self.index_envelope);
        params.exclusive_group = self.exclusive_group;
        params.pitch_offset_cents = self.tune_cents;
        params.volume_offset_db = -self.attenuation_db;
        params.scratch = PatchScratch::Fm2 { feedback: 0.0 };

        if params.envelopes[0].is_finished() {
            return false;
        }
        params.state = VoiceState::Playing;
        true
    }

    pub(crate) fn process(
        &self,
        params: &mut VoiceParameters,
        ctx: &RenderContext,
        channel: &ChannelParameters,
        output: &mut [f32],
    ) {
        if params.state == VoiceState::Stopped {
            return;
        }
        let frames = output.len() / ctx.channels;
        debug_assert!(frames <= MICRO_BLOCK_FRAMES);

        params.envelopes[0].increment(frames as u32);
        params.envelopes[1].increment(frames as u32);
        let index = self.modulation_depth * f64::from(params.envelopes[1].value());

        let cents = channel.pitch_offset_cents() + params.pitch_offset_cents;
        let ratio = cents_to_ratio(cents);
        let sample_rate = f64::from(ctx.sample_rate);
        let carrier_increment = self.carrier.phase_increment(
            self.carrier.frequency(params.note, params.velocity) * self.carrier_ratio * ratio,
            sample_rate,
        );
        let modulator_increment = self.modulator.phase_increment(
            self.modulator.frequency(params.note, params.velocity) * self.modulator_ratio * ratio,
            sample_rate,
        );

        let carrier_loop_start = self.carrier.loop_start_phase();
        let carrier_loop_end = self.carrier.loop_end_phase();
        let carrier_loop_len = carrier_loop_end - carrier_loop_start;
        let modulator_loop_start = self.modulator.loop_start_phase();
        let modulator_loop_end = self.modulator.loop_end_phase();
        let modulator_loop_len = modulator_loop_end - modulator_loop_start;

        let mut carrier_phase = params.generators[0].phase;
        let mut modulator_phase = params.generators[1].phase;
        let mut feedback_sample = match params.scratch {
            PatchScratch::Fm2 { feedback } => feedback,
            _ => 0.0,
        };

        for sample in &mut params.block_buffer[..frames] {
            let modulator_out = self
                .modulator
                .get_value(modulator_phase + self.feedback * f64::from(feedback_sample));
            *sample = self
                .carrier
                .get_value(carrier_phase + index * f64::from(modulator_out));
            feedback_sample = modulator_out;

            carrier_phase += carrier_increment;
            modulator_phase += modulator_increment;
            match self.sync {
                SyncMode::Soft => {
                    if carrier_phase >= carrier_loop_end {
                        carrier_phase -= carrier_loop_len;
                    }
                    if modulator_phase >= modulator_loop_end {
                        modulator_phase -= modulator_loop_len;
                    }
                }
                SyncMode::Hard => {
                    // Carrier-driven: the modulator resets here and only
                    // here, in the same sample as the carrier wrap.
                    if carrier_phase >= carrier_loop_end {
                        carrier_phase = carrier_loop_start + (carrier_phase - carrier_loop_end);
                        modulator_phase = modulator_loop_start;
                    }
                }
            }
        }

        params.generators[0].phase = carrier_phase;
        params.generators[1].phase = modulator_phase;
        params.scratch = PatchScratch::Fm2 {
            feedback: feedback_sample,
        };

        let amp = params.envelopes[0].value()
            * velocity_gain(params.velocity)
            * channel.gain()
            * db_to_gain(params.volume_offset_db);
        let (pan_left, pan_right) = channel.pan_gains();
        let target = (amp * pan_left, amp * pan_right);
        mix_declicked(
            &params.block_buffer[..frames],
            output,
            ctx.channels,
            (params.gain_left, params.gain_right),
            target,
        );
        params.gain_left = target.0;
        params.gain_right = target.1;

        if params.envelopes[0].is_finished() {
            params.state = VoiceState::Stopped;
        }
    }

    pub(crate) fn stop(&self, params: &mut VoiceParameters) {
        if self.carrier.loop_mode() == LoopMode::OneShot {
            return;
        }
        params.envelopes[0].release(ENVELOPE_SILENCE);
        params.envelopes[1].release(ENVELOPE_SILENCE);
        params.state = VoiceState::Stopping;
    }
}
