//! SFZ-derived sampled instrument.
//!
//! The SFZ region model routes three dedicated envelope/LFO pairs:
//! amplitude (ampeg/amplfo), filter (fileg/fillfo), and pitch
//! (pitcheg/pitchlfo), each with a per-target depth fixed at load time.

use tonada_core::{
    EnvelopeDescriptor, FilterDescriptor, Generator, GeneratorState, LfoDescriptor, LoopMode,
    cents_to_ratio, db_to_gain,
};

use crate::LoadError;
use crate::channel::{ChannelParameters, velocity_gain};
use crate::descriptor::DescriptorList;
use crate::patch::ENVELOPE_SILENCE;
use crate::sample::SampleStore;
use crate::voice::{
    MICRO_BLOCK_FRAMES, PatchScratch, RenderContext, VoiceParameters, VoiceState, mix_declicked,
};

/// SFZ-style sampled patch.
///
/// Component slots: generator 0; envelopes 0/1/2 = amplitude / filter /
/// pitch; LFOs 0/1/2 = amplitude / filter / pitch; filter 0.
#[derive(Clone, Debug)]
pub struct SfzPatch {
    name: String,
    exclusive_group: u32,
    tune_cents: f64,
    attenuation_db: f32,
    generator: Generator,
    amplitude_envelope: EnvelopeDescriptor,
    filter_envelope: EnvelopeDescriptor,
    pitch_envelope: EnvelopeDescriptor,
    amplitude_lfo: LfoDescriptor,
    filter_lfo: LfoDescriptor,
    pitch_lfo: LfoDescriptor,
    filter: FilterDescriptor,
    filter_env_to_cutoff: f32,
    pitch_env_to_pitch: f32,
    amp_lfo_to_volume: f32,
    filter_lfo_to_cutoff: f32,
    pitch_lfo_to_pitch: f32,
}

impl SfzPatch {
    /// Record id carrying the routing depths.
    pub const CUSTOM_ID: &'static str = "sfz";

    /// Build from an instrument descriptor list.
    ///
    /// Requires one generator record. Envelope records 0/1/2 are
    /// amplitude/filter/pitch, LFO records likewise. The `sfz` custom
    /// record supplies `filter_env_to_cutoff`, `pitch_env_to_pitch`,
    /// `filter_lfo_to_cutoff` and `pitch_lfo_to_pitch` in cents and
    /// `amp_lfo_to_volume` in dB.
    pub fn load(
        name: impl Into<String>,
        descriptors: &DescriptorList,
        samples: &SampleStore,
    ) -> Result<Self, LoadError> {
        let generator = descriptors
            .generators
            .first()
            .ok_or_else(|| {
                LoadError::InvalidDescriptor("sfz patch requires a generator record".into())
            })?
            .build(samples)?;

        let custom = descriptors.custom(Self::CUSTOM_ID);
        let number =
            |key: &str| custom.and_then(|c| c.number(key)).unwrap_or(0.0) as f32;

        let sustained = || EnvelopeDescriptor::adsr(0.0, 0.0, 1.0, 0.05);
        Ok(Self {
            name: name.into(),
            exclusive_group: descriptors.exclusive_group,
            tune_cents: descriptors.tune_cents,
            attenuation_db: descriptors.attenuation_db,
            generator,
            amplitude_envelope: descriptors
                .envelope(0)
                .copied()
                .unwrap_or_else(|| EnvelopeDescriptor::adsr(0.002, 0.0, 1.0, 0.05)),
            filter_envelope: descriptors.envelope(1).copied().unwrap_or_else(sustained),
            pitch_envelope: descriptors.envelope(2).copied().unwrap_or_else(sustained),
            amplitude_lfo: descriptors.lfo(0).cloned().unwrap_or_default(),
            filter_lfo: descriptors.lfo(1).cloned().unwrap_or_default(),
            pitch_lfo: descriptors.lfo(2).cloned().unwrap_or_default(),
            filter: descriptors.filter(0).copied().unwrap_or_default(),
            filter_env_to_cutoff: number("filter_env_to_cutoff"),
            pitch_env_to_pitch: number("pitch_env_to_pitch"),
            amp_lfo_to_volume: number("amp_lfo_to_volume"),
            filter_lfo_to_cutoff: number("filter_lfo_to_cutoff"),
            pitch_lfo_to_pitch: number("pitch_lfo_to_pitch"),
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

    pub(crate) fn start(
        &self,
        params: &mut VoiceParameters,
        ctx: &RenderContext,
        _channel: &ChannelParameters,
    ) -> bool {
        params.generators[0].quick_setup(&self.generator);
        params.envelopes[0].quick_setup(ctx.sample_rate, params.velocity, &self.amplitude_envelope);
        params.envelopes[1].quick_setup(ctx.sample_rate, params.velocity, &self.filter_envelope);
        params.envelopes[2].quick_setup(ctx.sample_rate, params.velocity, &self.pitch_envelope);
        params.lfos[0].quick_setup(ctx.sample_rate, &self.amplitude_lfo);
        params.lfos[1].quick_setup(ctx.sample_rate, &self.filter_lfo);
        params.lfos[2].quick_setup(ctx.sample_rate, &self.pitch_lfo);
        params.filters[0].quick_setup(ctx.sample_rate, params.note, params.velocity, &self.filter);
        params.exclusive_group = self.exclusive_group;
        params.pitch_offset_cents = self.tune_cents;
        params.volume_offset_db = -self.attenuation_db;
        params.scratch = PatchScratch::Sampled {
            base_cutoff: params.filters[0].cutoff(),
        };

        if params.envelopes[0].is_finished()
            || params.generators[0].state == GeneratorState::Finished
        {
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

        for envelope in &mut params.envelopes[..3] {
            envelope.increment(frames as u32);
        }
        for lfo in &mut params.lfos[..3] {
            lfo.increment(frames as u32);
        }

        let pitch_env = params.envelopes[2].value();
        let pitch_lfo = params.lfos[2].value();
        let cents = channel.pitch_offset_cents()
            + params.pitch_offset_cents
            + f64::from(pitch_env * self.pitch_env_to_pitch)
            + f64::from(pitch_lfo * (self.pitch_lfo_to_pitch + channel.modulation_cents()));
        let frequency =
            self.generator.frequency(params.note, params.velocity) * cents_to_ratio(cents);
        let increment = self
            .generator
            .phase_increment(frequency, f64::from(ctx.sample_rate));
        self.generator.get_values(
            &mut params.generators[0],
            &mut params.block_buffer[..frames],
            increment,
        );

        if params.filters[0].is_enabled() {
            let base_cutoff = match params.scratch {
                PatchScratch::Sampled { base_cutoff } => base_cutoff,
                _ => self.filter.cutoff_hz,
            };
            let filter_cents = f64::from(
                params.envelopes[1].value() * self.filter_env_to_cutoff
                    + params.lfos[1].value() * self.filter_lfo_to_cutoff,
            );
            params.filters[0].set_cutoff(base_cutoff * cents_to_ratio(filter_cents) as f32);
            if params.filters[0].is_dirty() {
                params.filters[0].apply_filter_interp(&mut params.block_buffer[..frames]);
            } else {
                params.filters[0].apply_filter_buffer(&mut params.block_buffer[..frames]);
            }
        }

        let tremolo_db = params.lfos[0].value() * self.amp_lfo_to_volume;
        let amp = params.envelopes[0].value()
            * velocity_gain(params.velocity)
            * channel.gain()
            * db_to_gain(params.volume_offset_db + tremolo_db);
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

        if params.envelopes[0].is_finished()
            || params.generators[0].state == GeneratorState::Finished
        {
            params.state = VoiceState::Stopped;
        }
    }

    pub(crate) fn stop(&self, params: &mut VoiceParameters) {
        if self.generator.loop_mode() == LoopMode::OneShot {
            return;
        }
        params.envelopes[0].release(ENVELOPE_SILENCE);
        params.envelopes[1].release(ENVELOPE_SILENCE);
        params.envelopes[2].release(ENVELOPE_SILENCE);
        self.generator.release(&mut params.generators[0]);
        params.state = VoiceState::Stopping;
    }
}
