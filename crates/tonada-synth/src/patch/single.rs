//! Single-oscillator instrument.

use tonada_core::{
    EnvelopeDescriptor, FilterDescriptor, Generator, GeneratorState, LfoDescriptor, LoopMode,
    cents_to_ratio, db_to_gain,
};

use crate::channel::{ChannelParameters, velocity_gain};
use crate::descriptor::DescriptorList;
use crate::patch::ENVELOPE_SILENCE;
use crate::sample::SampleStore;
use crate::voice::{MICRO_BLOCK_FRAMES, RenderContext, VoiceParameters, VoiceState, mix_declicked};
use crate::LoadError;

/// One generator through a volume envelope, an optional filter, and a
/// mod-wheel-driven vibrato LFO.
///
/// Component slots: generator 0, envelope 0, filter 0, LFO 0.
#[derive(Clone, Debug)]
pub struct SinglePatch {
    name: String,
    exclusive_group: u32,
    tune_cents: f64,
    attenuation_db: f32,
    generator: Generator,
    volume_envelope: EnvelopeDescriptor,
    filter: FilterDescriptor,
    vibrato: LfoDescriptor,
}

impl SinglePatch {
    /// Build from an instrument descriptor list.
    ///
    /// Requires one generator record; envelope/filter/LFO records are
    /// optional (slot 0 each) and default to an organ-style instant
    /// envelope, no filter, and a 5 Hz vibrato.
    pub fn load(
        name: impl Into<String>,
        descriptors: &DescriptorList,
        samples: &SampleStore,
    ) -> Result<Self, LoadError> {
        let generator = descriptors
            .generators
            .first()
            .ok_or_else(|| {
                LoadError::InvalidDescriptor("single patch requires a generator record".into())
            })?
            .build(samples)?;
        Ok(Self {
            name: name.into(),
            exclusive_group: descriptors.exclusive_group,
            tune_cents: descriptors.tune_cents,
            attenuation_db: descriptors.attenuation_db,
            generator,
            volume_envelope: descriptors
                .envelope(0)
                .copied()
                .unwrap_or_else(|| EnvelopeDescriptor::adsr(0.002, 0.0, 1.0, 0.05)),
            filter: descriptors.filter(0).copied().unwrap_or_default(),
            vibrato: descriptors.lfo(0).cloned().unwrap_or_default(),
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

    /// The shared generator.
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub(crate) fn start(
        &self,
        params: &mut VoiceParameters,
        ctx: &RenderContext,
        _channel: &ChannelParameters,
    ) -> bool {
        params.generators[0].quick_setup(&self.generator);
        params.envelopes[0].quick_setup(ctx.sample_rate, params.velocity, &self.volume_envelope);
        params.filters[0].quick_setup(ctx.sample_rate, params.note, params.velocity, &self.filter);
        params.lfos[0].quick_setup(ctx.sample_rate, &self.vibrato);
        params.exclusive_group = self.exclusive_group;
        params.pitch_offset_cents = self.tune_cents;
        params.volume_offset_db = -self.attenuation_db;

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

        params.envelopes[0].increment(frames as u32);
        params.lfos[0].increment(frames as u32);

        let vibrato_cents = f64::from(params.lfos[0].value() * channel.modulation_cents());
        let cents = channel.pitch_offset_cents() + params.pitch_offset_cents + vibrato_cents;
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
            if params.filters[0].is_dirty() {
                params.filters[0].apply_filter_interp(&mut params.block_buffer[..frames]);
            } else {
                params.filters[0].apply_filter_buffer(&mut params.block_buffer[..frames]);
            }
        }

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
        self.generator.release(&mut params.generators[0]);
        params.state = VoiceState::Stopping;
    }
}
