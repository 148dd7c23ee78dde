//! SoundFont-derived sampled instrument.
//!
//! The SoundFont routing model: a volume envelope (decibel-domain
//! release), a modulation envelope driving pitch and filter cutoff, a
//! modulation LFO driving pitch, filter and volume, a vibrato LFO driving
//! pitch only, and a resonant lowpass. Sensitivities are fixed per
//! instrument at load time.

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

/// SoundFont-style sampled patch.
///
/// Component slots: generator 0; envelope 0 = volume, envelope 1 =
/// modulation; LFO 0 = modulation, LFO 1 = vibrato; filter 0.
#[derive(Clone, Debug)]
pub struct Sf2Patch {
    name: String,
    exclusive_group: u32,
    tune_cents: f64,
    attenuation_db: f32,
    generator: Generator,
    volume_envelope: EnvelopeDescriptor,
    modulation_envelope: EnvelopeDescriptor,
    modulation_lfo: LfoDescriptor,
    vibrato_lfo: LfoDescriptor,
    filter: FilterDescriptor,
    mod_lfo_to_pitch: f32,
    vib_lfo_to_pitch: f32,
    mod_env_to_pitch: f32,
    mod_env_to_filter: f32,
    mod_lfo_to_filter: f32,
    mod_lfo_to_volume: f32,
}

impl Sf2Patch {
    /// Record id carrying the modulation sensitivities.
    pub const CUSTOM_ID: &'static str = "sf2";

    /// Build from an instrument descriptor list.
    ///
    /// Requires one generator record. Envelope records 0/1 are
    /// volume/modulation, LFO records 0/1 are modulation/vibrato, filter
    /// record 0 is the lowpass. The `sf2` custom record supplies the
    /// routing sensitivities in cents (volume term in dB).
    pub fn load(
        name: impl Into<String>,
        descriptors: &DescriptorList,
        samples: &SampleStore,
    ) -> Result<Self, LoadError> {
        let generator = descriptors
            .generators
            .first()
            .ok_or_else(|| {
                LoadError::InvalidDescriptor("sf2 patch requires a generator record".into())
            })?
            .build(samples)?;

        let custom = descriptors.custom(Self::CUSTOM_ID);
        let number =
            |key: &str| custom.and_then(|c| c.number(key)).unwrap_or(0.0) as f32;

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
            modulation_envelope: descriptors
                .envelope(1)
                .copied()
                .unwrap_or_else(|| EnvelopeDescriptor::adsr(0.0, 0.0, 1.0, 0.05)),
            modulation_lfo: descriptors.lfo(0).cloned().unwrap_or_default(),
            vibrato_lfo: descriptors.lfo(1).cloned().unwrap_or_default(),
            filter: descriptors.filter(0).copied().unwrap_or_default(),
            mod_lfo_to_pitch: number("mod_lfo_to_pitch"),
            vib_lfo_to_pitch: number("vib_lfo_to_pitch"),
            mod_env_to_pitch: number("mod_env_to_pitch"),
            mod_env_to_filter: number("mod_env_to_filter"),
            mod_lfo_to_filter: number("mod_lfo_to_filter"),
            mod_lfo_to_volume: number("mod_lfo_to_volume"),
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
        params.envelopes[0].quick_setup(ctx.sample_rate, params.velocity, &self.volume_envelope);
        params.envelopes[1].quick_setup(
            ctx.sample_rate,
            params.velocity,
            &self.modulation_envelope,
        );
        params.lfos[0].quick_setup(ctx.sample_rate, &self.modulation_lfo);
        params.lfos[1].quick_setup(ctx.sample_rate, &self.vibrato_lfo);
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

        params.envelopes[0].increment(frames as u32);
        params.envelopes[1].increment(frames as u32);
        params.lfos[0].increment(frames as u32);
        params.lfos[1].increment(frames as u32);

        let modulation_env = params.envelopes[1].value();
        let modulation_lfo = params.lfos[0].value();
        let vibrato_lfo = params.lfos[1].value();

        // Pitch: channel state plus the three SoundFont pitch sources.
        // The mod wheel deepens vibrato on top of the fixed sensitivity.
        let cents = channel.pitch_offset_cents()
            + params.pitch_offset_cents
            + f64::from(modulation_env * self.mod_env_to_pitch)
            + f64::from(modulation_lfo * self.mod_lfo_to_pitch)
            + f64::from(vibrato_lfo * (self.vib_lfo_to_pitch + channel.modulation_cents()));
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
                modulation_env * self.mod_env_to_filter + modulation_lfo * self.mod_lfo_to_filter,
            );
            params.filters[0].set_cutoff(base_cutoff * cents_to_ratio(filter_cents) as f32);
            if params.filters[0].is_dirty() {
                params.filters[0].apply_filter_interp(&mut params.block_buffer[..frames]);
            } else {
                params.filters[0].apply_filter_buffer(&mut params.block_buffer[..frames]);
            }
        }

        let tremolo_db = modulation_lfo * self.mod_lfo_to_volume;
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
        params.envelopes[0].release_sf2_volume(ENVELOPE_SILENCE);
        params.envelopes[1].release(ENVELOPE_SILENCE);
        self.generator.release(&mut params.generators[0]);
        params.state = VoiceState::Stopping;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CustomDescriptor, CustomValue, GeneratorDescriptor};
    use crate::sample::PcmSample;
    use tonada_core::FilterType;

    fn store() -> SampleStore {
        let mut store = SampleStore::new();
        let frames: Vec<f32> = (0..256).map(|i| (i as f32 * 0.2).sin() * 0.8).collect();
        store.insert(
            PcmSample::from_frames("wave", frames, 44100.0, 60).with_loop(32.0, 224.0),
        );
        store
    }

    fn descriptors() -> DescriptorList {
        DescriptorList {
            generators: vec![GeneratorDescriptor::sample("wave")],
            envelopes: vec![
                EnvelopeDescriptor::adsr(0.005, 0.1, 0.7, 0.2),
                EnvelopeDescriptor::adsr(0.01, 0.2, 0.5, 0.2),
            ],
            filters: vec![FilterDescriptor {
                filter_type: FilterType::BiquadLowpass,
                cutoff_hz: 2000.0,
                resonance: 1.0,
                ..FilterDescriptor::default()
            }],
            custom: vec![CustomDescriptor {
                id: "sf2".into(),
                entries: vec![
                    ("mod_env_to_filter".into(), CustomValue::Number(1200.0)),
                    ("mod_lfo_to_pitch".into(), CustomValue::Number(25.0)),
                ],
            }],
            ..DescriptorList::default()
        }
    }

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 44100.0,
            channels: 2,
        }
    }

    #[test]
    fn load_requires_generator() {
        let err = Sf2Patch::load("sf", &DescriptorList::default(), &store()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidDescriptor(_)));
    }

    #[test]
    fn renders_and_tracks_base_cutoff() {
        let patch = Sf2Patch::load("sf", &descriptors(), &store()).unwrap();
        let channel = ChannelParameters::new();
        let mut params = VoiceParameters::new();
        params.configure(0, 60, 100);
        assert!(patch.start(&mut params, &ctx(), &channel));
        assert_eq!(
            params.scratch,
            PatchScratch::Sampled { base_cutoff: 2000.0 }
        );

        let mut output = [0.0f32; 2 * MICRO_BLOCK_FRAMES];
        let mut energy = 0.0;
        for _ in 0..40 {
            patch.process(&mut params, &ctx(), &channel, &mut output);
            energy += output.iter().map(|s| s.abs()).sum::<f32>();
            output.fill(0.0);
        }
        assert!(energy > 0.0);
        // Modulation envelope opened the filter above its base cutoff.
        assert!(params.filters[0].cutoff() > 2000.0);
    }

    #[test]
    fn stop_uses_decibel_release_and_finishes() {
        let patch = Sf2Patch::load("sf", &descriptors(), &store()).unwrap();
        let channel = ChannelParameters::new();
        let mut params = VoiceParameters::new();
        params.configure(0, 60, 100);
        patch.start(&mut params, &ctx(), &channel);

        let mut output = [0.0f32; 2 * MICRO_BLOCK_FRAMES];
        for _ in 0..20 {
            patch.process(&mut params, &ctx(), &channel, &mut output);
        }
        patch.stop(&mut params);
        assert_eq!(params.state, VoiceState::Stopping);

        // 0.2 s release at 44.1 kHz: 140 blocks of 64 frames is plenty.
        for _ in 0..200 {
            patch.process(&mut params, &ctx(), &channel, &mut output);
            if params.state == VoiceState::Stopped {
                break;
            }
        }
        assert_eq!(params.state, VoiceState::Stopped);
    }
}
