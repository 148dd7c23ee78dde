//! Block-synchronous MIDI synthesizer.
//!
//! Single-threaded and cooperative: the host pulls audio by calling
//! [`Synthesizer::render`] with its own interleaved buffer, and the
//! synthesizer walks it in [`MICRO_BLOCK_FRAMES`]-sized sub-blocks.
//! Queued MIDI events apply only at sub-block boundaries — control
//! latency is bounded by one sub-block while event dispatch stays off the
//! per-sample path. Voices accumulate into the output sequentially;
//! nothing in here allocates, locks, or fails once instruments are
//! loaded.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::bank::{DRUM_BANK, PatchBank};
use crate::channel::ChannelParameters;
use crate::midi::{MidiMessage, ScheduledMessage, command, controller};
use crate::patch::Patch;
use crate::voice::{MICRO_BLOCK_FRAMES, RenderContext, VoiceState};
use crate::voice_manager::{VoiceManager, VoiceStealPolicy};

/// The percussion channel (0-based), forced onto [`DRUM_BANK`].
pub const DRUM_CHANNEL: u8 = 9;

const CHANNEL_COUNT: usize = 16;

/// Polyphonic sample/wavetable synthesizer.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tonada_synth::{
///     DescriptorList, GeneratorDescriptor, Patch, SampleStore, SinglePatch, Synthesizer,
/// };
/// use tonada_core::Waveform;
///
/// let mut synth = Synthesizer::new(48000, 2, 32);
/// let descriptors = DescriptorList {
///     generators: vec![GeneratorDescriptor::waveform(Waveform::Saw)],
///     ..DescriptorList::default()
/// };
/// let patch = SinglePatch::load("saw", &descriptors, &SampleStore::new()).unwrap();
/// synth.set_patch(0, 0, Arc::new(Patch::Single(patch)));
///
/// synth.note_on(0, 60, 100);
/// let mut buffer = vec![0.0f32; 2 * 480];
/// synth.render(&mut buffer);
/// ```
#[derive(Debug)]
pub struct Synthesizer {
    sample_rate: u32,
    channels: usize,
    voice_manager: VoiceManager,
    channel_params: [ChannelParameters; CHANNEL_COUNT],
    bank: PatchBank,
    queue: VecDeque<ScheduledMessage>,
    rendered_frames: u64,
}

impl Synthesizer {
    /// Create a synthesizer rendering `channels` (1 or 2) interleaved
    /// channels at `sample_rate`, with a fixed pool of `polyphony`
    /// voices.
    pub fn new(sample_rate: u32, channels: usize, polyphony: usize) -> Self {
        assert!(
            channels == 1 || channels == 2,
            "only mono and stereo rendering are supported"
        );
        tracing::info!(sample_rate, channels, polyphony, "synthesizer created");
        Self {
            sample_rate,
            channels,
            voice_manager: VoiceManager::new(polyphony),
            channel_params: [ChannelParameters::new(); CHANNEL_COUNT],
            bank: PatchBank::new(),
            queue: VecDeque::new(),
            rendered_frames: 0,
        }
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved output channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of voices currently sounding.
    pub fn active_voice_count(&self) -> usize {
        self.voice_manager.active_count()
    }

    /// Number of voices available without stealing.
    pub fn free_voice_count(&self) -> usize {
        self.voice_manager.free_count()
    }

    /// Configured stealing policy.
    pub fn steal_policy(&self) -> VoiceStealPolicy {
        self.voice_manager.steal_policy()
    }

    /// Set the stealing policy.
    pub fn set_steal_policy(&mut self, policy: VoiceStealPolicy) {
        self.voice_manager.set_steal_policy(policy);
    }

    /// The patch bank.
    pub fn bank(&self) -> &PatchBank {
        &self.bank
    }

    /// Mutable access to the patch bank (instrument loading).
    pub fn bank_mut(&mut self) -> &mut PatchBank {
        &mut self.bank
    }

    /// Install a patch at (bank, program).
    pub fn set_patch(&mut self, bank: u16, program: u8, patch: Arc<Patch>) {
        self.bank.set(bank, program, patch);
    }

    /// Program currently selected on a channel.
    pub fn channel_program(&self, channel: u8) -> u8 {
        self.channel_params[usize::from(channel & 0x0F)].program
    }

    /// Volume controller value on a channel.
    pub fn channel_volume(&self, channel: u8) -> u8 {
        self.channel_params[usize::from(channel & 0x0F)].volume()
    }

    /// Pan controller value on a channel.
    pub fn channel_pan(&self, channel: u8) -> u8 {
        self.channel_params[usize::from(channel & 0x0F)].pan()
    }

    /// Start a note. Velocity 0 is a note-off, per MIDI convention.
    pub fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        let channel = channel & 0x0F;
        let key = key & 0x7F;
        let velocity = velocity & 0x7F;
        if velocity == 0 {
            self.note_off(channel, key);
            return;
        }

        let channel_index = usize::from(channel);
        let bank = if channel == DRUM_CHANNEL {
            DRUM_BANK
        } else {
            self.channel_params[channel_index].bank()
        };
        let program = self.channel_params[channel_index].program;
        let Some(patch) = self.bank.get(bank, program).cloned() else {
            tracing::trace!(channel, key, bank, program, "note dropped: no patch installed");
            return;
        };

        match &*patch {
            Patch::Multi(router) => {
                for interval in router.matching(channel, key, velocity) {
                    self.start_layer(channel, key, velocity, interval.patch.clone());
                }
            }
            _ => self.start_layer(channel, key, velocity, patch.clone()),
        }
    }

    /// Release a note. Deferred while the channel's hold pedal is down.
    pub fn note_off(&mut self, channel: u8, key: u8) {
        let channel = channel & 0x0F;
        let key = key & 0x7F;
        let hold = self.channel_params[usize::from(channel)].hold_pedal();
        self.voice_manager.for_each_note_voice(channel, key, |voice| {
            if voice.params.state != VoiceState::Playing {
                return;
            }
            if hold {
                voice.params.note_off_pending = true;
            } else {
                voice.stop();
            }
        });
    }

    /// Stop every voice. `immediate` skips release envelopes entirely
    /// (panic/reset); otherwise voices fade out through their releases.
    pub fn note_off_all(&mut self, immediate: bool) {
        self.voice_manager.stop_all(immediate);
    }

    /// Apply a MIDI short message right now.
    pub fn process_midi_message(&mut self, channel: u8, command: u8, data1: u8, data2: u8) {
        self.dispatch(MidiMessage::new(channel, command, data1, data2));
    }

    /// Queue a message for a future render position, in absolute frames.
    ///
    /// Messages must be queued in nondecreasing time order; they are
    /// drained from the front at sub-block boundaries. A timestamp at or
    /// before the current render position applies at the next boundary.
    pub fn queue_midi_message(
        &mut self,
        sample_time: u64,
        channel: u8,
        command: u8,
        data1: u8,
        data2: u8,
    ) {
        debug_assert!(
            self.queue
                .back()
                .is_none_or(|last| last.sample_time <= sample_time),
            "queued messages must be in nondecreasing time order"
        );
        self.queue.push_back(ScheduledMessage {
            sample_time,
            message: MidiMessage::new(channel, command, data1, data2),
        });
    }

    /// Render additively into a caller-owned interleaved buffer.
    ///
    /// The buffer is *accumulated into*, never cleared — clear it first
    /// if it holds garbage. Length must be a multiple of the channel
    /// count.
    pub fn render(&mut self, output: &mut [f32]) {
        debug_assert_eq!(output.len() % self.channels, 0);
        let channels = self.channels;
        let total_frames = output.len() / channels;
        let ctx = self.render_context();

        let mut frame = 0;
        while frame < total_frames {
            self.drain_due_messages();
            let block_frames = MICRO_BLOCK_FRAMES.min(total_frames - frame);
            let block = &mut output[frame * channels..(frame + block_frames) * channels];

            for position in 0..self.voice_manager.active_indices().len() {
                let index = self.voice_manager.active_indices()[position];
                let voice = self.voice_manager.voice_mut(index);
                let channel = &self.channel_params[usize::from(voice.params.channel)];
                voice.process(&ctx, channel, block);
            }
            self.voice_manager.retire_finished();

            self.rendered_frames += block_frames as u64;
            frame += block_frames;
        }
    }

    /// Frames rendered since construction — the clock queued messages are
    /// timestamped against.
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames
    }

    fn render_context(&self) -> RenderContext {
        RenderContext {
            sample_rate: self.sample_rate as f32,
            channels: self.channels,
        }
    }

    fn start_layer(&mut self, channel: u8, key: u8, velocity: u8, patch: Arc<Patch>) {
        let group = patch.exclusive_group();
        if group != 0 {
            self.voice_manager.stop_exclusive_group(group);
        }

        let Some(index) = self.voice_manager.get_free_voice() else {
            tracing::trace!(channel, key, "note dropped: voice pool exhausted");
            return;
        };
        let ctx = self.render_context();
        let voice = self.voice_manager.voice_mut(index);
        voice.configure(channel, key, velocity, patch);
        let started = voice.start(&ctx, &self.channel_params[usize::from(channel)]);
        if started {
            self.voice_manager.activate(index);
        } else {
            self.voice_manager.release_unstarted(index);
        }
    }

    fn drain_due_messages(&mut self) {
        while let Some(scheduled) = self.queue.front() {
            if scheduled.sample_time > self.rendered_frames {
                break;
            }
            let message = self.queue.pop_front().expect("front checked").message;
            self.dispatch(message);
        }
    }

    fn dispatch(&mut self, message: MidiMessage) {
        let channel_index = usize::from(message.channel);
        match message.command {
            command::NOTE_ON if message.data2 > 0 => {
                self.note_on(message.channel, message.data1, message.data2);
            }
            command::NOTE_ON | command::NOTE_OFF => {
                self.note_off(message.channel, message.data1);
            }
            command::PROGRAM_CHANGE => {
                self.channel_params[channel_index].program = message.data1;
                tracing::debug!(
                    channel = message.channel,
                    program = message.data1,
                    "program change"
                );
            }
            command::PITCH_BEND => {
                self.channel_params[channel_index].set_pitch_bend(message.combined());
            }
            command::CONTROLLER => self.apply_controller(message),
            _ => {}
        }
    }

    fn apply_controller(&mut self, message: MidiMessage) {
        let channel_index = usize::from(message.channel);
        let value = message.data2;
        match message.data1 {
            controller::BANK_SELECT => self.channel_params[channel_index].set_bank_msb(value),
            controller::BANK_SELECT_LSB => self.channel_params[channel_index].set_bank_lsb(value),
            controller::MODULATION => self.channel_params[channel_index].set_modulation(value),
            controller::VOLUME => self.channel_params[channel_index].set_volume(value),
            controller::PAN => self.channel_params[channel_index].set_pan(value),
            controller::EXPRESSION => self.channel_params[channel_index].set_expression(value),
            controller::HOLD_PEDAL => {
                let was_down = self.channel_params[channel_index].hold_pedal();
                self.channel_params[channel_index].set_hold_pedal(value);
                if was_down && !self.channel_params[channel_index].hold_pedal() {
                    self.voice_manager.release_pending(message.channel);
                }
            }
            controller::RPN_MSB => self.channel_params[channel_index].set_rpn_msb(value),
            controller::RPN_LSB => self.channel_params[channel_index].set_rpn_lsb(value),
            controller::DATA_ENTRY => self.channel_params[channel_index].apply_data_entry(value),
            controller::DATA_ENTRY_LSB => {
                self.channel_params[channel_index].apply_data_entry_lsb(value);
            }
            controller::ALL_SOUND_OFF => {
                self.voice_manager.stop_channel(message.channel, true);
            }
            controller::RESET_CONTROLLERS => {
                self.channel_params[channel_index].reset_controllers();
            }
            controller::ALL_NOTES_OFF => {
                self.voice_manager.stop_channel(message.channel, false);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorList, GeneratorDescriptor};
    use crate::patch::SinglePatch;
    use crate::sample::SampleStore;
    use tonada_core::{EnvelopeDescriptor, Waveform};

    fn sine_patch(name: &str) -> Arc<Patch> {
        let descriptors = DescriptorList {
            generators: vec![GeneratorDescriptor::waveform(Waveform::Sine)],
            envelopes: vec![EnvelopeDescriptor::adsr(0.005, 0.05, 0.8, 0.05)],
            ..DescriptorList::default()
        };
        Arc::new(Patch::Single(
            SinglePatch::load(name, &descriptors, &SampleStore::new()).unwrap(),
        ))
    }

    fn synth() -> Synthesizer {
        let mut synth = Synthesizer::new(48000, 2, 8);
        synth.set_patch(0, 0, sine_patch("sine"));
        synth
    }

    #[test]
    fn render_accumulates_audio() {
        let mut synth = synth();
        synth.note_on(0, 69, 100);
        assert_eq!(synth.active_voice_count(), 1);

        let mut buffer = vec![0.0f32; 2 * 512];
        synth.render(&mut buffer);
        assert!(buffer.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn note_without_patch_is_dropped() {
        let mut synth = Synthesizer::new(48000, 2, 8);
        synth.note_on(0, 60, 100);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn note_off_releases_then_voice_retires() {
        let mut synth = synth();
        synth.note_on(0, 60, 100);
        let mut buffer = vec![0.0f32; 2 * 256];
        synth.render(&mut buffer);

        synth.note_off(0, 60);
        // 50 ms release at 48 kHz: render half a second to be safe.
        for _ in 0..100 {
            buffer.fill(0.0);
            synth.render(&mut buffer);
        }
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.free_voice_count(), 8);
    }

    #[test]
    fn hold_pedal_defers_note_off() {
        let mut synth = synth();
        synth.process_midi_message(0, command::CONTROLLER, controller::HOLD_PEDAL, 127);
        synth.note_on(0, 60, 100);
        synth.note_off(0, 60);
        assert_eq!(synth.active_voice_count(), 1);

        let mut buffer = vec![0.0f32; 2 * 256];
        synth.render(&mut buffer);
        assert_eq!(synth.active_voice_count(), 1, "held note must keep sounding");

        // Pedal up: the deferred note-off applies and the voice releases.
        synth.process_midi_message(0, command::CONTROLLER, controller::HOLD_PEDAL, 0);
        for _ in 0..100 {
            buffer.fill(0.0);
            synth.render(&mut buffer);
        }
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn queued_events_apply_at_their_block() {
        let mut synth = synth();
        // Note on at frame 128 (the third 64-frame sub-block).
        synth.queue_midi_message(128, 0, command::NOTE_ON, 69, 100);

        let mut first = vec![0.0f32; 2 * 128];
        synth.render(&mut first);
        assert!(
            first.iter().all(|&s| s == 0.0),
            "note must not sound before its timestamp"
        );

        let mut second = vec![0.0f32; 2 * 128];
        synth.render(&mut second);
        assert!(second.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn note_off_all_immediate_silences_everything() {
        let mut synth = synth();
        for key in [60, 64, 67] {
            synth.note_on(0, key, 100);
        }
        assert_eq!(synth.active_voice_count(), 3);
        synth.note_off_all(true);
        assert_eq!(synth.active_voice_count(), 0);

        let mut buffer = vec![0.0f32; 2 * 128];
        synth.render(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn drum_channel_uses_drum_bank() {
        let mut synth = Synthesizer::new(48000, 2, 8);
        synth.set_patch(0, 0, sine_patch("melodic"));
        // No drum bank entry: percussion notes are dropped, not routed to
        // the melodic patch.
        synth.note_on(DRUM_CHANNEL, 36, 100);
        assert_eq!(synth.active_voice_count(), 0);

        synth.set_patch(DRUM_BANK, 0, sine_patch("kick"));
        synth.note_on(DRUM_CHANNEL, 36, 100);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn polyphony_bound_holds_under_load() {
        let mut synth = synth();
        for key in 0..30 {
            synth.note_on(0, key, 100);
            assert!(synth.active_voice_count() <= 8);
        }
        assert_eq!(synth.active_voice_count(), 8);
        assert_eq!(synth.free_voice_count(), 0);
    }

    #[test]
    fn telemetry_getters_track_channel_state() {
        let mut synth = synth();
        synth.process_midi_message(3, command::PROGRAM_CHANGE, 17, 0);
        synth.process_midi_message(3, command::CONTROLLER, controller::VOLUME, 90);
        synth.process_midi_message(3, command::CONTROLLER, controller::PAN, 32);
        assert_eq!(synth.channel_program(3), 17);
        assert_eq!(synth.channel_volume(3), 90);
        assert_eq!(synth.channel_pan(3), 32);
    }
}
