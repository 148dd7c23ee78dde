//! End-to-end tests for the tonada synthesis engine: note lifecycle,
//! voice stealing, layered routing, exclusive groups, and sampled
//! playback through the full render loop.

use std::sync::Arc;

use tonada_core::{EnvelopeDescriptor, LoopMode, Waveform};
use tonada_synth::{
    DRUM_BANK, DescriptorList, GeneratorDescriptor, MultiPatch, Patch, PatchInterval,
    PatchRegistry, PcmSample, SampleStore, SinglePatch, Synthesizer, VoiceStealPolicy,
    midi::{command, controller},
};

fn sine_descriptors() -> DescriptorList {
    DescriptorList {
        generators: vec![GeneratorDescriptor::waveform(Waveform::Sine)],
        envelopes: vec![EnvelopeDescriptor::adsr(0.005, 0.05, 0.8, 0.05)],
        ..DescriptorList::default()
    }
}

fn sine_patch(name: &str) -> Arc<Patch> {
    Arc::new(Patch::Single(
        SinglePatch::load(name, &sine_descriptors(), &SampleStore::new()).unwrap(),
    ))
}

fn patch_with_group(name: &str, group: u32) -> Arc<Patch> {
    let descriptors = DescriptorList {
        exclusive_group: group,
        ..sine_descriptors()
    };
    Arc::new(Patch::Single(
        SinglePatch::load(name, &descriptors, &SampleStore::new()).unwrap(),
    ))
}

fn render_blocks(synth: &mut Synthesizer, blocks: usize) -> f32 {
    let mut buffer = vec![0.0f32; 2 * 256];
    let mut energy = 0.0;
    for _ in 0..blocks {
        buffer.fill(0.0);
        synth.render(&mut buffer);
        energy += buffer.iter().map(|s| s.abs()).sum::<f32>();
    }
    energy
}

#[test]
fn oldest_steal_scenario() {
    // 2-voice pool, Oldest policy: A then B exhaust the pool; C must
    // steal A, leaving B and C active and A gone from its registry
    // bucket.
    let mut synth = Synthesizer::new(44100, 2, 2);
    synth.set_patch(0, 0, sine_patch("sine"));
    synth.set_steal_policy(VoiceStealPolicy::Oldest);

    synth.note_on(0, 60, 100); // A
    synth.note_on(0, 64, 100); // B
    assert_eq!(synth.active_voice_count(), 2);

    synth.note_on(0, 67, 100); // C steals A
    assert_eq!(synth.active_voice_count(), 2);

    // A's note-off has nothing to release; B and C still sound.
    synth.note_off(0, 60);
    let energy = render_blocks(&mut synth, 4);
    assert!(energy > 0.0);
    assert_eq!(synth.active_voice_count(), 2);
}

#[test]
fn skip_policy_drops_excess_notes() {
    let mut synth = Synthesizer::new(44100, 2, 1);
    synth.set_patch(0, 0, sine_patch("sine"));
    synth.set_steal_policy(VoiceStealPolicy::Skip);

    synth.note_on(0, 60, 100);
    synth.note_on(0, 64, 100);
    assert_eq!(synth.active_voice_count(), 1, "excess note must be dropped");
}

#[test]
fn quietest_policy_steals_released_voice() {
    let mut synth = Synthesizer::new(44100, 2, 2);
    synth.set_patch(0, 0, sine_patch("sine"));
    synth.set_steal_policy(VoiceStealPolicy::Quietest);

    synth.note_on(0, 60, 100);
    synth.note_on(0, 64, 100);
    render_blocks(&mut synth, 4);

    // Put note 60 into release; its mix gain decays below note 64's.
    synth.note_off(0, 60);
    render_blocks(&mut synth, 2);

    synth.note_on(0, 67, 100);
    assert_eq!(synth.active_voice_count(), 2);

    // Note 64 must have survived the steal: releasing it and the new
    // note drains the pool completely.
    synth.note_off(0, 64);
    synth.note_off(0, 67);
    render_blocks(&mut synth, 60);
    assert_eq!(synth.active_voice_count(), 0);
    assert_eq!(synth.free_voice_count(), 2);
}

#[test]
fn layered_router_puts_two_voices_on_one_note() {
    let low = sine_patch("low");
    let high = sine_patch("high");
    let router = MultiPatch::new(
        "layers",
        vec![
            PatchInterval::new(low).with_velocities(0, 127),
            PatchInterval::new(high).with_velocities(64, 127),
        ],
    )
    .unwrap();

    let mut synth = Synthesizer::new(44100, 2, 8);
    synth.set_patch(0, 0, Arc::new(Patch::Multi(router)));

    synth.note_on(0, 60, 100);
    assert_eq!(synth.active_voice_count(), 2, "both layers should start");

    // One note-off releases both registered voices.
    synth.note_off(0, 60);
    render_blocks(&mut synth, 60);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn router_key_split_selects_one_layer() {
    let low = sine_patch("low");
    let high = sine_patch("high");
    let router = MultiPatch::new(
        "split",
        vec![
            PatchInterval::new(low).with_keys(0, 59),
            PatchInterval::new(high).with_keys(60, 127),
        ],
    )
    .unwrap();

    let mut synth = Synthesizer::new(44100, 2, 8);
    synth.set_patch(0, 0, Arc::new(Patch::Multi(router)));
    synth.note_on(0, 40, 100);
    assert_eq!(synth.active_voice_count(), 1);
    synth.note_on(0, 80, 100);
    assert_eq!(synth.active_voice_count(), 2);
}

#[test]
fn exclusive_group_chokes_previous_note() {
    // Open and closed hi-hat share a group: striking one chokes the
    // other before the new voice starts.
    let mut synth = Synthesizer::new(44100, 2, 8);
    synth.set_patch(0, 0, patch_with_group("open-hat", 7));
    synth.set_patch(0, 1, patch_with_group("closed-hat", 7));

    synth.note_on(0, 46, 100);
    render_blocks(&mut synth, 2);
    assert_eq!(synth.active_voice_count(), 1);

    synth.process_midi_message(0, command::PROGRAM_CHANGE, 1, 0);
    synth.note_on(0, 42, 100);
    // Both voices exist until the choked one's release tail retires, but
    // the choked voice must be releasing, not playing.
    render_blocks(&mut synth, 60);
    assert_eq!(synth.active_voice_count(), 1, "choked voice must retire");
}

#[test]
fn one_shot_sample_ignores_note_off() {
    let mut store = SampleStore::new();
    // Half a second of audible ramp at 44.1 kHz.
    let frames: Vec<f32> = (0..22050).map(|i| ((i % 64) as f32 / 64.0) - 0.5).collect();
    store.insert(PcmSample::from_frames("perc", frames, 44100.0, 60));

    let descriptors = DescriptorList {
        generators: vec![GeneratorDescriptor {
            loop_mode: Some(LoopMode::OneShot),
            ..GeneratorDescriptor::sample("perc")
        }],
        envelopes: vec![EnvelopeDescriptor::adsr(0.0, 0.0, 1.0, 0.01)],
        ..DescriptorList::default()
    };
    let patch = SinglePatch::load("perc", &descriptors, &store).unwrap();

    let mut synth = Synthesizer::new(44100, 2, 4);
    synth.set_patch(0, 0, Arc::new(Patch::Single(patch)));

    synth.note_on(0, 60, 100);
    synth.note_off(0, 60);
    render_blocks(&mut synth, 4);
    assert_eq!(
        synth.active_voice_count(),
        1,
        "one-shot must keep playing through note-off"
    );

    // Exhaust the sample (0.5 s = ~86 blocks of 256 frames).
    render_blocks(&mut synth, 100);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn looped_sample_sustains_until_note_off() {
    let mut store = SampleStore::new();
    let frames: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.1).sin() * 0.5).collect();
    store.insert(PcmSample::from_frames("pad", frames, 44100.0, 60).with_loop(128.0, 896.0));

    let descriptors = DescriptorList {
        generators: vec![GeneratorDescriptor::sample("pad")],
        envelopes: vec![EnvelopeDescriptor::adsr(0.01, 0.0, 1.0, 0.05)],
        ..DescriptorList::default()
    };
    let patch = SinglePatch::load("pad", &descriptors, &store).unwrap();

    let mut synth = Synthesizer::new(44100, 2, 4);
    synth.set_patch(0, 0, Arc::new(Patch::Single(patch)));
    synth.note_on(0, 72, 100);

    // Far longer than the raw sample: the loop must keep it sounding.
    let energy = render_blocks(&mut synth, 40);
    assert!(energy > 0.0);
    assert_eq!(synth.active_voice_count(), 1);

    synth.note_off(0, 72);
    render_blocks(&mut synth, 60);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn registry_built_through_registry_value_plays() {
    let registry = PatchRegistry::with_builtins();
    let patch = registry
        .build("fm2", "bell", &sine_descriptors(), &SampleStore::new())
        .unwrap();

    let mut synth = Synthesizer::new(48000, 2, 4);
    synth.set_patch(0, 0, Arc::new(patch));
    synth.note_on(0, 69, 110);
    let energy = render_blocks(&mut synth, 8);
    assert!(energy > 0.0);
}

#[test]
fn drum_channel_bank_override() {
    let mut synth = Synthesizer::new(44100, 2, 4);
    synth.set_patch(0, 0, sine_patch("melodic"));
    synth.set_patch(DRUM_BANK, 0, sine_patch("kit"));

    synth.note_on(9, 36, 100);
    assert_eq!(synth.active_voice_count(), 1);
}

#[test]
fn controller_stream_drives_pitch_and_volume() {
    let mut synth = Synthesizer::new(44100, 2, 4);
    synth.set_patch(0, 0, sine_patch("sine"));

    synth.process_midi_message(0, command::CONTROLLER, controller::VOLUME, 127);
    synth.note_on(0, 69, 127);
    let loud = render_blocks(&mut synth, 8);

    synth.note_off_all(true);
    synth.process_midi_message(0, command::CONTROLLER, controller::VOLUME, 32);
    synth.note_on(0, 69, 127);
    let quiet = render_blocks(&mut synth, 8);

    assert!(
        loud > quiet * 2.0,
        "volume controller must scale output: loud={loud} quiet={quiet}"
    );
}

#[test]
fn pitch_bend_changes_rendered_frequency() {
    // Count zero crossings with and without a +2 semitone bend.
    fn crossings(synth: &mut Synthesizer) -> usize {
        let mut buffer = vec![0.0f32; 2 * 4096];
        synth.render(&mut buffer);
        let mono: Vec<f32> = buffer.chunks(2).map(|frame| frame[0]).collect();
        mono.windows(2)
            .filter(|pair| pair[0].signum() != pair[1].signum())
            .count()
    }

    let mut synth = Synthesizer::new(44100, 2, 4);
    synth.set_patch(0, 0, sine_patch("sine"));
    synth.note_on(0, 69, 127);
    render_blocks(&mut synth, 4);
    let unbent = crossings(&mut synth);

    synth.note_off_all(true);
    synth.process_midi_message(0, command::PITCH_BEND, 0x7F, 0x7F);
    synth.note_on(0, 69, 127);
    render_blocks(&mut synth, 4);
    let bent = crossings(&mut synth);

    // +200 cents is a factor of ~1.122 in frequency.
    let ratio = bent as f32 / unbent as f32;
    assert!(
        (1.05..1.20).contains(&ratio),
        "bend ratio {ratio} (bent={bent}, unbent={unbent})"
    );
}

#[test]
fn released_voice_stays_active_through_its_tail() {
    let mut synth = Synthesizer::new(44100, 2, 2);
    synth.set_patch(0, 0, sine_patch("sine"));
    synth.note_on(0, 60, 100);
    render_blocks(&mut synth, 2);
    synth.note_off(0, 60);

    // The release tail keeps the voice active and audible...
    assert_eq!(synth.active_voice_count(), 1);
    let tail_energy = render_blocks(&mut synth, 2);
    assert!(tail_energy > 0.0, "release tail must be audible");

    // ...until the envelope terminates and the voice returns to the pool.
    render_blocks(&mut synth, 60);
    assert_eq!(synth.active_voice_count(), 0);
    assert_eq!(synth.free_voice_count(), 2);
}
