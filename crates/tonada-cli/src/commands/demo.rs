//! Built-in demo sequence command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use tonada_core::{EnvelopeDescriptor, FilterDescriptor, FilterType, Waveform};
use tonada_synth::{
    CustomDescriptor, CustomValue, DescriptorList, GeneratorDescriptor, PatchRegistry, SampleStore,
    Synthesizer, VoiceStealPolicy,
};

use super::common::{NoteEvent, queue_sequence, render_with_progress, write_wav};

/// Demo instrument selector.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum DemoPatch {
    /// Filtered saw lead.
    #[default]
    Saw,
    /// 2-operator FM bell.
    FmBell,
    /// Square-wave organ.
    Organ,
}

/// Stealing policy selector.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CliStealPolicy {
    /// Steal the oldest voice.
    #[default]
    Oldest,
    /// Steal the quietest releasing voice.
    Quietest,
    /// Drop new notes when the pool is full.
    Skip,
}

impl From<CliStealPolicy> for VoiceStealPolicy {
    fn from(policy: CliStealPolicy) -> Self {
        match policy {
            CliStealPolicy::Oldest => VoiceStealPolicy::Oldest,
            CliStealPolicy::Quietest => VoiceStealPolicy::Quietest,
            CliStealPolicy::Skip => VoiceStealPolicy::Skip,
        }
    }
}

#[derive(Args)]
pub struct DemoArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Demo instrument
    #[arg(long, value_enum, default_value_t = DemoPatch::Saw)]
    patch: DemoPatch,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Polyphony (voice pool size)
    #[arg(long, default_value = "32")]
    voices: usize,

    /// Voice stealing policy
    #[arg(long, value_enum, default_value_t = CliStealPolicy::Oldest)]
    steal: CliStealPolicy,
}

fn demo_descriptors(patch: DemoPatch) -> (&'static str, DescriptorList) {
    match patch {
        DemoPatch::Saw => (
            "single",
            DescriptorList {
                generators: vec![GeneratorDescriptor::waveform(Waveform::Saw)],
                envelopes: vec![EnvelopeDescriptor::adsr(0.01, 0.3, 0.6, 0.4)],
                filters: vec![FilterDescriptor {
                    filter_type: FilterType::BiquadLowpass,
                    cutoff_hz: 2200.0,
                    resonance: 1.2,
                    ..FilterDescriptor::default()
                }],
                ..DescriptorList::default()
            },
        ),
        DemoPatch::FmBell => (
            "fm2",
            DescriptorList {
                envelopes: vec![
                    EnvelopeDescriptor::adsr(0.002, 1.2, 0.0, 0.6),
                    EnvelopeDescriptor::adsr(0.002, 0.8, 0.2, 0.4),
                ],
                custom: vec![CustomDescriptor {
                    id: "fm2".into(),
                    entries: vec![
                        ("modulator_ratio".into(), CustomValue::Number(3.5)),
                        ("depth".into(), CustomValue::Number(0.8)),
                        ("feedback".into(), CustomValue::Number(0.1)),
                    ],
                }],
                ..DescriptorList::default()
            },
        ),
        DemoPatch::Organ => (
            "single",
            DescriptorList {
                generators: vec![GeneratorDescriptor::waveform(Waveform::Square)],
                envelopes: vec![EnvelopeDescriptor::adsr(0.005, 0.0, 1.0, 0.08)],
                ..DescriptorList::default()
            },
        ),
    }
}

/// A short I-vi-IV-V progression with a closing arpeggio.
fn demo_sequence() -> Vec<NoteEvent> {
    let chords: [&[u8]; 4] = [
        &[60, 64, 67], // C
        &[57, 60, 64], // Am
        &[53, 57, 60], // F
        &[55, 59, 62], // G
    ];
    let mut notes = Vec::new();
    for (bar, chord) in chords.iter().enumerate() {
        for &key in *chord {
            notes.push(NoteEvent {
                key,
                start: bar as f64,
                duration: 0.9,
                velocity: 96,
            });
        }
    }
    for (step, key) in [60u8, 64, 67, 72, 76, 72, 67, 64].iter().enumerate() {
        notes.push(NoteEvent {
            key: *key,
            start: 4.0 + step as f64 * 0.25,
            duration: 0.22,
            velocity: 110,
        });
    }
    notes
}

pub fn run(args: DemoArgs) -> anyhow::Result<()> {
    let (kind, descriptors) = demo_descriptors(args.patch);
    let registry = PatchRegistry::with_builtins();
    let patch = registry.build(kind, "demo", &descriptors, &SampleStore::new())?;

    let mut synth = Synthesizer::new(args.sample_rate, 2, args.voices);
    synth.set_steal_policy(args.steal.into());
    synth.set_patch(0, 0, Arc::new(patch));

    let notes = demo_sequence();
    queue_sequence(&mut synth, 0, &notes);

    // One second of tail past the last release.
    let total = notes
        .iter()
        .map(|note| note.start + note.duration)
        .fold(0.0f64, f64::max)
        + 1.0;
    println!(
        "Rendering {:.1} s demo ({:?}, {} voices)...",
        total, args.patch, args.voices
    );
    let samples = render_with_progress(&mut synth, total);
    write_wav(&args.output, &samples, args.sample_rate, 2)
}
