//! Render a TOML instrument file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use tonada_synth::{DescriptorList, PatchRegistry, SampleStore, Synthesizer};

use super::common::{NoteEvent, parse_keys, queue_sequence, render_with_progress, write_wav};

/// On-disk instrument definition: a patch type plus its descriptor list.
///
/// ```toml
/// kind = "single"
///
/// [[descriptors.generators]]
/// source = { waveform = "saw" }
///
/// [[descriptors.envelopes]]
/// times = [0.0, 0.01, 0.0, 0.3, 100000000.0, 0.4]
/// sustain_level = 0.6
/// ```
#[derive(Debug, Deserialize)]
struct InstrumentFile {
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    descriptors: DescriptorList,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Instrument definition (TOML)
    #[arg(value_name = "INSTRUMENT")]
    instrument: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Keys to play, comma separated MIDI numbers
    #[arg(long, default_value = "60,64,67")]
    keys: String,

    /// Seconds each note is held
    #[arg(long, default_value = "1.0")]
    note_duration: f64,

    /// Seconds between note starts
    #[arg(long, default_value = "0.5")]
    gap: f64,

    /// Note-on velocity
    #[arg(long, default_value = "100")]
    velocity: u8,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Polyphony (voice pool size)
    #[arg(long, default_value = "32")]
    voices: usize,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.instrument)
        .with_context(|| format!("reading {}", args.instrument.display()))?;
    let instrument: InstrumentFile =
        toml::from_str(&text).with_context(|| format!("parsing {}", args.instrument.display()))?;
    let name = instrument.name.as_deref().unwrap_or("instrument");

    let registry = PatchRegistry::with_builtins();
    let patch = registry
        .build(
            &instrument.kind,
            name,
            &instrument.descriptors,
            &SampleStore::new(),
        )
        .with_context(|| format!("loading instrument {name:?}"))?;

    let mut synth = Synthesizer::new(args.sample_rate, 2, args.voices);
    synth.set_patch(0, 0, Arc::new(patch));

    let keys = parse_keys(&args.keys)?;
    let notes: Vec<NoteEvent> = keys
        .iter()
        .enumerate()
        .map(|(index, &key)| NoteEvent {
            key,
            start: index as f64 * args.gap,
            duration: args.note_duration,
            velocity: args.velocity,
        })
        .collect();
    queue_sequence(&mut synth, 0, &notes);

    let total = notes
        .iter()
        .map(|note| note.start + note.duration)
        .fold(0.0f64, f64::max)
        + 1.0;
    println!("Rendering {name} for {total:.1} s...");
    let samples = render_with_progress(&mut synth, total);
    write_wav(&args.output, &samples, args.sample_rate, 2)
}
