//! Shared helpers for the render commands.

use std::path::Path;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tonada_synth::{Synthesizer, midi::command};

/// Frames rendered per progress tick.
pub const RENDER_CHUNK: usize = 4096;

/// A note event in the rendered sequence.
#[derive(Clone, Copy, Debug)]
pub struct NoteEvent {
    /// MIDI key.
    pub key: u8,
    /// Note-on time in seconds.
    pub start: f64,
    /// Note length in seconds.
    pub duration: f64,
    /// Note-on velocity.
    pub velocity: u8,
}

/// Queue a note sequence onto the synthesizer's event queue.
///
/// Events must be queued in nondecreasing time order, so on/off pairs are
/// flattened and sorted first.
pub fn queue_sequence(synth: &mut Synthesizer, channel: u8, notes: &[NoteEvent]) {
    let sample_rate = f64::from(synth.sample_rate());
    let mut events: Vec<(u64, u8, u8, u8)> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let on = (note.start * sample_rate) as u64;
        let off = ((note.start + note.duration) * sample_rate) as u64;
        events.push((on, command::NOTE_ON, note.key, note.velocity));
        events.push((off, command::NOTE_OFF, note.key, 0));
    }
    events.sort_by_key(|event| event.0);
    for (time, cmd, key, velocity) in events {
        synth.queue_midi_message(time, channel, cmd, key, velocity);
    }
}

/// Render `seconds` of audio with a progress bar, returning interleaved
/// samples.
pub fn render_with_progress(synth: &mut Synthesizer, seconds: f64) -> Vec<f32> {
    let channels = synth.channels();
    let total_frames = (seconds * f64::from(synth.sample_rate())) as usize;
    let mut output = vec![0.0f32; total_frames * channels];

    let progress = ProgressBar::new(total_frames as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("static template")
            .progress_chars("##-"),
    );

    for chunk in output.chunks_mut(RENDER_CHUNK * channels) {
        synth.render(chunk);
        progress.inc((chunk.len() / channels) as u64);
    }
    progress.finish_with_message("done");
    output
}

/// Write interleaved f32 samples as a 16-bit PCM WAV file.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: usize,
) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(quantized)?;
    }
    writer.finalize()?;
    println!(
        "Wrote {} ({} frames, {} Hz, {} ch)",
        path.display(),
        samples.len() / channels,
        sample_rate,
        channels
    );
    Ok(())
}

/// Parse a comma-separated key list like `60,64,67`.
pub fn parse_keys(keys: &str) -> anyhow::Result<Vec<u8>> {
    keys.split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .with_context(|| format!("invalid MIDI key: {part:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keys_accepts_spaces() {
        assert_eq!(parse_keys("60, 64,67").unwrap(), vec![60, 64, 67]);
        assert!(parse_keys("60,x").is_err());
    }
}
