//! Flat PCM sample store.
//!
//! Samples are loaded once by format collaborators (WAV/SoundFont/SFZ
//! readers) and referenced — never copied — by every generator that plays
//! them. The store itself is read-only after instrument load.

use std::sync::Arc;

use tonada_core::SampleData;

/// One named PCM sample with its playback metadata.
#[derive(Clone, Debug)]
pub struct PcmSample {
    /// Name the instrument descriptors reference.
    pub name: String,
    /// Shared mono sample frames and their native rate.
    pub data: SampleData,
    /// MIDI key the sample is pitched at.
    pub root_key: u8,
    /// Fine tuning in cents.
    pub tune_cents: f64,
    /// First playable frame.
    pub start: f64,
    /// One past the last playable frame.
    pub end: f64,
    /// Loop region, when the sample has one.
    pub loop_region: Option<(f64, f64)>,
}

impl PcmSample {
    /// Wrap raw frames as a full-length sample rooted at `root_key`.
    pub fn from_frames(
        name: impl Into<String>,
        frames: Vec<f32>,
        sample_rate: f64,
        root_key: u8,
    ) -> Self {
        let end = frames.len() as f64;
        Self {
            name: name.into(),
            data: SampleData::new(Arc::from(frames), sample_rate),
            root_key,
            tune_cents: 0.0,
            start: 0.0,
            end,
            loop_region: None,
        }
    }

    /// Set the loop region in frames.
    pub fn with_loop(mut self, loop_start: f64, loop_end: f64) -> Self {
        self.loop_region = Some((loop_start, loop_end));
        self
    }
}

/// Name-keyed collection of samples for one loaded bank.
#[derive(Clone, Debug, Default)]
pub struct SampleStore {
    samples: Vec<PcmSample>,
}

impl SampleStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample, replacing any existing sample with the same name.
    pub fn insert(&mut self, sample: PcmSample) {
        if let Some(existing) = self.samples.iter_mut().find(|s| s.name == sample.name) {
            *existing = sample;
        } else {
            self.samples.push(sample);
        }
    }

    /// Look up a sample by name.
    pub fn get(&self, name: &str) -> Option<&PcmSample> {
        self.samples.iter().find(|s| s.name == name)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_same_name() {
        let mut store = SampleStore::new();
        store.insert(PcmSample::from_frames("kick", vec![0.0; 8], 44100.0, 36));
        store.insert(PcmSample::from_frames("kick", vec![0.0; 16], 44100.0, 36));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("kick").unwrap().end, 16.0);
        assert!(store.get("snare").is_none());
    }

    #[test]
    fn from_frames_covers_whole_sample() {
        let sample = PcmSample::from_frames("s", vec![0.1, 0.2, 0.3], 22050.0, 60);
        assert_eq!(sample.start, 0.0);
        assert_eq!(sample.end, 3.0);
        assert!(sample.loop_region.is_none());

        let looped = sample.with_loop(1.0, 3.0);
        assert_eq!(looped.loop_region, Some((1.0, 3.0)));
    }
}
