//! Instrument descriptor lists — the input boundary to patch loading.
//!
//! Bank, SoundFont, and SFZ readers (external to this crate) produce one
//! [`DescriptorList`] per instrument: immutable generator / envelope /
//! filter / LFO records plus free-form [`CustomDescriptor`] entries for
//! patch-specific parameters. [`crate::Patch`] construction consumes
//! exactly this, validating everything before a voice can ever start.

use tonada_core::{
    EnvelopeDescriptor, FilterDescriptor, Generator, Interpolation, LfoDescriptor, LoopMode,
    SampleLayout, Waveform,
};

use crate::LoadError;
use crate::sample::SampleStore;

/// Signal source selector for a generator record.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GeneratorSourceDescriptor {
    /// Analytic waveform.
    Waveform(Waveform),
    /// PCM sample referenced by name in the [`SampleStore`].
    Sample(String),
}

impl Default for GeneratorSourceDescriptor {
    fn default() -> Self {
        Self::Waveform(Waveform::Sine)
    }
}

/// One generator record: source, loop layout, and pitch tracking.
///
/// Phase fields left unset fall back to the referenced sample's own
/// header values (start/end/loop points/root key/tuning).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneratorDescriptor {
    /// Waveform or named sample.
    pub source: GeneratorSourceDescriptor,
    /// Loop mode; `None` derives it from the sample (loop region present
    /// → `Continuous`, absent → `NoLoop`).
    pub loop_mode: Option<LoopMode>,
    /// Playback start frame override.
    pub start: Option<f64>,
    /// Playback end frame override.
    pub end: Option<f64>,
    /// Loop start frame override.
    pub loop_start: Option<f64>,
    /// Loop end frame override.
    pub loop_end: Option<f64>,
    /// Root key override.
    pub root_key: Option<u8>,
    /// Fine tuning override in cents.
    pub tune_cents: Option<f64>,
    /// Cents per key of pitch tracking (100 = standard).
    pub key_track: Option<f64>,
    /// Cents per velocity unit of pitch tracking.
    pub vel_track: Option<f64>,
    /// Interpolation kernel for sampled playback.
    pub interpolation: Interpolation,
}

impl GeneratorDescriptor {
    /// A plain analytic waveform record.
    pub fn waveform(waveform: Waveform) -> Self {
        Self {
            source: GeneratorSourceDescriptor::Waveform(waveform),
            ..Self::default()
        }
    }

    /// A record referencing a named sample with its own header layout.
    pub fn sample(name: impl Into<String>) -> Self {
        Self {
            source: GeneratorSourceDescriptor::Sample(name.into()),
            ..Self::default()
        }
    }

    /// Resolve this record into a shareable [`Generator`].
    pub fn build(&self, samples: &SampleStore) -> Result<Generator, LoadError> {
        match &self.source {
            GeneratorSourceDescriptor::Waveform(waveform) => Ok(Generator::from_waveform(
                *waveform,
                self.loop_mode.unwrap_or(LoopMode::Continuous),
            )),
            GeneratorSourceDescriptor::Sample(name) => {
                let sample = samples
                    .get(name)
                    .ok_or_else(|| LoadError::MissingSample(name.clone()))?;
                let (header_loop_start, header_loop_end) =
                    sample.loop_region.unwrap_or((0.0, 0.0));
                let loop_mode = self.loop_mode.unwrap_or(if sample.loop_region.is_some() {
                    LoopMode::Continuous
                } else {
                    LoopMode::NoLoop
                });
                let layout = SampleLayout {
                    loop_mode,
                    start: self.start.unwrap_or(sample.start),
                    end: self.end.unwrap_or(sample.end),
                    loop_start: self.loop_start.unwrap_or(header_loop_start),
                    loop_end: self.loop_end.unwrap_or(header_loop_end),
                    root_key: self.root_key.unwrap_or(sample.root_key),
                    tune_cents: self.tune_cents.unwrap_or(sample.tune_cents),
                    key_track: self.key_track.unwrap_or(100.0),
                    vel_track: self.vel_track.unwrap_or(0.0),
                    interpolation: self.interpolation,
                };
                Generator::from_sample(sample.data.clone(), layout).map_err(LoadError::from)
            }
        }
    }
}

/// A free-form value inside a custom record.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum CustomValue {
    /// Numeric parameter.
    Number(f64),
    /// Textual parameter.
    Text(String),
}

/// Free-form patch-specific record: an id plus named values.
///
/// Patch variants read their private knobs (FM ratios, modulation
/// sensitivities, exclusive groups) from the record whose id they own.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CustomDescriptor {
    /// Record identifier, e.g. `"fm2"`.
    pub id: String,
    /// Named entries.
    pub entries: Vec<(String, CustomValue)>,
}

impl CustomDescriptor {
    /// Numeric entry by name.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.entries.iter().find_map(|(k, v)| match v {
            CustomValue::Number(n) if k == key => Some(*n),
            _ => None,
        })
    }

    /// Text entry by name.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|(k, v)| match v {
            CustomValue::Text(t) if k == key => Some(t.as_str()),
            _ => None,
        })
    }
}

/// Immutable per-instrument parameter bag consumed by patch loading.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DescriptorList {
    /// Generator records.
    pub generators: Vec<GeneratorDescriptor>,
    /// Envelope records.
    pub envelopes: Vec<EnvelopeDescriptor>,
    /// Filter records.
    pub filters: Vec<FilterDescriptor>,
    /// LFO records.
    pub lfos: Vec<LfoDescriptor>,
    /// Free-form patch-specific records.
    pub custom: Vec<CustomDescriptor>,
    /// Exclusive group identifier (0 = none): starting a note in a
    /// non-zero group chokes every active voice sharing it.
    pub exclusive_group: u32,
    /// Static pitch offset in cents applied to every note of the patch.
    pub tune_cents: f64,
    /// Static attenuation in dB applied to every note of the patch.
    pub attenuation_db: f32,
}

impl DescriptorList {
    /// Custom record by id.
    pub fn custom(&self, id: &str) -> Option<&CustomDescriptor> {
        self.custom.iter().find(|c| c.id == id)
    }

    /// Envelope record by slot, if present.
    pub fn envelope(&self, index: usize) -> Option<&EnvelopeDescriptor> {
        self.envelopes.get(index)
    }

    /// Filter record by slot, if present.
    pub fn filter(&self, index: usize) -> Option<&FilterDescriptor> {
        self.filters.get(index)
    }

    /// LFO record by slot, if present.
    pub fn lfo(&self, index: usize) -> Option<&LfoDescriptor> {
        self.lfos.get(index)
    }
}
