//! Tonada Synth - sample and wavetable synthesis engine
//!
//! This crate turns the DSP primitives from `tonada-core` into a playable
//! instrument: polymorphic patches, a fixed voice pool with stealing and
//! a note registry, per-channel MIDI state, and a block-synchronous
//! render loop.
//!
//! # Core Components
//!
//! ## Patches
//!
//! Immutable instrument definitions over a closed capability set:
//!
//! - [`Patch`] - Tagged instrument enum
//! - [`SinglePatch`] - One oscillator or sample through envelope/filter
//! - [`Fm2Patch`] - 2-operator FM with feedback and [`SyncMode`]
//! - [`Sf2Patch`] / [`SfzPatch`] - Format-derived modulation routings
//! - [`MultiPatch`] - Channel/key/velocity router (never nested)
//!
//! ## Voices
//!
//! - [`Voice`] / [`VoiceParameters`] - Per-note mutable state, allocated
//!   once and reused
//! - [`VoiceManager`] - Fixed pool, free/active lists, note registry,
//!   [`VoiceStealPolicy`] stealing
//!
//! ## Rendering
//!
//! - [`Synthesizer`] - MIDI-driven block-synchronous render loop
//!
//! ```rust
//! use std::sync::Arc;
//! use tonada_core::Waveform;
//! use tonada_synth::{
//!     DescriptorList, GeneratorDescriptor, Patch, SampleStore, SinglePatch, Synthesizer,
//! };
//!
//! let mut synth = Synthesizer::new(48000, 2, 32);
//! let descriptors = DescriptorList {
//!     generators: vec![GeneratorDescriptor::waveform(Waveform::Sine)],
//!     ..DescriptorList::default()
//! };
//! let patch = SinglePatch::load("sine", &descriptors, &SampleStore::new()).unwrap();
//! synth.set_patch(0, 0, Arc::new(Patch::Single(patch)));
//!
//! synth.note_on(0, 60, 100);
//! let mut buffer = vec![0.0f32; 2 * 4800];
//! synth.render(&mut buffer);
//! synth.note_off(0, 60);
//! ```
//!
//! ## Loading
//!
//! - [`DescriptorList`] - The immutable parameter bag bank loaders
//!   produce and patch loading consumes
//! - [`SampleStore`] / [`PcmSample`] - Shared, read-only PCM
//! - [`PatchRegistry`] - Patch-type id → builder table (an explicit
//!   value, not process-global state)
//! - [`PatchBank`] - (bank, program) → patch lookup
//!
//! Load-time failures are [`LoadError`]s and happen before a voice ever
//! starts; the render path is error-free by construction.

pub mod bank;
pub mod channel;
pub mod descriptor;
pub mod midi;
pub mod patch;
pub mod registry;
pub mod sample;
pub mod synthesizer;
pub mod voice;
pub mod voice_manager;

// Re-export main types at crate root
pub use bank::{DRUM_BANK, PatchBank};
pub use channel::ChannelParameters;
pub use descriptor::{
    CustomDescriptor, CustomValue, DescriptorList, GeneratorDescriptor, GeneratorSourceDescriptor,
};
pub use midi::{MidiMessage, ScheduledMessage};
pub use patch::{Fm2Patch, MultiPatch, Patch, PatchInterval, Sf2Patch, SfzPatch, SinglePatch, SyncMode};
pub use registry::{PatchBuilder, PatchRegistry};
pub use sample::{PcmSample, SampleStore};
pub use synthesizer::{DRUM_CHANNEL, Synthesizer};
pub use voice::{
    MAX_VOICE_COMPONENTS, MICRO_BLOCK_FRAMES, PatchScratch, RenderContext, Voice, VoiceParameters,
    VoiceState,
};
pub use voice_manager::{VoiceManager, VoiceStealPolicy};

/// Errors raised while loading instruments. These fire before any voice
/// starts; the render path itself cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A generator record references a sample the store does not hold.
    #[error("referenced sample not found: {0}")]
    MissingSample(String),

    /// A descriptor field is malformed or missing.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The patch-type identifier is not registered.
    #[error("unknown patch type: {0}")]
    UnknownPatchType(String),

    /// A router patch routed to another router.
    #[error("router patches must not nest")]
    NestedRouter,

    /// A router patch with no intervals.
    #[error("patch has no layers")]
    EmptyPatch,

    /// Generator construction rejected the sample layout.
    #[error("generator: {0}")]
    Generator(#[from] tonada_core::GeneratorError),
}
