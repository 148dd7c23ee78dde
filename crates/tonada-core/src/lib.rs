//! Tonada Core - DSP primitives for sample and wavetable synthesis
//!
//! This crate provides the signal-generation machinery underneath the
//! tonada synthesizer: oscillators and sample players, table-driven
//! envelopes, LFOs, and resonant filters. Everything here is built for
//! reuse across thousands of note events per second — immutable shared
//! descriptors, per-voice state that is reset rather than reallocated,
//! and zero allocation on the render path.
//!
//! # Core Abstractions
//!
//! ## Generators
//!
//! Signal sources evaluated by phase, with loop-region playback:
//!
//! - [`Generator`] - Immutable waveform or PCM sample source
//! - [`GeneratorParameters`] - Per-voice playback cursor
//! - [`LoopMode`] / [`GeneratorState`] - Loop handling and segment state
//! - [`Interpolation`] - Sample interpolation kernels
//!
//! ```rust
//! use tonada_core::{Generator, GeneratorParameters, LoopMode, Waveform};
//!
//! let generator = Generator::from_waveform(Waveform::Sine, LoopMode::Continuous);
//! let mut cursor = GeneratorParameters::new();
//! cursor.quick_setup(&generator);
//!
//! let mut block = [0.0f32; 64];
//! let increment = generator.phase_increment(440.0, 48000.0);
//! generator.get_values(&mut cursor, &mut block, increment);
//! ```
//!
//! ## Envelopes
//!
//! Seven-stage (DAHDSR + terminal) table-driven envelopes:
//!
//! - [`Envelope`] / [`EnvelopeDescriptor`] / [`EnvelopeStage`]
//! - [`CurveShape`] - Shaping tables (SoundFont exponential law)
//!
//! ## Modulation
//!
//! - [`Lfo`] / [`LfoDescriptor`] - Delay-then-loop low-frequency modulator
//!
//! ## Filters
//!
//! - [`Filter`] / [`FilterDescriptor`] - One-pole and RBJ biquad low/high
//!   pass with declicked (interpolated) coefficient updates
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible (with `alloc`). Disable the default
//! `std` feature:
//!
//! ```toml
//! [dependencies]
//! tonada-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocation, locking, or errors in the render
//!   path; load-time validation fails before a voice ever starts
//! - **Shared immutable descriptors**: one descriptor serves every voice
//!   playing the instrument
//! - **Pure `no_std` math** via `libm`

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod curve;
pub mod envelope;
pub mod filter;
pub mod generator;
pub mod lfo;
pub mod math;

// Re-export main types at crate root
pub use curve::{CURVE_TABLE_LEN, CurveShape};
pub use envelope::{Envelope, EnvelopeDescriptor, EnvelopeStage};
pub use filter::{Filter, FilterDescriptor, FilterType};
pub use generator::{
    DEFAULT_SAW, DEFAULT_SINE, DEFAULT_SQUARE, DEFAULT_TRIANGLE, Generator, GeneratorError,
    GeneratorParameters, GeneratorState, Interpolation, LoopMode, SampleData, SampleLayout,
    Waveform,
};
pub use lfo::{Lfo, LfoDescriptor, LfoState};
pub use math::{
    cents_to_ratio, db_to_gain, flush_denormal, gain_to_db, key_to_frequency, rem_euclid_f64,
    semitones_to_ratio,
};
