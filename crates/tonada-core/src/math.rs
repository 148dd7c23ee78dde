//! Math helpers shared by the synthesis primitives.
//!
//! All routines are `no_std` compatible via `libm`. Audio samples are
//! `f32`; phase arithmetic is `f64` because sampled generators address PCM
//! frames whose indices exceed f32 integer precision.

/// Flush denormal numbers to zero.
///
/// IIR filter feedback paths decay into the denormal range where some CPUs
/// fall off the fast path. Anything below 1e-20 is inaudible.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

/// Convert a MIDI key number to frequency in Hz (A4 = key 69 = 440 Hz).
#[inline]
pub fn key_to_frequency(key: f64) -> f64 {
    440.0 * libm::exp2((key - 69.0) / 12.0)
}

/// Convert cents to a frequency ratio (100 cents = 1 semitone).
#[inline]
pub fn cents_to_ratio(cents: f64) -> f64 {
    libm::exp2(cents / 1200.0)
}

/// Convert semitones to a frequency ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    libm::exp2(semitones / 12.0)
}

/// Convert decibels to linear gain.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    libm::powf(10.0, db / 20.0)
}

/// Convert linear gain to decibels, with a -144 dB floor for silence.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-7 {
        -144.0
    } else {
        20.0 * libm::log10f(gain)
    }
}

/// Euclidean remainder for f64 phases, always in `[0, b)`.
#[inline]
pub fn rem_euclid_f64(a: f64, b: f64) -> f64 {
    let r = a - b * libm::floor(a / b);
    if r < 0.0 { r + b } else { r }
}
