// threshold.rs — Gradient magnitude → edge indicator.
//
// Two variants share one output buffer and are mutually exclusive per frame:
//
//   Hard   e = 1 if m > t else 0
//   Fuzzy  e = smoothstep(t - band, t + band, m)
//
// The fuzzy band is a half-width around the threshold. A band of zero would
// make smoothstep undefined, so configuration rejects it (config.rs).

use crate::image::{Image, Rgba};

/// Which threshold kernel runs this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Binary edge / no-edge decision.
    Hard,
    /// Graduated response across `threshold ± band`.
    Fuzzy,
}

impl ThresholdMode {
    /// The hard-threshold flag maps directly onto the mode.
    pub fn from_hard_flag(hard: bool) -> Self {
        if hard {
            ThresholdMode::Hard
        } else {
            ThresholdMode::Fuzzy
        }
    }
}

/// Hermite smoothstep, identical to WGSL's built-in for `e0 < e1`.
#[inline]
pub fn smoothstep(e0: f32, e1: f32, x: f32) -> f32 {
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn hard_at(magnitude: f32, threshold: f32) -> f32 {
    if magnitude > threshold {
        1.0
    } else {
        0.0
    }
}

#[inline]
pub fn fuzzy_at(magnitude: f32, threshold: f32, band: f32) -> f32 {
    smoothstep(threshold - band, threshold + band, magnitude)
}

/// Whole-image threshold of a magnitude buffer.
pub fn threshold(
    magnitude: &Image<Rgba>,
    mode: ThresholdMode,
    threshold: f32,
    band: f32,
) -> Image<Rgba> {
    magnitude.map(|m| {
        let e = match mode {
            ThresholdMode::Hard => hard_at(m.r, threshold),
            ThresholdMode::Fuzzy => fuzzy_at(m.r, threshold, band),
        };
        Rgba::splat(e)
    })
}
