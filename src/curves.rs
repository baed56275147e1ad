//! Waveshaper Transfer Curves
//!
//! Static lookup tables for the waveshaping stages. A curve maps input
//! amplitude in [-1, 1] to output amplitude; entry `i` of an `n`-entry table
//! holds the transfer value at `x = 2i/n - 1`. [`Curve::shape`] reads the
//! table back on the same grid, so the last entry covers `[1 - 2/n, 1]`.
//!
//! # Curve Kinds
//!
//! - **Distortion**: `(3 + a)·x·k / (π + a·|x|)`, soft and odd-symmetric
//! - **Fold**: ×3 drive, reflected back into [-1, 1], ×0.7 make-up
//! - **Bitcrush**: quantisation onto `2^(17 - crush)` levels, optional dither
//! - **Noise**: clipping + waveshaping + asymmetric bend + additive noise
//!
//! Distortion and Fold are pure functions of their parameter. Noise and
//! dithered Bitcrush draw from the session [`Rng`] and are only reproducible
//! under a fixed seed.

use crate::rng::Rng;
use core::f64::consts::PI;
use libm::Libm;
use serde::{Deserialize, Serialize};

/// Table length used by the rendering backend (one second at 44.1 kHz).
pub const DEFAULT_CURVE_RESOLUTION: usize = 44100;

/// Fixed drive of the distortion curve: twenty degrees, in radians.
const DISTORTION_K: f64 = 20.0 * PI / 180.0;

const FOLD_PRE_GAIN: f64 = 3.0;
const FOLD_POST_GAIN: f64 = 0.7;

/// Which transfer function to tabulate, with its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CurveKind {
    /// Classic soft distortion, `amount >= 0`
    Distortion { amount: f64 },
    /// Wavefolder with fixed gains
    Fold,
    /// Bit-depth reduction, `crush` in 1..=16
    Bitcrush { crush: u32, dither: bool },
    /// Combined clip/shape/noise, `percent` in 0..=100
    Noise { percent: f64 },
}

impl CurveKind {
    /// Whether tabulating this curve consumes randomness.
    pub fn is_random(&self) -> bool {
        match self {
            CurveKind::Noise { percent } => *percent > 0.0,
            CurveKind::Bitcrush { dither, .. } => *dither,
            _ => false,
        }
    }
}

/// A tabulated transfer function.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    samples: Vec<f32>,
}

impl Curve {
    /// Wrap raw samples as a curve.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Input value represented by table index `i`.
    pub fn input_at(&self, i: usize) -> f64 {
        table_x(i, self.samples.len())
    }

    /// Evaluate the curve at `x` with linear interpolation between entries.
    ///
    /// Index `i` sits at `x = 2i/n - 1`. Inputs past the last entry or outside
    /// [-1, 1] hold the end values.
    pub fn shape(&self, x: f64) -> f64 {
        let n = self.samples.len();
        match n {
            0 => return x,
            1 => return self.samples[0] as f64,
            _ => {}
        }

        let v = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * n as f64;
        let k = Libm::<f64>::floor(v);
        let idx = k as usize;
        if idx >= n - 1 {
            return self.samples[n - 1] as f64;
        }
        let frac = v - k;
        let a = self.samples[idx] as f64;
        let b = self.samples[idx + 1] as f64;
        a + frac * (b - a)
    }
}

#[inline]
fn table_x(i: usize, n: usize) -> f64 {
    (i as f64) * 2.0 / (n as f64) - 1.0
}

/// Tabulate `kind` at the given resolution.
pub fn generate_curve(kind: CurveKind, resolution: usize, rng: &mut Rng) -> Curve {
    let n = resolution.max(2);
    let samples = (0..n)
        .map(|i| {
            let x = table_x(i, n);
            let y = match kind {
                CurveKind::Distortion { amount } => distortion(x, amount),
                CurveKind::Fold => fold(x),
                CurveKind::Bitcrush { crush, dither } => {
                    let noise = if dither { rng.next_f64_bipolar() } else { 0.0 };
                    bitcrush(x, crush, noise)
                }
                CurveKind::Noise { percent } => {
                    let noise = if percent > 0.0 {
                        rng.next_f64_bipolar()
                    } else {
                        0.0
                    };
                    noise_shape(x, percent, noise)
                }
            };
            y as f32
        })
        .collect();
    Curve { samples }
}

/// Soft distortion transfer. Odd in `x` for every `amount`.
pub fn distortion(x: f64, amount: f64) -> f64 {
    let a = amount.max(0.0);
    (3.0 + a) * x * DISTORTION_K / (PI + a * x.abs())
}

/// Wavefolder transfer. Output lies in [-0.7, 0.7].
pub fn fold(x: f64) -> f64 {
    let mut y = x * FOLD_PRE_GAIN;
    // Pre-gain is bounded, so a handful of reflections always suffices
    while y > 1.0 || y < -1.0 {
        if y > 1.0 {
            y = 2.0 - y;
        } else {
            y = -2.0 - y;
        }
    }
    y * FOLD_POST_GAIN
}

/// Effective bit depth for a crush amount (clamped to 1..=16).
pub fn crush_bits(crush: u32) -> u32 {
    17 - crush.clamp(1, 16)
}

/// Number of quantisation levels for a crush amount.
pub fn crush_levels(crush: u32) -> u64 {
    1u64 << crush_bits(crush)
}

/// Bitcrush transfer.
///
/// `noise` is a bipolar draw in [-1, 1); pass 0.0 for no dither. The dither
/// spans half a quantisation step, scaled by `crush / 16`.
pub fn bitcrush(x: f64, crush: u32, noise: f64) -> f64 {
    let crush = crush.clamp(1, 16);
    let steps = (crush_levels(crush) - 1) as f64;
    let step = 2.0 / steps;
    let dither = noise * step * 0.5 * (crush as f64 / 16.0);

    let x = (x + dither).clamp(-1.0, 1.0);
    let index = Libm::<f64>::round((x + 1.0) * 0.5 * steps);
    (index / steps * 2.0 - 1.0).clamp(-1.0, 1.0)
}

/// Combined noise curve transfer.
///
/// `noise` is a bipolar draw in [-1, 1); its amplitude grows with the square
/// of `percent`. At 0% the transfer is the identity.
pub fn noise_shape(x: f64, percent: f64, noise: f64) -> f64 {
    let p = if percent.is_finite() {
        percent.clamp(0.0, 100.0) / 100.0
    } else {
        0.0
    };

    let threshold = 1.0 - 0.8 * p;
    let clipped = x.clamp(-threshold, threshold);

    let k = 50.0 * p;
    let mut y = (1.0 + k) * clipped / (1.0 + k * clipped.abs());

    if p > 0.5 {
        let weight = (p - 0.5) * 2.0;
        y += weight * (0.3 * y * y - 0.15 * y * y * y);
    }

    y += 0.15 * p * p * noise;
    y.clamp(-1.0, 1.0)
}

/// Stereo exponentially decaying noise burst for convolver stages.
pub fn impulse_response(
    sample_rate: f64,
    seconds: f64,
    decay: f64,
    rng: &mut Rng,
) -> [Vec<f32>; 2] {
    let length = ((sample_rate * seconds).max(1.0)) as usize;
    let mut channel = || {
        (0..length)
            .map(|i| {
                let envelope = Libm::<f64>::pow(1.0 - i as f64 / length as f64, decay);
                (rng.next_f64_bipolar() * envelope) as f32
            })
            .collect::<Vec<f32>>()
    };
    let left = channel();
    let right = channel();
    [left, right]
}
