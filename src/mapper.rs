//! Parameter Mapper
//!
//! Maps the orientation sample and the slider positions onto live stage and
//! oscillator parameters. The mapper never creates, removes or connects
//! anything; it only writes values. Each mapping is a small pure function so
//! the numbers can be checked without a session.
//!
//! | input       | mode    | target                                   |
//! |-------------|---------|------------------------------------------|
//! | x, y, α     | all     | detune of square, sine, triangle         |
//! | x           | Dream   | highpass cutoff, 50–800 Hz               |
//! | y           | Dream   | stereo delay time, 5–50 ms               |
//! | x           | Glitch  | notch cutoff, 200–3000 Hz                |
//! | y           | Glitch  | ring carrier frequency, 200–800 Hz       |
//! | α           | Glitch  | grain length, 10–200 ms                  |
//! | distortion  | all     | active waveshaper curve                  |
//! | degradation | all     | crusher curve, hold count, noise gain    |
//! | reverb      | all     | wet/dry gains                            |

use crate::curves::CurveKind;
use crate::grains::GrainScheduler;
use crate::pool::OscillatorPool;
use crate::rng::Rng;
use crate::router::Mode;
use crate::stage::{Oversample, Param, StageId, StageRegistry};
use libm::Libm;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Detune depth per degree of tilt, as a fraction of the base frequency
pub const DETUNE_SCALE: f64 = 0.1;

/// Full-scale tilt in degrees
const TILT_RANGE: f64 = 90.0;

/// The latest orientation reading, in whole degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Left-right tilt (gamma)
    pub x: i32,
    /// Front-back tilt (beta)
    pub y: i32,
    /// Compass heading (alpha)
    pub rotation: i32,
}

impl OrientationSample {
    pub fn new(x: i32, y: i32, rotation: i32) -> Self {
        Self { x, y, rotation }
    }

    /// Build from raw sensor angles, rounding to whole degrees.
    ///
    /// Missing or non-finite axes read as zero.
    pub fn from_angles(alpha: Option<f64>, beta: Option<f64>, gamma: Option<f64>) -> Self {
        Self {
            x: round_degrees(gamma),
            y: round_degrees(beta),
            rotation: round_degrees(alpha),
        }
    }
}

fn round_degrees(angle: Option<f64>) -> i32 {
    match angle {
        // Halves round towards positive infinity
        Some(a) if a.is_finite() => Libm::<f64>::floor(a + 0.5) as i32,
        _ => 0,
    }
}

/// Slider positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderState {
    /// 0–100
    pub distortion: f64,
    /// 0–100
    pub degradation: f64,
    /// 0–100
    pub reverb: f64,
    pub oversample: Oversample,
}

impl Default for SliderState {
    fn default() -> Self {
        Self {
            distortion: 0.0,
            degradation: 0.0,
            reverb: 0.0,
            oversample: Oversample::X2,
        }
    }
}

/// A parameter value the mapper wrote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamWrite {
    pub stage: StageId,
    pub param: Param,
    pub value: f64,
}

impl ParamWrite {
    fn new(stage: StageId, param: Param, value: f64) -> Self {
        Self {
            stage,
            param,
            value,
        }
    }
}

/// Clamp a slider value to 0–100; non-finite values read as 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Orientation detune of one generator, in cents
pub fn axis_detune(offset: f64, base_frequency: f64, multiplier: f64, axis: i32) -> f64 {
    offset + base_frequency * multiplier * (axis as f64 * DETUNE_SCALE)
}

/// Detunes of a set's square, sine and triangle generators
pub fn set_detunes(
    offset: f64,
    base_frequency: f64,
    multiplier: f64,
    sample: OrientationSample,
) -> [f64; 3] {
    [sample.x, sample.y, sample.rotation]
        .map(|axis| axis_detune(offset, base_frequency, multiplier, axis))
}

fn tilt(axis: i32) -> f64 {
    (axis as f64 / TILT_RANGE).abs()
}

/// Dream highpass cutoff in Hz
pub fn dream_highpass(x: i32) -> f64 {
    (50.0 + tilt(x) * 750.0).clamp(50.0, 800.0)
}

/// Dream stereo delay time in seconds
pub fn dream_delay(y: i32) -> f64 {
    (0.005 + tilt(y) * 0.045).clamp(0.005, 0.05)
}

/// Glitch notch cutoff in Hz
pub fn glitch_notch(x: i32) -> f64 {
    (200.0 + tilt(x) * 2800.0).clamp(200.0, 3000.0)
}

/// Glitch ring carrier frequency in Hz (unclamped)
pub fn ring_frequency(y: i32) -> f64 {
    200.0 + tilt(y) * 600.0
}

/// Grain length in seconds for a compass heading
pub fn grain_seconds(rotation: i32) -> f64 {
    let heading = rotation.rem_euclid(360) as f64;
    0.01 + (heading / 360.0) * 0.19
}

/// Crush amount (1–16) for a degradation percentage
pub fn crush_amount(percent: f64) -> u32 {
    1 + Libm::<f64>::floor(clamp_percent(percent) / 100.0 * 15.0) as u32
}

/// Sample-and-hold length for a crush amount
pub fn hold_samples(crush: u32) -> usize {
    Libm::<f64>::floor(1.0 + (crush.max(1) - 1) as f64 * 2.93) as usize
}

/// Gain of the dither noise mixed after the crusher
pub fn noise_gain(percent: f64) -> f64 {
    clamp_percent(percent) / 100.0 * 0.15
}

/// (wet, dry) reverb gains; always sum to one
pub fn reverb_mix(percent: f64) -> (f64, f64) {
    let wet = clamp_percent(percent) / 100.0;
    (wet, 1.0 - wet)
}

/// The waveshaper the distortion slider drives in a mode, and its curve
pub fn distortion_curve(mode: Mode, percent: f64) -> (StageId, CurveKind) {
    let percent = clamp_percent(percent);
    match mode {
        Mode::Classic => (
            StageId::Drive,
            CurveKind::Distortion {
                amount: percent * 8.0,
            },
        ),
        Mode::Noise | Mode::Dream | Mode::Glitch => {
            (StageId::NoiseShaper, CurveKind::Noise { percent })
        }
    }
}

/// Writes mapped values into the session's stages and oscillator sets
#[derive(Debug, Default)]
pub struct ParameterMapper;

impl ParameterMapper {
    pub fn new() -> Self {
        Self
    }

    /// Apply one orientation sample.
    ///
    /// Detunes every set in every mode, then the mode-specific targets.
    pub fn map_orientation(
        &self,
        mode: Mode,
        sample: OrientationSample,
        stages: &mut StageRegistry,
        pool: &mut OscillatorPool,
        grains: &mut GrainScheduler,
    ) -> Vec<ParamWrite> {
        let base = pool.base_frequency();
        let multiplier = pool.multiplier();
        for (_, set) in pool.iter_mut() {
            let detunes = set_detunes(set.detune_offset(), base, multiplier, sample);
            set.set_detunes(detunes);
        }

        let writes = match mode {
            Mode::Dream => vec![
                ParamWrite::new(StageId::Highpass, Param::Frequency, dream_highpass(sample.x)),
                ParamWrite::new(StageId::StereoDelay, Param::DelayTime, dream_delay(sample.y)),
            ],
            Mode::Glitch => {
                grains.set_grain_seconds(grain_seconds(sample.rotation));
                vec![
                    ParamWrite::new(StageId::Notch, Param::Frequency, glitch_notch(sample.x)),
                    ParamWrite::new(
                        StageId::RingCarrier,
                        Param::Frequency,
                        ring_frequency(sample.y),
                    ),
                ]
            }
            Mode::Noise | Mode::Classic => Vec::new(),
        };

        apply(stages, writes)
    }

    /// Regenerate the active waveshaper for a distortion position.
    pub fn map_distortion(
        &self,
        mode: Mode,
        percent: f64,
        stages: &mut StageRegistry,
        rng: &mut Rng,
    ) -> (StageId, CurveKind) {
        let (stage, kind) = distortion_curve(mode, percent);
        stages.set_curve(stage, kind, rng);
        (stage, kind)
    }

    /// Apply a degradation position: crusher curve, hold count, noise level.
    pub fn map_degradation(
        &self,
        percent: f64,
        stages: &mut StageRegistry,
        rng: &mut Rng,
    ) -> Vec<ParamWrite> {
        let crush = crush_amount(percent);
        stages.set_curve(
            StageId::Bitcrusher,
            CurveKind::Bitcrush {
                crush,
                dither: true,
            },
            rng,
        );
        debug!(crush, hold = hold_samples(crush), "degradation mapped");

        apply(
            stages,
            vec![
                ParamWrite::new(
                    StageId::SampleReducer,
                    Param::HoldSamples,
                    hold_samples(crush) as f64,
                ),
                ParamWrite::new(StageId::NoiseGain, Param::Gain, noise_gain(percent)),
            ],
        )
    }

    /// Apply a reverb position to the wet and dry gains.
    pub fn map_reverb(&self, percent: f64, stages: &mut StageRegistry) -> Vec<ParamWrite> {
        let (wet, dry) = reverb_mix(percent);
        apply(
            stages,
            vec![
                ParamWrite::new(StageId::WetGain, Param::Gain, wet),
                ParamWrite::new(StageId::DryGain, Param::Gain, dry),
            ],
        )
    }

    pub fn map_oversample(&self, oversample: Oversample, stages: &mut StageRegistry) {
        stages.set_oversample(oversample);
    }

    /// Write the master gain of a mode.
    pub fn map_master_gain(&self, mode: Mode, stages: &mut StageRegistry) -> Vec<ParamWrite> {
        apply(
            stages,
            vec![ParamWrite::new(StageId::Master, Param::Gain, mode.master_gain())],
        )
    }
}

fn apply(stages: &mut StageRegistry, writes: Vec<ParamWrite>) -> Vec<ParamWrite> {
    writes
        .into_iter()
        .filter(|w| stages.set_param(w.stage, w.param, w.value))
        .collect()
}
