//! Effect Stage Registry
//!
//! The fixed catalog of effect nodes the router wires together. Every stage
//! exists exactly once per session and is re-parameterised in place; only
//! waveshaper curves are regenerated. Stages carry no connection state, which
//! belongs to [`GraphRouter`](crate::router::GraphRouter).

use crate::curves::{generate_curve, impulse_response, Curve, CurveKind};
use crate::rng::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Identifier of a stage in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Sum of all oscillator sets
    Master,
    Drive,
    ClassicGain,
    FoldShaper,
    NoiseShaper,
    Highpass,
    DreamReverb,
    StereoDelay,
    DelayMerge,
    Notch,
    RingModulator,
    /// Oscillator driving the ring modulator's gain
    RingCarrier,
    SampleReducer,
    Bitcrusher,
    NoiseSource,
    NoiseGain,
    CrushBus,
    Reverb,
    DryGain,
    WetGain,
    /// Granular voices, mixed into the compressor in Glitch mode
    GrainBus,
    Compressor,
    /// The platform audio output
    Destination,
}

impl StageId {
    pub const ALL: [StageId; 23] = [
        StageId::Master,
        StageId::Drive,
        StageId::ClassicGain,
        StageId::FoldShaper,
        StageId::NoiseShaper,
        StageId::Highpass,
        StageId::DreamReverb,
        StageId::StereoDelay,
        StageId::DelayMerge,
        StageId::Notch,
        StageId::RingModulator,
        StageId::RingCarrier,
        StageId::SampleReducer,
        StageId::Bitcrusher,
        StageId::NoiseSource,
        StageId::NoiseGain,
        StageId::CrushBus,
        StageId::Reverb,
        StageId::DryGain,
        StageId::WetGain,
        StageId::GrainBus,
        StageId::Compressor,
        StageId::Destination,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageId::Master => "master",
            StageId::Drive => "drive",
            StageId::ClassicGain => "classic_gain",
            StageId::FoldShaper => "fold_shaper",
            StageId::NoiseShaper => "noise_shaper",
            StageId::Highpass => "highpass",
            StageId::DreamReverb => "dream_reverb",
            StageId::StereoDelay => "stereo_delay",
            StageId::DelayMerge => "delay_merge",
            StageId::Notch => "notch",
            StageId::RingModulator => "ring_modulator",
            StageId::RingCarrier => "ring_carrier",
            StageId::SampleReducer => "sample_reducer",
            StageId::Bitcrusher => "bitcrusher",
            StageId::NoiseSource => "noise_source",
            StageId::NoiseGain => "noise_gain",
            StageId::CrushBus => "crush_bus",
            StageId::Reverb => "reverb",
            StageId::DryGain => "dry_gain",
            StageId::WetGain => "wet_gain",
            StageId::GrainBus => "grain_bus",
            StageId::Compressor => "compressor",
            StageId::Destination => "destination",
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageId::Drive | StageId::FoldShaper | StageId::NoiseShaper | StageId::Bitcrusher => {
                StageKind::WaveShaper
            }
            StageId::Highpass => StageKind::BiquadFilter {
                filter: FilterType::Highpass,
            },
            StageId::Notch => StageKind::BiquadFilter {
                filter: FilterType::Notch,
            },
            StageId::DreamReverb | StageId::Reverb => StageKind::Convolver,
            StageId::StereoDelay => StageKind::Delay,
            StageId::Compressor => StageKind::Compressor,
            StageId::RingCarrier => StageKind::Oscillator,
            StageId::SampleReducer => StageKind::SampleReducer,
            StageId::NoiseSource => StageKind::NoiseSource,
            StageId::Destination => StageKind::Destination,
            StageId::Master
            | StageId::ClassicGain
            | StageId::DelayMerge
            | StageId::RingModulator
            | StageId::NoiseGain
            | StageId::CrushBus
            | StageId::DryGain
            | StageId::WetGain
            | StageId::GrainBus => StageKind::Gain,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl core::fmt::Display for StageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Biquad response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Highpass,
    Notch,
}

/// What kind of node the rendering backend has to instantiate for a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StageKind {
    WaveShaper,
    BiquadFilter { filter: FilterType },
    Convolver,
    Delay,
    Compressor,
    Gain,
    /// Oscillator used as a modulation source
    Oscillator,
    /// Sample-and-hold rate reduction, run by the core per block
    SampleReducer,
    /// Looping white-noise buffer
    NoiseSource,
    Destination,
}

/// Numeric parameters a stage can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Gain,
    Frequency,
    Q,
    DelayTime,
    Threshold,
    Knee,
    Ratio,
    Attack,
    Release,
    HoldSamples,
}

impl Param {
    pub const ALL: [Param; 10] = [
        Param::Gain,
        Param::Frequency,
        Param::Q,
        Param::DelayTime,
        Param::Threshold,
        Param::Knee,
        Param::Ratio,
        Param::Attack,
        Param::Release,
        Param::HoldSamples,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Param::Gain => "gain",
            Param::Frequency => "frequency",
            Param::Q => "q",
            Param::DelayTime => "delay_time",
            Param::Threshold => "threshold",
            Param::Knee => "knee",
            Param::Ratio => "ratio",
            Param::Attack => "attack",
            Param::Release => "release",
            Param::HoldSamples => "hold_samples",
        }
    }
}

impl core::fmt::Display for Param {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl core::str::FromStr for Param {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s.trim())
            .ok_or_else(|| format!("Unknown parameter: {}", s))
    }
}

impl core::str::FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s.trim())
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

/// Waveshaper oversampling, mirrored 1:1 by the rendering backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Oversample {
    None,
    #[default]
    X2,
    X4,
}

impl Oversample {
    /// Map a selector index (0, 1, 2); larger indices saturate at 4x.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Oversample::None,
            1 => Oversample::X2,
            _ => Oversample::X4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Oversample::None => "none",
            Oversample::X2 => "2x",
            Oversample::X4 => "4x",
        }
    }
}

/// A single stage of the catalog with its live parameter values
#[derive(Debug, Clone)]
pub struct EffectStage {
    id: StageId,
    params: BTreeMap<Param, f64>,
    curve: Option<(CurveKind, Curve)>,
    oversample: Oversample,
    impulse: Option<[Vec<f32>; 2]>,
}

impl EffectStage {
    fn new(id: StageId) -> Self {
        Self {
            id,
            params: BTreeMap::new(),
            curve: None,
            oversample: Oversample::default(),
            impulse: None,
        }
    }

    fn with_param(mut self, param: Param, value: f64) -> Self {
        self.params.insert(param, value);
        self
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn kind(&self) -> StageKind {
        self.id.kind()
    }

    /// Current value of a parameter, if the stage has it
    pub fn param(&self, param: Param) -> Option<f64> {
        self.params.get(&param).copied()
    }

    /// All parameters with their current values
    pub fn params(&self) -> impl Iterator<Item = (Param, f64)> + '_ {
        self.params.iter().map(|(&p, &v)| (p, v))
    }

    /// Write a parameter in place.
    ///
    /// Returns false (and changes nothing) if the stage has no such parameter.
    pub fn set_param(&mut self, param: Param, value: f64) -> bool {
        match self.params.get_mut(&param) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn curve(&self) -> Option<&Curve> {
        self.curve.as_ref().map(|(_, c)| c)
    }

    pub fn curve_kind(&self) -> Option<CurveKind> {
        self.curve.as_ref().map(|(k, _)| *k)
    }

    pub fn oversample(&self) -> Oversample {
        self.oversample
    }

    /// Stereo impulse response of a convolver stage
    pub fn impulse(&self) -> Option<&[Vec<f32>; 2]> {
        self.impulse.as_ref()
    }
}

/// Serializable view of a stage, enough for a backend to instantiate it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub id: StageId,
    pub kind: StageKind,
    pub params: BTreeMap<Param, f64>,
    pub curve: Option<CurveKind>,
    pub oversample: Option<Oversample>,
}

impl EffectStage {
    pub fn snapshot(&self) -> StageSnapshot {
        let shaper = self.kind() == StageKind::WaveShaper;
        StageSnapshot {
            id: self.id,
            kind: self.kind(),
            params: self.params.clone(),
            curve: self.curve_kind(),
            oversample: shaper.then_some(self.oversample),
        }
    }
}

/// Settings used to build the catalog
#[derive(Debug, Clone, Copy)]
pub struct StageDefaults {
    pub sample_rate: f64,
    pub curve_resolution: usize,
    pub oversample: Oversample,
    pub drive_amount: f64,
    pub noise_percent: f64,
    pub crush: u32,
    pub reverb_wet: f64,
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            curve_resolution: crate::curves::DEFAULT_CURVE_RESOLUTION,
            oversample: Oversample::X2,
            drive_amount: 800.0,
            noise_percent: 0.0,
            crush: 1,
            reverb_wet: 0.0,
        }
    }
}

/// The fixed catalog of stages, one per [`StageId`]
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<EffectStage>,
    curve_resolution: usize,
}

impl StageRegistry {
    /// Build every stage with its initial parameters, curves and impulses.
    pub fn new(defaults: &StageDefaults, rng: &mut Rng) -> Self {
        let stages = StageId::ALL
            .iter()
            .map(|&id| initial_stage(id, defaults))
            .collect();

        let mut registry = Self {
            stages,
            curve_resolution: defaults.curve_resolution,
        };

        registry.set_curve(
            StageId::Drive,
            CurveKind::Distortion {
                amount: defaults.drive_amount,
            },
            rng,
        );
        registry.set_curve(StageId::FoldShaper, CurveKind::Fold, rng);
        registry.set_curve(
            StageId::NoiseShaper,
            CurveKind::Noise {
                percent: defaults.noise_percent,
            },
            rng,
        );
        registry.set_curve(
            StageId::Bitcrusher,
            CurveKind::Bitcrush {
                crush: defaults.crush,
                dither: true,
            },
            rng,
        );
        registry.set_oversample(defaults.oversample);

        registry.stages[StageId::Reverb.index()].impulse =
            Some(impulse_response(defaults.sample_rate, 2.0, 2.0, rng));
        registry.stages[StageId::DreamReverb.index()].impulse =
            Some(impulse_response(defaults.sample_rate, 3.0, 1.5, rng));

        registry
    }

    pub fn get(&self, id: StageId) -> &EffectStage {
        &self.stages[id.index()]
    }

    pub fn get_mut(&mut self, id: StageId) -> &mut EffectStage {
        &mut self.stages[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectStage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn param(&self, id: StageId, param: Param) -> Option<f64> {
        self.get(id).param(param)
    }

    pub fn set_param(&mut self, id: StageId, param: Param, value: f64) -> bool {
        self.get_mut(id).set_param(param, value)
    }

    /// Regenerate the curve of a waveshaper stage.
    ///
    /// Non-waveshaper stages are left untouched and false is returned. A
    /// deterministic curve that is already installed is kept as is; random
    /// kinds always draw a fresh table.
    pub fn set_curve(&mut self, id: StageId, kind: CurveKind, rng: &mut Rng) -> bool {
        if id.kind() != StageKind::WaveShaper {
            return false;
        }
        if !kind.is_random() && self.get(id).curve_kind() == Some(kind) {
            return true;
        }
        let curve = generate_curve(kind, self.curve_resolution, rng);
        debug!(stage = %id, ?kind, "regenerated curve");
        self.get_mut(id).curve = Some((kind, curve));
        true
    }

    /// Apply an oversample setting to every waveshaper stage.
    pub fn set_oversample(&mut self, oversample: Oversample) {
        for stage in &mut self.stages {
            if stage.kind() == StageKind::WaveShaper {
                stage.oversample = oversample;
            }
        }
    }
}

fn initial_stage(id: StageId, defaults: &StageDefaults) -> EffectStage {
    let stage = EffectStage::new(id);
    let wet = defaults.reverb_wet.clamp(0.0, 1.0);
    match id.kind() {
        StageKind::Gain => {
            let gain = match id {
                StageId::RingModulator | StageId::NoiseGain => 0.0,
                StageId::WetGain => wet,
                StageId::DryGain => 1.0 - wet,
                _ => 1.0,
            };
            stage.with_param(Param::Gain, gain)
        }
        StageKind::BiquadFilter { filter } => {
            let (frequency, q) = match filter {
                FilterType::Highpass => (50.0, 1.0),
                FilterType::Notch => (200.0, 5.0),
            };
            stage
                .with_param(Param::Frequency, frequency)
                .with_param(Param::Q, q)
        }
        StageKind::Delay => stage.with_param(Param::DelayTime, 0.005),
        StageKind::Compressor => stage
            .with_param(Param::Threshold, -24.0)
            .with_param(Param::Knee, 30.0)
            .with_param(Param::Ratio, 12.0)
            .with_param(Param::Attack, 0.003)
            .with_param(Param::Release, 0.25),
        StageKind::Oscillator => stage.with_param(Param::Frequency, 200.0),
        StageKind::SampleReducer => stage.with_param(Param::HoldSamples, 1.0),
        StageKind::WaveShaper
        | StageKind::Convolver
        | StageKind::NoiseSource
        | StageKind::Destination => stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_defaults() -> StageDefaults {
        StageDefaults {
            sample_rate: 1000.0,
            curve_resolution: 256,
            ..StageDefaults::default()
        }
    }

    #[test]
    fn test_catalog_has_every_stage_once() {
        let mut rng = Rng::from_seed(1);
        let registry = StageRegistry::new(&small_defaults(), &mut rng);
        assert_eq!(registry.len(), StageId::ALL.len());
        for (stage, id) in registry.iter().zip(StageId::ALL.iter()) {
            assert_eq!(stage.id(), *id);
        }
    }

    #[test]
    fn test_waveshapers_get_curves() {
        let mut rng = Rng::from_seed(1);
        let registry = StageRegistry::new(&small_defaults(), &mut rng);
        for stage in registry.iter() {
            if stage.kind() == StageKind::WaveShaper {
                assert_eq!(stage.curve().map(|c| c.len()), Some(256));
                assert_eq!(stage.oversample(), Oversample::X2);
            } else {
                assert!(stage.curve().is_none());
            }
        }
        assert_eq!(
            registry.get(StageId::Drive).curve_kind(),
            Some(CurveKind::Distortion { amount: 800.0 })
        );
    }

    #[test]
    fn test_set_param_only_touches_known_params() {
        let mut rng = Rng::from_seed(1);
        let mut registry = StageRegistry::new(&small_defaults(), &mut rng);

        assert!(registry.set_param(StageId::Highpass, Param::Frequency, 400.0));
        assert_eq!(registry.param(StageId::Highpass, Param::Frequency), Some(400.0));

        assert!(!registry.set_param(StageId::Highpass, Param::DelayTime, 0.1));
        assert_eq!(registry.param(StageId::Highpass, Param::DelayTime), None);
    }

    #[test]
    fn test_set_curve_rejects_non_shapers() {
        let mut rng = Rng::from_seed(1);
        let mut registry = StageRegistry::new(&small_defaults(), &mut rng);
        assert!(!registry.set_curve(StageId::Compressor, CurveKind::Fold, &mut rng));
        assert!(registry.get(StageId::Compressor).curve().is_none());
    }

    #[test]
    fn test_set_curve_keeps_unchanged_deterministic_table() {
        let mut rng = Rng::from_seed(1);
        let mut registry = StageRegistry::new(&small_defaults(), &mut rng);
        let kind = CurveKind::Distortion { amount: 50.0 };

        assert!(registry.set_curve(StageId::Drive, kind, &mut rng));
        let before = registry.get(StageId::Drive).curve().map(|c| c.as_slice().as_ptr());
        assert!(registry.set_curve(StageId::Drive, kind, &mut rng));
        let after = registry.get(StageId::Drive).curve().map(|c| c.as_slice().as_ptr());
        assert_eq!(before, after);

        let noise = CurveKind::Noise { percent: 60.0 };
        registry.set_curve(StageId::NoiseShaper, noise, &mut rng);
        let first = registry.get(StageId::NoiseShaper).curve().cloned();
        registry.set_curve(StageId::NoiseShaper, noise, &mut rng);
        assert_ne!(registry.get(StageId::NoiseShaper).curve().cloned(), first);
    }

    #[test]
    fn test_reverb_defaults_sum_to_one() {
        let mut rng = Rng::from_seed(1);
        let defaults = StageDefaults {
            reverb_wet: 0.3,
            ..small_defaults()
        };
        let registry = StageRegistry::new(&defaults, &mut rng);
        let wet = registry.param(StageId::WetGain, Param::Gain).unwrap_or_default();
        let dry = registry.param(StageId::DryGain, Param::Gain).unwrap_or_default();
        assert!((wet + dry - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_convolvers_have_impulses() {
        let mut rng = Rng::from_seed(1);
        let registry = StageRegistry::new(&small_defaults(), &mut rng);
        assert_eq!(
            registry.get(StageId::Reverb).impulse().map(|ir| ir[0].len()),
            Some(2000)
        );
        assert_eq!(
            registry.get(StageId::DreamReverb).impulse().map(|ir| ir[1].len()),
            Some(3000)
        );
    }

    #[test]
    fn test_oversample_from_index() {
        assert_eq!(Oversample::from_index(0), Oversample::None);
        assert_eq!(Oversample::from_index(1), Oversample::X2);
        assert_eq!(Oversample::from_index(2), Oversample::X4);
        assert_eq!(Oversample::from_index(9), Oversample::X4);
    }

    #[test]
    fn test_names_parse_back() {
        for id in StageId::ALL {
            assert_eq!(id.name().parse::<StageId>(), Ok(id));
        }
        for param in Param::ALL {
            assert_eq!(param.name().parse::<Param>(), Ok(param));
        }
        assert!("mixer".parse::<StageId>().is_err());
    }

    #[test]
    fn test_snapshot() {
        let mut rng = Rng::from_seed(1);
        let registry = StageRegistry::new(&small_defaults(), &mut rng);

        let drive = registry.get(StageId::Drive).snapshot();
        assert_eq!(drive.curve, Some(CurveKind::Distortion { amount: 800.0 }));
        assert_eq!(drive.oversample, Some(Oversample::X2));

        let compressor = registry.get(StageId::Compressor).snapshot();
        assert_eq!(compressor.oversample, None);
        assert_eq!(compressor.params.get(&Param::Threshold), Some(&-24.0));
    }
}
