//! Session Configuration
//!
//! Everything a session is built from, with defaults matching the stock
//! instrument. Every field is optional in JSON; missing ones take their
//! default value.

use crate::grains::GrainConfig;
use crate::mapper::SliderState;
use crate::observer::ObserverConfig;
use crate::pool::{FrequencyRange, PoolSettings};
use crate::router::Mode;
use crate::session::SessionError;
use crate::stage::StageDefaults;
use serde::{Deserialize, Serialize};

/// Construction parameters of an [`EngineSession`](crate::session::EngineSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sample rate of the rendering backend, used for impulse responses and
    /// the grain recorder
    pub sample_rate: f64,
    /// Samples per waveshaper curve
    pub curve_resolution: usize,
    /// Gain of the first oscillator set
    pub base_gain: f64,
    /// Detune distance between consecutive sets, in cents
    pub detune_spread: f64,
    /// Drive amount of the classic-mode distortion before the slider moves
    pub drive_amount: f64,
    pub initial_mode: Mode,
    pub frequency_range: FrequencyRange,
    /// Initial slider positions
    pub sliders: SliderState,
    pub grains: GrainConfig,
    pub events: ObserverConfig,
    /// Fixed seed for reproducible curves and detune jitter
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            curve_resolution: crate::curves::DEFAULT_CURVE_RESOLUTION,
            base_gain: 0.3,
            detune_spread: 15.0,
            drive_amount: 800.0,
            initial_mode: Mode::Noise,
            frequency_range: FrequencyRange::Low,
            sliders: SliderState::default(),
            grains: GrainConfig::default(),
            events: ObserverConfig::default(),
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Reject values no session can be built from
    pub fn validate(&self) -> Result<(), SessionError> {
        fn positive(name: &str, value: f64) -> Result<(), SessionError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SessionError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )))
            }
        }

        positive("sample_rate", self.sample_rate)?;
        positive("grains.buffer_seconds", self.grains.buffer_seconds)?;
        if self.curve_resolution < 2 {
            return Err(SessionError::Config(format!(
                "curve_resolution must be at least 2, got {}",
                self.curve_resolution
            )));
        }
        if !(self.base_gain.is_finite() && self.base_gain >= 0.0) {
            return Err(SessionError::Config(format!(
                "base_gain must be non-negative, got {}",
                self.base_gain
            )));
        }
        if !(self.detune_spread.is_finite() && self.detune_spread >= 0.0) {
            return Err(SessionError::Config(format!(
                "detune_spread must be non-negative, got {}",
                self.detune_spread
            )));
        }
        if !self.drive_amount.is_finite() {
            return Err(SessionError::Config("drive_amount must be finite".into()));
        }
        if self.grains.period_ms == 0 {
            return Err(SessionError::Config(
                "grains.period_ms must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.grains.jitter) {
            return Err(SessionError::Config(format!(
                "grains.jitter must be within 0..=1, got {}",
                self.grains.jitter
            )));
        }
        if !(0.0..=0.5).contains(&self.grains.fade_fraction) {
            return Err(SessionError::Config(format!(
                "grains.fade_fraction must be within 0..=0.5, got {}",
                self.grains.fade_fraction
            )));
        }
        Ok(())
    }

    pub(crate) fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            base_frequency: self.frequency_range.base_frequency(),
            multiplier: self.frequency_range.multiplier(),
            base_gain: self.base_gain,
            detune_spread: self.detune_spread,
        }
    }

    pub(crate) fn stage_defaults(&self) -> StageDefaults {
        StageDefaults {
            sample_rate: self.sample_rate,
            curve_resolution: self.curve_resolution,
            oversample: self.sliders.oversample,
            drive_amount: self.drive_amount,
            noise_percent: crate::mapper::clamp_percent(self.sliders.distortion),
            crush: crate::mapper::crush_amount(self.sliders.degradation),
            reverb_wet: crate::mapper::reverb_mix(self.sliders.reverb).0,
        }
    }

    /// Serialize to JSON string
    #[cfg(feature = "alloc")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON and validate
    #[cfg(feature = "alloc")]
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
