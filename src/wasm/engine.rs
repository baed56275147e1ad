//! TiltSynthEngine - Main WASM interface for the synth core

use super::error::TiltSynthError;
use crate::config::SessionConfig;
use crate::mapper::OrientationSample;
use crate::pool::FrequencyRange;
use crate::router::Mode;
use crate::session::{Control, EngineSession};
use crate::stage::{Param, StageId, StageSnapshot};
use core::time::Duration;
use wasm_bindgen::prelude::*;

/// Main WASM interface for the synth core
#[wasm_bindgen]
pub struct TiltSynthEngine {
    session: EngineSession,
}

#[wasm_bindgen]
impl TiltSynthEngine {
    /// Create an engine with default settings at the given sample rate
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Result<TiltSynthEngine, JsValue> {
        // Initialize panic hook for better error messages
        console_error_panic_hook::set_once();

        let config = SessionConfig {
            sample_rate,
            ..SessionConfig::default()
        };
        let session = EngineSession::new(config).map_err(js_error)?;
        Ok(Self { session })
    }

    /// Create an engine from a JSON configuration
    pub fn from_config(config_json: &str) -> Result<TiltSynthEngine, JsValue> {
        console_error_panic_hook::set_once();

        let config = SessionConfig::from_json(config_json).map_err(js_error)?;
        let session = EngineSession::new(config).map_err(js_error)?;
        Ok(Self { session })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Call from a user gesture; true if the page should start its AudioContext
    pub fn request_start(&mut self) -> bool {
        self.session.request_start()
    }

    /// Report the AudioContext outcome; `error` is set when it failed
    pub fn engine_started(&mut self, error: Option<String>) -> Result<(), JsValue> {
        let result = match error {
            Some(msg) => Err(msg),
            None => Ok(()),
        };
        self.session.engine_started(result).map_err(js_error)
    }

    pub fn stop(&mut self) -> bool {
        self.session.stop()
    }

    pub fn permission_denied(&mut self, reason: &str) {
        self.session.permission_denied(reason);
    }

    #[wasm_bindgen(getter)]
    pub fn running(&self) -> bool {
        self.session.is_running()
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Feed a `deviceorientation` reading; null axes read as zero
    pub fn handle_orientation(
        &mut self,
        alpha: Option<f64>,
        beta: Option<f64>,
        gamma: Option<f64>,
    ) -> Result<JsValue, JsValue> {
        let sample: OrientationSample = self.session.handle_orientation(alpha, beta, gamma);
        to_js(&sample)
    }

    /// Switch mode by name; returns the edge diff, or null before start
    pub fn switch_mode(&mut self, mode: &str) -> Result<JsValue, JsValue> {
        let mode: Mode = mode.parse().map_err(|e| js_error(format!("{}", e)))?;
        let change = self.session.switch_mode(mode).map_err(js_error)?;
        to_js(&change)
    }

    pub fn add_oscillator_set(&mut self) -> bool {
        self.session.add_oscillator_set().is_some()
    }

    /// Apply a slider or selector by name
    pub fn set_control(&mut self, name: &str, value: f64) -> Result<(), JsValue> {
        let control = Control::from_value(name, value).map_err(js_error)?;
        self.session.apply_control(control).map_err(js_error)
    }

    pub fn set_frequency_range(&mut self, range: &str) -> Result<(), JsValue> {
        let range: FrequencyRange = range.parse().map_err(js_error)?;
        self.session.set_frequency_range(range);
        Ok(())
    }

    // =========================================================================
    // Timers and Audio
    // =========================================================================

    /// Poll the grain timer at `now_ms`; returns the spawned grain or null
    pub fn poll_grains(&mut self, now_ms: f64) -> Result<JsValue, JsValue> {
        let now = if now_ms.is_finite() && now_ms > 0.0 {
            Duration::from_secs_f64(now_ms / 1000.0)
        } else {
            Duration::ZERO
        };
        to_js(&self.session.poll_grains(now))
    }

    /// Poll the grain timer using the JavaScript clock
    pub fn poll_grains_now(&mut self) -> Result<JsValue, JsValue> {
        self.poll_grains(js_sys::Date::now())
    }

    /// Run the sample-and-hold reducer over one render quantum
    pub fn process_reducer(&mut self, input: &[f32], output: &mut [f32]) {
        self.session.process_reducer(input, output);
    }

    /// Record the master bus and write the grain mix
    pub fn process_grains(&mut self, master: &[f32], output: &mut [f32]) {
        self.session.process_grains(master, output);
    }

    // =========================================================================
    // Graph Introspection
    // =========================================================================

    pub fn get_connections(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.connections())
    }

    /// Every stage with its kind, parameters and curve settings
    pub fn get_stages(&self) -> Result<JsValue, JsValue> {
        let stages: Vec<StageSnapshot> =
            self.session.stages().iter().map(|s| s.snapshot()).collect();
        to_js(&stages)
    }

    /// Waveshaper curve samples; empty for other stages
    pub fn get_curve(&self, stage: &str) -> Result<Vec<f32>, JsValue> {
        let id: StageId = stage.parse().map_err(js_error)?;
        Ok(self
            .session
            .stages()
            .get(id)
            .curve()
            .map(|c| c.as_slice().to_vec())
            .unwrap_or_default())
    }

    /// One channel of a convolver impulse response; empty for other stages
    pub fn get_impulse(&self, stage: &str, channel: usize) -> Result<Vec<f32>, JsValue> {
        let id: StageId = stage.parse().map_err(js_error)?;
        Ok(self
            .session
            .stages()
            .get(id)
            .impulse()
            .and_then(|ir| ir.get(channel).cloned())
            .unwrap_or_default())
    }

    pub fn get_param(&self, stage: &str, param: &str) -> Result<Option<f64>, JsValue> {
        let id: StageId = stage.parse().map_err(js_error)?;
        let param: Param = param.parse().map_err(js_error)?;
        Ok(self.session.param(id, param))
    }

    // =========================================================================
    // State
    // =========================================================================

    #[wasm_bindgen(getter)]
    pub fn mode(&self) -> String {
        self.session.mode().name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn set_count(&self) -> usize {
        self.session.pool().len()
    }

    /// All oscillator sets with their generators
    pub fn get_sets(&self) -> Result<JsValue, JsValue> {
        let sets: Vec<_> = self.session.pool().iter().map(|(_, s)| s.clone()).collect();
        to_js(&sets)
    }

    /// Take all pending presentation events
    pub fn drain_events(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.session.drain_events())
    }
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn js_error(e: impl Into<TiltSynthError>) -> JsValue {
    e.into().into_js()
}
