//! WASM bindings for TiltSynth
//!
//! This module provides the JavaScript-facing API for driving the synth core
//! from a browser page that owns the Web Audio graph.

mod engine;
mod error;

pub use engine::TiltSynthEngine;
pub use error::TiltSynthError;

// Re-export wasm_bindgen for convenience
pub use wasm_bindgen::prelude::*;
