//! Error types for WASM bindings

use crate::router::RouterError;
use crate::session::SessionError;
use wasm_bindgen::prelude::*;

/// Error type for WASM bindings
#[wasm_bindgen]
pub struct TiltSynthError {
    message: String,
}

#[wasm_bindgen]
impl TiltSynthError {
    /// Get the error message
    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<SessionError> for TiltSynthError {
    fn from(e: SessionError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

impl From<RouterError> for TiltSynthError {
    fn from(e: RouterError) -> Self {
        SessionError::from(e).into()
    }
}

impl From<String> for TiltSynthError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TiltSynthError {
    fn from(message: &str) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TiltSynthError {
    /// Convert to JsValue for use as error return
    pub fn into_js(self) -> JsValue {
        JsValue::from_str(&self.message)
    }
}
