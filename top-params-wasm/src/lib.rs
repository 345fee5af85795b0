//! WebAssembly bindings for the TopParams Reader and Listener.
//!
//! Exposes two classes to JavaScript:
//!
//! - `TopParamsReader` - the embedded control (`init`, `updateView`,
//!   `getOutputs`, `destroy`)
//! - `TopParamsListener` - the host-page listener (`onInit`, `onDispose`,
//!   `broadcast`), plus `installSnippet()` for the drop-in page script
//!
//! Both drive the `top_params` core through [`window::BrowserContext`],
//! which maps the context traits onto a real `Window`.

use thiserror::Error;
use wasm_bindgen::prelude::*;

mod listener;
mod logger;
mod reader;
mod surface;
mod window;

pub use listener::{install_snippet, WasmListener};
pub use reader::WasmReader;

/// Errors surfaced to JavaScript.
#[derive(Error, Debug)]
pub enum WasmError {
    /// A configuration object was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// A browser API the bindings need is missing or threw.
    #[error("Browser API unavailable: {0}")]
    Browser(String),
    /// The relay core refused the call.
    #[error(transparent)]
    Relay(#[from] top_params::RelayError),
}

impl From<WasmError> for JsValue {
    fn from(err: WasmError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Module entry: panic hook and console logging.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    logger::init(log::LevelFilter::Info);
}

/// Change the console log level (`error`, `warn`, `info`, `debug`,
/// `trace` or `off`).
#[wasm_bindgen(js_name = "setLogLevel")]
pub fn set_log_level(level: &str) -> Result<(), JsError> {
    let filter = logger::parse_level(level)
        .ok_or_else(|| JsError::new(&format!("unknown log level: {level}")))?;
    log::set_max_level(filter);
    Ok(())
}

/// Convert a JS configuration object into a JSON value, treating
/// `undefined`/`null` as an empty object.
pub(crate) fn config_value(config: JsValue) -> Result<serde_json::Value, WasmError> {
    if config.is_undefined() || config.is_null() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_wasm_bindgen::from_value(config).map_err(|e| WasmError::Config(e.to_string()))
}
