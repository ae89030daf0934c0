//! arlink Web - browser entry points
//!
//! Exposes [`ArRenderer`] to JavaScript. Tracker notifications arrive as DOM
//! custom events and are forwarded into the session channel; content is
//! attached through promise-returning methods.

mod listeners;
mod options;
mod renderer;
mod video;

pub use renderer::ArRenderer;

use std::str::FromStr;
use std::sync::Once;
use wasm_bindgen::prelude::*;

static LOGGING: Once = Once::new();

/// Entry point for WASM module
#[wasm_bindgen(start)]
pub fn main() {
    // Set panic hook for better error messages
    console_error_panic_hook::set_once();
}

/// Install the console subscriber. The first renderer's level wins.
pub(crate) fn init_logging(level: &str) {
    LOGGING.call_once(|| {
        let level = tracing::Level::from_str(level).unwrap_or(tracing::Level::WARN);
        tracing_wasm::set_as_global_default_with_config(
            tracing_wasm::WASMLayerConfigBuilder::new()
                .set_max_level(level)
                .build(),
        );
    });
}
