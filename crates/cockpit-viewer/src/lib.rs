//! Cockpit Viewer - browser host for the RB16B driver cockpit scene
//!
//! A two-view shell (dashboard / cockpit) that mounts and unmounts the
//! cockpit scene from `cockpit-scene` as the user navigates.

mod app;
mod ui;

use wasm_bindgen::prelude::*;

/// WASM entry point
#[wasm_bindgen(start)]
pub fn main() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging with filtering to reduce noise
    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::WARN)
            .build()
    );

    app::run();
}
