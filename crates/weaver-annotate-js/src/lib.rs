//! WASM bindings for the weaver annotation overlay.
//!
//! Provides `JsAnnotateView`, an annotation layer over any element of a
//! rendered document, for JavaScript/TypeScript apps.

mod types;
mod view;

pub use types::*;
pub use view::*;

use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}
