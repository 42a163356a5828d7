//! WebAssembly bindings for `georce_core`.
//!
//! Exposes the stepped GEORCE runner and the method comparison report to JavaScript.

mod comparison;
mod problem;
mod runner;

pub use comparison::compare_methods;
pub use runner::WasmGeodesicRunner;

use georce_core::loader::{SUPPORTED_GEOMETRIES, SUPPORTED_MANIFOLDS};
use wasm_bindgen::prelude::*;

/// Manifold selectors accepted by the runner and `compare_methods`.
#[wasm_bindgen]
pub fn supported_manifolds() -> Vec<String> {
    SUPPORTED_MANIFOLDS.iter().map(|s| s.to_string()).collect()
}

#[wasm_bindgen]
pub fn supported_geometries() -> Vec<String> {
    SUPPORTED_GEOMETRIES.iter().map(|s| s.to_string()).collect()
}
