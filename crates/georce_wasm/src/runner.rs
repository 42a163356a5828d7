//! Stepped GEORCE runner for incremental progress reporting in the browser.

use crate::problem::build_problem;
use anyhow::{bail, Context, Result};
use georce_core::georce::{GeorceSettings, GeorceSolver, GeorceState};
use georce_core::line_search::LineSearchSettings;
use georce_core::loader::LoadedProblem;
use georce_core::solver::{GeodesicResult, SolveStatus};
use js_sys::Float64Array;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Progress payload for the stepped solver.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct GeodesicSolveProgress {
    done: bool,
    iterations: usize,
    max_iter: usize,
    energy: f64,
    grad_norm: f64,
    status: Option<SolveStatus>,
}

/// Plain-Rust state behind [`WasmGeodesicRunner`].
pub(crate) struct GeodesicRun {
    problem: LoadedProblem,
    solver: GeorceSolver,
    state: GeorceState,
}

impl GeodesicRun {
    pub(crate) fn new(problem: LoadedProblem, settings: GeorceSettings) -> Result<Self> {
        let solver = GeorceSolver::new(settings).context("Invalid GEORCE settings.")?;
        let state = solver
            .start(&problem.provider, &problem.setup.z0, &problem.setup.z_t)
            .context("Failed to initialize the curve.")?;
        Ok(Self {
            problem,
            solver,
            state,
        })
    }

    pub(crate) fn run_steps(&mut self, batch_size: usize) -> Result<GeodesicSolveProgress> {
        for _ in 0..batch_size {
            let iteration = self.state.iteration;
            let done = self
                .solver
                .step(&self.problem.provider, &mut self.state)
                .with_context(|| format!("GEORCE failed after {iteration} iterations."))?;
            if done {
                break;
            }
        }
        Ok(self.progress())
    }

    pub(crate) fn progress(&self) -> GeodesicSolveProgress {
        GeodesicSolveProgress {
            done: self.state.is_done(),
            iterations: self.state.iteration,
            max_iter: self.solver.settings().max_iter,
            energy: self.state.energy,
            grad_norm: self.state.grad_norm,
            status: self.state.status,
        }
    }

    pub(crate) fn result(&self) -> Result<GeodesicResult> {
        if !self.state.is_done() {
            bail!("GEORCE has not finished yet.");
        }
        self.solver
            .finish(&self.problem.provider, self.state.clone())
            .context("Failed to evaluate the final curve.")
    }

    /// Current curve, flattened row by row.
    pub(crate) fn flat_curve(&self) -> Vec<f64> {
        self.state
            .curve
            .points()
            .iter()
            .flat_map(|p| p.iter().copied())
            .collect()
    }

    /// Current curve mapped through the manifold's embedding, when it has one.
    pub(crate) fn flat_embedded_curve(&self) -> Option<Vec<f64>> {
        let chart = self.problem.provider.chart()?;
        Some(
            self.state
                .curve
                .points()
                .iter()
                .flat_map(|p| chart.parametrize(p).iter().copied().collect::<Vec<_>>())
                .collect(),
        )
    }
}

#[wasm_bindgen]
pub struct WasmGeodesicRunner {
    run: Option<GeodesicRun>,
}

#[wasm_bindgen]
impl WasmGeodesicRunner {
    /// `line_search` is a serialized `LineSearchSettings`; `undefined` selects the defaults.
    #[wasm_bindgen(constructor)]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        geometry: &str,
        manifold: &str,
        dim: u32,
        speed: f64,
        z0: Vec<f64>,
        z_t: Vec<f64>,
        steps: u32,
        tol: f64,
        max_iter: u32,
        line_search: JsValue,
    ) -> Result<WasmGeodesicRunner, JsValue> {
        console_error_panic_hook::set_once();

        let problem = build_problem(geometry, manifold, dim as usize, speed, &z0, &z_t)
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        let line_search = if line_search.is_undefined() || line_search.is_null() {
            LineSearchSettings {
                rho: problem.setup.rho,
                ..LineSearchSettings::default()
            }
        } else {
            from_value(line_search)
                .map_err(|e| JsValue::from_str(&format!("Invalid line search settings: {}", e)))?
        };
        let settings = GeorceSettings {
            steps: steps as usize,
            tol,
            max_iter: max_iter as usize,
            line_search,
        };

        let run = GeodesicRun::new(problem, settings)
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        Ok(WasmGeodesicRunner { run: Some(run) })
    }

    pub fn is_done(&self) -> bool {
        self.run.as_ref().map_or(true, |run| run.state.is_done())
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        let progress = run
            .run_steps(batch_size as usize)
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        to_value(&progress).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        to_value(&run.progress())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        let result = run
            .result()
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        to_value(&result).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Current chart coordinates as a flat `(T + 1) * dim` array.
    pub fn get_curve(&self) -> Result<Float64Array, JsValue> {
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        Ok(Float64Array::from(run.flat_curve().as_slice()))
    }

    /// Current curve in embedding coordinates, or `undefined` without a chart.
    pub fn get_embedded_curve(&self) -> Result<Option<Float64Array>, JsValue> {
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        Ok(run
            .flat_embedded_curve()
            .map(|values| Float64Array::from(values.as_slice())))
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn runner_reaches_a_result() {
        let mut runner = WasmGeodesicRunner::new(
            "Riemannian",
            "Euclidean",
            2,
            1.5,
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            10,
            1e-4,
            100,
            JsValue::UNDEFINED,
        )
        .expect("runner");
        runner.run_steps(10).expect("steps");
        assert!(runner.is_done());
        assert!(runner.get_result().is_ok());
        assert_eq!(runner.get_curve().expect("curve").length(), 22);
    }

    #[wasm_bindgen_test]
    fn runner_rejects_unknown_manifold() {
        let err = WasmGeodesicRunner::new(
            "Riemannian",
            "Klein",
            2,
            1.5,
            vec![],
            vec![],
            10,
            1e-4,
            100,
            JsValue::UNDEFINED,
        )
        .err()
        .expect("unsupported");
        assert!(err.as_string().unwrap_or_default().contains("Klein"));
    }
}
