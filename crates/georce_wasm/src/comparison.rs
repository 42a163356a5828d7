//! Method comparison entry point.

use crate::problem::build_problem;
use anyhow::{Context, Result};
use georce_core::report::{compare_methods as core_compare_methods, ComparisonPlan, MethodReport};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub(crate) fn run_comparison(
    geometry: &str,
    manifold: &str,
    dim: usize,
    speed: f64,
    plan: Option<ComparisonPlan>,
) -> Result<Vec<MethodReport>> {
    let problem = build_problem(geometry, manifold, dim, speed, &[], &[])?;
    let mut plan = plan.unwrap_or_default();
    plan.line_search.rho = problem.setup.rho;
    core_compare_methods(&problem.provider, &problem.setup.z0, &problem.setup.z_t, &plan)
        .with_context(|| format!("Comparison on {manifold} failed."))
}

/// Runs every solver on a named problem and returns one report per method.
///
/// `plan` is a serialized `ComparisonPlan`; `undefined` selects the defaults.
#[wasm_bindgen]
pub fn compare_methods(
    geometry: &str,
    manifold: &str,
    dim: u32,
    speed: f64,
    plan: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let plan = if plan.is_undefined() || plan.is_null() {
        None
    } else {
        Some(
            from_value::<ComparisonPlan>(plan)
                .map_err(|e| JsValue::from_str(&format!("Invalid comparison plan: {}", e)))?,
        )
    };
    let reports = run_comparison(geometry, manifold, dim as usize, speed, plan)
        .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
    to_value(&reports).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_comparison_matches_ground_truth() {
        let plan = ComparisonPlan {
            steps: 10,
            ..ComparisonPlan::default()
        };
        let reports = run_comparison("Riemannian", "Euclidean", 2, 1.5, Some(plan)).unwrap();
        assert_eq!(reports[0].method, "ground_truth");
        // Straight interpolation is already the geodesic in flat space.
        for report in &reports {
            assert!(report.error.unwrap() < 1e-9, "{}", report.method);
        }
    }

    #[test]
    fn unknown_geometry_fails() {
        let err = run_comparison("Kähler", "Sphere", 2, 1.5, None).unwrap_err();
        assert!(format!("{err:#}").contains("Riemannian, Finsler"));
    }
}
