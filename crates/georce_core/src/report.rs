//! Side-by-side comparison of GEORCE and the baseline solvers on one problem.

use crate::baselines::{
    FirstOrderMethod, GradientSettings, GradientSolver, QuasiNewtonMethod, QuasiNewtonSettings,
    QuasiNewtonSolver,
};
use crate::curve::{length, Curve, Initializer};
use crate::error::Result;
use crate::georce::{GeorceSettings, GeorceSolver};
use crate::line_search::LineSearchSettings;
use crate::metric::MetricProvider;
use crate::solver::{validate_endpoints, GeodesicResult, GeodesicSolver, SolveStatus};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonPlan {
    pub steps: usize,
    pub tol: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Line search used by GEORCE.
    pub line_search: LineSearchSettings,
    pub gradient_methods: bool,
    pub quasi_newton_methods: bool,
}

impl Default for ComparisonPlan {
    fn default() -> Self {
        Self {
            steps: 100,
            tol: 1e-4,
            max_iter: 1000,
            learning_rate: 0.01,
            line_search: LineSearchSettings::default(),
            gradient_methods: true,
            quasi_newton_methods: true,
        }
    }
}

/// One row of a comparison. Rows without a solve (ground truth, initial curve) leave the
/// solver fields empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodReport {
    pub method: String,
    pub length: Option<f64>,
    pub grad_norm: Option<f64>,
    pub iterations: Option<usize>,
    pub status: Option<SolveStatus>,
    /// Absolute deviation from the ground-truth length, when one is known.
    pub error: Option<f64>,
    /// Message of a failed solve.
    pub failure: Option<String>,
}

impl MethodReport {
    fn length_only(method: &str, length: f64, error: Option<f64>) -> Self {
        Self {
            method: method.to_string(),
            length: Some(length),
            grad_norm: None,
            iterations: None,
            status: None,
            error,
            failure: None,
        }
    }

    fn from_result(method: &str, result: &GeodesicResult, base: Option<f64>) -> Self {
        Self {
            method: method.to_string(),
            length: Some(result.length),
            grad_norm: Some(result.grad_norm),
            iterations: Some(result.iterations),
            status: Some(result.status),
            error: base.map(|b| (result.length - b).abs()),
            failure: None,
        }
    }

    fn failed(method: &str, message: String) -> Self {
        Self {
            method: method.to_string(),
            length: None,
            grad_norm: None,
            iterations: None,
            status: None,
            error: None,
            failure: Some(message),
        }
    }
}

/// Runs every enabled method on `z0 → z_t` and collects one report per method.
///
/// Rows are, in order: `ground_truth` (only when the provider has a reference geodesic),
/// `GEORCE`, `init`, then the gradient family and the quasi-Newton family.
pub fn compare_methods<P: MetricProvider + ?Sized>(
    provider: &P,
    z0: &DVector<f64>,
    z_t: &DVector<f64>,
    plan: &ComparisonPlan,
) -> Result<Vec<MethodReport>> {
    validate_endpoints(provider, z0, z_t)?;

    let georce = GeorceSolver::new(GeorceSettings {
        steps: plan.steps,
        tol: plan.tol,
        max_iter: plan.max_iter,
        line_search: plan.line_search,
    })?;
    let mut baselines: Vec<Box<dyn GeodesicSolver>> = Vec::new();
    if plan.gradient_methods {
        for method in [FirstOrderMethod::adam(), FirstOrderMethod::Sgd] {
            baselines.push(Box::new(GradientSolver::new(GradientSettings {
                steps: plan.steps,
                tol: plan.tol,
                max_iter: plan.max_iter,
                learning_rate: plan.learning_rate,
                method,
            })?));
        }
    }
    if plan.quasi_newton_methods {
        for method in [
            QuasiNewtonMethod::Bfgs,
            QuasiNewtonMethod::ConjugateGradient,
            QuasiNewtonMethod::Dogleg,
            QuasiNewtonMethod::TrustNcg,
        ] {
            baselines.push(Box::new(QuasiNewtonSolver::new(QuasiNewtonSettings {
                steps: plan.steps,
                tol: plan.tol,
                max_iter: plan.max_iter,
                method,
                ..QuasiNewtonSettings::default()
            })?));
        }
    }

    let mut reports = Vec::new();
    let base = match provider.reference() {
        Some(reference) => {
            let curve = Curve::new(reference.geodesic(z0, z_t, plan.steps))?;
            let value = length(provider, &curve)?;
            reports.push(MethodReport::length_only("ground_truth", value, Some(0.0)));
            Some(value)
        }
        None => None,
    };

    reports.push(run_one(&georce, provider, z0, z_t, base));

    let init = Initializer::Linear.initialize(z0, z_t, plan.steps)?;
    let init_length = length(provider, &init)?;
    reports.push(MethodReport::length_only(
        "init",
        init_length,
        base.map(|b| (init_length - b).abs()),
    ));

    for solver in &baselines {
        reports.push(run_one(solver.as_ref(), provider, z0, z_t, base));
    }
    Ok(reports)
}

fn run_one<S, P>(
    solver: &S,
    provider: &P,
    z0: &DVector<f64>,
    z_t: &DVector<f64>,
    base: Option<f64>,
) -> MethodReport
where
    S: GeodesicSolver + ?Sized,
    P: MetricProvider + ?Sized,
{
    let name = solver.name().to_string();
    match solver.solve(&provider, z0, z_t) {
        Ok(result) => MethodReport::from_result(&name, &result, base),
        Err(err) => {
            warn!(method = %name, %err, "method failed during comparison");
            MethodReport::failed(&name, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifolds::Sphere;
    use crate::metric::Riemannian;
    use crate::navigation::{Navigation, NavigationSettings, TrigonometricDrift};

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn sphere_comparison_includes_ground_truth_and_every_method() {
        let provider = Riemannian::new(Sphere::new(2));
        let plan = ComparisonPlan {
            steps: 20,
            ..ComparisonPlan::default()
        };
        let reports =
            compare_methods(&provider, &v(&[-0.6, -0.2]), &v(&[0.4, 0.7]), &plan).unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(
            names,
            [
                "ground_truth",
                "GEORCE",
                "init",
                "Adam",
                "SGD",
                "BFGS",
                "CG",
                "dogleg",
                "trust-ncg",
            ]
        );

        let georce = &reports[1];
        assert_eq!(georce.status, Some(SolveStatus::Converged));
        assert!(georce.error.unwrap() < 5e-3);
        // The straight chart line is longer than the optimized curve.
        let init = &reports[2];
        assert!(init.length.unwrap() > georce.length.unwrap());
        assert!(init.iterations.is_none());
        assert!(reports.iter().all(|r| r.failure.is_none()));
    }

    #[test]
    fn finsler_comparison_has_no_ground_truth() {
        let base = Sphere::new(2);
        let provider =
            Navigation::new(base, TrigonometricDrift::new(base), NavigationSettings::default())
                .unwrap();
        let plan = ComparisonPlan {
            steps: 10,
            max_iter: 50,
            gradient_methods: false,
            ..ComparisonPlan::default()
        };
        let reports =
            compare_methods(&provider, &v(&[0.0, -1.0]), &v(&[0.5, 0.5]), &plan).unwrap();
        assert_eq!(reports[0].method, "GEORCE");
        assert_eq!(reports.len(), 6);
        assert!(reports.iter().all(|r| r.error.is_none()));
    }

    #[test]
    fn invalid_plan_fails_before_solving() {
        let provider = Riemannian::new(Sphere::new(2));
        let plan = ComparisonPlan {
            steps: 0,
            ..ComparisonPlan::default()
        };
        assert!(compare_methods(&provider, &v(&[0.0, 0.0]), &v(&[1.0, 0.0]), &plan).is_err());
    }
}
