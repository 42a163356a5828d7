//! Quasi-Newton and trust-region minimization of the curve energy.
//!
//! Every algorithm works on the flattened interior vector. BFGS and nonlinear CG take their
//! step length from the shared backtracking search. The two trust-region methods share one
//! radius policy: dogleg keeps a BFGS model of the Hessian, while trust-region Newton-CG
//! runs Steihaug's truncated CG on finite-difference Hessian-vector products.

use super::InteriorObjective;
use crate::curve::{unstack, Initializer};
use crate::error::Result;
use crate::line_search::{search, LineSearchMethod, LineSearchSettings};
use crate::metric::MetricProvider;
use crate::solver::{
    finish, validate_common, validate_endpoints, GeodesicResult, GeodesicSolver, SolveStatus,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const INITIAL_RADIUS: f64 = 1.0;
const MAX_RADIUS: f64 = 100.0;
const MIN_RADIUS: f64 = 1e-14;
/// Minimum ratio of actual to predicted reduction for a trust-region step to be taken.
const ACCEPT_RATIO: f64 = 1e-4;
const CURVATURE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuasiNewtonMethod {
    Bfgs,
    /// Polak-Ribière nonlinear conjugate gradient with automatic restarts.
    ConjugateGradient,
    Dogleg,
    /// Trust-region Newton-CG (Steihaug).
    TrustNcg,
}

impl QuasiNewtonMethod {
    pub fn name(&self) -> &'static str {
        match self {
            QuasiNewtonMethod::Bfgs => "BFGS",
            QuasiNewtonMethod::ConjugateGradient => "CG",
            QuasiNewtonMethod::Dogleg => "dogleg",
            QuasiNewtonMethod::TrustNcg => "trust-ncg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuasiNewtonSettings {
    pub steps: usize,
    pub tol: f64,
    pub max_iter: usize,
    pub method: QuasiNewtonMethod,
    /// Step selection for BFGS and CG; unused by the trust-region methods.
    pub line_search: LineSearchSettings,
}

impl Default for QuasiNewtonSettings {
    fn default() -> Self {
        Self {
            steps: 100,
            tol: 1e-4,
            max_iter: 1000,
            method: QuasiNewtonMethod::Bfgs,
            line_search: LineSearchSettings {
                method: LineSearchMethod::Armijo { c1: 1e-4 },
                max_attempts: 50,
                ..LineSearchSettings::default()
            },
        }
    }
}

impl QuasiNewtonSettings {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.steps, self.tol, self.max_iter)?;
        self.line_search.validate()
    }
}

/// Iterate shared by every algorithm.
struct Iterate {
    x: DVector<f64>,
    value: f64,
    grad: DVector<f64>,
    iterations: usize,
}

#[derive(Debug, Clone)]
pub struct QuasiNewtonSolver {
    settings: QuasiNewtonSettings,
    initializer: Initializer,
}

impl QuasiNewtonSolver {
    pub fn new(settings: QuasiNewtonSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            initializer: Initializer::Linear,
        })
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn settings(&self) -> &QuasiNewtonSettings {
        &self.settings
    }

    pub fn run<P: MetricProvider + ?Sized>(
        &self,
        provider: &P,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeodesicResult> {
        validate_endpoints(provider, z0, z_t)?;
        let settings = &self.settings;
        let template = self.initializer.initialize(z0, z_t, settings.steps)?;
        let objective = InteriorObjective::new(provider, template);

        let x = objective.initial_point();
        let mut iterate = Iterate {
            value: objective.value(&x)?,
            grad: objective.gradient(&x, 0)?,
            x,
            iterations: 0,
        };

        let status = if iterate.grad.norm() < settings.tol {
            SolveStatus::Converged
        } else {
            match settings.method {
                QuasiNewtonMethod::Bfgs => self.bfgs(&objective, &mut iterate)?,
                QuasiNewtonMethod::ConjugateGradient => {
                    self.conjugate_gradient(&objective, &mut iterate)?
                }
                QuasiNewtonMethod::Dogleg => self.dogleg(&objective, &mut iterate)?,
                QuasiNewtonMethod::TrustNcg => self.trust_ncg(&objective, &mut iterate)?,
            }
        };
        match status {
            SolveStatus::MaxIterations => warn!(
                method = settings.method.name(),
                grad_norm = iterate.grad.norm(),
                "quasi-Newton solve stopped at the iteration cap"
            ),
            SolveStatus::Stalled => warn!(
                method = settings.method.name(),
                grad_norm = iterate.grad.norm(),
                "quasi-Newton solve stalled"
            ),
            SolveStatus::Converged => {}
        }

        let dim = objective.dimension();
        let curve = objective.curve(&iterate.x)?;
        finish(
            settings.method.name(),
            provider,
            curve,
            &unstack(&iterate.grad, dim),
            iterate.iterations,
            status,
        )
    }

    /// Runs the line search along `direction`; `None` when no acceptable step exists.
    fn line_step<P: MetricProvider + ?Sized>(
        &self,
        objective: &InteriorObjective<'_, P>,
        iterate: &Iterate,
        direction: &DVector<f64>,
    ) -> Result<Option<(f64, f64)>> {
        let dim = objective.dimension();
        let curve = objective.curve(&iterate.x)?;
        let outcome = search(
            objective.provider,
            &curve,
            &unstack(direction, dim),
            iterate.value,
            iterate.grad.dot(direction),
            &self.settings.line_search,
        );
        Ok(outcome.improved.then_some((outcome.step, outcome.energy)))
    }

    fn bfgs<P: MetricProvider + ?Sized>(
        &self,
        objective: &InteriorObjective<'_, P>,
        iterate: &mut Iterate,
    ) -> Result<SolveStatus> {
        let n = iterate.x.len();
        let mut inverse_hessian = DMatrix::<f64>::identity(n, n);

        for k in 1..=self.settings.max_iter {
            let mut direction = -(&inverse_hessian * &iterate.grad);
            if iterate.grad.dot(&direction) >= 0.0 {
                inverse_hessian = DMatrix::identity(n, n);
                direction = -&iterate.grad;
            }
            let Some((step, value)) = self.line_step(objective, iterate, &direction)? else {
                return Ok(SolveStatus::Stalled);
            };

            let s = direction * step;
            iterate.x += &s;
            let grad = objective.gradient(&iterate.x, k)?;
            let y = &grad - &iterate.grad;
            iterate.value = value;
            iterate.grad = grad;
            iterate.iterations = k;

            let sy = s.dot(&y);
            if sy > CURVATURE_EPS {
                if k == 1 {
                    inverse_hessian = DMatrix::identity(n, n) * (sy / y.dot(&y));
                }
                let rho = 1.0 / sy;
                let hy = &inverse_hessian * &y;
                let yhy = y.dot(&hy);
                inverse_hessian -= (&hy * s.transpose() + &s * hy.transpose()) * rho;
                inverse_hessian += &s * s.transpose() * (rho * rho * yhy + rho);
            }

            if log_and_check(self.settings.method, k, iterate, self.settings.tol) {
                return Ok(SolveStatus::Converged);
            }
        }
        Ok(SolveStatus::MaxIterations)
    }

    fn conjugate_gradient<P: MetricProvider + ?Sized>(
        &self,
        objective: &InteriorObjective<'_, P>,
        iterate: &mut Iterate,
    ) -> Result<SolveStatus> {
        let n = iterate.x.len();
        let mut direction = -&iterate.grad;

        for k in 1..=self.settings.max_iter {
            if iterate.grad.dot(&direction) >= 0.0 {
                direction = -&iterate.grad;
            }
            let Some((step, value)) = self.line_step(objective, iterate, &direction)? else {
                return Ok(SolveStatus::Stalled);
            };

            iterate.x += &direction * step;
            let grad = objective.gradient(&iterate.x, k)?;
            let previous = iterate.grad.dot(&iterate.grad);
            let beta = if k % n == 0 {
                0.0
            } else {
                (grad.dot(&(&grad - &iterate.grad)) / previous).max(0.0)
            };
            direction = &direction * beta - &grad;
            iterate.value = value;
            iterate.grad = grad;
            iterate.iterations = k;

            if log_and_check(self.settings.method, k, iterate, self.settings.tol) {
                return Ok(SolveStatus::Converged);
            }
        }
        Ok(SolveStatus::MaxIterations)
    }

    fn dogleg<P: MetricProvider + ?Sized>(
        &self,
        objective: &InteriorObjective<'_, P>,
        iterate: &mut Iterate,
    ) -> Result<SolveStatus> {
        let n = iterate.x.len();
        let mut hessian = DMatrix::<f64>::identity(n, n);
        let mut radius = INITIAL_RADIUS;

        for k in 1..=self.settings.max_iter {
            iterate.iterations = k;
            let step = dogleg_step(&hessian, &iterate.grad, radius);
            let step_norm = step.norm();
            let predicted = -(iterate.grad.dot(&step) + 0.5 * step.dot(&(&hessian * &step)));

            let trial = &iterate.x + &step;
            // Trials outside the metric domain are treated like a failed reduction.
            let actual = match objective.value(&trial) {
                Ok(value) if value.is_finite() => iterate.value - value,
                _ => f64::NEG_INFINITY,
            };
            let ratio = if predicted > 0.0 {
                actual / predicted
            } else {
                f64::NEG_INFINITY
            };

            if ratio < 0.25 {
                radius *= 0.25;
            } else if ratio > 0.75 && (step_norm - radius).abs() <= 1e-12 * radius.max(1.0) {
                radius = (2.0 * radius).min(MAX_RADIUS);
            }

            if ratio > ACCEPT_RATIO {
                let grad = objective.gradient(&trial, k)?;
                let y = &grad - &iterate.grad;
                let sy = step.dot(&y);
                if sy > CURVATURE_EPS {
                    let hs = &hessian * &step;
                    let shs = step.dot(&hs);
                    hessian -= &hs * hs.transpose() / shs;
                    hessian += &y * y.transpose() / sy;
                }
                iterate.value -= actual;
                iterate.x = trial;
                iterate.grad = grad;

                if log_and_check(self.settings.method, k, iterate, self.settings.tol) {
                    return Ok(SolveStatus::Converged);
                }
            }

            if radius < MIN_RADIUS {
                return Ok(SolveStatus::Stalled);
            }
        }
        Ok(SolveStatus::MaxIterations)
    }

    fn trust_ncg<P: MetricProvider + ?Sized>(
        &self,
        objective: &InteriorObjective<'_, P>,
        iterate: &mut Iterate,
    ) -> Result<SolveStatus> {
        let mut radius = INITIAL_RADIUS;

        for k in 1..=self.settings.max_iter {
            iterate.iterations = k;
            let current = &*iterate;
            let (step, on_boundary) = steihaug_step(&current.grad, radius, |d| {
                hessian_vector(objective, current, d, k)
            })?;
            let curvature = hessian_vector(objective, current, &step, k)?;
            let predicted = -(current.grad.dot(&step) + 0.5 * step.dot(&curvature));

            let trial = &current.x + &step;
            let actual = match objective.value(&trial) {
                Ok(value) if value.is_finite() => current.value - value,
                _ => f64::NEG_INFINITY,
            };
            let ratio = if predicted > 0.0 {
                actual / predicted
            } else {
                f64::NEG_INFINITY
            };

            if ratio < 0.25 {
                radius *= 0.25;
            } else if ratio > 0.75 && on_boundary {
                radius = (2.0 * radius).min(MAX_RADIUS);
            }

            if ratio > ACCEPT_RATIO {
                iterate.grad = objective.gradient(&trial, k)?;
                iterate.value -= actual;
                iterate.x = trial;

                if log_and_check(self.settings.method, k, iterate, self.settings.tol) {
                    return Ok(SolveStatus::Converged);
                }
            }

            if radius < MIN_RADIUS {
                return Ok(SolveStatus::Stalled);
            }
        }
        Ok(SolveStatus::MaxIterations)
    }
}

/// Forward-difference product of the energy Hessian at `iterate.x` with `v`.
fn hessian_vector<P: MetricProvider + ?Sized>(
    objective: &InteriorObjective<'_, P>,
    iterate: &Iterate,
    v: &DVector<f64>,
    iteration: usize,
) -> Result<DVector<f64>> {
    let norm = v.norm();
    if norm == 0.0 {
        return Ok(DVector::zeros(v.len()));
    }
    let h = f64::EPSILON.sqrt() * (1.0 + iterate.x.norm()) / norm;
    let shifted = objective.gradient(&(&iterate.x + v * h), iteration)?;
    Ok((shifted - &iterate.grad) / h)
}

/// Steihaug's truncated CG on the model `gᵀp + ½ pᵀHp` restricted to `|p| <= radius`.
///
/// Returns the step and whether it ends on the trust-region boundary.
fn steihaug_step<H>(
    grad: &DVector<f64>,
    radius: f64,
    mut hessian: H,
) -> Result<(DVector<f64>, bool)>
where
    H: FnMut(&DVector<f64>) -> Result<DVector<f64>>,
{
    let grad_norm = grad.norm();
    let tolerance = grad_norm.sqrt().min(0.5) * grad_norm;
    let mut p = DVector::zeros(grad.len());
    let mut r = grad.clone();
    let mut d = -grad;

    for _ in 0..grad.len() {
        let hd = hessian(&d)?;
        let curvature = d.dot(&hd);
        if curvature <= 0.0 {
            return Ok((to_boundary(&p, &d, radius), true));
        }
        let rr = r.dot(&r);
        let alpha = rr / curvature;
        let next = &p + &d * alpha;
        if next.norm() >= radius {
            return Ok((to_boundary(&p, &d, radius), true));
        }
        r += &hd * alpha;
        if r.norm() < tolerance {
            return Ok((next, false));
        }
        d = &d * (r.dot(&r) / rr) - &r;
        p = next;
    }
    Ok((p, false))
}

/// Point `p + τ d` with `τ >= 0` on the sphere of the given radius.
fn to_boundary(p: &DVector<f64>, d: &DVector<f64>, radius: f64) -> DVector<f64> {
    let a = d.dot(d);
    let b = 2.0 * p.dot(d);
    let c = p.dot(p) - radius * radius;
    let tau = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
    p + d * tau
}

/// Dogleg path through the Cauchy point towards the full quasi-Newton step.
fn dogleg_step(hessian: &DMatrix<f64>, grad: &DVector<f64>, radius: f64) -> DVector<f64> {
    let cauchy = |radius: f64| {
        let curvature = grad.dot(&(hessian * grad));
        let g2 = grad.dot(grad);
        if curvature > 0.0 {
            -grad * (g2 / curvature)
        } else {
            -grad * (radius / g2.sqrt())
        }
    };

    let newton = hessian.clone().cholesky().map(|c| -c.solve(grad));
    let Some(newton) = newton else {
        let pu = cauchy(radius);
        let norm = pu.norm();
        return if norm > radius {
            pu * (radius / norm)
        } else {
            pu
        };
    };
    if newton.norm() <= radius {
        return newton;
    }

    let pu = cauchy(radius);
    let pu_norm = pu.norm();
    if pu_norm >= radius {
        return pu * (radius / pu_norm);
    }

    to_boundary(&pu, &(&newton - &pu), radius)
}

fn log_and_check(method: QuasiNewtonMethod, iteration: usize, iterate: &Iterate, tol: f64) -> bool {
    let grad_norm = iterate.grad.norm();
    debug!(
        method = method.name(),
        iteration,
        energy = iterate.value,
        grad_norm,
        "quasi-Newton iteration"
    );
    grad_norm < tol
}

impl GeodesicSolver for QuasiNewtonSolver {
    fn name(&self) -> &str {
        self.settings.method.name()
    }

    fn solve(
        &self,
        provider: &dyn MetricProvider,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeodesicResult> {
        self.run(provider, z0, z_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::georce::{GeorceSettings, GeorceSolver};
    use crate::manifolds::{Euclidean, Sphere};
    use crate::metric::Riemannian;
    use crate::navigation::{ConstantDrift, Navigation, NavigationSettings};

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    fn settings(method: QuasiNewtonMethod) -> QuasiNewtonSettings {
        QuasiNewtonSettings {
            steps: 20,
            method,
            ..QuasiNewtonSettings::default()
        }
    }

    #[test]
    fn every_method_matches_georce_on_the_sphere() {
        let provider = Riemannian::new(Sphere::new(2));
        let z0 = v(&[-0.6, -0.2]);
        let z_t = v(&[0.4, 0.7]);
        let reference = GeorceSolver::new(GeorceSettings {
            steps: 20,
            ..GeorceSettings::default()
        })
        .unwrap()
        .run(&provider, &z0, &z_t)
        .unwrap()
        .length;

        for method in [
            QuasiNewtonMethod::Bfgs,
            QuasiNewtonMethod::ConjugateGradient,
            QuasiNewtonMethod::Dogleg,
            QuasiNewtonMethod::TrustNcg,
        ] {
            let result = QuasiNewtonSolver::new(settings(method))
                .unwrap()
                .run(&provider, &z0, &z_t)
                .expect("solve");
            assert_eq!(result.status, SolveStatus::Converged, "{}", method.name());
            assert!(result.grad_norm < 1e-4);
            assert!(
                (result.length - reference).abs() < 1e-4,
                "{} length {} vs {}",
                method.name(),
                result.length,
                reference
            );
            assert_eq!(result.curve.start(), &z0);
            assert_eq!(result.curve.end(), &z_t);
        }
    }

    #[test]
    fn finsler_problem_runs_through_the_same_contract() {
        let provider = Navigation::new(
            Euclidean::new(2),
            ConstantDrift::new(vec![0.0, 0.5]),
            NavigationSettings::default(),
        )
        .unwrap();
        let solver: Box<dyn GeodesicSolver> =
            Box::new(QuasiNewtonSolver::new(settings(QuasiNewtonMethod::Bfgs)).unwrap());
        let result = solver.solve(&provider, &v(&[0.0, 0.0]), &v(&[0.0, 1.0])).unwrap();
        assert!((result.length - 0.5).abs() < 1e-9);
        assert_eq!(solver.name(), "BFGS");
    }

    #[test]
    fn iteration_cap_is_not_an_error() {
        let provider = Riemannian::new(Sphere::new(2));
        let capped = QuasiNewtonSettings {
            max_iter: 2,
            ..settings(QuasiNewtonMethod::Dogleg)
        };
        let result = QuasiNewtonSolver::new(capped)
            .unwrap()
            .run(&provider, &v(&[-0.6, -0.2]), &v(&[0.4, 0.7]))
            .unwrap();
        assert_eq!(result.status, SolveStatus::MaxIterations);
        assert_eq!(result.iterations, 2);
    }

    #[test]
    fn dogleg_step_respects_radius() {
        let hessian = DMatrix::from_diagonal(&v(&[1.0, 10.0]));
        let grad = v(&[1.0, 1.0]);

        let full = dogleg_step(&hessian, &grad, 10.0);
        assert!((full - v(&[-1.0, -0.1])).norm() < 1e-12);

        for radius in [0.05, 0.5] {
            let step = dogleg_step(&hessian, &grad, radius);
            assert!((step.norm() - radius).abs() < 1e-12);
            assert!(grad.dot(&step) < 0.0);
        }
    }

    #[test]
    fn steihaug_step_solves_or_truncates_the_model() {
        let hessian = DMatrix::from_diagonal(&v(&[2.0, 8.0]));
        let apply = |d: &DVector<f64>| Ok(&hessian * d);
        let grad = v(&[2e-4, 4e-4]);

        let (newton, on_boundary) = steihaug_step(&grad, 10.0, apply).unwrap();
        assert!(!on_boundary);
        assert!((newton - v(&[-1e-4, -0.5e-4])).norm() < 1e-12);

        let (truncated, on_boundary) = steihaug_step(&grad, 1e-5, apply).unwrap();
        assert!(on_boundary);
        assert!((truncated.norm() - 1e-5).abs() < 1e-15);
        assert!(grad.dot(&truncated) < 0.0);
    }

    #[test]
    fn steihaug_step_follows_negative_curvature_to_the_boundary() {
        let hessian = DMatrix::from_diagonal(&v(&[1.0, -1.0]));
        let (step, on_boundary) =
            steihaug_step(&v(&[0.0, 1.0]), 2.0, |d| Ok(&hessian * d)).unwrap();
        assert!(on_boundary);
        assert!((step - v(&[0.0, -2.0])).norm() < 1e-12);
    }

    #[test]
    fn trust_ncg_reports_its_name_and_respects_the_cap() {
        let provider = Riemannian::new(Sphere::new(2));
        let solver: Box<dyn GeodesicSolver> = Box::new(
            QuasiNewtonSolver::new(QuasiNewtonSettings {
                max_iter: 2,
                ..settings(QuasiNewtonMethod::TrustNcg)
            })
            .unwrap(),
        );
        assert_eq!(solver.name(), "trust-ncg");
        let result = solver.solve(&provider, &v(&[-0.6, -0.2]), &v(&[0.4, 0.7])).unwrap();
        assert_eq!(result.status, SolveStatus::MaxIterations);
        assert_eq!(result.iterations, 2);
    }
}
