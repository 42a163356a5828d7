//! GEORCE: geodesic optimization by repeated closed-form control updates.
//!
//! Writing the curve through its controls `u_t = z_{t+1} - z_t`, each iteration freezes the
//! tensors `G_t = g(z_t, u_t)` and the position gradients `ν_t = ∇_z F²(z_t, u_t)` along the
//! current curve and minimizes the resulting model
//!
//! ```text
//!     Σ_t ν_tᵀ z_t + Σ_t u_tᵀ G_t u_t    subject to    Σ_t u_t = z_T - z_0
//! ```
//!
//! With `s_t = Σ_{j>t} ν_j` the minimizer is `û_t = -½ G_t⁻¹ (μ + s_t)` where the boundary
//! multiplier solves `(Σ_t G_t⁻¹) μ = -2 (z_T - z_0) - Σ_t G_t⁻¹ s_t`. The candidate curve is
//! the cumulative sum of `û` from `z_0`, and a bounded line search along `candidate - current`
//! keeps the energy from increasing.

use crate::curve::{energy, energy_gradient, gradient_norm, Curve, Initializer};
use crate::error::{GeodesicError, Result};
use crate::line_search::{search, slope, LineSearchSettings};
use crate::metric::MetricProvider;
use crate::solver::{
    finish, validate_common, validate_endpoints, GeodesicResult, GeodesicSolver, SolveStatus,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeorceSettings {
    /// Number of curve segments `T`.
    pub steps: usize,
    pub tol: f64,
    pub max_iter: usize,
    pub line_search: LineSearchSettings,
}

impl Default for GeorceSettings {
    fn default() -> Self {
        Self {
            steps: 100,
            tol: 1e-4,
            max_iter: 1000,
            line_search: LineSearchSettings::default(),
        }
    }
}

impl GeorceSettings {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.steps, self.tol, self.max_iter)?;
        self.line_search.validate()
    }
}

/// Iteration state of one GEORCE solve.
#[derive(Debug, Clone)]
pub struct GeorceState {
    pub curve: Curve,
    pub gradient: Vec<DVector<f64>>,
    pub grad_norm: f64,
    pub energy: f64,
    pub iteration: usize,
    /// Set once the solve has terminated.
    pub status: Option<SolveStatus>,
}

impl GeorceState {
    pub fn is_done(&self) -> bool {
        self.status.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct GeorceSolver {
    settings: GeorceSettings,
    initializer: Initializer,
}

impl GeorceSolver {
    pub fn new(settings: GeorceSettings) -> Result<Self> {
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

    pub fn settings(&self) -> &GeorceSettings {
        &self.settings
    }

    /// Builds the initial curve and evaluates it; no update is taken yet.
    pub fn start<P: MetricProvider + ?Sized>(
        &self,
        provider: &P,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeorceState> {
        validate_endpoints(provider, z0, z_t)?;
        let curve = self.initializer.initialize(z0, z_t, self.settings.steps)?;
        let energy = energy(provider, &curve)?;
        let gradient = energy_gradient(provider, &curve)?;
        let grad_norm = gradient_norm(&gradient);
        let status = (grad_norm < self.settings.tol).then_some(SolveStatus::Converged);
        Ok(GeorceState {
            curve,
            gradient,
            grad_norm,
            energy,
            iteration: 0,
            status,
        })
    }

    /// Advances the solve by one iteration. Returns `true` once the state is terminal.
    pub fn step<P: MetricProvider + ?Sized>(
        &self,
        provider: &P,
        state: &mut GeorceState,
    ) -> Result<bool> {
        if state.is_done() {
            return Ok(true);
        }
        if state.iteration >= self.settings.max_iter {
            state.status = Some(SolveStatus::MaxIterations);
            return Ok(true);
        }

        let iteration = state.iteration + 1;
        let candidate = candidate_curve(provider, &state.curve, iteration)?;
        let direction: Vec<DVector<f64>> = candidate
            .interior()
            .iter()
            .zip(state.curve.interior())
            .map(|(new, old)| new - old)
            .collect();

        let outcome = search(
            provider,
            &state.curve,
            &direction,
            state.energy,
            slope(&state.gradient, &direction),
            &self.settings.line_search,
        );
        if !outcome.improved {
            warn!(
                iteration,
                attempts = outcome.attempts,
                energy = state.energy,
                "line search exhausted without a non-increasing step"
            );
            state.status = Some(SolveStatus::Stalled);
            return Ok(true);
        }

        state.curve = state.curve.displaced(&direction, outcome.step);
        state.energy = outcome.energy;
        state.gradient = energy_gradient(provider, &state.curve)?;
        state.grad_norm = gradient_norm(&state.gradient);
        state.iteration = iteration;
        debug!(
            iteration,
            energy = state.energy,
            grad_norm = state.grad_norm,
            step = outcome.step,
            "georce iteration"
        );

        if state.grad_norm < self.settings.tol {
            state.status = Some(SolveStatus::Converged);
        } else if state.iteration >= self.settings.max_iter {
            warn!(
                max_iter = self.settings.max_iter,
                grad_norm = state.grad_norm,
                "georce stopped at the iteration cap"
            );
            state.status = Some(SolveStatus::MaxIterations);
        }
        Ok(state.is_done())
    }

    /// Packs the state into a result; an unfinished state is reported as capped.
    pub fn finish<P: MetricProvider + ?Sized>(
        &self,
        provider: &P,
        state: GeorceState,
    ) -> Result<GeodesicResult> {
        let status = state.status.unwrap_or(SolveStatus::MaxIterations);
        finish(
            "GEORCE",
            provider,
            state.curve,
            &state.gradient,
            state.iteration,
            status,
        )
    }

    pub fn run<P: MetricProvider + ?Sized>(
        &self,
        provider: &P,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeodesicResult> {
        let mut state = self.start(provider, z0, z_t)?;
        while !self.step(provider, &mut state)? {}
        self.finish(provider, state)
    }
}

impl GeodesicSolver for GeorceSolver {
    fn name(&self) -> &str {
        "GEORCE"
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

fn failure(iteration: usize, reason: String) -> GeodesicError {
    GeodesicError::SolverFailure { iteration, reason }
}

/// Minimizer of the frozen quadratic model around `curve`.
fn candidate_curve<P: MetricProvider + ?Sized>(
    provider: &P,
    curve: &Curve,
    iteration: usize,
) -> Result<Curve> {
    let dim = curve.dimension();
    let points = curve.points();
    let controls = curve.controls();
    let steps = controls.len();

    let mut inverses = Vec::with_capacity(steps);
    let mut position_grads = Vec::with_capacity(steps);
    for (t, u) in controls.iter().enumerate() {
        let g = provider.fundamental_tensor(&points[t], u)?;
        let inverse = g.cholesky().map(|c| c.inverse()).ok_or_else(|| {
            failure(iteration, format!("metric tensor of segment {t} is not positive definite"))
        })?;
        inverses.push(inverse);
        // z_0 is fixed, so its position gradient never enters the model.
        let nu = if t == 0 {
            DVector::zeros(dim)
        } else {
            provider.squared_norm_gradients(&points[t], u)?.0
        };
        position_grads.push(nu);
    }

    // tails[t] = Σ_{j>t} ν_j
    let mut tails = vec![DVector::zeros(dim); steps];
    for t in (0..steps.saturating_sub(1)).rev() {
        tails[t] = &tails[t + 1] + &position_grads[t + 1];
    }

    let mut inverse_sum = DMatrix::zeros(dim, dim);
    let mut weighted_tails = DVector::zeros(dim);
    for (inverse, tail) in inverses.iter().zip(&tails) {
        inverse_sum += inverse;
        weighted_tails += inverse * tail;
    }

    let rhs = (curve.end() - curve.start()) * -2.0 - weighted_tails;
    let mu = inverse_sum
        .lu()
        .solve(&rhs)
        .ok_or_else(|| failure(iteration, "boundary multiplier system is singular".to_string()))?;

    let mut next = Vec::with_capacity(steps + 1);
    let mut z = curve.start().clone();
    next.push(z.clone());
    for (inverse, tail) in inverses.iter().zip(&tails) {
        z += inverse * (&mu + tail) * -0.5;
        next.push(z.clone());
    }
    if next.iter().flat_map(|p| p.iter()).any(|x| !x.is_finite()) {
        return Err(failure(iteration, "update produced non-finite points".to_string()));
    }
    // Pin the far endpoint against accumulated rounding.
    next[steps] = curve.end().clone();
    Curve::new(next)
}
