//! Baseline solvers that optimize the energy of the stacked interior points directly.
//!
//! They satisfy the same [`GeodesicSolver`](crate::solver::GeodesicSolver) contract as GEORCE
//! so results can be compared one-to-one.

pub mod gradient;
pub mod quasi_newton;

pub use gradient::{FirstOrderMethod, GradientSettings, GradientSolver};
pub use quasi_newton::{QuasiNewtonMethod, QuasiNewtonSettings, QuasiNewtonSolver};

use crate::curve::{energy, energy_gradient, stack, Curve};
use crate::error::{GeodesicError, Result};
use crate::metric::MetricProvider;
use nalgebra::DVector;

/// The discrete energy seen as a function of the flattened interior `x`.
pub(crate) struct InteriorObjective<'a, P: ?Sized> {
    provider: &'a P,
    template: Curve,
}

impl<'a, P: MetricProvider + ?Sized> InteriorObjective<'a, P> {
    pub(crate) fn new(provider: &'a P, template: Curve) -> Self {
        Self { provider, template }
    }

    pub(crate) fn initial_point(&self) -> DVector<f64> {
        self.template.flatten_interior()
    }

    pub(crate) fn curve(&self, x: &DVector<f64>) -> Result<Curve> {
        self.template.with_interior(x)
    }

    pub(crate) fn value(&self, x: &DVector<f64>) -> Result<f64> {
        energy(self.provider, &self.curve(x)?)
    }

    pub(crate) fn gradient(&self, x: &DVector<f64>, iteration: usize) -> Result<DVector<f64>> {
        let grad = stack(&energy_gradient(self.provider, &self.curve(x)?)?);
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(GeodesicError::SolverFailure {
                iteration,
                reason: "energy gradient is not finite".to_string(),
            });
        }
        Ok(grad)
    }

    pub(crate) fn dimension(&self) -> usize {
        self.template.dimension()
    }
}
