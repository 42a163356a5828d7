//! Bounded backtracking along a curve update direction.

use crate::curve::{energy, Curve};
use crate::error::{GeodesicError, Result};
use crate::metric::MetricProvider;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LineSearchMethod {
    /// Accept the first step that does not increase the energy.
    Soft,
    /// Accept the first step with sufficient decrease `E(s) <= E(0) + c1 * s * slope`.
    Armijo { c1: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSearchSettings {
    pub method: LineSearchMethod,
    /// Shrink factor applied after each rejected trial.
    pub rho: f64,
    pub max_attempts: usize,
    pub initial_step: f64,
}

impl Default for LineSearchSettings {
    fn default() -> Self {
        Self {
            method: LineSearchMethod::Soft,
            rho: 0.5,
            max_attempts: 100,
            initial_step: 1.0,
        }
    }
}

impl LineSearchSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(GeodesicError::InvalidConfig(format!(
                "rho must lie in (0, 1), got {}",
                self.rho
            )));
        }
        if self.max_attempts == 0 {
            return Err(GeodesicError::InvalidConfig(
                "line search needs at least one attempt".to_string(),
            ));
        }
        if !(self.initial_step > 0.0 && self.initial_step <= 1.0) {
            return Err(GeodesicError::InvalidConfig(format!(
                "initial_step must lie in (0, 1], got {}",
                self.initial_step
            )));
        }
        if let LineSearchMethod::Armijo { c1 } = self.method {
            if !(c1 > 0.0 && c1 < 1.0) {
                return Err(GeodesicError::InvalidConfig(format!(
                    "Armijo constant must lie in (0, 1), got {c1}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchOutcome {
    pub step: f64,
    /// Energy at the accepted step, or the starting energy when nothing was accepted.
    pub energy: f64,
    pub attempts: usize,
    pub improved: bool,
}

/// Directional derivative `∇E · d` of the energy along `direction`.
pub fn slope(gradient: &[DVector<f64>], direction: &[DVector<f64>]) -> f64 {
    gradient.iter().zip(direction).map(|(g, d)| g.dot(d)).sum()
}

/// Shrinks the step from `initial_step` by `rho` until the acceptance rule holds.
///
/// Exhaustion is not an error: the outcome carries the smallest tested step with
/// `improved == false`. Trials whose energy cannot be evaluated count as rejections.
pub fn search<P: MetricProvider + ?Sized>(
    provider: &P,
    curve: &Curve,
    direction: &[DVector<f64>],
    energy0: f64,
    slope: f64,
    settings: &LineSearchSettings,
) -> LineSearchOutcome {
    let mut step = settings.initial_step;
    let mut last_tested = step;

    for attempt in 1..=settings.max_attempts {
        last_tested = step;
        let trial = curve.displaced(direction, step);
        match energy(provider, &trial) {
            Ok(value) if value.is_finite() && accepts(settings, energy0, slope, step, value) => {
                return LineSearchOutcome {
                    step,
                    energy: value,
                    attempts: attempt,
                    improved: true,
                };
            }
            Ok(value) => trace!(attempt, step, energy = value, energy0, "rejected trial step"),
            Err(err) => trace!(attempt, step, %err, "trial step left the metric domain"),
        }
        step *= settings.rho;
    }

    LineSearchOutcome {
        step: last_tested,
        energy: energy0,
        attempts: settings.max_attempts,
        improved: false,
    }
}

fn accepts(settings: &LineSearchSettings, energy0: f64, slope: f64, step: f64, value: f64) -> bool {
    match settings.method {
        LineSearchMethod::Soft => value <= energy0,
        LineSearchMethod::Armijo { c1 } => value <= energy0 + c1 * step * slope,
    }
}
