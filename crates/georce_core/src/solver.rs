//! The contract shared by every geodesic solver.

use crate::curve::{energy, gradient_norm, length, Curve};
use crate::error::{GeodesicError, Result};
use crate::metric::MetricProvider;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Why a solve stopped. Solver failures are reported as errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Gradient norm fell below the tolerance.
    Converged,
    /// The iteration cap was reached first.
    MaxIterations,
    /// The line search found no non-increasing step; the last curve is kept.
    ///
    /// The solve ends here instead of retrying a zero step until the cap, so `iterations`
    /// counts accepted updates and may be below `max_iter`.
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeodesicResult {
    pub curve: Curve,
    /// Energy gradient at each interior point of `curve`.
    pub gradient: Vec<Vec<f64>>,
    pub grad_norm: f64,
    pub energy: f64,
    pub length: f64,
    pub iterations: usize,
    pub status: SolveStatus,
}

impl GeodesicResult {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// A strategy turning two boundary points into a discretized geodesic.
pub trait GeodesicSolver {
    fn name(&self) -> &str;

    fn solve(
        &self,
        provider: &dyn MetricProvider,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeodesicResult>;
}

/// Checks the boundary points against the provider's chart.
pub fn validate_endpoints<P: MetricProvider + ?Sized>(
    provider: &P,
    z0: &DVector<f64>,
    z_t: &DVector<f64>,
) -> Result<()> {
    let dim = provider.dimension();
    if dim == 0 {
        return Err(GeodesicError::InvalidConfig(
            "manifold has zero dimension".to_string(),
        ));
    }
    for point in [z0, z_t] {
        if point.len() != dim {
            return Err(GeodesicError::DimensionMismatch {
                expected: dim,
                got: point.len(),
            });
        }
        if point.iter().any(|x| !x.is_finite()) {
            return Err(GeodesicError::InvalidConfig(
                "boundary points must be finite".to_string(),
            ));
        }
    }
    Ok(())
}

/// Shared validation of the solver-level numeric settings.
pub(crate) fn validate_common(steps: usize, tol: f64, max_iter: usize) -> Result<()> {
    if steps == 0 {
        return Err(GeodesicError::InvalidConfig(
            "steps must be at least 1".to_string(),
        ));
    }
    if tol.is_nan() || tol <= 0.0 {
        return Err(GeodesicError::InvalidConfig(format!(
            "tol must be positive, got {tol}"
        )));
    }
    if max_iter == 0 {
        return Err(GeodesicError::InvalidConfig(
            "max_iter must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Packs a finished curve into a result, logging one summary line.
pub(crate) fn finish<P: MetricProvider + ?Sized>(
    method: &str,
    provider: &P,
    curve: Curve,
    gradient: &[DVector<f64>],
    iterations: usize,
    status: SolveStatus,
) -> Result<GeodesicResult> {
    let energy = energy(provider, &curve)?;
    let length = length(provider, &curve)?;
    let grad_norm = gradient_norm(gradient);
    info!(method, ?status, iterations, length, grad_norm, "geodesic solve finished");
    Ok(GeodesicResult {
        curve,
        gradient: gradient.iter().map(|g| g.iter().copied().collect()).collect(),
        grad_norm,
        energy,
        length,
        iterations,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifolds::Euclidean;
    use crate::metric::Riemannian;

    #[test]
    fn endpoints_must_match_manifold_dimension() {
        let provider = Riemannian::new(Euclidean::new(2));
        let err = validate_endpoints(
            &provider,
            &DVector::zeros(2),
            &DVector::zeros(3),
        )
        .expect_err("mismatch");
        assert_eq!(err, GeodesicError::DimensionMismatch { expected: 2, got: 3 });

        let nan = DVector::from_vec(vec![f64::NAN, 0.0]);
        assert!(validate_endpoints(&provider, &nan, &DVector::zeros(2)).is_err());
    }

    #[test]
    fn common_settings_fail_fast() {
        assert!(validate_common(0, 1e-4, 10).unwrap_err().to_string().contains("steps"));
        assert!(validate_common(10, 0.0, 10).unwrap_err().to_string().contains("tol"));
        assert!(validate_common(10, f64::NAN, 10).is_err());
        assert!(validate_common(10, 1e-4, 0).unwrap_err().to_string().contains("max_iter"));
        assert!(validate_common(10, 1e-4, 10).is_ok());
    }

    #[test]
    fn finish_reports_length_and_gradient() {
        let provider = Riemannian::new(Euclidean::new(1));
        let curve = Curve::linear(&DVector::from_vec(vec![0.0]), &DVector::from_vec(vec![3.0]), 3);
        let gradient = vec![DVector::from_vec(vec![3.0]), DVector::from_vec(vec![4.0])];
        let result = finish("test", &provider, curve, &gradient, 7, SolveStatus::MaxIterations)
            .expect("result");
        assert!((result.length - 3.0).abs() < 1e-12);
        assert!((result.energy - 3.0).abs() < 1e-12);
        assert_eq!(result.grad_norm, 5.0);
        assert_eq!(result.gradient, vec![vec![3.0], vec![4.0]]);
        assert!(!result.converged());
    }
}
