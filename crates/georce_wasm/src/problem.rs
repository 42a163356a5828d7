//! Problem construction shared by the runner and the comparison entry point.

use anyhow::{bail, Context, Result};
use georce_core::loader::{load_problem, Geometry, LoadedProblem};
use georce_core::navigation::NavigationSettings;
use nalgebra::DVector;

/// Loads a named problem, optionally overriding its boundary points.
///
/// Empty `z0` / `z_t` keep the problem's own boundary points.
pub(crate) fn build_problem(
    geometry: &str,
    manifold: &str,
    dim: usize,
    speed: f64,
    z0: &[f64],
    z_t: &[f64],
) -> Result<LoadedProblem> {
    let geometry: Geometry = geometry.parse()?;
    let mut problem = load_problem(geometry, manifold, dim, NavigationSettings { speed })
        .with_context(|| format!("Failed to load {manifold} problem."))?;

    if !z0.is_empty() {
        problem.setup.z0 = boundary_point("z0", z0, dim)?;
    }
    if !z_t.is_empty() {
        problem.setup.z_t = boundary_point("z_t", z_t, dim)?;
    }
    Ok(problem)
}

fn boundary_point(label: &str, values: &[f64], dim: usize) -> Result<DVector<f64>> {
    if values.len() != dim {
        bail!(
            "Boundary point {} dimension mismatch. Expected {}, got {}.",
            label,
            dim,
            values.len()
        );
    }
    Ok(DVector::from_column_slice(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn keeps_default_boundary_points_when_empty() {
        let problem = build_problem("Riemannian", "Sphere", 2, 1.5, &[], &[]).unwrap();
        assert_eq!(problem.setup.z0.as_slice(), &[-0.0, -1.0]);
        assert_eq!(problem.setup.z_t.as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn overrides_boundary_points() {
        let problem =
            build_problem("Finsler", "Euclidean", 2, 1.5, &[0.0, 0.0], &[1.0, 2.0]).unwrap();
        assert_eq!(problem.setup.z_t.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn reports_unknown_selectors_and_bad_points() {
        assert_err_contains(
            build_problem("Riemannian", "Torus", 2, 1.5, &[], &[]),
            "supported: Euclidean, Paraboloid, Sphere, H2",
        );
        assert_err_contains(
            build_problem("Projective", "Sphere", 2, 1.5, &[], &[]),
            "\"Projective\"",
        );
        assert_err_contains(
            build_problem("Riemannian", "Sphere", 2, 1.5, &[1.0], &[]),
            "z0 dimension mismatch",
        );
        assert_err_contains(
            build_problem("Finsler", "Sphere", 2, 0.0, &[], &[]),
            "speed",
        );
    }
}
