//! Selector-based construction of benchmark problems.

use crate::error::{GeodesicError, Result};
use crate::manifolds::{BuiltinManifold, Euclidean, HyperbolicHalfPlane, Paraboloid, Sphere};
use crate::metric::{MetricProvider, Riemannian};
use crate::navigation::{Navigation, NavigationSettings, TrigonometricDrift};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const SUPPORTED_MANIFOLDS: &[&str] = &["Euclidean", "Paraboloid", "Sphere", "H2"];
pub const SUPPORTED_GEOMETRIES: &[&str] = &["Riemannian", "Finsler"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Geometry {
    Riemannian,
    /// Randers metric from navigating the base manifold under [`TrigonometricDrift`].
    Finsler,
}

impl FromStr for Geometry {
    type Err = GeodesicError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "Riemannian" => Ok(Geometry::Riemannian),
            "Finsler" => Ok(Geometry::Finsler),
            other => Err(GeodesicError::unsupported("geometry", other, SUPPORTED_GEOMETRIES)),
        }
    }
}

/// Boundary points and manifold of a named benchmark problem.
#[derive(Debug, Clone)]
pub struct ProblemSetup {
    pub z0: DVector<f64>,
    pub z_t: DVector<f64>,
    pub manifold: BuiltinManifold,
    /// Line-search shrink factor used for this problem.
    pub rho: f64,
}

/// `-(0, 1/(dim-1), ..., 1)`, or `[0]` in one dimension.
fn descending_ramp(dim: usize) -> DVector<f64> {
    if dim <= 1 {
        return DVector::zeros(dim);
    }
    let last = (dim - 1) as f64;
    DVector::from_iterator(dim, (0..dim).map(|i| -(i as f64) / last))
}

pub fn load_manifold(selector: &str, dim: usize) -> Result<ProblemSetup> {
    if dim == 0 {
        return Err(GeodesicError::InvalidConfig(
            "dimension must be at least 1".to_string(),
        ));
    }
    let (manifold, z0, z_t) = match selector {
        "Euclidean" => (
            BuiltinManifold::Euclidean(Euclidean::new(dim)),
            descending_ramp(dim),
            DVector::from_element(dim, 1.0),
        ),
        "Paraboloid" => (
            BuiltinManifold::Paraboloid(Paraboloid::new(dim)),
            descending_ramp(dim),
            DVector::from_element(dim, 1.0),
        ),
        "Sphere" => (
            BuiltinManifold::Sphere(Sphere::new(dim)),
            descending_ramp(dim),
            DVector::from_element(dim, 0.5),
        ),
        "H2" => {
            if dim != 2 {
                return Err(GeodesicError::DimensionMismatch {
                    expected: 2,
                    got: dim,
                });
            }
            (
                BuiltinManifold::H2(HyperbolicHalfPlane),
                DVector::from_vec(vec![1.0, 1.0]),
                DVector::from_vec(vec![0.1, 0.1]),
            )
        }
        other => return Err(GeodesicError::unsupported("manifold", other, SUPPORTED_MANIFOLDS)),
    };
    Ok(ProblemSetup {
        z0,
        z_t,
        manifold,
        rho: 0.5,
    })
}

/// A loaded problem together with the metric the solvers should see.
pub struct LoadedProblem {
    pub setup: ProblemSetup,
    pub geometry: Geometry,
    pub provider: Box<dyn MetricProvider + Send + Sync>,
}

impl std::fmt::Debug for LoadedProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedProblem")
            .field("setup", &self.setup)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

pub fn load_problem(
    geometry: Geometry,
    selector: &str,
    dim: usize,
    navigation: NavigationSettings,
) -> Result<LoadedProblem> {
    let setup = load_manifold(selector, dim)?;
    let provider: Box<dyn MetricProvider + Send + Sync> = match geometry {
        Geometry::Riemannian => Box::new(Riemannian::new(setup.manifold)),
        Geometry::Finsler => Box::new(Navigation::new(
            setup.manifold,
            TrigonometricDrift::new(setup.manifold),
            navigation,
        )?),
    };
    Ok(LoadedProblem {
        setup,
        geometry,
        provider,
    })
}
