//! Discretized curves and the energy / length functionals evaluated on them.
//!
//! With `u_t = z_{t+1} - z_t`, the energy is `E = Σ_t F(z_t, u_t)²` and the length is
//! `L = Σ_t F(z_t, u_t)`. The norm of each segment is always evaluated at its left endpoint.

use crate::error::{GeodesicError, Result};
use crate::metric::MetricProvider;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An ordered sequence of `T + 1` points with fixed endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<f64>>", try_from = "Vec<Vec<f64>>")]
pub struct Curve {
    points: Vec<DVector<f64>>,
}

impl Curve {
    pub fn new(points: Vec<DVector<f64>>) -> Result<Self> {
        let first = points.first().ok_or_else(|| {
            GeodesicError::InvalidConfig("a curve needs at least one point".to_string())
        })?;
        let dim = first.len();
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(GeodesicError::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }
        Ok(Self { points })
    }

    /// Affine interpolation of the endpoints into `steps + 1` samples.
    pub fn linear(z0: &DVector<f64>, z_t: &DVector<f64>, steps: usize) -> Self {
        let denom = steps.max(1) as f64;
        let mut points: Vec<DVector<f64>> = (0..=steps)
            .map(|t| {
                let s = t as f64 / denom;
                z0 + (z_t - z0) * s
            })
            .collect();
        // Pin endpoints bit-for-bit.
        points[0] = z0.clone();
        if steps > 0 {
            points[steps] = z_t.clone();
        }
        Self { points }
    }

    /// Number of segments `T`.
    pub fn steps(&self) -> usize {
        self.points.len() - 1
    }

    pub fn dimension(&self) -> usize {
        self.points[0].len()
    }

    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    pub fn start(&self) -> &DVector<f64> {
        &self.points[0]
    }

    pub fn end(&self) -> &DVector<f64> {
        &self.points[self.points.len() - 1]
    }

    /// The free points `z_1, ..., z_{T-1}`.
    pub fn interior(&self) -> &[DVector<f64>] {
        let n = self.points.len();
        if n <= 2 {
            &[]
        } else {
            &self.points[1..n - 1]
        }
    }

    /// Segment displacements `u_t = z_{t+1} - z_t`.
    pub fn controls(&self) -> Vec<DVector<f64>> {
        self.points.windows(2).map(|w| &w[1] - &w[0]).collect()
    }

    /// Interior points stacked into one vector of length `(T - 1) * dim`.
    pub fn flatten_interior(&self) -> DVector<f64> {
        let dim = self.dimension();
        let interior = self.interior();
        let mut flat = DVector::zeros(interior.len() * dim);
        for (i, p) in interior.iter().enumerate() {
            flat.rows_mut(i * dim, dim).copy_from(p);
        }
        flat
    }

    /// Same endpoints, interior replaced by a stacked vector.
    pub fn with_interior(&self, flat: &DVector<f64>) -> Result<Self> {
        let dim = self.dimension();
        let expected = self.interior().len() * dim;
        if flat.len() != expected {
            return Err(GeodesicError::DimensionMismatch {
                expected,
                got: flat.len(),
            });
        }
        let mut points = self.points.clone();
        for (i, p) in points.iter_mut().skip(1).take(self.interior().len()).enumerate() {
            *p = flat.rows(i * dim, dim).into_owned();
        }
        Ok(Self { points })
    }

    /// Moves the interior by `step * direction`; endpoints are untouched.
    ///
    /// `direction` holds one vector per interior point.
    pub fn displaced(&self, direction: &[DVector<f64>], step: f64) -> Self {
        let mut points = self.points.clone();
        for (p, d) in points.iter_mut().skip(1).zip(direction) {
            *p += d * step;
        }
        let last = self.points.len() - 1;
        points[last] = self.points[last].clone();
        Self { points }
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.points.iter().map(|p| p.iter().copied().collect()).collect()
    }
}

impl From<Curve> for Vec<Vec<f64>> {
    fn from(curve: Curve) -> Self {
        curve.to_rows()
    }
}

impl TryFrom<Vec<Vec<f64>>> for Curve {
    type Error = GeodesicError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Curve::new(rows.into_iter().map(DVector::from_vec).collect())
    }
}

type InitFn = dyn Fn(&DVector<f64>, &DVector<f64>, usize) -> Curve + Send + Sync;

/// Produces the starting curve of a solve.
#[derive(Clone, Default)]
pub enum Initializer {
    /// Straight interpolation in chart coordinates.
    #[default]
    Linear,
    Custom(Arc<InitFn>),
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initializer::Linear => write!(f, "Linear"),
            Initializer::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Initializer {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&DVector<f64>, &DVector<f64>, usize) -> Curve + Send + Sync + 'static,
    {
        Initializer::Custom(Arc::new(f))
    }

    /// Builds the initial curve; custom output is checked and its endpoints pinned.
    pub fn initialize(&self, z0: &DVector<f64>, z_t: &DVector<f64>, steps: usize) -> Result<Curve> {
        match self {
            Initializer::Linear => Ok(Curve::linear(z0, z_t, steps)),
            Initializer::Custom(f) => {
                let curve = f(z0, z_t, steps);
                if curve.steps() != steps {
                    return Err(GeodesicError::InvalidConfig(format!(
                        "initializer produced {} segments, expected {}",
                        curve.steps(),
                        steps
                    )));
                }
                if curve.dimension() != z0.len() {
                    return Err(GeodesicError::DimensionMismatch {
                        expected: z0.len(),
                        got: curve.dimension(),
                    });
                }
                let mut points = curve.points;
                points[0] = z0.clone();
                points[steps] = z_t.clone();
                Ok(Curve { points })
            }
        }
    }
}

/// Discrete energy `Σ_t F(z_t, u_t)²`.
pub fn energy<P: MetricProvider + ?Sized>(provider: &P, curve: &Curve) -> Result<f64> {
    let points = curve.points();
    curve
        .controls()
        .iter()
        .enumerate()
        .try_fold(0.0, |acc, (t, u)| Ok(acc + provider.squared_norm(&points[t], u)?))
}

/// Discrete length `Σ_t F(z_t, u_t)`.
pub fn length<P: MetricProvider + ?Sized>(provider: &P, curve: &Curve) -> Result<f64> {
    let points = curve.points();
    curve
        .controls()
        .iter()
        .enumerate()
        .try_fold(0.0, |acc, (t, u)| {
            Ok(acc + provider.squared_norm(&points[t], u)?.max(0.0).sqrt())
        })
}

/// Gradient of the energy with respect to each interior point.
///
/// `∂E/∂z_t = ∇_z F²(z_t, u_t) - ∇_v F²(z_t, u_t) + ∇_v F²(z_{t-1}, u_{t-1})`
pub fn energy_gradient<P: MetricProvider + ?Sized>(
    provider: &P,
    curve: &Curve,
) -> Result<Vec<DVector<f64>>> {
    segment_gradient(provider, curve, |_, grad_z, grad_v| Some((grad_z, grad_v)))
}

/// Gradient of the length with respect to each interior point.
///
/// Uses `∇F = ∇F² / (2F)`; zero-length segments contribute nothing.
pub fn length_gradient<P: MetricProvider + ?Sized>(
    provider: &P,
    curve: &Curve,
) -> Result<Vec<DVector<f64>>> {
    segment_gradient(provider, curve, |f2, grad_z, grad_v| {
        let f = f2.max(0.0).sqrt();
        if f <= f64::EPSILON {
            None
        } else {
            let scale = 0.5 / f;
            Some((grad_z * scale, grad_v * scale))
        }
    })
}

fn segment_gradient<P, S>(provider: &P, curve: &Curve, scale: S) -> Result<Vec<DVector<f64>>>
where
    P: MetricProvider + ?Sized,
    S: Fn(f64, DVector<f64>, DVector<f64>) -> Option<(DVector<f64>, DVector<f64>)>,
{
    let dim = curve.dimension();
    let points = curve.points();
    let controls = curve.controls();
    let n_interior = curve.interior().len();
    let mut grad = vec![DVector::zeros(dim); n_interior];

    for (t, u) in controls.iter().enumerate() {
        let (grad_z, grad_v) = provider.squared_norm_gradients(&points[t], u)?;
        let f2 = provider.squared_norm(&points[t], u)?;
        let Some((seg_z, seg_v)) = scale(f2, grad_z, grad_v) else {
            continue;
        };
        // Segment t depends on z_t (interior index t - 1) and z_{t+1} (interior index t).
        if t >= 1 {
            grad[t - 1] += seg_z - &seg_v;
        }
        if t < n_interior {
            grad[t] += seg_v;
        }
    }

    Ok(grad)
}

/// Euclidean norm of a stacked gradient.
pub fn gradient_norm(gradient: &[DVector<f64>]) -> f64 {
    gradient.iter().map(|g| g.norm_squared()).sum::<f64>().sqrt()
}

/// Stacks per-point vectors into one vector.
pub fn stack(parts: &[DVector<f64>]) -> DVector<f64> {
    DVector::from_iterator(
        parts.iter().map(|p| p.len()).sum(),
        parts.iter().flat_map(|p| p.iter().copied()),
    )
}

/// Splits a stacked vector into `dim`-sized parts.
pub fn unstack(flat: &DVector<f64>, dim: usize) -> Vec<DVector<f64>> {
    if dim == 0 {
        return Vec::new();
    }
    (0..flat.len() / dim)
        .map(|i| flat.rows(i * dim, dim).into_owned())
        .collect()
}
