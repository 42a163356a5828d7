use nalgebra::DVector;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in metric evaluations.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Converts an `f64` constant, yielding NaN if the value is not representable.
    fn lit(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A coordinate chart on which metrics are defined.
///
/// Optional capabilities are exposed as `Option`s: a manifold either provides a closed-form
/// geodesic or an embedding chart, or it does not.
pub trait Manifold {
    /// Returns the dimension of the coordinate chart.
    fn dimension(&self) -> usize;

    /// Closed-form geodesics, when known. Used only for ground-truth lengths.
    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        None
    }

    /// Map between the reduced chart and an embedding space, when the chart is reduced.
    fn chart(&self) -> Option<&dyn Chart> {
        None
    }
}

/// A Riemannian metric tensor field.
pub trait MetricField<T: Scalar>: Manifold {
    /// Evaluates the metric tensor at a point.
    /// z: point in chart coordinates
    /// out: buffer receiving G(z) in row-major order (length dim * dim)
    fn metric(&self, z: &[T], out: &mut [T]);
}

/// A vector field on the chart, interpreted as the drift of a navigation problem.
pub trait DriftField<T: Scalar> {
    /// Evaluates the drift at a point.
    /// z: point in chart coordinates
    /// out: buffer receiving W(z) (length dim)
    fn drift(&self, z: &[T], out: &mut [T]);
}

/// Exact geodesics, available for a few manifolds.
pub trait ReferenceGeodesic {
    /// Samples the geodesic from `z0` to `z_t` at `steps + 1` points in chart coordinates.
    fn geodesic(&self, z0: &DVector<f64>, z_t: &DVector<f64>, steps: usize) -> Vec<DVector<f64>>;
}

/// Reduced coordinate chart of an embedded manifold.
pub trait Chart {
    /// Dimension of the ambient space the chart maps into.
    fn embedding_dimension(&self) -> usize;

    /// Maps chart coordinates to the embedding.
    fn parametrize(&self, z: &DVector<f64>) -> DVector<f64>;

    /// Maps an embedded point back to chart coordinates.
    fn inverse_parametrize(&self, x: &DVector<f64>) -> DVector<f64>;
}
