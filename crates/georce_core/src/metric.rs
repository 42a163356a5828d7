//! Local metric data consumed by the solvers.
//!
//! Solvers only see [`MetricProvider`]: the squared norm `F(z, v)^2` of a displacement, its
//! gradients, and the fundamental tensor `g(z, v) = ½ ∂²F²/∂v²`. For a Riemannian metric
//! `F(z, v)^2 = vᵀ G(z) v` and `g(z, v) = G(z)`; the navigation transform supplies a
//! direction-dependent Randers metric through the same contract.

use crate::autodiff::{metric_partials, Dual};
use crate::error::{GeodesicError, Result};
use crate::traits::{Chart, MetricField, ReferenceGeodesic};
use nalgebra::{DMatrix, DVector};

/// Everything a solver needs from a metric at a point `z` and displacement `v`.
pub trait MetricProvider {
    /// Dimension of the coordinate chart.
    fn dimension(&self) -> usize;

    /// Squared norm `F(z, v)^2`.
    fn squared_norm(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<f64>;

    /// Gradients of `F(z, v)^2` with respect to `z` (holding `v`) and to `v` (holding `z`).
    fn squared_norm_gradients(
        &self,
        z: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>)>;

    /// Symmetric positive-definite fundamental tensor at `(z, v)`.
    fn fundamental_tensor(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<DMatrix<f64>>;

    /// Closed-form geodesics of this metric, if any.
    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        None
    }

    /// Embedding chart of the underlying manifold, if any.
    fn chart(&self) -> Option<&dyn Chart> {
        None
    }
}

impl<P: MetricProvider + ?Sized> MetricProvider for &P {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn squared_norm(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<f64> {
        (**self).squared_norm(z, v)
    }
    fn squared_norm_gradients(
        &self,
        z: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>)> {
        (**self).squared_norm_gradients(z, v)
    }
    fn fundamental_tensor(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<DMatrix<f64>> {
        (**self).fundamental_tensor(z, v)
    }
    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        (**self).reference()
    }
    fn chart(&self) -> Option<&dyn Chart> {
        (**self).chart()
    }
}

impl<P: MetricProvider + ?Sized> MetricProvider for Box<P> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn squared_norm(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<f64> {
        (**self).squared_norm(z, v)
    }
    fn squared_norm_gradients(
        &self,
        z: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>)> {
        (**self).squared_norm_gradients(z, v)
    }
    fn fundamental_tensor(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<DMatrix<f64>> {
        (**self).fundamental_tensor(z, v)
    }
    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        (**self).reference()
    }
    fn chart(&self) -> Option<&dyn Chart> {
        (**self).chart()
    }
}

/// A Riemannian metric field exposed through the solver contract.
///
/// Derivatives of the tensor come from Dual-number evaluation of the same field.
#[derive(Debug, Clone)]
pub struct Riemannian<M> {
    field: M,
}

impl<M> Riemannian<M>
where
    M: MetricField<f64> + MetricField<Dual>,
{
    pub fn new(field: M) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &M {
        &self.field
    }

    /// Metric tensor `G(z)`.
    pub fn metric(&self, z: &DVector<f64>) -> Result<DMatrix<f64>> {
        let dim = self.field.dimension();
        let mut out = vec![0.0; dim * dim];
        <M as MetricField<f64>>::metric(&self.field, z.as_slice(), &mut out);
        if out.iter().any(|v| !v.is_finite()) {
            return Err(GeodesicError::MetricEvaluation(format!(
                "non-finite metric tensor at {:?}",
                z.as_slice()
            )));
        }
        Ok(DMatrix::from_row_slice(dim, dim, &out))
    }

    /// Partial derivatives `∂G/∂z_k`, one matrix per coordinate.
    pub fn metric_derivative(&self, z: &DVector<f64>) -> Vec<DMatrix<f64>> {
        let dim = self.field.dimension();
        metric_partials(&self.field, z.as_slice())
            .into_iter()
            .map(|block| DMatrix::from_row_slice(dim, dim, &block))
            .collect()
    }
}

impl<M> MetricProvider for Riemannian<M>
where
    M: MetricField<f64> + MetricField<Dual>,
{
    fn dimension(&self) -> usize {
        self.field.dimension()
    }

    fn squared_norm(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<f64> {
        let g = self.metric(z)?;
        Ok(v.dot(&(&g * v)))
    }

    fn squared_norm_gradients(
        &self,
        z: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>)> {
        let g = self.metric(z)?;
        let grad_z = DVector::from_iterator(
            z.len(),
            self.metric_derivative(z)
                .iter()
                .map(|dg| v.dot(&(dg * v))),
        );
        let grad_v = (&g + g.transpose()) * v;
        Ok((grad_z, grad_v))
    }

    fn fundamental_tensor(&self, z: &DVector<f64>, _v: &DVector<f64>) -> Result<DMatrix<f64>> {
        let g = self.metric(z)?;
        Ok((&g + g.transpose()) * 0.5)
    }

    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        self.field.reference()
    }

    fn chart(&self) -> Option<&dyn Chart> {
        self.field.chart()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifolds::{Euclidean, Paraboloid};

    #[test]
    fn euclidean_squared_norm_is_dot_product() {
        let provider = Riemannian::new(Euclidean::new(3));
        let z = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let v = DVector::from_vec(vec![1.0, 2.0, 2.0]);
        let value = provider.squared_norm(&z, &v).expect("norm");
        assert!((value - 9.0).abs() < 1e-12);
    }

    #[test]
    fn paraboloid_gradients_match_finite_differences() {
        let provider = Riemannian::new(Paraboloid::new(2));
        let z = DVector::from_vec(vec![0.3, -0.7]);
        let v = DVector::from_vec(vec![0.2, 0.4]);
        let (grad_z, grad_v) = provider.squared_norm_gradients(&z, &v).expect("gradients");

        let h = 1e-6;
        for k in 0..2 {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[k] += h;
            zm[k] -= h;
            let fd = (provider.squared_norm(&zp, &v).unwrap()
                - provider.squared_norm(&zm, &v).unwrap())
                / (2.0 * h);
            assert!((fd - grad_z[k]).abs() < 1e-6, "z-gradient mismatch at {k}");

            let mut vp = v.clone();
            let mut vm = v.clone();
            vp[k] += h;
            vm[k] -= h;
            let fd = (provider.squared_norm(&z, &vp).unwrap()
                - provider.squared_norm(&z, &vm).unwrap())
                / (2.0 * h);
            assert!((fd - grad_v[k]).abs() < 1e-6, "v-gradient mismatch at {k}");
        }
    }

    #[test]
    fn metric_derivative_has_one_block_per_coordinate() {
        let provider = Riemannian::new(Paraboloid::new(2));
        let z = DVector::from_vec(vec![1.0, 2.0]);
        let partials = provider.metric_derivative(&z);
        assert_eq!(partials.len(), 2);
        // G = I + 4 z zᵀ, so ∂G/∂z_0 = 4 (e0 zᵀ + z e0ᵀ)
        assert!((partials[0][(0, 0)] - 8.0).abs() < 1e-12);
        assert!((partials[0][(0, 1)] - 8.0).abs() < 1e-12);
        assert_eq!(partials[0][(1, 1)], 0.0);
    }

    #[test]
    fn boxed_provider_forwards_capabilities() {
        let provider: Box<dyn MetricProvider> = Box::new(Riemannian::new(Euclidean::new(2)));
        assert_eq!(provider.dimension(), 2);
        assert!(provider.reference().is_some());
        assert!(provider.chart().is_none());
    }
}
