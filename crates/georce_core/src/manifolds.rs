//! Built-in metric families.
//!
//! These are deliberately small: enough closed-form metrics to exercise the solvers and the
//! loading layer, each written once for any [`Scalar`].

use crate::traits::{Chart, Manifold, MetricField, ReferenceGeodesic, Scalar};
use nalgebra::DVector;

fn write_scaled_identity<T: Scalar>(dim: usize, scale: T, out: &mut [T]) {
    for i in 0..dim {
        for j in 0..dim {
            out[i * dim + j] = if i == j { scale } else { T::zero() };
        }
    }
}

fn squared_norm<T: Scalar>(z: &[T]) -> T {
    z.iter().fold(T::zero(), |acc, &v| acc + v * v)
}

fn linear_samples(z0: &DVector<f64>, z_t: &DVector<f64>, steps: usize) -> Vec<DVector<f64>> {
    let denom = steps.max(1) as f64;
    (0..=steps)
        .map(|t| {
            let s = t as f64 / denom;
            z0 * (1.0 - s) + z_t * s
        })
        .collect()
}

/// Flat space: `G(z) = I`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Euclidean {
    dim: usize,
}

impl Euclidean {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Manifold for Euclidean {
    fn dimension(&self) -> usize {
        self.dim
    }
    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        Some(self)
    }
}

impl<T: Scalar> MetricField<T> for Euclidean {
    fn metric(&self, _z: &[T], out: &mut [T]) {
        write_scaled_identity(self.dim, T::one(), out);
    }
}

impl ReferenceGeodesic for Euclidean {
    fn geodesic(&self, z0: &DVector<f64>, z_t: &DVector<f64>, steps: usize) -> Vec<DVector<f64>> {
        linear_samples(z0, z_t, steps)
    }
}

/// Graph of `x ↦ |x|²`: `G(z) = I + 4 z zᵀ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paraboloid {
    dim: usize,
}

impl Paraboloid {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Manifold for Paraboloid {
    fn dimension(&self) -> usize {
        self.dim
    }
    fn chart(&self) -> Option<&dyn Chart> {
        Some(self)
    }
}

impl<T: Scalar> MetricField<T> for Paraboloid {
    fn metric(&self, z: &[T], out: &mut [T]) {
        let four = T::lit(4.0);
        let n = self.dim;
        for i in 0..n {
            for j in 0..n {
                let base = if i == j { T::one() } else { T::zero() };
                out[i * n + j] = base + four * z[i] * z[j];
            }
        }
    }
}

impl Chart for Paraboloid {
    fn embedding_dimension(&self) -> usize {
        self.dim + 1
    }

    fn parametrize(&self, z: &DVector<f64>) -> DVector<f64> {
        let mut x = DVector::zeros(self.dim + 1);
        x.rows_mut(0, self.dim).copy_from(z);
        x[self.dim] = z.norm_squared();
        x
    }

    fn inverse_parametrize(&self, x: &DVector<f64>) -> DVector<f64> {
        x.rows(0, self.dim).into_owned()
    }
}

/// Unit sphere in stereographic coordinates (projection from the north pole):
/// `G(z) = 4 / (1 + |z|²)² I`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    dim: usize,
}

impl Sphere {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Manifold for Sphere {
    fn dimension(&self) -> usize {
        self.dim
    }
    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        Some(self)
    }
    fn chart(&self) -> Option<&dyn Chart> {
        Some(self)
    }
}

impl<T: Scalar> MetricField<T> for Sphere {
    fn metric(&self, z: &[T], out: &mut [T]) {
        let denom = T::one() + squared_norm(z);
        let scale = T::lit(4.0) / (denom * denom);
        write_scaled_identity(self.dim, scale, out);
    }
}

impl Chart for Sphere {
    fn embedding_dimension(&self) -> usize {
        self.dim + 1
    }

    fn parametrize(&self, z: &DVector<f64>) -> DVector<f64> {
        let r2 = z.norm_squared();
        let mut x = DVector::zeros(self.dim + 1);
        x.rows_mut(0, self.dim).copy_from(&(z * (2.0 / (1.0 + r2))));
        x[self.dim] = (r2 - 1.0) / (r2 + 1.0);
        x
    }

    fn inverse_parametrize(&self, x: &DVector<f64>) -> DVector<f64> {
        x.rows(0, self.dim).into_owned() / (1.0 - x[self.dim])
    }
}

impl ReferenceGeodesic for Sphere {
    fn geodesic(&self, z0: &DVector<f64>, z_t: &DVector<f64>, steps: usize) -> Vec<DVector<f64>> {
        let x0 = self.parametrize(z0);
        let x1 = self.parametrize(z_t);
        let theta = x0.dot(&x1).clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        // Coincident or antipodal endpoints: the great circle is not unique.
        if sin_theta.abs() < 1e-12 {
            return linear_samples(z0, z_t, steps);
        }

        let denom = steps.max(1) as f64;
        (0..=steps)
            .map(|t| {
                if t == 0 {
                    return z0.clone();
                }
                if t == steps {
                    return z_t.clone();
                }
                let s = t as f64 / denom;
                let x = (&x0 * ((1.0 - s) * theta).sin() + &x1 * (s * theta).sin()) / sin_theta;
                self.inverse_parametrize(&x)
            })
            .collect()
    }
}

/// Hyperbolic upper half-plane: `G(x, y) = I / y²`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HyperbolicHalfPlane;

impl Manifold for HyperbolicHalfPlane {
    fn dimension(&self) -> usize {
        2
    }
}

impl<T: Scalar> MetricField<T> for HyperbolicHalfPlane {
    fn metric(&self, z: &[T], out: &mut [T]) {
        write_scaled_identity(2, (z[1] * z[1]).recip(), out);
    }
}

/// One variant per built-in family, so a selected manifold keeps static dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuiltinManifold {
    Euclidean(Euclidean),
    Paraboloid(Paraboloid),
    Sphere(Sphere),
    H2(HyperbolicHalfPlane),
}

impl BuiltinManifold {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinManifold::Euclidean(_) => "Euclidean",
            BuiltinManifold::Paraboloid(_) => "Paraboloid",
            BuiltinManifold::Sphere(_) => "Sphere",
            BuiltinManifold::H2(_) => "H2",
        }
    }
}

impl Manifold for BuiltinManifold {
    fn dimension(&self) -> usize {
        match self {
            BuiltinManifold::Euclidean(m) => m.dimension(),
            BuiltinManifold::Paraboloid(m) => m.dimension(),
            BuiltinManifold::Sphere(m) => m.dimension(),
            BuiltinManifold::H2(m) => m.dimension(),
        }
    }

    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        match self {
            BuiltinManifold::Euclidean(m) => m.reference(),
            BuiltinManifold::Paraboloid(m) => m.reference(),
            BuiltinManifold::Sphere(m) => m.reference(),
            BuiltinManifold::H2(m) => m.reference(),
        }
    }

    fn chart(&self) -> Option<&dyn Chart> {
        match self {
            BuiltinManifold::Euclidean(m) => m.chart(),
            BuiltinManifold::Paraboloid(m) => m.chart(),
            BuiltinManifold::Sphere(m) => m.chart(),
            BuiltinManifold::H2(m) => m.chart(),
        }
    }
}

impl<T: Scalar> MetricField<T> for BuiltinManifold {
    fn metric(&self, z: &[T], out: &mut [T]) {
        match self {
            BuiltinManifold::Euclidean(m) => m.metric(z, out),
            BuiltinManifold::Paraboloid(m) => m.metric(z, out),
            BuiltinManifold::Sphere(m) => m.metric(z, out),
            BuiltinManifold::H2(m) => m.metric(z, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_f64<M: MetricField<f64>>(m: &M, z: &[f64]) -> Vec<f64> {
        let n = m.dimension();
        let mut out = vec![0.0; n * n];
        m.metric(z, &mut out);
        out
    }

    #[test]
    fn sphere_chart_round_trips_and_lands_on_unit_sphere() {
        let sphere = Sphere::new(2);
        let z = DVector::from_vec(vec![0.3, -1.4]);
        let x = sphere.parametrize(&z);
        assert!((x.norm() - 1.0).abs() < 1e-12);
        let back = sphere.inverse_parametrize(&x);
        assert!((back - z).norm() < 1e-12);
    }

    #[test]
    fn sphere_metric_is_conformal() {
        let g = metric_f64(&Sphere::new(2), &[1.0, 0.0]);
        assert!((g[0] - 1.0).abs() < 1e-12);
        assert_eq!(g[1], 0.0);
        assert!((g[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_reference_geodesic_keeps_endpoints_and_stays_on_great_circle() {
        let sphere = Sphere::new(2);
        let z0 = DVector::from_vec(vec![0.0, -1.0]);
        let z_t = DVector::from_vec(vec![0.5, 0.5]);
        let samples = sphere.geodesic(&z0, &z_t, 8);
        assert_eq!(samples.len(), 9);
        assert_eq!(samples[0], z0);
        assert_eq!(samples[8], z_t);

        let x0 = sphere.parametrize(&z0);
        let x1 = sphere.parametrize(&z_t);
        let normal = DVector::from_vec(vec![
            x0[1] * x1[2] - x0[2] * x1[1],
            x0[2] * x1[0] - x0[0] * x1[2],
            x0[0] * x1[1] - x0[1] * x1[0],
        ]);
        for z in &samples {
            let x = sphere.parametrize(z);
            assert!(x.dot(&normal).abs() < 1e-10, "sample left the great circle");
        }
    }

    #[test]
    fn paraboloid_chart_lifts_to_graph() {
        let p = Paraboloid::new(2);
        let z = DVector::from_vec(vec![1.0, 2.0]);
        let x = p.parametrize(&z);
        assert_eq!(x.as_slice(), &[1.0, 2.0, 5.0]);
        assert_eq!(p.inverse_parametrize(&x), z);
    }

    #[test]
    fn half_plane_metric_scales_with_height() {
        let g = metric_f64(&HyperbolicHalfPlane, &[3.0, 0.5]);
        assert_eq!(g, vec![4.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn builtin_dispatch_preserves_capabilities() {
        let sphere = BuiltinManifold::Sphere(Sphere::new(3));
        assert_eq!(sphere.dimension(), 3);
        assert!(sphere.reference().is_some());
        assert!(sphere.chart().is_some());

        let h2 = BuiltinManifold::H2(HyperbolicHalfPlane);
        assert_eq!(h2.name(), "H2");
        assert!(h2.reference().is_none());
    }
}
