//! Zermelo navigation: a Riemannian metric `h`, a drift `W` and a nominal speed `v0` induce the
//! Randers metric
//!
//! ```text
//! F(z, v) = sqrt(vᵀ a(z) v) + b(z)ᵀ v
//! a = h̃ / λ + w wᵀ / λ²,   b = -w / λ,
//! h̃ = h / v0²,   w = h̃ W,   λ = 1 - Wᵀ h̃ W
//! ```
//!
//! `F(z, v)` is the travel time along `v` when the medium moves with velocity `W`. The metric is
//! only defined while the drift is slower than the nominal speed (`λ > 0`).

use crate::autodiff::{gradient, lift, Dual};
use crate::error::{GeodesicError, Result};
use crate::metric::MetricProvider;
use crate::traits::{Chart, DriftField, MetricField, ReferenceGeodesic, Scalar};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NavigationSettings {
    /// Nominal travel speed `v0` relative to the medium.
    pub speed: f64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self { speed: 1.5 }
    }
}

impl NavigationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(GeodesicError::InvalidConfig(format!(
                "navigation speed must be positive and finite, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// Randers coefficients at a point.
struct Randers<T> {
    /// Row-major `a(z)`.
    a: Vec<T>,
    b: Vec<T>,
}

impl<T: Scalar> Randers<T> {
    fn alpha_beta(&self, v: &[T]) -> (T, T) {
        let n = v.len();
        let mut quad = T::zero();
        let mut beta = T::zero();
        for i in 0..n {
            beta = beta + self.b[i] * v[i];
            for j in 0..n {
                quad = quad + v[i] * self.a[i * n + j] * v[j];
            }
        }
        (quad.sqrt(), beta)
    }
}

/// Randers metric obtained by navigating a Riemannian metric under a drift.
#[derive(Debug, Clone)]
pub struct Navigation<M, W> {
    base: M,
    drift: W,
    speed: f64,
}

impl<M, W> Navigation<M, W>
where
    M: MetricField<f64> + MetricField<Dual>,
    W: DriftField<f64> + DriftField<Dual>,
{
    pub fn new(base: M, drift: W, settings: NavigationSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            base,
            drift,
            speed: settings.speed,
        })
    }

    pub fn base(&self) -> &M {
        &self.base
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    fn randers<T>(&self, z: &[T]) -> Result<Randers<T>>
    where
        T: Scalar,
        M: MetricField<T>,
        W: DriftField<T>,
    {
        let n = self.base.dimension();
        let mut h = vec![T::zero(); n * n];
        <M as MetricField<T>>::metric(&self.base, z, &mut h);
        let mut wind = vec![T::zero(); n];
        <W as DriftField<T>>::drift(&self.drift, z, &mut wind);

        let inv_speed_sq = T::lit(1.0 / (self.speed * self.speed));
        for entry in h.iter_mut() {
            *entry = *entry * inv_speed_sq;
        }

        let mut w = vec![T::zero(); n];
        for i in 0..n {
            for j in 0..n {
                w[i] = w[i] + h[i * n + j] * wind[j];
            }
        }
        let wind_sq = (0..n).fold(T::zero(), |acc, i| acc + w[i] * wind[i]);
        let lambda = T::one() - wind_sq;
        let lambda_val = lambda.to_f64().unwrap_or(f64::NAN);
        if !(lambda_val > 0.0) {
            return Err(GeodesicError::MetricEvaluation(format!(
                "drift is not slower than the nominal speed {} (1 - |W|²/v0² = {})",
                self.speed, lambda_val
            )));
        }

        let lambda_sq = lambda * lambda;
        let mut a = vec![T::zero(); n * n];
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = h[i * n + j] / lambda + w[i] * w[j] / lambda_sq;
            }
        }
        let b = w.iter().map(|&wi| -wi / lambda).collect();
        Ok(Randers { a, b })
    }

    fn coefficients(&self, z: &DVector<f64>) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let n = self.base.dimension();
        let randers = self.randers::<f64>(z.as_slice())?;
        if randers.a.iter().chain(&randers.b).any(|v| !v.is_finite()) {
            return Err(GeodesicError::MetricEvaluation(format!(
                "non-finite Randers coefficients at {:?}",
                z.as_slice()
            )));
        }
        Ok((
            DMatrix::from_row_slice(n, n, &randers.a),
            DVector::from_vec(randers.b),
        ))
    }

    /// Randers norm `F(z, v)`.
    pub fn norm(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<f64> {
        let randers = self.randers::<f64>(z.as_slice())?;
        let (alpha, beta) = randers.alpha_beta(v.as_slice());
        Ok(alpha + beta)
    }
}

impl<M, W> MetricProvider for Navigation<M, W>
where
    M: MetricField<f64> + MetricField<Dual>,
    W: DriftField<f64> + DriftField<Dual>,
{
    fn dimension(&self) -> usize {
        self.base.dimension()
    }

    fn squared_norm(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<f64> {
        let f = self.norm(z, v)?;
        Ok(f * f)
    }

    fn squared_norm_gradients(
        &self,
        z: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>)> {
        let n = z.len();
        let (a, b) = self.coefficients(z)?;
        let av = &a * v;
        let alpha = v.dot(&av).sqrt();
        // F² vanishes identically along v = 0, and so do both gradients.
        if alpha == 0.0 {
            return Ok((DVector::zeros(n), DVector::zeros(n)));
        }
        let f = alpha + b.dot(v);
        let grad_v = (av / alpha + b) * (2.0 * f);

        let dual_v: Vec<Dual> = lift(v.as_slice());
        let grad_z = gradient(z.as_slice(), |dual_z| {
            let randers = self.randers::<Dual>(dual_z)?;
            let (alpha, beta) = randers.alpha_beta(&dual_v);
            let f = alpha + beta;
            Ok::<_, GeodesicError>(f * f)
        })?;

        Ok((DVector::from_vec(grad_z), grad_v))
    }

    fn fundamental_tensor(&self, z: &DVector<f64>, v: &DVector<f64>) -> Result<DMatrix<f64>> {
        let (a, b) = self.coefficients(z)?;
        let av = &a * v;
        let alpha = v.dot(&av).sqrt();
        if alpha == 0.0 {
            trace!("fundamental tensor requested at zero displacement; using Riemannian part");
            return Ok(a);
        }
        let f = alpha + b.dot(v);
        let l = av / alpha;
        let lb = &l + &b;
        let g = (&a - &l * l.transpose()) * (f / alpha) + &lb * lb.transpose();
        Ok((&g + g.transpose()) * 0.5)
    }

    fn reference(&self) -> Option<&dyn ReferenceGeodesic> {
        None
    }

    fn chart(&self) -> Option<&dyn Chart> {
        self.base.chart()
    }
}

/// Spatially constant drift.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDrift {
    velocity: Vec<f64>,
}

impl ConstantDrift {
    pub fn new(velocity: Vec<f64>) -> Self {
        Self { velocity }
    }
}

impl<T: Scalar> DriftField<T> for ConstantDrift {
    fn drift(&self, _z: &[T], out: &mut [T]) {
        for (o, &v) in out.iter_mut().zip(&self.velocity) {
            *o = T::lit(v);
        }
    }
}

/// Benchmark drift `W(z) = sin(z) ⊙ cos(z) / |cos(z)|_G`, normalized by the base metric.
#[derive(Debug, Clone, PartialEq)]
pub struct TrigonometricDrift<M> {
    base: M,
}

impl<M> TrigonometricDrift<M> {
    pub fn new(base: M) -> Self {
        Self { base }
    }
}

impl<T: Scalar, M: MetricField<T>> DriftField<T> for TrigonometricDrift<M> {
    fn drift(&self, z: &[T], out: &mut [T]) {
        let n = self.base.dimension();
        let mut g = vec![T::zero(); n * n];
        self.base.metric(z, &mut g);
        let cos: Vec<T> = z.iter().map(|v| v.cos()).collect();
        let mut quad = T::zero();
        for i in 0..n {
            for j in 0..n {
                quad = quad + cos[i] * g[i * n + j] * cos[j];
            }
        }
        let norm = quad.sqrt();
        for i in 0..n {
            out[i] = z[i].sin() * cos[i] / norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifolds::{Euclidean, Sphere};

    fn euclidean_with_drift(drift: Vec<f64>, speed: f64) -> Navigation<Euclidean, ConstantDrift> {
        Navigation::new(
            Euclidean::new(drift.len()),
            ConstantDrift::new(drift),
            NavigationSettings { speed },
        )
        .expect("navigation")
    }

    #[test]
    fn zero_drift_rescales_riemannian_norm_by_speed() {
        let nav = euclidean_with_drift(vec![0.0, 0.0], 2.0);
        let z = DVector::zeros(2);
        let v = DVector::from_vec(vec![3.0, 4.0]);
        assert!((nav.norm(&z, &v).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn travel_time_is_shorter_downstream() {
        let nav = euclidean_with_drift(vec![0.5, 0.0], 1.0);
        let z = DVector::zeros(2);
        let downstream = DVector::from_vec(vec![1.0, 0.0]);
        let upstream = -downstream.clone();
        // Effective speeds are 1.5 downstream and 0.5 upstream.
        assert!((nav.norm(&z, &downstream).unwrap() - 1.0 / 1.5).abs() < 1e-12);
        assert!((nav.norm(&z, &upstream).unwrap() - 1.0 / 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_drift_faster_than_speed() {
        let nav = euclidean_with_drift(vec![2.0, 0.0], 1.0);
        let err = nav
            .squared_norm(&DVector::zeros(2), &DVector::from_vec(vec![1.0, 0.0]))
            .expect_err("infeasible drift");
        assert!(matches!(err, GeodesicError::MetricEvaluation(_)));
    }

    #[test]
    fn rejects_non_positive_speed() {
        let err = Navigation::new(
            Euclidean::new(2),
            ConstantDrift::new(vec![0.0, 0.0]),
            NavigationSettings { speed: 0.0 },
        )
        .expect_err("invalid speed");
        assert!(matches!(err, GeodesicError::InvalidConfig(_)));
    }

    #[test]
    fn fundamental_tensor_reproduces_squared_norm() {
        let sphere = Sphere::new(2);
        let nav = Navigation::new(
            sphere,
            TrigonometricDrift::new(sphere),
            NavigationSettings::default(),
        )
        .expect("navigation");
        let z = DVector::from_vec(vec![0.4, -0.3]);
        let v = DVector::from_vec(vec![0.2, 0.7]);
        let g = nav.fundamental_tensor(&z, &v).unwrap();
        let quad = v.dot(&(&g * &v));
        let f2 = nav.squared_norm(&z, &v).unwrap();
        assert!((quad - f2).abs() < 1e-10);
        assert!(g.clone().cholesky().is_some(), "tensor should be positive definite");
    }

    #[test]
    fn gradients_match_finite_differences() {
        let sphere = Sphere::new(2);
        let nav = Navigation::new(
            sphere,
            TrigonometricDrift::new(sphere),
            NavigationSettings::default(),
        )
        .expect("navigation");
        let z = DVector::from_vec(vec![0.4, -0.3]);
        let v = DVector::from_vec(vec![0.2, 0.7]);
        let (grad_z, grad_v) = nav.squared_norm_gradients(&z, &v).unwrap();
        let h = 1e-6;
        for k in 0..2 {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[k] += h;
            zm[k] -= h;
            let fd = (nav.squared_norm(&zp, &v).unwrap() - nav.squared_norm(&zm, &v).unwrap())
                / (2.0 * h);
            assert!((fd - grad_z[k]).abs() < 1e-6);

            let mut vp = v.clone();
            let mut vm = v.clone();
            vp[k] += h;
            vm[k] -= h;
            let fd = (nav.squared_norm(&z, &vp).unwrap() - nav.squared_norm(&z, &vm).unwrap())
                / (2.0 * h);
            assert!((fd - grad_v[k]).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_displacement_has_zero_gradients() {
        let nav = euclidean_with_drift(vec![0.3, 0.1], 1.5);
        let (gz, gv) = nav
            .squared_norm_gradients(&DVector::zeros(2), &DVector::zeros(2))
            .unwrap();
        assert_eq!(gz.norm(), 0.0);
        assert_eq!(gv.norm(), 0.0);
    }
}
