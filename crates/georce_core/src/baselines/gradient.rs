//! First-order descent on the curve energy with a fixed learning rate.

use super::InteriorObjective;
use crate::curve::{unstack, Initializer};
use crate::error::{GeodesicError, Result};
use crate::metric::MetricProvider;
use crate::solver::{
    finish, validate_common, validate_endpoints, GeodesicResult, GeodesicSolver, SolveStatus,
};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FirstOrderMethod {
    Sgd,
    Momentum { beta: f64 },
    Adam { beta1: f64, beta2: f64, epsilon: f64 },
}

impl FirstOrderMethod {
    pub fn adam() -> Self {
        FirstOrderMethod::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FirstOrderMethod::Sgd => "SGD",
            FirstOrderMethod::Momentum { .. } => "Momentum",
            FirstOrderMethod::Adam { .. } => "Adam",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientSettings {
    pub steps: usize,
    pub tol: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub method: FirstOrderMethod,
}

impl Default for GradientSettings {
    fn default() -> Self {
        Self {
            steps: 100,
            tol: 1e-4,
            max_iter: 1000,
            learning_rate: 0.01,
            method: FirstOrderMethod::adam(),
        }
    }
}

impl GradientSettings {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.steps, self.tol, self.max_iter)?;
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(GeodesicError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        match self.method {
            FirstOrderMethod::Sgd => {}
            FirstOrderMethod::Momentum { beta } => check_unit("beta", beta)?,
            FirstOrderMethod::Adam {
                beta1,
                beta2,
                epsilon,
            } => {
                check_unit("beta1", beta1)?;
                check_unit("beta2", beta2)?;
                if epsilon.is_nan() || epsilon <= 0.0 {
                    return Err(GeodesicError::InvalidConfig(
                        "epsilon must be positive".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(GeodesicError::InvalidConfig(format!(
            "{name} must lie in [0, 1), got {value}"
        )))
    }
}

/// Per-method optimizer memory.
enum Moments {
    None,
    Velocity(DVector<f64>),
    Adam { m: DVector<f64>, v: DVector<f64> },
}

#[derive(Debug, Clone)]
pub struct GradientSolver {
    settings: GradientSettings,
    initializer: Initializer,
}

impl GradientSolver {
    pub fn new(settings: GradientSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            initializer: Initializer::Linear,
        })
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn settings(&self) -> &GradientSettings {
        &self.settings
    }

    pub fn run<P: MetricProvider + ?Sized>(
        &self,
        provider: &P,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeodesicResult> {
        validate_endpoints(provider, z0, z_t)?;
        let settings = &self.settings;
        let template = self.initializer.initialize(z0, z_t, settings.steps)?;
        let objective = InteriorObjective::new(provider, template);
        let dim = objective.dimension();

        let mut x = objective.initial_point();
        let mut grad = objective.gradient(&x, 0)?;
        let mut moments = match settings.method {
            FirstOrderMethod::Sgd => Moments::None,
            FirstOrderMethod::Momentum { .. } => Moments::Velocity(DVector::zeros(x.len())),
            FirstOrderMethod::Adam { .. } => Moments::Adam {
                m: DVector::zeros(x.len()),
                v: DVector::zeros(x.len()),
            },
        };

        let mut iterations = 0;
        let mut status = SolveStatus::MaxIterations;
        if grad.norm() < settings.tol {
            status = SolveStatus::Converged;
        } else {
            for k in 1..=settings.max_iter {
                let update = match (&mut moments, settings.method) {
                    (Moments::Velocity(velocity), FirstOrderMethod::Momentum { beta }) => {
                        *velocity = &*velocity * beta + &grad;
                        velocity.clone()
                    }
                    (
                        Moments::Adam { m, v },
                        FirstOrderMethod::Adam {
                            beta1,
                            beta2,
                            epsilon,
                        },
                    ) => {
                        *m = &*m * beta1 + &grad * (1.0 - beta1);
                        *v = &*v * beta2 + grad.component_mul(&grad) * (1.0 - beta2);
                        let m_hat = &*m / (1.0 - beta1.powi(k as i32));
                        let v_hat = &*v / (1.0 - beta2.powi(k as i32));
                        m_hat.zip_map(&v_hat, |mi, vi| mi / (vi.sqrt() + epsilon))
                    }
                    _ => grad.clone(),
                };
                x -= update * settings.learning_rate;
                grad = objective.gradient(&x, k)?;
                iterations = k;

                let grad_norm = grad.norm();
                if k % 100 == 0 {
                    debug!(
                        method = settings.method.name(),
                        iteration = k,
                        grad_norm,
                        "descent progress"
                    );
                }
                if grad_norm < settings.tol {
                    status = SolveStatus::Converged;
                    break;
                }
            }
            if status == SolveStatus::MaxIterations {
                warn!(
                    method = settings.method.name(),
                    max_iter = settings.max_iter,
                    grad_norm = grad.norm(),
                    "descent stopped at the iteration cap"
                );
            }
        }

        let curve = objective.curve(&x)?;
        finish(
            settings.method.name(),
            provider,
            curve,
            &unstack(&grad, dim),
            iterations,
            status,
        )
    }
}

impl GeodesicSolver for GradientSolver {
    fn name(&self) -> &str {
        self.settings.method.name()
    }

    fn solve(
        &self,
        provider: &dyn MetricProvider,
        z0: &DVector<f64>,
        z_t: &DVector<f64>,
    ) -> Result<GeodesicResult> {
        self.run(provider, z0, z_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::georce::{GeorceSettings, GeorceSolver};
    use crate::manifolds::{Euclidean, Sphere};
    use crate::metric::Riemannian;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    fn sphere_problem() -> (Riemannian<Sphere>, DVector<f64>, DVector<f64>) {
        (Riemannian::new(Sphere::new(2)), v(&[-0.6, -0.2]), v(&[0.4, 0.7]))
    }

    fn georce_length(provider: &Riemannian<Sphere>, z0: &DVector<f64>, z_t: &DVector<f64>) -> f64 {
        GeorceSolver::new(GeorceSettings {
            steps: 20,
            ..GeorceSettings::default()
        })
        .unwrap()
        .run(provider, z0, z_t)
        .unwrap()
        .length
    }

    #[test]
    fn adam_agrees_with_georce() {
        let (provider, z0, z_t) = sphere_problem();
        let adam = GradientSolver::new(GradientSettings {
            steps: 20,
            ..GradientSettings::default()
        })
        .unwrap();
        let result = adam.run(&provider, &z0, &z_t).expect("adam");
        assert_eq!(result.status, SolveStatus::Converged);
        assert!(result.grad_norm < 1e-4);
        assert!((result.length - georce_length(&provider, &z0, &z_t)).abs() < 1e-4);
    }

    #[test]
    fn sgd_and_momentum_agree_with_georce() {
        let (provider, z0, z_t) = sphere_problem();
        let reference = georce_length(&provider, &z0, &z_t);
        for (method, learning_rate) in [
            (FirstOrderMethod::Sgd, 0.05),
            (FirstOrderMethod::Momentum { beta: 0.9 }, 0.01),
        ] {
            let solver = GradientSolver::new(GradientSettings {
                steps: 20,
                max_iter: 5000,
                learning_rate,
                method,
                ..GradientSettings::default()
            })
            .unwrap();
            let result = solver.run(&provider, &z0, &z_t).expect("descent");
            assert_eq!(result.status, SolveStatus::Converged, "{}", method.name());
            assert!((result.length - reference).abs() < 1e-4, "{}", method.name());
        }
    }

    #[test]
    fn cap_is_reported_with_final_gradient() {
        let (provider, z0, z_t) = sphere_problem();
        let solver = GradientSolver::new(GradientSettings {
            steps: 20,
            max_iter: 3,
            method: FirstOrderMethod::Sgd,
            ..GradientSettings::default()
        })
        .unwrap();
        let result = solver.run(&provider, &z0, &z_t).unwrap();
        assert_eq!(result.status, SolveStatus::MaxIterations);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.gradient.len(), 19);
        assert!(result.grad_norm > 1e-4);
    }

    #[test]
    fn degenerate_problem_needs_no_iterations() {
        let provider = Riemannian::new(Euclidean::new(3));
        let z = v(&[1.0, 2.0, 3.0]);
        let result = GradientSolver::new(GradientSettings::default())
            .unwrap()
            .run(&provider, &z, &z)
            .unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.length, 0.0);
        assert_eq!(result.status, SolveStatus::Converged);
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        let zero_lr = GradientSettings {
            learning_rate: 0.0,
            ..GradientSettings::default()
        };
        assert!(GradientSolver::new(zero_lr)
            .unwrap_err()
            .to_string()
            .contains("learning_rate"));

        let bad_beta = GradientSettings {
            method: FirstOrderMethod::Momentum { beta: 1.0 },
            ..GradientSettings::default()
        };
        assert!(GradientSolver::new(bad_beta).unwrap_err().to_string().contains("beta"));
    }
}
