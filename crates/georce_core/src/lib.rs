//! The `georce_core` crate is the numerical engine for approximating geodesics between two
//! fixed points on a Riemannian or Finsler (Randers) manifold.
//!
//! Metric fields are written once, generically over a `Scalar` type, so that the same code is
//! evaluated with `f64` for values and with Dual numbers for derivatives.
//!
//! Key components:
//! - **Traits**: `Scalar`, `Manifold`, `MetricField` (metric tensors), `DriftField` (navigation
//!   drift), plus the optional `ReferenceGeodesic` and `Chart` capabilities.
//! - **Metric**: `MetricProvider`, the local-data contract every solver consumes, and the
//!   `Riemannian` adapter.
//! - **Navigation**: Zermelo navigation turning a Riemannian metric and a drift into a Randers
//!   metric.
//! - **Curve**: discretized curves, energy, length and their gradients.
//! - **Line Search**: bounded backtracking ("soft" monotone decrease or Armijo).
//! - **GEORCE**: the closed-form control update solver, with a resumable stepping interface.
//! - **Baselines**: first-order and quasi-Newton/trust-region solvers behind the same contract.
//! - **Manifolds / Loader / Report**: built-in metric families, selector-based problem loading and
//!   method comparison reports.
pub mod autodiff;
pub mod baselines;
pub mod curve;
pub mod error;
pub mod georce;
pub mod line_search;
pub mod loader;
pub mod manifolds;
pub mod metric;
pub mod navigation;
pub mod report;
pub mod solver;
pub mod traits;

pub use curve::{Curve, Initializer};
pub use error::{GeodesicError, Result};
pub use georce::{GeorceSettings, GeorceSolver, GeorceState};
pub use metric::{MetricProvider, Riemannian};
pub use navigation::Navigation;
pub use solver::{GeodesicResult, GeodesicSolver, SolveStatus};
