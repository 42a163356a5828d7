//! Error types shared by every solver.
//!
//! Running out of iterations is not an error: it is reported through
//! [`SolveStatus`](crate::solver::SolveStatus) on the result.

use thiserror::Error;

/// Errors raised while configuring or running a geodesic solver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeodesicError {
    /// Settings rejected at construction time. Values are never clamped.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A point or curve has the wrong number of coordinates.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The structured linear system of an update could not be solved.
    #[error("Solver failure at iteration {iteration}: {reason}")]
    SolverFailure { iteration: usize, reason: String },

    /// The metric could not be evaluated (non-finite values, infeasible drift, ...).
    #[error("Metric evaluation failed: {0}")]
    MetricEvaluation(String),

    /// An unknown identifier was passed to the loading layer.
    #[error("Unsupported {kind} selector \"{name}\"; supported: {supported}")]
    UnsupportedSelector {
        kind: &'static str,
        name: String,
        supported: String,
    },
}

impl GeodesicError {
    pub(crate) fn unsupported(kind: &'static str, name: &str, supported: &[&str]) -> Self {
        Self::UnsupportedSelector {
            kind,
            name: name.to_string(),
            supported: supported.join(", "),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeodesicError>;
