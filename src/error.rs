use thiserror::Error;

/// Kalman filter error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KalmanError {
    /// Malformed State: non-finite entries or inconsistent mean/covariance shapes
    #[error("Invalid state: {0}")]
    Validation(String),

    /// Inconsistent or incomplete dynamic/observation model configuration
    #[error("Invalid model configuration: {0}")]
    Config(String),

    #[error("{context} has dimension {actual}, expected {expected}")]
    Dimension {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Matrix of size {size}x{size} is singular")]
    SingularMatrix { size: usize },

    #[error("Incompatible shapes for {operation}: {left:?} and {right:?}")]
    Shape {
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("State covariance did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
}

/// Result type for filter operations
pub type KalmanResult<T> = Result<T, KalmanError>;
