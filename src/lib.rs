//! Linear Kalman filtering over discrete-time observation streams.
//!
//! ```text
//! KalmanConfig ──► LinearDynamic (F, Q) ─┐
//!              └─► LinearObservation (H, R) ─► KalmanFilter ─► KalmanSession
//! ```
//!
//! `KalmanFilter::predict` and `KalmanFilter::correct` are pure functions of
//! their inputs. `KalmanSession` adds the running "last corrected State" for
//! callers that feed one observation at a time.

pub mod config;
pub mod error;
pub mod filters;
pub mod models;
pub mod session;
pub mod state;
pub mod types;

pub use config::{Covariance, DynamicConfig, KalmanConfig, ObservationConfig};
pub use error::{KalmanError, KalmanResult};
pub use filters::KalmanFilter;
pub use models::{DynamicModel, LinearDynamic, LinearObservation, ObservationModel};
pub use session::KalmanSession;
pub use state::{Mahalanobis, State};
pub use types::{Matrix, Observation, Vector};
