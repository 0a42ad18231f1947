//! Process and measurement models
//!
//! The recursion only talks to models through the two traits below. Both
//! receive the State they are applied to, which is the hook needed for
//! index- or state-dependent (linearised) models. The linear models in this
//! crate ignore it.

pub mod dynamic;
pub mod observation;

pub use dynamic::LinearDynamic;
pub use observation::LinearObservation;

use crate::state::State;
use crate::types::Matrix;

pub trait DynamicModel {
    /// State dimension n
    fn dimension(&self) -> usize;

    /// Time step used when the caller does not supply one
    fn time_step(&self) -> f64;

    /// Transition matrix F [n x n] applied to `previous`
    fn transition(&self, previous: &State, time_step: f64) -> Matrix;

    /// Process noise Q [n x n] added when predicting from `previous`
    fn process_noise(&self, previous: &State) -> Matrix;
}

pub trait ObservationModel {
    /// Observation dimension m
    fn dimension(&self) -> usize;

    /// Projection H [m x n] applied to `predicted`
    fn projection(&self, predicted: &State) -> Matrix;

    /// Measurement noise R [m x m]
    fn noise(&self, predicted: &State) -> Matrix;
}
