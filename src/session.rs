use crate::error::KalmanResult;
use crate::filters::kalman::KalmanFilter;
use crate::models::{DynamicModel, LinearDynamic, LinearObservation, ObservationModel};
use crate::state::State;
use crate::types::{Observation, Vector};

/// Running filter over one observation stream
///
/// Holds the last corrected State so callers can feed observations one at a
/// time. A session is owned by its caller; independent streams use
/// independent sessions and share nothing.
#[derive(Clone, Debug)]
pub struct KalmanSession<D = LinearDynamic, O = LinearObservation> {
    filter: KalmanFilter<D, O>,
    last_corrected: Option<State>,
    step_count: u64,
}

impl<D: DynamicModel, O: ObservationModel> KalmanSession<D, O> {
    /// Create new session starting from the filter's initial State
    pub fn new(filter: KalmanFilter<D, O>) -> Self {
        KalmanSession {
            filter,
            last_corrected: None,
            step_count: 0,
        }
    }

    /// Predict from the last corrected State, then correct with `observation`
    ///
    /// The session only advances on success; on error the last corrected
    /// State is left untouched.
    pub fn filter(&mut self, observation: impl Into<Observation>) -> KalmanResult<State> {
        let predicted = self.filter.predict(self.last_corrected.as_ref())?;
        let corrected = self.filter.correct(&predicted, observation)?;

        self.step_count += 1;
        log::debug!(
            "Session step {}: index={:?}",
            self.step_count,
            corrected.index
        );

        self.last_corrected = Some(corrected.clone());
        Ok(corrected)
    }

    /// Filter observations in order, one corrected State per observation
    ///
    /// Stops at the first failing observation; the session then holds the
    /// State corrected by the observation before it.
    pub fn filter_all<I, T>(&mut self, observations: I) -> KalmanResult<Vec<State>>
    where
        I: IntoIterator<Item = T>,
        T: Into<Observation>,
    {
        observations
            .into_iter()
            .map(|observation| self.filter(observation))
            .collect()
    }

    /// Same as `filter_all`, keeping only the corrected means
    pub fn filter_all_means<I, T>(&mut self, observations: I) -> KalmanResult<Vec<Vector>>
    where
        I: IntoIterator<Item = T>,
        T: Into<Observation>,
    {
        Ok(self
            .filter_all(observations)?
            .into_iter()
            .map(|state| state.mean)
            .collect())
    }

    pub fn last_corrected(&self) -> Option<&State> {
        self.last_corrected.as_ref()
    }

    pub fn kalman_filter(&self) -> &KalmanFilter<D, O> {
        &self.filter
    }

    /// Number of observations fused since creation or the last reset
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Forget the running estimate; the next step starts from the initial State
    pub fn reset(&mut self) {
        self.last_corrected = None;
        self.step_count = 0;
    }
}
