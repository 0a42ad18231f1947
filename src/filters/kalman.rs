//! Linear Kalman recursion
//!
//! predict:  x' = F·x            P' = F·P·Fᵗ + Q
//! correct:  y  = z − H·x        S  = H·P·Hᵗ + R
//!           K  = P·Hᵗ·S⁻¹
//!           x' = x + K·y        P' = (I − K·H)·P
//!
//! Every step takes States by reference and returns a new State. The filter
//! itself holds no running estimate; see `KalmanSession` for that.

use crate::config::KalmanConfig;
use crate::error::{KalmanError, KalmanResult};
use crate::models::{DynamicModel, LinearDynamic, LinearObservation, ObservationModel};
use crate::state::State;
use crate::types::{
    add, contains_non_finite, invert, multiply, multiply_vector, subtract, subtract_vector,
    transpose, Matrix, Observation,
};

/// Covariance scale of the default initial State
pub const DIFFUSE_COVARIANCE: f64 = 1e6;

/// Index of the default initial State, so the first prediction has index 0
pub const INITIAL_INDEX: i64 = -1;

#[derive(Clone, Debug)]
pub struct KalmanFilter<D = LinearDynamic, O = LinearObservation> {
    dynamic: D,
    observation: O,

    /// Belief used when predicting without a previous corrected State
    init: State,
}

impl KalmanFilter {
    /// Build the linear models from configuration
    ///
    /// The dynamic presets are sized from the observation's sensor dimension,
    /// then the observation projection is sized from the dynamic dimension.
    pub fn from_config(config: &KalmanConfig) -> KalmanResult<Self> {
        let dynamic =
            LinearDynamic::from_config(&config.dynamic, config.observation.sensor_dimension())?;
        let observation = LinearObservation::from_config(&config.observation, dynamic.dimension())?;
        Self::new(dynamic, observation, config.init.clone())
    }
}

impl<D: DynamicModel, O: ObservationModel> KalmanFilter<D, O> {
    /// Create a filter from any pair of models
    ///
    /// # Arguments
    /// * `init` - Initial belief; zero mean with `DIFFUSE_COVARIANCE · I` when `None`
    pub fn new(dynamic: D, observation: O, init: Option<State>) -> KalmanResult<Self> {
        let dimension = dynamic.dimension();
        let init = init.unwrap_or_else(|| {
            State::diffuse(dimension, DIFFUSE_COVARIANCE, Some(INITIAL_INDEX))
        });
        init.check(Some(dimension))?;

        Ok(Self {
            dynamic,
            observation,
            init,
        })
    }

    pub fn dynamic(&self) -> &D {
        &self.dynamic
    }

    pub fn observation(&self) -> &O {
        &self.observation
    }

    pub fn initial_state(&self) -> &State {
        &self.init
    }

    /// Predict with the dynamic model's own time step
    pub fn predict(&self, previous: Option<&State>) -> KalmanResult<State> {
        self.predict_with_time_step(previous, self.dynamic.time_step())
    }

    /// Propagate `previous` (or the initial State) through the dynamic model
    pub fn predict_with_time_step(
        &self,
        previous: Option<&State>,
        time_step: f64,
    ) -> KalmanResult<State> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(KalmanError::Config(format!(
                "time step must be positive and finite, got {time_step}"
            )));
        }
        let previous = previous.unwrap_or(&self.init);
        previous.check(Some(self.dynamic.dimension()))?;

        let f = self.dynamic.transition(previous, time_step);
        let q = self.dynamic.process_noise(previous);

        let mean = multiply_vector(&f, &previous.mean)?;
        let covariance = add(
            &multiply(&multiply(&f, &previous.covariance)?, &transpose(&f))?,
            &q,
        )?;

        log::trace!("predict: index={:?} mean={}", previous.index, mean.transpose());

        finite_state(
            "predict",
            State {
                mean,
                covariance,
                index: previous.index.map(|i| i + 1),
            },
        )
    }

    /// Kalman gain K = P·Hᵗ·S⁻¹ for a predicted State
    pub fn gain(&self, predicted: &State) -> KalmanResult<Matrix> {
        predicted.check(Some(self.dynamic.dimension()))?;
        let h = self.observation.projection(predicted);
        let r = self.observation.noise(predicted);
        gain_from(&predicted.covariance, &h, &r)
    }

    /// Fuse a predicted State with an observation
    ///
    /// Fails with `SingularMatrix` when the innovation covariance cannot be
    /// inverted; the caller decides whether to drop the observation.
    pub fn correct(
        &self,
        predicted: &State,
        observation: impl Into<Observation>,
    ) -> KalmanResult<State> {
        let n = self.dynamic.dimension();
        predicted.check(Some(n))?;

        let h = self.observation.projection(predicted);
        let r = self.observation.noise(predicted);
        let z = observation.into().to_column(self.observation.dimension())?;

        let innovation = subtract_vector(&z, &multiply_vector(&h, &predicted.mean)?)?;
        let k = gain_from(&predicted.covariance, &h, &r).map_err(|e| {
            if let KalmanError::SingularMatrix { .. } = e {
                log::warn!(
                    "Innovation covariance is singular at index {:?}, observation not fused",
                    predicted.index
                );
            }
            e
        })?;

        let mean = &predicted.mean + multiply_vector(&k, &innovation)?;
        let identity = Matrix::identity(n, n);
        let covariance = multiply(&subtract(&identity, &multiply(&k, &h)?)?, &predicted.covariance)?;

        log::trace!(
            "correct: index={:?} innovation={} mean={}",
            predicted.index,
            innovation.transpose(),
            mean.transpose()
        );

        finite_state(
            "correct",
            State {
                mean,
                covariance,
                index: predicted.index,
            },
        )
    }

    /// Steady-state covariance of the corrected State
    ///
    /// Iterates the covariance recursion from the initial State until the
    /// Frobenius norm of the change drops below `tolerance`.
    pub fn asymptotic_state_covariance(
        &self,
        limit_iterations: usize,
        tolerance: f64,
    ) -> KalmanResult<Matrix> {
        let mut state = self.init.clone();
        for _ in 0..limit_iterations {
            let predicted = self.predict(Some(&state))?;
            let h = self.observation.projection(&predicted);
            let r = self.observation.noise(&predicted);
            let k = gain_from(&predicted.covariance, &h, &r)?;
            let n = predicted.dimension();
            let covariance = multiply(
                &subtract(&Matrix::identity(n, n), &multiply(&k, &h)?)?,
                &predicted.covariance,
            )?;

            let change = (&covariance - &state.covariance).norm();
            state = State {
                mean: predicted.mean,
                covariance,
                index: predicted.index,
            };
            if change < tolerance {
                return Ok(state.covariance);
            }
        }
        Err(KalmanError::NotConverged {
            iterations: limit_iterations,
        })
    }

    /// Steady-state Kalman gain, computed from the asymptotic covariance
    pub fn asymptotic_gain(&self, limit_iterations: usize, tolerance: f64) -> KalmanResult<Matrix> {
        let covariance = self.asymptotic_state_covariance(limit_iterations, tolerance)?;
        let steady = State {
            mean: self.init.mean.clone(),
            covariance,
            index: self.init.index,
        };
        let predicted = self.predict(Some(&steady))?;
        self.gain(&predicted)
    }
}

fn gain_from(covariance: &Matrix, h: &Matrix, r: &Matrix) -> KalmanResult<Matrix> {
    let h_transpose = transpose(h);
    let s = add(&multiply(&multiply(h, covariance)?, &h_transpose)?, r)?;
    let s_inv = invert(&s)?;
    multiply(&multiply(covariance, &h_transpose)?, &s_inv)
}

/// Reject a State whose entries overflowed to a non-finite value
fn finite_state(step: &str, state: State) -> KalmanResult<State> {
    if contains_non_finite(state.mean.iter()) || contains_non_finite(state.covariance.iter()) {
        log::warn!("{step} produced non-finite values at index {:?}", state.index);
        return Err(KalmanError::Validation(format!(
            "{step} produced a State with non-finite values"
        )));
    }
    Ok(state)
}
