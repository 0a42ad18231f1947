//! Gaussian belief over the tracked state
//!
//! A `State` is a value: predict and correct always build a new one and never
//! touch the previous State.

use serde::{Deserialize, Serialize};

use crate::error::{KalmanError, KalmanResult};
use crate::filters::kalman::KalmanFilter;
use crate::models::{DynamicModel, ObservationModel};
use crate::types::{
    contains_non_finite, from_rows, invert, multiply, multiply_vector, select_block,
    subtract_vector, to_rows, transpose, Matrix, Observation, Vector,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateRepr", into = "StateRepr")]
pub struct State {
    /// Mean of the state [n]
    pub mean: Vector,

    /// Estimation uncertainty [n x n]
    pub covariance: Matrix,

    /// Position of the State in the sequence. Not needed for plain linear
    /// filtering, used by index-dependent models.
    pub index: Option<i64>,
}

/// Outcome of a Mahalanobis computation in observation space
#[derive(Clone, Debug, PartialEq)]
pub struct Mahalanobis {
    /// `H·mean − observation`, restricted to the selected indexes
    pub diff: Vector,

    /// Inverse of `H·P·Hᵗ`, restricted to the selected indexes
    pub covariance_invert: Matrix,

    /// `sqrt(diffᵗ · covariance_invert · diff)`
    pub value: f64,
}

impl State {
    /// Build a State and validate it
    pub fn new(mean: Vector, covariance: Matrix, index: Option<i64>) -> KalmanResult<Self> {
        let state = Self {
            mean,
            covariance,
            index,
        };
        state.check(None)?;
        Ok(state)
    }

    /// Build a State from a flat mean and row-major covariance rows
    pub fn from_rows(
        mean: &[f64],
        covariance: &[Vec<f64>],
        index: Option<i64>,
    ) -> KalmanResult<Self> {
        let covariance = from_rows(covariance).ok_or_else(|| {
            KalmanError::Validation("covariance rows have inconsistent lengths".to_string())
        })?;
        Self::new(Vector::from_column_slice(mean), covariance, index)
    }

    /// Zero mean with a diffuse `scale · I` covariance
    pub fn diffuse(dimension: usize, scale: f64, index: Option<i64>) -> Self {
        Self {
            mean: Vector::zeros(dimension),
            covariance: Matrix::identity(dimension, dimension) * scale,
            index,
        }
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Check the consistency of the State
    ///
    /// * `expected_dimension` - when given, the mean must have exactly this length
    pub fn check(&self, expected_dimension: Option<usize>) -> KalmanResult<()> {
        let dimension = self.mean.len();
        if let Some(expected) = expected_dimension {
            if dimension != expected {
                return Err(KalmanError::Dimension {
                    context: "state mean",
                    expected,
                    actual: dimension,
                });
            }
        }

        if contains_non_finite(self.mean.iter()) {
            return Err(KalmanError::Validation(
                "mean should only contain finite values".to_string(),
            ));
        }
        if contains_non_finite(self.covariance.iter()) {
            return Err(KalmanError::Validation(
                "covariance should only contain finite values".to_string(),
            ));
        }
        if self.covariance.shape() != (dimension, dimension) {
            return Err(KalmanError::Validation(format!(
                "covariance shape {:?} does not match mean dimension {}",
                self.covariance.shape(),
                dimension
            )));
        }
        Ok(())
    }

    /// Mahalanobis distance between the projected State and an observation,
    /// with the intermediate diff and inverted covariance
    ///
    /// The covariance is the projected state covariance `H·P·Hᵗ` only; the
    /// measurement noise of the observation model is not added.
    ///
    /// * `selected_indexes` - observation-space indexes to keep, for partial observations
    pub fn detailed_mahalanobis<D, O>(
        &self,
        filter: &KalmanFilter<D, O>,
        observation: impl Into<Observation>,
        selected_indexes: Option<&[usize]>,
    ) -> KalmanResult<Mahalanobis>
    where
        D: DynamicModel,
        O: ObservationModel,
    {
        let projection = filter.observation().projection(self);
        self.check(Some(projection.ncols()))?;

        let observation = observation.into().to_column(projection.nrows())?;
        let diff = subtract_vector(&multiply_vector(&projection, &self.mean)?, &observation)?;
        let covariance_in_observation_space = multiply(
            &multiply(&projection, &self.covariance)?,
            &transpose(&projection),
        )?;

        let (diff, covariance) = match selected_indexes {
            Some(indexes) => {
                if let Some(&bad) = indexes.iter().find(|&&i| i >= diff.len()) {
                    return Err(KalmanError::Validation(format!(
                        "selected index {} out of range for observation dimension {}",
                        bad,
                        diff.len()
                    )));
                }
                (
                    diff.select_rows(indexes),
                    select_block(&covariance_in_observation_space, indexes),
                )
            }
            None => (diff, covariance_in_observation_space),
        };

        let covariance_invert = invert(&covariance).map_err(|e| {
            log::warn!("Projected covariance is singular, Mahalanobis distance undefined");
            e
        })?;
        let quadratic = diff.dot(&(&covariance_invert * &diff));

        Ok(Mahalanobis {
            diff,
            covariance_invert,
            value: quadratic.max(0.0).sqrt(),
        })
    }

    /// Mahalanobis distance between the projected State and an observation
    pub fn mahalanobis<D, O>(
        &self,
        filter: &KalmanFilter<D, O>,
        observation: impl Into<Observation>,
        selected_indexes: Option<&[usize]>,
    ) -> KalmanResult<f64>
    where
        D: DynamicModel,
        O: ObservationModel,
    {
        Ok(self
            .detailed_mahalanobis(filter, observation, selected_indexes)?
            .value)
    }
}

/// Serialized form: flat mean, row-major covariance
#[derive(Serialize, Deserialize)]
struct StateRepr {
    mean: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<i64>,
}

impl TryFrom<StateRepr> for State {
    type Error = KalmanError;

    fn try_from(repr: StateRepr) -> Result<Self, Self::Error> {
        State::from_rows(&repr.mean, &repr.covariance, repr.index)
    }
}

impl From<State> for StateRepr {
    fn from(state: State) -> Self {
        StateRepr {
            mean: state.mean.iter().copied().collect(),
            covariance: to_rows(&state.covariance),
            index: state.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KalmanConfig;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn constant_position_2d() -> KalmanFilter {
        let config: KalmanConfig = serde_json::from_value(json!({
            "observation": { "name": "sensors", "sensorDimension": 2 },
            "dynamic": { "name": "constant-position", "covariance": [3, 4] }
        }))
        .unwrap();
        KalmanFilter::from_config(&config).unwrap()
    }

    fn state_2d() -> State {
        State::from_rows(
            &[100.0, 100.0],
            &[vec![1.0, 0.0], vec![0.0, 4.0]],
            Some(0),
        )
        .unwrap()
    }

    #[test]
    fn test_check_valid() {
        let state = state_2d();
        assert!(state.check(None).is_ok());
        assert!(state.check(Some(2)).is_ok());
    }

    #[test]
    fn test_check_dimension_mismatch() {
        let state = state_2d();
        assert_eq!(
            state.check(Some(4)),
            Err(KalmanError::Dimension { context: "state mean", expected: 4, actual: 2 })
        );
    }

    #[test]
    fn test_check_nan() {
        let mut state = state_2d();
        state.covariance[(0, 1)] = f64::NAN;
        assert!(matches!(state.check(None), Err(KalmanError::Validation(_))));

        let mut state = state_2d();
        state.mean[0] = f64::NAN;
        assert!(matches!(state.check(None), Err(KalmanError::Validation(_))));
    }

    #[test]
    fn test_check_infinite() {
        let mut state = state_2d();
        state.covariance[(1, 1)] = f64::INFINITY;
        assert!(matches!(state.check(None), Err(KalmanError::Validation(_))));

        let mut state = state_2d();
        state.mean[1] = f64::NEG_INFINITY;
        assert!(matches!(state.check(Some(2)), Err(KalmanError::Validation(_))));
    }

    #[test]
    fn test_check_non_square_covariance() {
        let state = State {
            mean: Vector::zeros(2),
            covariance: Matrix::zeros(2, 3),
            index: None,
        };
        assert!(matches!(state.check(None), Err(KalmanError::Validation(_))));
    }

    #[test]
    fn test_new_rejects_ragged_covariance() {
        let err = State::from_rows(&[0.0, 0.0], &[vec![1.0, 0.0], vec![1.0]], None).unwrap_err();
        assert!(matches!(err, KalmanError::Validation(_)));
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = json!({ "mean": [1.0, 2.0], "covariance": [[1.0]] });
        assert!(serde_json::from_value::<State>(bad).is_err());

        let good = json!({ "mean": [1.0], "covariance": [[2.0]], "index": 3 });
        let state: State = serde_json::from_value(good).unwrap();
        assert_eq!(state.index, Some(3));
        assert_eq!(state.covariance[(0, 0)], 2.0);
    }

    #[test]
    fn test_mahalanobis_zero_on_exact_projection() {
        let kf = constant_position_2d();
        let state = state_2d();
        let distance = state.mahalanobis(&kf, [100.0, 100.0], None).unwrap();
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_mahalanobis_value() {
        let kf = constant_position_2d();
        let state = state_2d();
        // diff = [-3, -4], S = diag(1, 4) → 9 + 4 = 13
        let detail = state.detailed_mahalanobis(&kf, [103.0, 104.0], None).unwrap();
        assert_relative_eq!(detail.value, 13.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(detail.diff, Vector::from_vec(vec![-3.0, -4.0]));
        assert_relative_eq!(detail.covariance_invert[(1, 1)], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_mahalanobis_selected_indexes() {
        let kf = constant_position_2d();
        let state = state_2d();
        let detail = state
            .detailed_mahalanobis(&kf, [103.0, 104.0], Some(&[1][..]))
            .unwrap();
        assert_eq!(detail.diff.len(), 1);
        assert_relative_eq!(detail.value, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mahalanobis_selected_index_out_of_range() {
        let kf = constant_position_2d();
        let state = state_2d();
        let result = state.mahalanobis(&kf, [103.0, 104.0], Some(&[2][..]));
        assert!(matches!(result, Err(KalmanError::Validation(_))));
    }

    #[test]
    fn test_mahalanobis_non_negative() {
        let kf = constant_position_2d();
        let state = state_2d();
        for obs in [[0.0, 0.0], [100.0, 99.0], [-50.0, 1e3], [100.5, 100.0]] {
            assert!(state.mahalanobis(&kf, obs, None).unwrap() >= 0.0);
        }
    }

    #[test]
    fn test_mahalanobis_singular_covariance() {
        let kf = constant_position_2d();
        let state = State::from_rows(&[0.0, 0.0], &[vec![1.0, 1.0], vec![1.0, 1.0]], None).unwrap();
        let result = state.mahalanobis(&kf, [1.0, 2.0], None);
        assert_eq!(result, Err(KalmanError::SingularMatrix { size: 2 }));
    }
}
