//! Linear measurement model
//!
//! With `n_sensors` identical sensors each reading `sensor_dimension` values,
//! the observation vector is the concatenation of the sensor readings:
//! [0, s):    Sensor 0
//! [s, 2s):   Sensor 1
//! ...
//! R is the per-sensor covariance repeated along the block diagonal.

use crate::config::ObservationConfig;
use crate::error::{KalmanError, KalmanResult};
use crate::models::ObservationModel;
use crate::state::State;
use crate::types::{block_diagonal, contains_non_finite, from_rows, Matrix};

#[derive(Clone, Debug, PartialEq)]
pub struct LinearObservation {
    sensor_dimension: usize,
    n_sensors: usize,

    /// State projection H [m x n]
    projection: Matrix,

    /// Measurement noise R [m x m]
    covariance: Matrix,
}

impl LinearObservation {
    /// Resolve a configuration against the state dimension of the paired dynamic model
    pub fn from_config(config: &ObservationConfig, state_dimension: usize) -> KalmanResult<Self> {
        match config {
            ObservationConfig::Sensors {
                sensor_dimension,
                n_sensors,
                sensor_covariance,
                state_projection,
            } => {
                let (s, count) = (*sensor_dimension, *n_sensors);
                if s == 0 || count == 0 {
                    return Err(KalmanError::Config(format!(
                        "sensorDimension ({s}) and nSensors ({count}) must be at least 1"
                    )));
                }

                let per_sensor = match sensor_covariance {
                    Some(c) => c.to_matrix(s, "sensor covariance")?,
                    None => Matrix::identity(s, s),
                };
                let projection = match state_projection {
                    Some(rows) => parse_projection(rows)?,
                    None => Self::default_projection(s, count, state_dimension)?,
                };

                Self::new(
                    s,
                    count,
                    projection,
                    block_diagonal(&per_sensor, count),
                    state_dimension,
                )
            }
            ObservationConfig::Explicit {
                dimension,
                state_projection,
                covariance,
            } => {
                let projection = parse_projection(state_projection)?;
                let covariance = match covariance {
                    Some(c) => c.to_matrix(*dimension, "observation covariance")?,
                    None => Matrix::identity(*dimension, *dimension),
                };
                Self::new(*dimension, 1, projection, covariance, state_dimension)
            }
        }
    }

    /// Build from explicit matrices, checking them against each other
    pub fn new(
        sensor_dimension: usize,
        n_sensors: usize,
        projection: Matrix,
        covariance: Matrix,
        state_dimension: usize,
    ) -> KalmanResult<Self> {
        let dimension = sensor_dimension * n_sensors;
        if projection.shape() != (dimension, state_dimension) {
            return Err(KalmanError::Config(format!(
                "state projection has shape {:?}, expected {dimension}x{state_dimension} \
                 (sensorDimension {sensor_dimension} x nSensors {n_sensors} rows, \
                 state dimension columns)",
                projection.shape()
            )));
        }
        if covariance.shape() != (dimension, dimension) {
            return Err(KalmanError::Config(format!(
                "observation covariance has shape {:?}, expected {dimension}x{dimension}",
                covariance.shape()
            )));
        }
        if contains_non_finite(projection.iter()) || contains_non_finite(covariance.iter()) {
            return Err(KalmanError::Config(
                "state projection and observation covariance should only contain finite values".to_string(),
            ));
        }

        log::debug!(
            "Built observation: {} sensor(s) of dimension {}, state dimension {}",
            n_sensors,
            sensor_dimension,
            state_dimension
        );

        Ok(Self {
            sensor_dimension,
            n_sensors,
            projection,
            covariance,
        })
    }

    /// `[I_s | 0]` stacked once per sensor
    fn default_projection(
        sensor_dimension: usize,
        n_sensors: usize,
        state_dimension: usize,
    ) -> KalmanResult<Matrix> {
        if sensor_dimension > state_dimension {
            return Err(KalmanError::Config(format!(
                "sensorDimension {sensor_dimension} exceeds state dimension {state_dimension}"
            )));
        }
        let mut h = Matrix::zeros(sensor_dimension * n_sensors, state_dimension);
        for sensor in 0..n_sensors {
            for i in 0..sensor_dimension {
                h[(sensor * sensor_dimension + i, i)] = 1.0;
            }
        }
        Ok(h)
    }

    pub fn sensor_dimension(&self) -> usize {
        self.sensor_dimension
    }

    pub fn n_sensors(&self) -> usize {
        self.n_sensors
    }

    pub fn state_projection(&self) -> &Matrix {
        &self.projection
    }

    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }
}

fn parse_projection(rows: &[Vec<f64>]) -> KalmanResult<Matrix> {
    from_rows(rows).ok_or_else(|| {
        KalmanError::Config("state projection rows have inconsistent lengths".to_string())
    })
}

impl ObservationModel for LinearObservation {
    fn dimension(&self) -> usize {
        self.projection.nrows()
    }

    fn projection(&self, _predicted: &State) -> Matrix {
        self.projection.clone()
    }

    fn noise(&self, _predicted: &State) -> Matrix {
        self.covariance.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Covariance;
    use crate::types::diag;

    fn sensors(
        sensor_dimension: usize,
        n_sensors: usize,
        sensor_covariance: Option<Vec<f64>>,
    ) -> ObservationConfig {
        ObservationConfig::Sensors {
            sensor_dimension,
            n_sensors,
            sensor_covariance: sensor_covariance.map(Covariance::Diagonal),
            state_projection: None,
        }
    }

    #[test]
    fn test_single_sensor_default_projection() {
        let model = LinearObservation::from_config(&sensors(2, 1, None), 4).unwrap();
        let expected = from_rows(&[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]]).unwrap();
        assert_eq!(model.state_projection(), &expected);
        assert_eq!(model.covariance(), &Matrix::identity(2, 2));
    }

    #[test]
    fn test_multi_sensor_fusion() {
        let model = LinearObservation::from_config(&sensors(2, 2, Some(vec![3.0, 4.0])), 4).unwrap();
        assert_eq!(model.dimension(), 4);
        assert_eq!(model.state_projection().nrows(), 4);
        let expected = from_rows(&[
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
        ])
        .unwrap();
        assert_eq!(model.state_projection(), &expected);
        assert_eq!(model.covariance(), &diag(&[3.0, 4.0, 3.0, 4.0]));
    }

    #[test]
    fn test_sensor_larger_than_state() {
        let err = LinearObservation::from_config(&sensors(3, 1, None), 2).unwrap_err();
        assert!(matches!(err, KalmanError::Config(_)));
    }

    #[test]
    fn test_zero_sensors() {
        assert!(LinearObservation::from_config(&sensors(2, 0, None), 4).is_err());
        assert!(LinearObservation::from_config(&sensors(0, 1, None), 4).is_err());
    }

    #[test]
    fn test_sensor_covariance_wrong_size() {
        let result = LinearObservation::from_config(&sensors(2, 2, Some(vec![3.0, 3.0, 4.0, 4.0])), 4);
        assert!(matches!(result, Err(KalmanError::Config(_))));
    }

    #[test]
    fn test_explicit_projection_columns_must_match_state() {
        let config = ObservationConfig::Explicit {
            dimension: 1,
            state_projection: vec![vec![1.0, 0.0, 0.0]],
            covariance: None,
        };
        assert!(LinearObservation::from_config(&config, 2).is_err());
        let model = LinearObservation::from_config(&config, 3).unwrap();
        assert_eq!(model.n_sensors(), 1);
        assert_eq!(model.sensor_dimension(), 1);
    }

    #[test]
    fn test_sensors_with_custom_projection_rows() {
        let config = ObservationConfig::Sensors {
            sensor_dimension: 1,
            n_sensors: 2,
            sensor_covariance: None,
            state_projection: Some(vec![vec![1.0, 0.0]]),
        };
        let err = LinearObservation::from_config(&config, 2).unwrap_err();
        assert!(matches!(err, KalmanError::Config(_)));
    }
}
