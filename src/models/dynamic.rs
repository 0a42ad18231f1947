//! Linear process model
//!
//! State layout for the kinematic presets, with `s` the sensor dimension:
//! [0, s):    Position
//! [s, 2s):   Velocity      (constant-speed, constant-acceleration)
//! [2s, 3s):  Acceleration  (constant-acceleration)

use crate::config::{Covariance, DynamicConfig};
use crate::error::{KalmanError, KalmanResult};
use crate::models::DynamicModel;
use crate::state::State;
use crate::types::{contains_non_finite, from_rows, Matrix};

#[derive(Clone, Debug, PartialEq)]
pub enum Kinematics {
    ConstantPosition,
    ConstantSpeed,
    ConstantAcceleration,
    Explicit(Matrix),
}

impl Kinematics {
    /// Number of derivative blocks in the state (position = 1)
    fn order(&self) -> Option<usize> {
        match self {
            Kinematics::ConstantPosition => Some(1),
            Kinematics::ConstantSpeed => Some(2),
            Kinematics::ConstantAcceleration => Some(3),
            Kinematics::Explicit(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinearDynamic {
    kinematics: Kinematics,

    /// State dimension n
    dimension: usize,

    /// Default time step [seconds]
    time_step: f64,

    /// Process noise Q [n x n]
    covariance: Matrix,
}

impl LinearDynamic {
    /// Resolve a configuration into concrete matrices
    ///
    /// # Arguments
    /// * `config` - preset or explicit transition
    /// * `sensor_dimension` - dimension of one observation, sizes the presets
    pub fn from_config(config: &DynamicConfig, sensor_dimension: usize) -> KalmanResult<Self> {
        match config {
            DynamicConfig::ConstantPosition {
                dimension,
                covariance,
            } => Self::preset(
                Kinematics::ConstantPosition,
                sensor_dimension,
                *dimension,
                1.0,
                covariance.as_ref(),
            ),
            DynamicConfig::ConstantSpeed {
                dimension,
                time_step,
                covariance,
            } => Self::preset(
                Kinematics::ConstantSpeed,
                sensor_dimension,
                *dimension,
                *time_step,
                covariance.as_ref(),
            ),
            DynamicConfig::ConstantAcceleration {
                dimension,
                time_step,
                covariance,
            } => Self::preset(
                Kinematics::ConstantAcceleration,
                sensor_dimension,
                *dimension,
                *time_step,
                covariance.as_ref(),
            ),
            DynamicConfig::Explicit {
                dimension,
                transition,
                covariance,
            } => {
                let transition = from_rows(transition).ok_or_else(|| {
                    KalmanError::Config("transition rows have inconsistent lengths".to_string())
                })?;
                let covariance = match covariance {
                    Some(c) => c.to_matrix(*dimension, "process covariance")?,
                    None => Matrix::identity(*dimension, *dimension),
                };
                Self::explicit(transition, covariance)
            }
        }
    }

    fn preset(
        kinematics: Kinematics,
        sensor_dimension: usize,
        declared_dimension: Option<usize>,
        time_step: f64,
        covariance: Option<&Covariance>,
    ) -> KalmanResult<Self> {
        if sensor_dimension == 0 {
            return Err(KalmanError::Config(
                "sensor dimension must be at least 1".to_string(),
            ));
        }
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(KalmanError::Config(format!(
                "time step must be positive and finite, got {time_step}"
            )));
        }

        let order = kinematics.order().unwrap_or(1);
        let dimension = order * sensor_dimension;
        if let Some(declared) = declared_dimension {
            if declared != dimension {
                return Err(KalmanError::Config(format!(
                    "dynamic dimension {declared} disagrees with preset dimension {dimension} \
                     ({order} x sensor dimension {sensor_dimension})"
                )));
            }
        }

        let covariance = match covariance {
            Some(c) => c.to_matrix(dimension, "process covariance")?,
            None => Matrix::identity(dimension, dimension),
        };

        log::debug!(
            "Built {:?} dynamic: dimension={}, time_step={}",
            kinematics,
            dimension,
            time_step
        );

        Ok(Self {
            kinematics,
            dimension,
            time_step,
            covariance,
        })
    }

    /// Time-step independent model from an explicit transition
    pub fn explicit(transition: Matrix, covariance: Matrix) -> KalmanResult<Self> {
        let dimension = covariance.nrows();
        if transition.shape() != (dimension, dimension) {
            return Err(KalmanError::Config(format!(
                "transition has shape {:?}, expected {dimension}x{dimension}",
                transition.shape()
            )));
        }
        if !covariance.is_square() {
            return Err(KalmanError::Config(format!(
                "process covariance has shape {:?}, expected a square matrix",
                covariance.shape()
            )));
        }
        if contains_non_finite(transition.iter()) || contains_non_finite(covariance.iter()) {
            return Err(KalmanError::Config(
                "transition and process covariance should only contain finite values".to_string(),
            ));
        }

        Ok(Self {
            kinematics: Kinematics::Explicit(transition),
            dimension,
            time_step: 1.0,
            covariance,
        })
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    /// Transition matrix F for a time step
    ///
    /// Presets fill the block above the diagonal with `dt^k / k!`, which gives
    /// `p += v·dt` and `p += v·dt + a·dt²/2, v += a·dt` for the speed and
    /// acceleration presets. An explicit transition ignores `time_step`.
    pub fn state_transition(&self, time_step: f64) -> Matrix {
        let order = match &self.kinematics {
            Kinematics::Explicit(transition) => return transition.clone(),
            other => other.order().unwrap_or(1),
        };

        let s = self.dimension / order;
        let mut f = Matrix::identity(self.dimension, self.dimension);
        for block_row in 0..order {
            for block_col in (block_row + 1)..order {
                let power = block_col - block_row;
                let factorial: f64 = (1..=power).map(|k| k as f64).product();
                let coefficient = time_step.powi(power as i32) / factorial;
                for i in 0..s {
                    f[(block_row * s + i, block_col * s + i)] = coefficient;
                }
            }
        }
        f
    }

    /// Process noise Q
    pub fn process_covariance(&self) -> &Matrix {
        &self.covariance
    }
}

impl DynamicModel for LinearDynamic {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn time_step(&self) -> f64 {
        self.time_step
    }

    fn transition(&self, _previous: &State, time_step: f64) -> Matrix {
        self.state_transition(time_step)
    }

    fn process_noise(&self, _previous: &State) -> Matrix {
        self.covariance.clone()
    }
}
