//! Filter configuration surface
//!
//! JSON keys follow the camelCase naming of the original model options
//! (`sensorDimension`, `nSensors`, `timeStep`, `stateProjection`, ...). The
//! loosely-typed JSON form is converted into closed enums at parse time, so
//! an incomplete configuration is rejected before any model is built.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KalmanError, KalmanResult};
use crate::state::State;
use crate::types::{contains_non_finite, diag, from_rows, Matrix};

/// Noise covariance given either as the diagonal or as the full matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Covariance {
    Diagonal(Vec<f64>),
    Full(Vec<Vec<f64>>),
}

impl Covariance {
    /// Expand into a `dimension x dimension` matrix
    pub fn to_matrix(&self, dimension: usize, context: &str) -> KalmanResult<Matrix> {
        let matrix = match self {
            Covariance::Diagonal(values) => diag(values),
            Covariance::Full(rows) => from_rows(rows).ok_or_else(|| {
                KalmanError::Config(format!("{context} rows have inconsistent lengths"))
            })?,
        };
        if matrix.shape() != (dimension, dimension) {
            return Err(KalmanError::Config(format!(
                "{context} has shape {:?}, expected {dimension}x{dimension}",
                matrix.shape()
            )));
        }
        if contains_non_finite(matrix.iter()) {
            return Err(KalmanError::Config(format!("{context} should only contain finite values")));
        }
        Ok(matrix)
    }
}

// ─── Dynamic model ───────────────────────────────────────────────────────────

/// Process model: one of the kinematic presets or an explicit transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDynamicConfig", into = "RawDynamicConfig")]
pub enum DynamicConfig {
    ConstantPosition {
        dimension: Option<usize>,
        covariance: Option<Covariance>,
    },
    ConstantSpeed {
        dimension: Option<usize>,
        time_step: f64,
        covariance: Option<Covariance>,
    },
    ConstantAcceleration {
        dimension: Option<usize>,
        time_step: f64,
        covariance: Option<Covariance>,
    },
    Explicit {
        dimension: usize,
        transition: Vec<Vec<f64>>,
        covariance: Option<Covariance>,
    },
}

pub const DEFAULT_TIME_STEP: f64 = 1.0;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawDynamicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transition: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    covariance: Option<Covariance>,
}

impl TryFrom<RawDynamicConfig> for DynamicConfig {
    type Error = KalmanError;

    fn try_from(raw: RawDynamicConfig) -> Result<Self, Self::Error> {
        let time_step = raw.time_step.unwrap_or(DEFAULT_TIME_STEP);
        match (raw.name.as_deref(), raw.transition) {
            (Some(name), Some(_)) if name != "explicit" => Err(KalmanError::Config(format!(
                "dynamic preset '{name}' cannot be combined with an explicit transition"
            ))),
            (Some("constant-position"), None) => Ok(DynamicConfig::ConstantPosition {
                dimension: raw.dimension,
                covariance: raw.covariance,
            }),
            (Some("constant-speed"), None) => Ok(DynamicConfig::ConstantSpeed {
                dimension: raw.dimension,
                time_step,
                covariance: raw.covariance,
            }),
            (Some("constant-acceleration"), None) => Ok(DynamicConfig::ConstantAcceleration {
                dimension: raw.dimension,
                time_step,
                covariance: raw.covariance,
            }),
            (None | Some("explicit"), Some(transition)) => {
                let dimension = raw.dimension.ok_or_else(|| {
                    KalmanError::Config("explicit dynamic requires a dimension".to_string())
                })?;
                Ok(DynamicConfig::Explicit {
                    dimension,
                    transition,
                    covariance: raw.covariance,
                })
            }
            (Some(name), None) if name != "explicit" => Err(KalmanError::Config(format!(
                "unknown dynamic preset '{name}'"
            ))),
            _ => Err(KalmanError::Config(
                "dynamic requires either a preset name or an explicit transition".to_string(),
            )),
        }
    }
}

impl From<DynamicConfig> for RawDynamicConfig {
    fn from(config: DynamicConfig) -> Self {
        match config {
            DynamicConfig::ConstantPosition {
                dimension,
                covariance,
            } => RawDynamicConfig {
                name: Some("constant-position".to_string()),
                dimension,
                covariance,
                ..Default::default()
            },
            DynamicConfig::ConstantSpeed {
                dimension,
                time_step,
                covariance,
            } => RawDynamicConfig {
                name: Some("constant-speed".to_string()),
                dimension,
                time_step: Some(time_step),
                covariance,
                ..Default::default()
            },
            DynamicConfig::ConstantAcceleration {
                dimension,
                time_step,
                covariance,
            } => RawDynamicConfig {
                name: Some("constant-acceleration".to_string()),
                dimension,
                time_step: Some(time_step),
                covariance,
                ..Default::default()
            },
            DynamicConfig::Explicit {
                dimension,
                transition,
                covariance,
            } => RawDynamicConfig {
                dimension: Some(dimension),
                transition: Some(transition),
                covariance,
                ..Default::default()
            },
        }
    }
}

// ─── Observation model ───────────────────────────────────────────────────────

/// Measurement model: identical sensors observing the leading state block,
/// or an explicit projection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservationConfig", into = "RawObservationConfig")]
pub enum ObservationConfig {
    Sensors {
        sensor_dimension: usize,
        n_sensors: usize,
        sensor_covariance: Option<Covariance>,
        state_projection: Option<Vec<Vec<f64>>>,
    },
    Explicit {
        dimension: usize,
        state_projection: Vec<Vec<f64>>,
        covariance: Option<Covariance>,
    },
}

impl ObservationConfig {
    /// Dimension of a single sensor reading, used to size the dynamic presets
    pub fn sensor_dimension(&self) -> usize {
        match self {
            ObservationConfig::Sensors {
                sensor_dimension, ..
            } => *sensor_dimension,
            ObservationConfig::Explicit { dimension, .. } => *dimension,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawObservationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensor_dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n_sensors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensor_covariance: Option<Covariance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    covariance: Option<Covariance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_projection: Option<Vec<Vec<f64>>>,
}

impl TryFrom<RawObservationConfig> for ObservationConfig {
    type Error = KalmanError;

    fn try_from(raw: RawObservationConfig) -> Result<Self, Self::Error> {
        match (raw.name.as_deref(), raw.state_projection) {
            (Some("sensors"), state_projection) => {
                if raw.covariance.is_some() {
                    return Err(KalmanError::Config(
                        "sensors observation takes sensorCovariance, not covariance".to_string(),
                    ));
                }
                Ok(ObservationConfig::Sensors {
                    sensor_dimension: raw.sensor_dimension.or(raw.dimension).unwrap_or(1),
                    n_sensors: raw.n_sensors.unwrap_or(1),
                    sensor_covariance: raw.sensor_covariance,
                    state_projection,
                })
            }
            (None | Some("explicit"), Some(state_projection)) => {
                if raw.n_sensors.is_some() || raw.sensor_covariance.is_some() {
                    return Err(KalmanError::Config(
                        "explicit observation does not take nSensors or sensorCovariance"
                            .to_string(),
                    ));
                }
                let dimension = raw
                    .dimension
                    .or(raw.sensor_dimension)
                    .unwrap_or(state_projection.len());
                Ok(ObservationConfig::Explicit {
                    dimension,
                    state_projection,
                    covariance: raw.covariance,
                })
            }
            (Some(name), _) if name != "explicit" => Err(KalmanError::Config(format!(
                "unknown observation preset '{name}'"
            ))),
            _ => Err(KalmanError::Config(
                "observation requires either the 'sensors' preset or a stateProjection"
                    .to_string(),
            )),
        }
    }
}

impl From<ObservationConfig> for RawObservationConfig {
    fn from(config: ObservationConfig) -> Self {
        match config {
            ObservationConfig::Sensors {
                sensor_dimension,
                n_sensors,
                sensor_covariance,
                state_projection,
            } => RawObservationConfig {
                name: Some("sensors".to_string()),
                sensor_dimension: Some(sensor_dimension),
                n_sensors: Some(n_sensors),
                sensor_covariance,
                state_projection,
                ..Default::default()
            },
            ObservationConfig::Explicit {
                dimension,
                state_projection,
                covariance,
            } => RawObservationConfig {
                dimension: Some(dimension),
                state_projection: Some(state_projection),
                covariance,
                ..Default::default()
            },
        }
    }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KalmanConfig {
    pub dynamic: DynamicConfig,
    pub observation: ObservationConfig,

    /// Starting belief; a diffuse zero-mean State is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<State>,
}

impl KalmanConfig {
    pub fn from_json_str(json: &str) -> KalmanResult<Self> {
        serde_json::from_str(json).map_err(|e| KalmanError::Config(e.to_string()))
    }

    pub fn from_path(path: &Path) -> KalmanResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| KalmanError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preset_defaults() {
        let config: DynamicConfig =
            serde_json::from_value(json!({ "name": "constant-speed" })).unwrap();
        assert_eq!(
            config,
            DynamicConfig::ConstantSpeed {
                dimension: None,
                time_step: DEFAULT_TIME_STEP,
                covariance: None,
            }
        );
    }

    #[test]
    fn test_explicit_without_name() {
        let config: DynamicConfig = serde_json::from_value(json!({
            "dimension": 2,
            "transition": [[1, 0.1], [0, 1]],
            "covariance": [1, 0.1]
        }))
        .unwrap();
        assert!(matches!(config, DynamicConfig::Explicit { dimension: 2, .. }));
    }

    #[test]
    fn test_missing_preset_and_transition() {
        let result = KalmanConfig::from_json_str(
            r#"{ "dynamic": { "dimension": 2 }, "observation": { "name": "sensors" } }"#,
        );
        assert!(matches!(result, Err(KalmanError::Config(_))));
    }

    #[test]
    fn test_preset_with_transition_rejected() {
        let result = serde_json::from_value::<DynamicConfig>(json!({
            "name": "constant-position",
            "dimension": 1,
            "transition": [[1]]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_preset() {
        let result = serde_json::from_value::<DynamicConfig>(json!({ "name": "constant-jerk" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_observation_dimension_alias() {
        let config: ObservationConfig =
            serde_json::from_value(json!({ "name": "sensors", "dimension": 3 })).unwrap();
        assert_eq!(config.sensor_dimension(), 3);

        let config: ObservationConfig =
            serde_json::from_value(json!({ "name": "sensors" })).unwrap();
        assert_eq!(config.sensor_dimension(), 1);
    }

    #[test]
    fn test_observation_explicit_projection() {
        let config: ObservationConfig = serde_json::from_value(json!({
            "stateProjection": [[1, 0, 0, 0], [0, 1, 0, 0]],
            "covariance": [[2, 0], [0, 2]]
        }))
        .unwrap();
        assert_eq!(config.sensor_dimension(), 2);
    }

    #[test]
    fn test_covariance_forms() {
        let diagonal = Covariance::Diagonal(vec![3.0, 4.0]);
        let full = Covariance::Full(vec![vec![3.0, 0.0], vec![0.0, 4.0]]);
        assert_eq!(
            diagonal.to_matrix(2, "covariance").unwrap(),
            full.to_matrix(2, "covariance").unwrap()
        );
        assert!(matches!(
            diagonal.to_matrix(3, "covariance"),
            Err(KalmanError::Config(_))
        ));
    }

    #[test]
    fn test_config_with_init() {
        let config = KalmanConfig::from_json_str(
            r#"{
                "dynamic": { "name": "constant-position", "covariance": [3, 4] },
                "observation": { "name": "sensors", "sensorDimension": 2 },
                "init": { "mean": [100, 100], "covariance": [[1, 0], [0, 1]], "index": 0 }
            }"#,
        )
        .unwrap();
        let init = config.init.unwrap();
        assert_eq!(init.dimension(), 2);
        assert_eq!(init.index, Some(0));
    }

    #[test]
    fn test_config_reserializes() {
        let config = KalmanConfig::from_json_str(
            r#"{
                "dynamic": { "name": "constant-acceleration", "timeStep": 0.1 },
                "observation": { "name": "sensors", "sensorDimension": 2, "nSensors": 2 }
            }"#,
        )
        .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(KalmanConfig::from_json_str(&json).unwrap(), config);
    }
}
