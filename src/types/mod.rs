pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

use crate::error::{KalmanError, KalmanResult};

/// A raw observation as supplied by a caller
///
/// Either a flat ordered sequence `[z0, z1, ...]` or a column vector
/// `[[z0], [z1], ...]`. Both normalise to the same column vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observation {
    Flat(Vec<f64>),
    Column(Vec<Vec<f64>>),
}

impl Observation {
    pub fn len(&self) -> usize {
        match self {
            Observation::Flat(values) => values.len(),
            Observation::Column(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalise into a column vector of length `dimension`
    pub fn to_column(&self, dimension: usize) -> KalmanResult<Vector> {
        let values: Vec<f64> = match self {
            Observation::Flat(values) => values.clone(),
            Observation::Column(rows) => {
                if let Some(row) = rows.iter().find(|row| row.len() != 1) {
                    return Err(KalmanError::Validation(format!(
                        "observation rows must hold exactly one value, found {}",
                        row.len()
                    )));
                }
                rows.iter().map(|row| row[0]).collect()
            }
        };

        if values.len() != dimension {
            return Err(KalmanError::Dimension {
                context: "observation",
                expected: dimension,
                actual: values.len(),
            });
        }
        if contains_non_finite(&values) {
            return Err(KalmanError::Validation(
                "observation should only contain finite values".to_string(),
            ));
        }
        Ok(Vector::from_vec(values))
    }
}

impl From<Vec<f64>> for Observation {
    fn from(values: Vec<f64>) -> Self {
        Observation::Flat(values)
    }
}

impl From<&[f64]> for Observation {
    fn from(values: &[f64]) -> Self {
        Observation::Flat(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Observation {
    fn from(values: [f64; N]) -> Self {
        Observation::Flat(values.to_vec())
    }
}

impl From<Vec<Vec<f64>>> for Observation {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Observation::Column(rows)
    }
}

impl From<&Vector> for Observation {
    fn from(values: &Vector) -> Self {
        Observation::Flat(values.iter().copied().collect())
    }
}

impl From<&Observation> for Observation {
    fn from(observation: &Observation) -> Self {
        observation.clone()
    }
}
