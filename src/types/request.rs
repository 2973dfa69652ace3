//! Risk prediction request payloads

use crate::error::InputError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /predict-risk`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Wizard step; higher steps reveal more admission fields
    pub step: i64,

    /// Raw field values keyed by input name
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl PredictRequest {
    /// Create a request with no inputs
    pub fn new(step: i64) -> Self {
        Self {
            step,
            inputs: Map::new(),
        }
    }

    /// Add a raw input value
    pub fn with_input(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(field.to_string(), value.into());
        self
    }
}

/// A validated wizard step (1 through [`Step::MAX`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Step(u8);

impl Step {
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether fields introduced at `step` are expected in this request
    pub fn includes(self, step: u8) -> bool {
        self.0 >= step
    }
}

impl TryFrom<i64> for Step {
    type Error = InputError;

    fn try_from(step: i64) -> Result<Self, Self::Error> {
        if (1..=Self::MAX as i64).contains(&step) {
            Ok(Step(step as u8))
        } else {
            Err(InputError::StepOutOfRange {
                step,
                max: Self::MAX,
            })
        }
    }
}
