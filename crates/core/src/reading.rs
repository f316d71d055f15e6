use serde::{Deserialize, Serialize};
use serde_json::error::Category;

pub const JOINT_COUNT: usize = 6;

/// One decoded set of joint angles as sent by the arm controller.
///
/// Values are passed through untouched: no range check, no rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "M1")]
    pub m1: f64,
    #[serde(rename = "M2")]
    pub m2: f64,
    #[serde(rename = "M3")]
    pub m3: f64,
    #[serde(rename = "M4")]
    pub m4: f64,
    #[serde(rename = "M5")]
    pub m5: f64,
    #[serde(rename = "M6")]
    pub m6: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(serde_json::Error),
    #[error("payload is JSON but not an object")]
    NotAnObject,
    #[error("payload does not match the reading schema: {0}")]
    Schema(serde_json::Error),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => DecodeError::Schema(err),
            _ => DecodeError::Malformed(err),
        }
    }
}

impl Reading {
    pub fn new(values: [f64; JOINT_COUNT]) -> Self {
        let [m1, m2, m3, m4, m5, m6] = values;
        Self { m1, m2, m3, m4, m5, m6 }
    }

    /// Decode a raw frame. Extra keys are ignored; all of `M1`..`M6` must be present and numeric.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        // Derived struct impls also accept sequences; the wire format is always an object.
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn values(&self) -> [f64; JOINT_COUNT] {
        [self.m1, self.m2, self.m3, self.m4, self.m5, self.m6]
    }
}
