use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub i64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServoButton {
    pub name: String,
    pub servo_output: i64,
    pub pulse_width: f64,
}

impl ServoButton {
    pub fn new(name: impl Into<String>, servo_output: i64, pulse_width: f64) -> Self {
        Self {
            name: name.into(),
            servo_output,
            pulse_width,
        }
    }
}

/// Drops entries whose trimmed name is empty. Order of the survivors is
/// preserved and the stored name keeps its original whitespace.
pub fn sanitize_buttons(candidate: &[ServoButton]) -> Vec<ServoButton> {
    candidate
        .iter()
        .filter(|button| !button.name.trim().is_empty())
        .cloned()
        .collect()
}
