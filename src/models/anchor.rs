use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-placed reference point on a floor plan, in normalised image
/// coordinates (origin top-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorPoint {
    pub id: Uuid,
    pub name: String,
    pub x_norm: f64,
    pub y_norm: f64,
    pub created_at: DateTime<Utc>,
}

impl AnchorPoint {
    pub fn new(name: impl Into<String>, x_norm: f64, y_norm: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            x_norm: clamp01(x_norm),
            y_norm: clamp01(y_norm),
            created_at: Utc::now(),
        }
    }
}

pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
