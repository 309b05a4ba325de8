use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BeaconId;

/// Value stored for beacons that were not heard at a location.
pub const RSSI_FLOOR: f64 = -100.0;

/// One labelled location in the corpus. `vector` has one slot per entry of
/// the owning corpus' `beacons`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintSample {
    #[serde(rename = "planID")]
    pub plan_id: String,
    pub x_norm: f64,
    pub y_norm: f64,
    pub vector: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintCorpus {
    pub beacons: Vec<BeaconId>,
    pub samples: Vec<FingerprintSample>,
    pub status: String,
}

impl Default for FingerprintCorpus {
    fn default() -> Self {
        Self {
            beacons: Vec::new(),
            samples: Vec::new(),
            status: "No dataset loaded".into(),
        }
    }
}

impl FingerprintCorpus {
    /// Empty corpus reported after an explicit wipe.
    pub fn cleared() -> Self {
        Self {
            status: "Cleared".into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples_for_plan<'a>(
        &'a self,
        plan_id: &'a str,
    ) -> impl Iterator<Item = &'a FingerprintSample> + 'a {
        self.samples.iter().filter(move |s| s.plan_id == plan_id)
    }
}

/// A saved window median for one beacon at one reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "planID")]
    pub plan_id: String,
    #[serde(rename = "pointID")]
    pub point_id: Uuid,
    pub point_name: String,
    pub x_norm: f64,
    pub y_norm: f64,
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
    pub rssi: i32,
    pub mode: String,
}

impl CaptureRecord {
    pub fn beacon(&self) -> BeaconId {
        BeaconId::new(self.major, self.minor)
    }

    pub fn is_median(&self) -> bool {
        self.mode.starts_with("median")
    }
}
