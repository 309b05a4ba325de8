use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::EngineError;

/// Identifies one transmitter inside a ranging scope.
///
/// Ordering is by `(major, minor)`, which is the order every sorted beacon
/// list in the crate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeaconId {
    pub major: u16,
    pub minor: u16,
}

impl BeaconId {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{} m{}", self.major, self.minor)
    }
}

/// The proximity UUID a ranging session is constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangingScope {
    uuid: Uuid,
}

impl RangingScope {
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl FromStr for RangingScope {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self::new)
            .map_err(|_| EngineError::InvalidIdentity(value.to_string()))
    }
}

impl fmt::Display for RangingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid.hyphenated().to_string().to_uppercase())
    }
}

/// A single signal-strength observation delivered by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingEvent {
    pub beacon: BeaconId,
    pub rssi: i32,
    pub timestamp: Instant,
}

impl ReadingEvent {
    pub fn new(beacon: BeaconId, rssi: i32, timestamp: Instant) -> Self {
        Self {
            beacon,
            rssi,
            timestamp,
        }
    }

    /// An RSSI of exactly zero is the hardware's "unknown" sentinel.
    pub fn is_valid(&self) -> bool {
        self.rssi != 0
    }
}
