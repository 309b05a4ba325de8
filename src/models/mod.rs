pub mod anchor;
pub mod beacon;
pub mod fingerprint;

pub use anchor::{clamp01, AnchorPoint};
pub use beacon::{BeaconId, RangingScope, ReadingEvent};
pub use fingerprint::{CaptureRecord, FingerprintCorpus, FingerprintSample, RSSI_FLOOR};
