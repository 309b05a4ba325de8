pub mod controller;
pub mod median;
pub mod scanner;
pub mod simulator;
pub mod state;

pub use controller::RangingController;
pub use median::median;
pub use scanner::{BeaconScanner, ChannelScanner, ScannerFeed};
pub use simulator::{DevicePosition, PathLossModel, SimulatedBeacon, SimulatedScanner};
pub use state::{LiveSnapshot, RangingPhase, RangingSnapshot, RangingState};
