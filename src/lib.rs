pub mod corpus;
pub mod error;
pub mod localization;
pub mod models;
pub mod plans;
pub mod ranging;
pub mod settings;
pub mod utils;

pub use corpus::{build_corpus, CorpusStore, JsonCorpusStore, MemoryCorpusStore, RecordLog};
pub use error::{EngineError, EngineResult};
pub use localization::{LocalizationController, LocalizerSnapshot, PositionEstimate, TickOutcome};
pub use models::{
    AnchorPoint, BeaconId, CaptureRecord, FingerprintCorpus, FingerprintSample, RangingScope,
    ReadingEvent,
};
pub use plans::PlanPointStore;
pub use ranging::{
    BeaconScanner, ChannelScanner, RangingController, RangingPhase, RangingSnapshot, ScannerFeed,
    SimulatedScanner,
};
pub use settings::{EngineSettings, LocalizationSettings, RangingSettings, SettingsStore};

/// Installs the global logger. Reads `RUST_LOG`; defaults to `info`.
/// Calling it twice is harmless.
pub fn init_logging() {
    let installed = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();

    if installed.is_ok() {
        log::info!("beaconloc starting up...");
    }
}
