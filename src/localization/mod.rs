pub mod cache;
pub mod controller;
pub mod knn;
pub mod state;

pub use cache::TrainingCache;
pub use controller::LocalizationController;
pub use knn::{EmaSmoother, RawEstimate};
pub use state::{LocalizerSnapshot, LocalizerState, PositionEstimate, TickOutcome};
