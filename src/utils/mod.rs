pub mod logging;
pub mod task;

pub use task::{delayed_interval, ScopedTask};
