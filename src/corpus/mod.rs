pub mod builder;
pub mod store;

pub use builder::{build_corpus, median_mode, records_from_medians, RecordLog};
pub use store::{CorpusStore, JsonCorpusStore, MemoryCorpusStore};
