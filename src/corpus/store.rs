use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use anyhow::{Context, Result};
use log::warn;

use crate::models::FingerprintCorpus;

/// Opaque load/save collaborator for the fingerprint corpus.
pub trait CorpusStore: Send + Sync {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<FingerprintCorpus>>;

    fn save(&self, corpus: &FingerprintCorpus) -> Result<()>;

    fn clear(&self) -> Result<()>;

    /// Loads the stored corpus, falling back to an empty one when nothing is
    /// stored or the payload cannot be read.
    fn load_or_default(&self) -> FingerprintCorpus {
        match self.load() {
            Ok(Some(corpus)) => corpus,
            Ok(None) => FingerprintCorpus::default(),
            Err(err) => {
                warn!("Corpus load failed: {err:#}");
                FingerprintCorpus::default()
            }
        }
    }
}

/// Corpus persisted as a single pretty-printed JSON document.
pub struct JsonCorpusStore {
    path: PathBuf,
    // Serialises writers against each other and against readers.
    lock: RwLock<()>,
}

impl JsonCorpusStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CorpusStore for JsonCorpusStore {
    fn load(&self) -> Result<Option<FingerprintCorpus>> {
        let _guard = match self.lock.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read corpus from {}", self.path.display()))?;
        let corpus = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse corpus in {}", self.path.display()))?;
        Ok(Some(corpus))
    }

    fn save(&self, corpus: &FingerprintCorpus) -> Result<()> {
        let _guard = match self.lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create corpus directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(corpus)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write corpus to {}", self.path.display()))
    }

    fn clear(&self) -> Result<()> {
        let _guard = match self.lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove corpus at {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCorpusStore {
    data: RwLock<Option<FingerprintCorpus>>,
}

impl MemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CorpusStore for MemoryCorpusStore {
    fn load(&self) -> Result<Option<FingerprintCorpus>> {
        let guard = match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.clone())
    }

    fn save(&self, corpus: &FingerprintCorpus) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(corpus.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BeaconId, FingerprintSample};

    fn corpus() -> FingerprintCorpus {
        FingerprintCorpus {
            beacons: vec![BeaconId::new(1, 1), BeaconId::new(2, 7)],
            samples: vec![FingerprintSample {
                plan_id: "north".into(),
                x_norm: 0.25,
                y_norm: 0.75,
                vector: vec![-61.0, -100.0],
            }],
            status: "Imported 1 samples, 2 beacons".into(),
        }
    }

    #[test]
    fn json_store_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCorpusStore::new(dir.path().join("nested").join("corpus.json"));
        assert_eq!(store.load().unwrap(), None);

        store.save(&corpus()).unwrap();
        assert_eq!(store.load().unwrap(), Some(corpus()));

        let reopened = JsonCorpusStore::new(store.path().to_path_buf());
        assert_eq!(reopened.load_or_default(), corpus());

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_payload_falls_back_to_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonCorpusStore::new(path);
        assert!(store.load().is_err());
        let corpus = store.load_or_default();
        assert!(corpus.is_empty());
        assert_eq!(corpus.status, "No dataset loaded");
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let json = serde_json::to_value(corpus()).unwrap();
        assert_eq!(json["samples"][0]["planID"], "north");
        assert_eq!(json["samples"][0]["xNorm"], 0.25);
        assert_eq!(json["beacons"][1]["minor"], 7);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCorpusStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&corpus()).unwrap();
        assert_eq!(store.load_or_default(), corpus());
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
