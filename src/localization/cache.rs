use std::collections::HashMap;

use crate::{
    error::{EngineError, EngineResult},
    models::{BeaconId, FingerprintCorpus},
    ranging::LiveSnapshot,
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Added to every per-slot standard deviation so constant slots normalise
/// to zero instead of dividing by zero.
pub const STD_EPSILON: f64 = 1e-6;

/// z-scored training rows for one plan.
///
/// Built from a corpus snapshot and not invalidated automatically: callers
/// must [`rebuild`](Self::rebuild) after the corpus or the selected plan
/// changes.
#[derive(Debug, Clone, Default)]
pub struct TrainingCache {
    plan_id: Option<String>,
    beacons: Vec<BeaconId>,
    index: HashMap<BeaconId, usize>,
    mean: Vec<f64>,
    std: Vec<f64>,
    features: Vec<Vec<f64>>,
    labels: Vec<(f64, f64)>,
}

impl TrainingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds from the samples of `plan_id`. On failure the cache is left
    /// empty.
    pub fn rebuild(&mut self, corpus: &FingerprintCorpus, plan_id: &str) -> EngineResult<usize> {
        self.clear();

        let width = corpus.beacons.len();
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for sample in corpus.samples_for_plan(plan_id) {
            if sample.vector.len() != width {
                log_warn!(
                    "skipping sample at ({:.3}, {:.3}): {} slots, corpus has {}",
                    sample.x_norm,
                    sample.y_norm,
                    sample.vector.len(),
                    width
                );
                continue;
            }
            features.push(sample.vector.clone());
            labels.push((sample.x_norm, sample.y_norm));
        }

        if width == 0 || features.is_empty() {
            return Err(EngineError::NoTrainingData {
                plan_id: plan_id.to_string(),
            });
        }

        let rows = features.len() as f64;
        let mut mean = vec![0.0; width];
        for row in &features {
            for (slot, value) in row.iter().enumerate() {
                mean[slot] += value;
            }
        }
        mean.iter_mut().for_each(|m| *m /= rows);

        let mut std = vec![0.0; width];
        for row in &features {
            for (slot, value) in row.iter().enumerate() {
                let d = value - mean[slot];
                std[slot] += d * d;
            }
        }
        std.iter_mut()
            .for_each(|s| *s = (*s / rows).sqrt() + STD_EPSILON);

        for row in features.iter_mut() {
            for (slot, value) in row.iter_mut().enumerate() {
                *value = (*value - mean[slot]) / std[slot];
            }
        }

        self.plan_id = Some(plan_id.to_string());
        self.index = corpus
            .beacons
            .iter()
            .enumerate()
            .map(|(slot, beacon)| (*beacon, slot))
            .collect();
        self.beacons = corpus.beacons.clone();
        self.mean = mean;
        self.std = std;
        self.features = features;
        self.labels = labels;
        Ok(self.features.len())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty() || self.beacons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.plan_id.as_deref()
    }

    pub fn beacons(&self) -> &[BeaconId] {
        &self.beacons
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[(f64, f64)] {
        &self.labels
    }

    /// Raw query vector in slot order: `floor` everywhere, overwritten by the
    /// live RSSI of each beacon the cache knows. Unknown live beacons are
    /// ignored.
    pub fn live_vector(&self, live: &LiveSnapshot, floor: f64) -> Vec<f64> {
        let mut vector = vec![floor; self.beacons.len()];
        for (beacon, rssi) in live {
            if let Some(&slot) = self.index.get(beacon) {
                vector[slot] = f64::from(*rssi);
            }
        }
        vector
    }

    /// z-scores `vector` in place with the stored training statistics.
    pub fn normalize(&self, vector: &mut [f64]) {
        for ((value, mean), std) in vector.iter_mut().zip(&self.mean).zip(&self.std) {
            *value = (*value - mean) / std;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FingerprintSample;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn sample(plan: &str, x: f64, y: f64, vector: Vec<f64>) -> FingerprintSample {
        FingerprintSample {
            plan_id: plan.into(),
            x_norm: x,
            y_norm: y,
            vector,
        }
    }

    fn corpus() -> FingerprintCorpus {
        FingerprintCorpus {
            beacons: vec![BeaconId::new(1, 1), BeaconId::new(1, 2)],
            samples: vec![
                sample("north", 0.1, 0.1, vec![-50.0, -80.0]),
                sample("north", 0.9, 0.9, vec![-70.0, -80.0]),
                sample("south", 0.5, 0.5, vec![-60.0, -60.0]),
            ],
            status: String::new(),
        }
    }

    #[test]
    fn computes_population_statistics_and_z_scores() {
        let mut cache = TrainingCache::new();
        assert_eq!(cache.rebuild(&corpus(), "north").unwrap(), 2);

        assert_relative_eq!(cache.mean()[0], -60.0);
        assert_relative_eq!(cache.mean()[1], -80.0);
        // Population std of [-50, -70] is 10, not the sample std.
        assert_relative_eq!(cache.std()[0], 10.0 + STD_EPSILON);
        assert_relative_eq!(cache.std()[1], STD_EPSILON);

        assert_relative_eq!(cache.features()[0][0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(cache.features()[1][0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(cache.features()[0][1], 0.0);
        assert_eq!(cache.labels()[1], (0.9, 0.9));
        assert_eq!(cache.plan_id(), Some("north"));

        assert_eq!(cache.mean().len(), cache.beacons().len());
        assert_eq!(cache.std().len(), cache.beacons().len());
        assert!(cache.features().iter().all(|f| f.len() == cache.beacons().len()));
    }

    #[test]
    fn unknown_plan_reports_no_training_data() {
        let mut cache = TrainingCache::new();
        cache.rebuild(&corpus(), "north").unwrap();

        let err = cache.rebuild(&corpus(), "east").unwrap_err();
        assert_eq!(
            err,
            EngineError::NoTrainingData {
                plan_id: "east".into()
            }
        );
        assert!(cache.is_empty());
        assert_eq!(cache.plan_id(), None);
    }

    #[test]
    fn mismatched_rows_are_skipped() {
        let mut data = corpus();
        data.samples.push(sample("north", 0.5, 0.5, vec![-40.0]));

        let mut cache = TrainingCache::new();
        assert_eq!(cache.rebuild(&data, "north").unwrap(), 2);
    }

    #[test]
    fn live_vector_uses_floor_and_ignores_unknown_beacons() {
        let mut cache = TrainingCache::new();
        cache.rebuild(&corpus(), "north").unwrap();

        let live = BTreeMap::from([(BeaconId::new(1, 2), -65), (BeaconId::new(9, 9), -40)]);
        let mut vector = cache.live_vector(&live, -100.0);
        assert_eq!(vector, vec![-100.0, -65.0]);

        cache.normalize(&mut vector);
        assert_relative_eq!(vector[0], (-100.0 + 60.0) / (10.0 + STD_EPSILON));
    }
}
