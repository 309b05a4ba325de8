use serde::Serialize;

use crate::{
    error::EngineResult,
    models::FingerprintCorpus,
    ranging::LiveSnapshot,
    settings::LocalizationSettings,
};

use super::{
    cache::TrainingCache,
    knn::{regress, EmaSmoother},
};

/// Published position in normalised plan coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEstimate {
    pub x_norm: f64,
    pub y_norm: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No training data; nothing was touched.
    NoTraining,
    /// No live beacons; the estimate was cleared.
    Cleared,
    /// Neighbour weights summed to zero; the previous estimate stands.
    Unchanged,
    Updated(PositionEstimate),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalizerSnapshot {
    pub status: String,
    pub plan_id: Option<String>,
    pub training_rows: usize,
    pub running: bool,
    pub estimate: Option<PositionEstimate>,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct LocalizerState {
    cache: TrainingCache,
    smoother: EmaSmoother,
    estimate: Option<PositionEstimate>,
    k: usize,
    rssi_floor: f64,
    running: bool,
    status: String,
}

impl LocalizerState {
    pub fn new(settings: &LocalizationSettings) -> Self {
        Self {
            cache: TrainingCache::new(),
            smoother: EmaSmoother::new(settings.ema_alpha),
            estimate: None,
            k: settings.k,
            rssi_floor: settings.rssi_floor,
            running: false,
            status: "Idle".into(),
        }
    }

    pub fn cache(&self) -> &TrainingCache {
        &self.cache
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn estimate(&self) -> Option<PositionEstimate> {
        self.estimate
    }

    pub fn confidence(&self) -> f64 {
        self.estimate.map_or(0.0, |e| e.confidence)
    }

    pub fn rebuild(&mut self, corpus: &FingerprintCorpus, plan_id: &str) -> EngineResult<usize> {
        match self.cache.rebuild(corpus, plan_id) {
            Ok(rows) => {
                self.status = format!("Training ready ({rows} samples)");
                Ok(rows)
            }
            Err(err) => {
                self.status = format!("No training samples for {plan_id}");
                self.estimate = None;
                Err(err)
            }
        }
    }

    /// Marks a new session. The smoothing carry never crosses sessions.
    pub fn begin_session(&mut self) {
        self.running = true;
        self.estimate = None;
        self.smoother.reset();
        self.status = "Ranging + regressing...".into();
    }

    pub fn end_session(&mut self) {
        self.running = false;
        self.estimate = None;
        self.smoother.reset();
        self.status = "Stopped".into();
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn tick(&mut self, live: &LiveSnapshot) -> TickOutcome {
        if self.cache.is_empty() {
            return TickOutcome::NoTraining;
        }
        if live.is_empty() {
            self.estimate = None;
            return TickOutcome::Cleared;
        }

        let mut query = self.cache.live_vector(live, self.rssi_floor);
        self.cache.normalize(&mut query);

        let Some(raw) = regress(self.cache.features(), self.cache.labels(), &query, self.k) else {
            return TickOutcome::Unchanged;
        };

        let (x_norm, y_norm) = self.smoother.apply(raw.x_norm, raw.y_norm);
        let estimate = PositionEstimate {
            x_norm,
            y_norm,
            confidence: raw.confidence,
        };
        self.estimate = Some(estimate);
        TickOutcome::Updated(estimate)
    }

    pub fn snapshot(&self) -> LocalizerSnapshot {
        LocalizerSnapshot {
            status: self.status.clone(),
            plan_id: self.cache.plan_id().map(str::to_string),
            training_rows: self.cache.len(),
            running: self.running,
            estimate: self.estimate,
            confidence: self.confidence(),
        }
    }
}
