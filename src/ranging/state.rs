use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    error::{EngineError, EngineResult},
    models::{BeaconId, RangingScope, ReadingEvent},
};

use super::median::median;

/// Latest RSSI per live beacon, ordered by `(major, minor)`.
pub type LiveSnapshot = BTreeMap<BeaconId, i32>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RangingPhase {
    Idle,
    Ranging,
    Capturing,
}

impl Default for RangingPhase {
    fn default() -> Self {
        RangingPhase::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveReading {
    pub rssi: i32,
    pub last_seen: Instant,
}

/// An in-progress capture. Beacons in `discarded` went offline during the
/// window and never contribute a median for it.
#[derive(Debug, Clone)]
pub struct CaptureWindow {
    epoch: u64,
    window_secs: u32,
    remaining_secs: u32,
    samples: HashMap<BeaconId, Vec<i32>>,
    discarded: HashSet<BeaconId>,
}

impl CaptureWindow {
    fn new(epoch: u64, window_secs: u32) -> Self {
        Self {
            epoch,
            window_secs,
            remaining_secs: window_secs,
            samples: HashMap::new(),
            discarded: HashSet::new(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn window_secs(&self) -> u32 {
        self.window_secs
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn samples(&self, beacon: &BeaconId) -> Option<&[i32]> {
        self.samples.get(beacon).map(Vec::as_slice)
    }

    pub fn is_discarded(&self, beacon: &BeaconId) -> bool {
        self.discarded.contains(beacon)
    }

    fn record(&mut self, beacon: BeaconId, rssi: i32) {
        if !self.discarded.contains(&beacon) {
            self.samples.entry(beacon).or_default().push(rssi);
        }
    }

    fn discard(&mut self, beacon: BeaconId) {
        self.samples.remove(&beacon);
        self.discarded.insert(beacon);
    }

    fn medians(&self) -> BTreeMap<BeaconId, i32> {
        self.samples
            .iter()
            .filter(|(beacon, _)| !self.discarded.contains(*beacon))
            .filter_map(|(beacon, values)| median(values).map(|m| (*beacon, m)))
            .collect()
    }
}

/// Result of one countdown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownStep {
    /// No window with the given epoch is active; the countdown should exit.
    Inactive,
    Running { remaining_secs: u32 },
    Finalized(BTreeMap<BeaconId, i32>),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconLevel {
    pub beacon: BeaconId,
    pub rssi: i32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconSampleCount {
    pub beacon: BeaconId,
    pub samples: usize,
}

/// Point-in-time copy of the engine state. Every list is sorted by beacon.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RangingSnapshot {
    pub phase: RangingPhase,
    pub status: String,
    pub scope: Option<String>,
    pub live: Vec<BeaconLevel>,
    pub seconds_left: Option<u32>,
    pub sample_counts: Vec<BeaconSampleCount>,
    pub discarded: Vec<BeaconId>,
    pub medians: Vec<BeaconLevel>,
}

#[derive(Debug, Clone)]
pub struct RangingState {
    phase: RangingPhase,
    scope: Option<RangingScope>,
    live: HashMap<BeaconId, LiveReading>,
    window: Option<CaptureWindow>,
    medians: BTreeMap<BeaconId, i32>,
    offline_timeout: Duration,
    next_epoch: u64,
    status: String,
}

impl RangingState {
    pub fn new(offline_timeout: Duration) -> Self {
        Self {
            phase: RangingPhase::Idle,
            scope: None,
            live: HashMap::new(),
            window: None,
            medians: BTreeMap::new(),
            offline_timeout,
            next_epoch: 0,
            status: "Idle".into(),
        }
    }

    pub fn phase(&self) -> RangingPhase {
        self.phase
    }

    pub fn scope(&self) -> Option<RangingScope> {
        self.scope
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn window(&self) -> Option<&CaptureWindow> {
        self.window.as_ref()
    }

    pub fn live(&self, beacon: &BeaconId) -> Option<LiveReading> {
        self.live.get(beacon).copied()
    }

    pub fn begin_ranging(&mut self, scope: RangingScope) {
        self.phase = RangingPhase::Ranging;
        self.scope = Some(scope);
        self.live.clear();
        self.window = None;
        self.medians.clear();
        self.status = "Ranging...".into();
    }

    /// Returns `false` when there was no session to stop. Medians from an
    /// already finished window are kept so they can still be saved.
    pub fn stop_ranging(&mut self) -> bool {
        if self.phase == RangingPhase::Idle {
            return false;
        }
        self.phase = RangingPhase::Idle;
        self.scope = None;
        self.live.clear();
        self.window = None;
        self.status = "Stopped".into();
        true
    }

    /// Applies a reading; returns whether it was accepted.
    pub fn apply_reading(&mut self, event: &ReadingEvent) -> bool {
        if self.phase == RangingPhase::Idle || !event.is_valid() {
            return false;
        }

        self.live.insert(
            event.beacon,
            LiveReading {
                rssi: event.rssi,
                last_seen: event.timestamp,
            },
        );

        if let Some(window) = self.window.as_mut() {
            window.record(event.beacon, event.rssi);
        }
        true
    }

    /// Opens a fresh window and returns its epoch. Beacons already live are
    /// seeded with their latest RSSI as the first sample.
    pub fn begin_capture(&mut self, window_secs: u32) -> EngineResult<u64> {
        if self.phase == RangingPhase::Idle {
            return Err(EngineError::NotRanging);
        }
        if window_secs == 0 {
            return Err(EngineError::InvalidWindow(window_secs));
        }

        self.next_epoch = self.next_epoch.wrapping_add(1);
        let mut window = CaptureWindow::new(self.next_epoch, window_secs);
        for (beacon, reading) in &self.live {
            window.record(*beacon, reading.rssi);
        }

        self.window = Some(window);
        self.medians.clear();
        self.phase = RangingPhase::Capturing;
        self.status = format!("Capturing {window_secs}s");
        Ok(self.next_epoch)
    }

    /// Drops the active window without producing medians.
    pub fn abort_capture(&mut self) -> bool {
        if self.phase != RangingPhase::Capturing {
            return false;
        }
        self.window = None;
        self.phase = RangingPhase::Ranging;
        self.status = "Capture cancelled".into();
        true
    }

    /// Removes beacons unheard for longer than the offline timeout. During a
    /// capture the whole window is invalidated for each removed beacon.
    pub fn prune_offline(&mut self, now: Instant) -> Vec<BeaconId> {
        let timeout = self.offline_timeout;
        let mut stale: Vec<BeaconId> = self
            .live
            .iter()
            .filter(|(_, reading)| now.saturating_duration_since(reading.last_seen) > timeout)
            .map(|(beacon, _)| *beacon)
            .collect();
        stale.sort();

        for beacon in &stale {
            self.live.remove(beacon);
            if let Some(window) = self.window.as_mut() {
                window.discard(*beacon);
            }
        }
        stale
    }

    /// Advances the window identified by `epoch` by one second.
    pub fn countdown_tick(&mut self, epoch: u64) -> CountdownStep {
        let Some(window) = self.window.as_mut().filter(|w| w.epoch == epoch) else {
            return CountdownStep::Inactive;
        };

        window.remaining_secs = window.remaining_secs.saturating_sub(1);
        if window.remaining_secs > 0 {
            let remaining_secs = window.remaining_secs;
            self.status = format!("Capturing {remaining_secs}s");
            return CountdownStep::Running { remaining_secs };
        }

        CountdownStep::Finalized(self.finalize_window())
    }

    fn finalize_window(&mut self) -> BTreeMap<BeaconId, i32> {
        let medians = self.window.take().map(|w| w.medians()).unwrap_or_default();
        self.medians = medians.clone();
        self.phase = RangingPhase::Ranging;
        self.status = format!("Captured {} medians", medians.len());
        medians
    }

    pub fn window_medians(&self) -> &BTreeMap<BeaconId, i32> {
        &self.medians
    }

    pub fn live_snapshot(&self) -> LiveSnapshot {
        self.live
            .iter()
            .map(|(beacon, reading)| (*beacon, reading.rssi))
            .collect()
    }

    pub fn snapshot(&self) -> RangingSnapshot {
        let live = self
            .live_snapshot()
            .into_iter()
            .map(|(beacon, rssi)| BeaconLevel { beacon, rssi })
            .collect();

        let (seconds_left, sample_counts, discarded) = match &self.window {
            Some(window) => {
                let mut counts: Vec<BeaconSampleCount> = window
                    .samples
                    .iter()
                    .map(|(beacon, values)| BeaconSampleCount {
                        beacon: *beacon,
                        samples: values.len(),
                    })
                    .collect();
                counts.sort_by_key(|c| c.beacon);

                let mut discarded: Vec<BeaconId> = window.discarded.iter().copied().collect();
                discarded.sort();

                (Some(window.remaining_secs), counts, discarded)
            }
            None => (None, Vec::new(), Vec::new()),
        };

        RangingSnapshot {
            phase: self.phase,
            status: self.status.clone(),
            scope: self.scope.map(|s| s.to_string()),
            live,
            seconds_left,
            sample_counts,
            discarded,
            medians: self
                .medians
                .iter()
                .map(|(beacon, rssi)| BeaconLevel {
                    beacon: *beacon,
                    rssi: *rssi,
                })
                .collect(),
        }
    }
}
