//! Synthetic scanner for demos and soak runs.
//!
//! Beacons sit at fixed normalised positions on a plan; the device position is
//! shared through [`DevicePosition`] and can be moved while ranging. RSSI
//! follows a log-distance path-loss model with uniform noise, and a fraction
//! of readings arrive as the zero sentinel the way real radios report them.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::EngineResult,
    models::{BeaconId, RangingScope, ReadingEvent},
};

use super::scanner::BeaconScanner;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedBeacon {
    pub id: BeaconId,
    pub x_norm: f64,
    pub y_norm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLossModel {
    /// RSSI at one metre.
    pub tx_power_dbm: f64,
    pub exponent: f64,
    /// Plan width in metres; normalised distances are scaled by this.
    pub plan_scale_m: f64,
    pub noise_db: f64,
    pub sentinel_rate: f64,
}

impl Default for PathLossModel {
    fn default() -> Self {
        Self {
            tx_power_dbm: -59.0,
            exponent: 2.2,
            plan_scale_m: 40.0,
            noise_db: 3.0,
            sentinel_rate: 0.05,
        }
    }
}

impl PathLossModel {
    pub fn expected_rssi(&self, beacon: &SimulatedBeacon, x_norm: f64, y_norm: f64) -> f64 {
        let dx = (beacon.x_norm - x_norm) * self.plan_scale_m;
        let dy = (beacon.y_norm - y_norm) * self.plan_scale_m;
        let metres = (dx * dx + dy * dy).sqrt().max(1.0);
        self.tx_power_dbm - 10.0 * self.exponent * metres.log10()
    }
}

/// Shared, movable device position in normalised plan coordinates.
#[derive(Debug, Clone)]
pub struct DevicePosition {
    inner: Arc<Mutex<(f64, f64)>>,
}

impl DevicePosition {
    pub fn new(x_norm: f64, y_norm: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new((x_norm, y_norm))),
        }
    }

    pub fn get(&self) -> (f64, f64) {
        match self.inner.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, x_norm: f64, y_norm: f64) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = (x_norm, y_norm);
    }
}

pub struct SimulatedScanner {
    beacons: Vec<SimulatedBeacon>,
    model: PathLossModel,
    position: DevicePosition,
    interval: Duration,
    seed: u64,
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedScanner {
    pub fn new(beacons: Vec<SimulatedBeacon>, model: PathLossModel, position: DevicePosition) -> Self {
        Self {
            beacons,
            model,
            position,
            interval: Duration::from_millis(300),
            seed: 7,
            cancel_token: None,
            handle: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn position(&self) -> DevicePosition {
        self.position.clone()
    }

    fn halt(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl BeaconScanner for SimulatedScanner {
    fn start_ranging(&mut self, scope: &RangingScope) -> EngineResult<mpsc::Receiver<ReadingEvent>> {
        self.halt();

        let (tx, rx) = mpsc::channel(self.beacons.len().max(1) * 8);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let beacons = self.beacons.clone();
        let model = self.model;
        let position = self.position.clone();
        let interval = self.interval;
        let seed = self.seed;

        log_info!("simulated scanner ranging {} beacons in {}", beacons.len(), scope);

        let handle = tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (x, y) = position.get();
                        let now = Instant::now();
                        for beacon in &beacons {
                            let rssi = synthesize(&model, beacon, x, y, &mut rng);
                            if tx.send(ReadingEvent::new(beacon.id, rssi, now)).await.is_err() {
                                log_debug!("simulated scanner receiver dropped");
                                return;
                            }
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        self.cancel_token = Some(cancel_token);
        self.handle = Some(handle);
        Ok(rx)
    }

    fn stop_ranging(&mut self, scope: &RangingScope) {
        log_info!("simulated scanner stopped for {}", scope);
        self.halt();
    }
}

impl Drop for SimulatedScanner {
    fn drop(&mut self) {
        self.halt();
    }
}

fn synthesize(model: &PathLossModel, beacon: &SimulatedBeacon, x: f64, y: f64, rng: &mut StdRng) -> i32 {
    if model.sentinel_rate > 0.0 && rng.gen_bool(model.sentinel_rate.min(1.0)) {
        return 0;
    }
    let noise = model.noise_db.abs();
    let jitter = if noise > 0.0 { rng.gen_range(-noise..=noise) } else { 0.0 };
    let rssi = (model.expected_rssi(beacon, x, y) + jitter).round() as i32;
    // A rounded zero would read as the sentinel.
    rssi.min(-1)
}
