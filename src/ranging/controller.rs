use std::{collections::BTreeMap, sync::Arc};

use tokio::{
    sync::{mpsc, Mutex},
    time::Instant,
};

use crate::{
    error::EngineResult,
    models::{BeaconId, RangingScope, ReadingEvent},
    settings::RangingSettings,
    utils::{delayed_interval, ScopedTask},
};

use super::{
    scanner::BeaconScanner,
    state::{CountdownStep, LiveSnapshot, RangingPhase, RangingSnapshot, RangingState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Owns the live view and capture window for one scanner.
///
/// Every mutation (reading pump, offline sweep, capture countdown and the
/// public entry points) goes through the single state mutex, so they are
/// serialised with respect to each other. Timers are scoped to the session
/// that started them and are torn down on stop.
#[derive(Clone)]
pub struct RangingController {
    state: Arc<Mutex<RangingState>>,
    scanner: Arc<Mutex<Box<dyn BeaconScanner>>>,
    pump: Arc<Mutex<Option<ScopedTask>>>,
    sweeper: Arc<Mutex<Option<ScopedTask>>>,
    countdown: Arc<Mutex<Option<ScopedTask>>>,
    settings: RangingSettings,
}

impl RangingController {
    pub fn new(scanner: Box<dyn BeaconScanner>, settings: RangingSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(RangingState::new(settings.offline_timeout()))),
            scanner: Arc::new(Mutex::new(scanner)),
            pump: Arc::new(Mutex::new(None)),
            sweeper: Arc::new(Mutex::new(None)),
            countdown: Arc::new(Mutex::new(None)),
            settings,
        }
    }

    pub fn settings(&self) -> &RangingSettings {
        &self.settings
    }

    pub async fn phase(&self) -> RangingPhase {
        self.state.lock().await.phase()
    }

    pub async fn snapshot(&self) -> RangingSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn live_snapshot(&self) -> LiveSnapshot {
        self.state.lock().await.live_snapshot()
    }

    pub async fn window_medians(&self) -> BTreeMap<BeaconId, i32> {
        self.state.lock().await.window_medians().clone()
    }

    /// Starts (or restarts) ranging for the proximity UUID in `scope`.
    ///
    /// A malformed scope leaves any running session untouched and only
    /// updates the status string.
    pub async fn start_ranging(&self, scope: &str) -> EngineResult<()> {
        let scope = match scope.parse::<RangingScope>() {
            Ok(scope) => scope,
            Err(err) => {
                log_warn!("rejecting ranging scope: {err}");
                self.state.lock().await.set_status("Bad UUID");
                return Err(err);
            }
        };

        // The old session is fully reset first, so a scanner failure below
        // leaves the engine idle rather than half-running.
        let previous_scope = {
            let mut state = self.state.lock().await;
            let scope = state.scope();
            state.stop_ranging();
            scope
        };
        self.teardown_session(previous_scope).await;

        let readings = {
            let mut scanner = self.scanner.lock().await;
            match scanner.start_ranging(&scope) {
                Ok(readings) => readings,
                Err(err) => {
                    log_error!("scanner failed to start for {scope}: {err}");
                    self.state.lock().await.set_status(format!("Scanner error: {err}"));
                    return Err(err);
                }
            }
        };

        self.state.lock().await.begin_ranging(scope);
        self.spawn_pump(readings).await;
        self.spawn_sweeper().await;

        log_info!("ranging started for {scope}");
        Ok(())
    }

    /// Stops ranging. Always succeeds; a no-op when already idle.
    pub async fn stop_ranging(&self) {
        let (stopped, scope) = {
            let mut state = self.state.lock().await;
            let scope = state.scope();
            (state.stop_ranging(), scope)
        };
        self.teardown_session(scope).await;
        if stopped {
            log_info!("ranging stopped");
        }
    }

    /// Direct entry point for a reading. Returns whether it was accepted.
    pub async fn on_reading(&self, event: ReadingEvent) -> bool {
        self.state.lock().await.apply_reading(&event)
    }

    pub async fn start_capture(&self, window_secs: u32) -> EngineResult<()> {
        // The countdown slot is swapped while the state guard is held, so the
        // installed task always belongs to the current window.
        let previous = {
            let mut state = self.state.lock().await;
            let epoch = state.begin_capture(window_secs)?;
            let task = self.countdown_task(epoch);
            log_info!("capture window {epoch} started ({window_secs}s)");
            self.countdown.lock().await.replace(task)
        };
        // The old window's epoch no longer matches; it exits on its next tick.
        drop(previous);
        Ok(())
    }

    /// Aborts the active window without producing medians. Returns whether a
    /// window was active.
    pub async fn stop_capture(&self) -> bool {
        let (aborted, countdown) = {
            let mut state = self.state.lock().await;
            let aborted = state.abort_capture();
            (aborted, self.countdown.lock().await.take())
        };
        if let Some(task) = countdown {
            task.shutdown().await;
        }
        if aborted {
            log_info!("capture window aborted");
        }
        aborted
    }

    pub async fn start_default_capture(&self) -> EngineResult<()> {
        self.start_capture(self.settings.default_capture_secs).await
    }

    async fn teardown_session(&self, scope: Option<RangingScope>) {
        for slot in [&self.countdown, &self.pump, &self.sweeper] {
            let task = slot.lock().await.take();
            if let Some(task) = task {
                task.shutdown().await;
            }
        }

        if let Some(scope) = scope {
            self.scanner.lock().await.stop_ranging(&scope);
        }
    }

    async fn spawn_pump(&self, mut readings: mpsc::Receiver<ReadingEvent>) {
        let state = self.state.clone();
        let task = ScopedTask::spawn("reading pump", move |token| async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    maybe_event = readings.recv() => {
                        let Some(event) = maybe_event else {
                            log_info!("reading source closed");
                            break;
                        };
                        if !state.lock().await.apply_reading(&event) {
                            log_debug!("dropped reading {} rssi={}", event.beacon, event.rssi);
                        }
                    }
                }
            }
        });

        *self.pump.lock().await = Some(task);
    }

    async fn spawn_sweeper(&self) {
        let state = self.state.clone();
        let period = self.settings.sweep_interval();
        let task = ScopedTask::spawn("offline sweep", move |token| async move {
            let mut ticker = delayed_interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = state.lock().await.prune_offline(Instant::now());
                        for beacon in pruned {
                            log_info!("beacon {beacon} went offline");
                        }
                    }
                }
            }
        });

        *self.sweeper.lock().await = Some(task);
    }

    fn countdown_task(&self, epoch: u64) -> ScopedTask {
        let state = self.state.clone();
        let period = self.settings.countdown_interval();
        ScopedTask::spawn("capture countdown", move |token| async move {
            let mut ticker = delayed_interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let step = state.lock().await.countdown_tick(epoch);
                        match step {
                            CountdownStep::Inactive => break,
                            CountdownStep::Running { remaining_secs } => {
                                log_debug!("capture window {epoch}: {remaining_secs}s left");
                            }
                            CountdownStep::Finalized(medians) => {
                                log_info!(
                                    "capture window {epoch} finalized with {} medians",
                                    medians.len()
                                );
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}
