use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    error::EngineResult,
    models::FingerprintCorpus,
    ranging::RangingController,
    settings::LocalizationSettings,
    utils::{delayed_interval, ScopedTask},
};

use super::state::{LocalizerSnapshot, LocalizerState, PositionEstimate, TickOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Runs the regression tick against a ranging controller's live view.
///
/// The localizer never touches ranging internals: each tick copies the live
/// snapshot first and only then locks its own state.
#[derive(Clone)]
pub struct LocalizationController {
    state: Arc<Mutex<LocalizerState>>,
    ranging: RangingController,
    ticker: Arc<Mutex<Option<ScopedTask>>>,
    settings: LocalizationSettings,
}

impl LocalizationController {
    pub fn new(ranging: RangingController, settings: LocalizationSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(LocalizerState::new(&settings))),
            ranging,
            ticker: Arc::new(Mutex::new(None)),
            settings,
        }
    }

    pub fn ranging(&self) -> &RangingController {
        &self.ranging
    }

    pub async fn estimate(&self) -> Option<PositionEstimate> {
        self.state.lock().await.estimate()
    }

    pub async fn snapshot(&self) -> LocalizerSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Rebuilds the training cache. Must be called whenever the corpus or the
    /// selected plan changes; a running session keeps ticking against the
    /// new cache.
    pub async fn rebuild(&self, corpus: &FingerprintCorpus, plan_id: &str) -> EngineResult<usize> {
        let result = self.state.lock().await.rebuild(corpus, plan_id);
        match &result {
            Ok(rows) => log_info!("training cache for {plan_id}: {rows} samples"),
            Err(err) => log_warn!("training cache rebuild failed: {err}"),
        }
        result
    }

    /// Builds the cache for `plan_id`, starts ranging `scope` and begins
    /// ticking. Refuses to start without training data.
    pub async fn start(&self, scope: &str, plan_id: &str, corpus: &FingerprintCorpus) -> EngineResult<()> {
        self.rebuild(corpus, plan_id).await?;

        if let Err(err) = self.ranging.start_ranging(scope).await {
            self.state.lock().await.set_status(format!("Ranging failed: {err}"));
            return Err(err);
        }

        self.state.lock().await.begin_session();
        self.spawn_ticker().await;
        log_info!("localization started on plan {plan_id}");
        Ok(())
    }

    /// Stops ranging and ticking and clears the estimate. Always succeeds.
    pub async fn stop(&self) {
        if let Some(task) = self.ticker.lock().await.take() {
            task.shutdown().await;
        }
        self.ranging.stop_ranging().await;
        self.state.lock().await.end_session();
        log_info!("localization stopped");
    }

    /// One regression step against the current live view.
    pub async fn tick(&self) -> TickOutcome {
        tick_once(&self.ranging, &self.state).await
    }

    async fn spawn_ticker(&self) {
        let state = self.state.clone();
        let ranging = self.ranging.clone();
        let period = self.settings.tick_interval();

        let task = ScopedTask::spawn("regression tick", move |token| async move {
            let mut ticker = delayed_interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tick_once(&ranging, &state).await;
                    }
                }
            }
        });

        let previous = self.ticker.lock().await.replace(task);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }
}

async fn tick_once(ranging: &RangingController, state: &Mutex<LocalizerState>) -> TickOutcome {
    let live = ranging.live_snapshot().await;
    let outcome = state.lock().await.tick(&live);
    match outcome {
        TickOutcome::Updated(estimate) => log_debug!(
            "position x={:.3} y={:.3} conf={:.2} from {} beacons",
            estimate.x_norm,
            estimate.y_norm,
            estimate.confidence,
            live.len()
        ),
        TickOutcome::Cleared => log_debug!("no live beacons; estimate cleared"),
        TickOutcome::NoTraining | TickOutcome::Unchanged => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::EngineError,
        models::{BeaconId, FingerprintSample},
        ranging::{ChannelScanner, ScannerFeed},
        settings::RangingSettings,
    };
    use approx::assert_relative_eq;
    use std::time::Duration;
    use tokio::time;

    const SCOPE: &str = "AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE";
    const A: BeaconId = BeaconId { major: 1, minor: 1 };
    const B: BeaconId = BeaconId { major: 1, minor: 2 };

    fn corpus() -> FingerprintCorpus {
        let sample = |x: f64, y: f64, a: f64, b: f64| FingerprintSample {
            plan_id: "north".into(),
            x_norm: x,
            y_norm: y,
            vector: vec![a, b],
        };
        FingerprintCorpus {
            beacons: vec![A, B],
            samples: vec![
                sample(0.0, 0.0, -50.0, -90.0),
                sample(1.0, 1.0, -90.0, -50.0),
            ],
            status: String::new(),
        }
    }

    fn localizer() -> (LocalizationController, ScannerFeed) {
        let scanner = ChannelScanner::new();
        let feed = scanner.feed();
        let ranging = RangingController::new(Box::new(scanner), RangingSettings::default());
        let settings = LocalizationSettings {
            k: 1,
            ..Default::default()
        };
        (LocalizationController::new(ranging, settings), feed)
    }

    #[tokio::test(start_paused = true)]
    async fn refuses_to_start_without_training_data() {
        let (locator, feed) = localizer();
        let err = locator.start(SCOPE, "south", &corpus()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoTrainingData { .. }));
        assert!(!feed.is_active());

        let snapshot = locator.snapshot().await;
        assert!(!snapshot.running);
        assert_eq!(snapshot.status, "No training samples for south");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_publishes_smoothed_positions() {
        let (locator, feed) = localizer();
        locator.start(SCOPE, "north", &corpus()).await.unwrap();

        feed.push(A, -50);
        feed.push(B, -90);
        time::sleep(Duration::from_millis(1_100)).await;

        let first = locator.estimate().await.expect("first tick");
        assert_relative_eq!(first.x_norm, 0.0);

        feed.push(A, -90);
        feed.push(B, -50);
        time::sleep(Duration::from_secs(1)).await;

        let second = locator.estimate().await.expect("second tick");
        assert_relative_eq!(second.x_norm, 0.35);
        assert_relative_eq!(second.y_norm, 0.35);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_start_resets_smoothing() {
        let (locator, feed) = localizer();
        locator.start(SCOPE, "north", &corpus()).await.unwrap();
        feed.push(A, -50);
        feed.push(B, -90);
        time::sleep(Duration::from_millis(1_100)).await;
        assert!(locator.estimate().await.is_some());

        locator.stop().await;
        let stopped = locator.snapshot().await;
        assert!(stopped.estimate.is_none());
        assert_eq!(stopped.confidence, 0.0);
        assert!(!feed.is_active());

        locator.start(SCOPE, "north", &corpus()).await.unwrap();
        feed.push(A, -90);
        feed.push(B, -50);
        time::sleep(Duration::from_millis(1_100)).await;

        let fresh = locator.estimate().await.expect("tick after restart");
        assert_relative_eq!(fresh.x_norm, 1.0);
        assert_relative_eq!(fresh.y_norm, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn estimate_clears_when_beacons_go_offline() {
        let (locator, feed) = localizer();
        locator.start(SCOPE, "north", &corpus()).await.unwrap();
        feed.push(A, -50);
        time::sleep(Duration::from_millis(1_100)).await;
        assert!(locator.estimate().await.is_some());

        // Offline after 3s; pruned on the next sweep, cleared on the next tick.
        time::sleep(Duration::from_secs(5)).await;
        assert!(locator.estimate().await.is_none());
        assert_eq!(locator.tick().await, TickOutcome::Cleared);
    }
}
