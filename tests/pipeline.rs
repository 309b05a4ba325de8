use std::time::Duration;

use approx::assert_relative_eq;
use beaconloc_lib::{
    models::RangingScope, BeaconId, ChannelScanner, CorpusStore, JsonCorpusStore,
    LocalizationController, LocalizationSettings, PlanPointStore, RangingController, RangingPhase,
    RangingSettings, RecordLog, ScannerFeed,
};
use tokio::time;

const SCOPE: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";
const PLAN: &str = "ground-floor";
const A: BeaconId = BeaconId { major: 10, minor: 1 };
const B: BeaconId = BeaconId { major: 10, minor: 2 };

fn ranging() -> (RangingController, ScannerFeed) {
    let scanner = ChannelScanner::new();
    let feed = scanner.feed();
    (
        RangingController::new(Box::new(scanner), RangingSettings::default()),
        feed,
    )
}

async fn capture(ranging: &RangingController, feed: &ScannerFeed, a: i32, b: i32) {
    feed.push(A, a);
    feed.push(B, b);
    time::sleep(Duration::from_millis(10)).await;

    ranging.start_capture(2).await.unwrap();
    assert_eq!(ranging.phase().await, RangingPhase::Capturing);
    time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(ranging.phase().await, RangingPhase::Ranging);
}

#[tokio::test(start_paused = true)]
async fn captured_fingerprints_localize_back_to_their_points() {
    let (ranging, feed) = ranging();
    let scope: RangingScope = SCOPE.parse().unwrap();
    let mut plans = PlanPointStore::new();
    let near = plans.add(PLAN, 0.2, 0.2);
    let far = plans.add(PLAN, 0.8, 0.8);

    ranging.start_ranging(SCOPE).await.unwrap();
    let mut log = RecordLog::new();

    capture(&ranging, &feed, -60, -70).await;
    let medians = ranging.window_medians().await;
    assert_eq!(medians.get(&A), Some(&-60));
    assert_eq!(medians.get(&B), Some(&-70));
    assert_eq!(log.save_medians(&medians, &scope, PLAN, &near, 2).unwrap(), 2);

    capture(&ranging, &feed, -80, -50).await;
    let medians = ranging.window_medians().await;
    log.save_medians(&medians, &scope, PLAN, &far, 2).unwrap();
    ranging.stop_ranging().await;

    let dir = tempfile::tempdir().unwrap();
    let store = JsonCorpusStore::new(dir.path().join("corpus.json"));
    store.save(&log.build_corpus()).unwrap();
    let corpus = store.load_or_default();
    assert_eq!(corpus.beacons, vec![A, B]);
    assert_eq!(corpus.status, "Imported 2 samples, 2 beacons");

    let settings = LocalizationSettings {
        k: 1,
        ..Default::default()
    };
    let localizer = LocalizationController::new(ranging.clone(), settings);
    localizer.start(SCOPE, PLAN, &corpus).await.unwrap();

    feed.push(A, -80);
    feed.push(B, -50);
    time::sleep(Duration::from_millis(1_100)).await;

    let estimate = localizer.estimate().await.expect("estimate after first tick");
    assert_relative_eq!(estimate.x_norm, 0.8);
    assert_relative_eq!(estimate.y_norm, 0.8);
    assert_relative_eq!(estimate.confidence, 1.0);

    localizer.stop().await;
    assert!(localizer.estimate().await.is_none());
    assert_eq!(ranging.phase().await, RangingPhase::Idle);
    assert!(!feed.is_active());
}

#[tokio::test(start_paused = true)]
async fn localizer_refuses_an_unsurveyed_plan() {
    let (ranging, feed) = ranging();
    let localizer = LocalizationController::new(ranging, LocalizationSettings::default());

    let corpus = RecordLog::new().build_corpus();
    assert_eq!(corpus.status, "No median rows found");
    assert!(localizer.start(SCOPE, PLAN, &corpus).await.is_err());
    assert!(!feed.is_active());
    assert!(!localizer.snapshot().await.running);
}
