use std::{env, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use beaconloc_lib::{
    init_logging,
    models::{BeaconId, RangingScope},
    ranging::{DevicePosition, PathLossModel, SimulatedBeacon},
    CorpusStore, JsonCorpusStore, LocalizationController, PlanPointStore, RangingController,
    RangingPhase, RecordLog, SettingsStore, SimulatedScanner,
};
use log::{info, warn};

const SCOPE: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";
const PLAN_ID: &str = "ground-floor";
const CAPTURE_SECS: u32 = 3;

fn data_path(var: &str, file: &str) -> PathBuf {
    env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join(file))
}

async fn wait_for_window(ranging: &RangingController) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(u64::from(CAPTURE_SECS) + 5);
    while ranging.phase().await == RangingPhase::Capturing {
        if tokio::time::Instant::now() > deadline {
            bail!("capture window did not finish");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let settings_store = SettingsStore::new(data_path("BEACONLOC_SETTINGS", "beaconloc-settings.json"))?;
    let settings = settings_store.settings().with_env_overrides();
    settings
        .validate()
        .context("Invalid settings after environment overrides")?;

    let beacons = vec![
        SimulatedBeacon { id: BeaconId::new(1, 1), x_norm: 0.1, y_norm: 0.1 },
        SimulatedBeacon { id: BeaconId::new(1, 2), x_norm: 0.9, y_norm: 0.1 },
        SimulatedBeacon { id: BeaconId::new(1, 3), x_norm: 0.5, y_norm: 0.9 },
        SimulatedBeacon { id: BeaconId::new(2, 1), x_norm: 0.1, y_norm: 0.8 },
    ];
    let position = DevicePosition::new(0.5, 0.5);
    let scanner = SimulatedScanner::new(beacons, PathLossModel::default(), position.clone())
        .with_interval(Duration::from_millis(250));
    let ranging = RangingController::new(Box::new(scanner), settings.ranging.clone());

    // Survey a 3x3 grid of reference points.
    let mut plans = PlanPointStore::new();
    for y in [0.15, 0.5, 0.85] {
        for x in [0.15, 0.5, 0.85] {
            plans.add(PLAN_ID, x, y);
        }
    }

    ranging.start_ranging(SCOPE).await?;
    let scope: RangingScope = SCOPE.parse()?;
    let mut log = RecordLog::new();
    for point in plans.points(PLAN_ID) {
        position.set(point.x_norm, point.y_norm);
        // Let the live view settle on the new position first.
        tokio::time::sleep(Duration::from_millis(600)).await;
        ranging.start_capture(CAPTURE_SECS).await?;
        wait_for_window(&ranging).await?;

        let medians = ranging.window_medians().await;
        match log.save_medians(&medians, &scope, PLAN_ID, point, CAPTURE_SECS) {
            Ok(rows) => info!("{}: {rows} medians", point.name),
            Err(err) => warn!("{}: {err}", point.name),
        }
    }
    ranging.stop_ranging().await;

    let corpus = log.build_corpus();
    let corpus_store = JsonCorpusStore::new(data_path("BEACONLOC_CORPUS", "beaconloc-corpus.json"));
    corpus_store
        .save(&corpus)
        .context("Failed to save fingerprint corpus")?;
    info!("{} -> {}", corpus.status, corpus_store.path().display());

    let corpus = corpus_store.load_or_default();
    let localizer = LocalizationController::new(ranging.clone(), settings.localization.clone());
    localizer.start(SCOPE, PLAN_ID, &corpus).await?;

    for (x, y) in [(0.2, 0.2), (0.8, 0.3), (0.5, 0.8)] {
        position.set(x, y);
        tokio::time::sleep(Duration::from_secs(4)).await;
        match localizer.estimate().await {
            Some(estimate) => info!(
                "device at ({x:.2}, {y:.2}) -> estimate ({:.2}, {:.2}) confidence {:.2}",
                estimate.x_norm, estimate.y_norm, estimate.confidence
            ),
            None => warn!("device at ({x:.2}, {y:.2}) -> no estimate"),
        }
    }

    localizer.stop().await;
    Ok(())
}
