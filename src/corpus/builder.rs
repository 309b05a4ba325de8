use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, EngineResult},
    models::{AnchorPoint, BeaconId, CaptureRecord, FingerprintCorpus, FingerprintSample, RangingScope, RSSI_FLOOR},
    ranging::median,
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Mode tag stored with window medians, e.g. `median8s`.
pub fn median_mode(window_secs: u32) -> String {
    format!("median{window_secs}s")
}

/// One record per beacon in `medians`, all sharing `timestamp` so they group
/// back into a single sample.
pub fn records_from_medians(
    medians: &BTreeMap<BeaconId, i32>,
    scope: &RangingScope,
    plan_id: &str,
    point: &AnchorPoint,
    window_secs: u32,
    timestamp: DateTime<Utc>,
) -> EngineResult<Vec<CaptureRecord>> {
    if medians.is_empty() {
        return Err(EngineError::NoMedians);
    }

    let mode = median_mode(window_secs);
    let uuid = scope.to_string();
    Ok(medians
        .iter()
        .map(|(beacon, rssi)| CaptureRecord {
            timestamp,
            plan_id: plan_id.to_string(),
            point_id: point.id,
            point_name: point.name.clone(),
            x_norm: point.x_norm,
            y_norm: point.y_norm,
            uuid: uuid.clone(),
            major: beacon.major,
            minor: beacon.minor,
            rssi: *rssi,
            mode: mode.clone(),
        })
        .collect())
}

/// Groups median records into labelled samples.
///
/// Records sharing `(timestamp, plan, x, y)` form one sample; repeated
/// readings of a beacon inside a group collapse to their integer median.
/// Beacons never heard in a group get [`RSSI_FLOOR`]. Rows whose mode is
/// not a median are ignored.
pub fn build_corpus<'a, I>(records: I) -> FingerprintCorpus
where
    I: IntoIterator<Item = &'a CaptureRecord>,
{
    type GroupKey = (DateTime<Utc>, String, u64, u64);

    let mut beacon_set = BTreeSet::new();
    let mut grouped: BTreeMap<GroupKey, HashMap<BeaconId, Vec<i32>>> = BTreeMap::new();

    for record in records.into_iter().filter(|r| r.is_median()) {
        let beacon = record.beacon();
        beacon_set.insert(beacon);
        let key = (
            record.timestamp,
            record.plan_id.clone(),
            record.x_norm.to_bits(),
            record.y_norm.to_bits(),
        );
        grouped
            .entry(key)
            .or_default()
            .entry(beacon)
            .or_default()
            .push(record.rssi);
    }

    if beacon_set.is_empty() || grouped.is_empty() {
        return FingerprintCorpus {
            status: "No median rows found".into(),
            ..FingerprintCorpus::default()
        };
    }

    let beacons: Vec<BeaconId> = beacon_set.into_iter().collect();
    let index: HashMap<BeaconId, usize> = beacons
        .iter()
        .enumerate()
        .map(|(slot, beacon)| (*beacon, slot))
        .collect();

    let samples: Vec<FingerprintSample> = grouped
        .into_iter()
        .map(|((_, plan_id, x_bits, y_bits), readings)| {
            let mut vector = vec![RSSI_FLOOR; beacons.len()];
            for (beacon, values) in readings {
                if let (Some(&slot), Some(value)) = (index.get(&beacon), median(&values)) {
                    vector[slot] = f64::from(value);
                }
            }
            FingerprintSample {
                plan_id,
                x_norm: f64::from_bits(x_bits),
                y_norm: f64::from_bits(y_bits),
                vector,
            }
        })
        .collect();

    let status = format!("Imported {} samples, {} beacons", samples.len(), beacons.len());
    log_info!("{status}");
    FingerprintCorpus {
        beacons,
        samples,
        status,
    }
}

/// Append-only log of saved window medians.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordLog {
    records: Vec<CaptureRecord>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves the medians of a finished window against `point`. Returns how
    /// many rows were appended.
    pub fn save_medians(
        &mut self,
        medians: &BTreeMap<BeaconId, i32>,
        scope: &RangingScope,
        plan_id: &str,
        point: &AnchorPoint,
        window_secs: u32,
    ) -> EngineResult<usize> {
        let rows = records_from_medians(medians, scope, plan_id, point, window_secs, Utc::now())?;
        let count = rows.len();
        self.records.extend(rows);
        log_info!("saved {count} medians at {} on {plan_id}", point.name);
        Ok(count)
    }

    pub fn push(&mut self, record: CaptureRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[CaptureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn build_corpus(&self) -> FingerprintCorpus {
        build_corpus(&self.records)
    }
}
