use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::{error::EngineError, models::RSSI_FLOOR};

const UPDATE_HZ_ENV: &str = "BEACONLOC_UPDATE_HZ";
/// Slowest regression rate a timer period is derived from.
const MIN_UPDATE_HZ: f64 = 0.2;
const MAX_UPDATE_HZ: f64 = 50.0;
const MAX_CAPTURE_SECS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingSettings {
    /// A beacon unheard for longer than this is pruned from the live view.
    pub offline_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub countdown_interval_ms: u64,
    pub default_capture_secs: u32,
}

impl Default for RangingSettings {
    fn default() -> Self {
        Self {
            offline_timeout_ms: 3_000,
            sweep_interval_ms: 1_000,
            countdown_interval_ms: 1_000,
            default_capture_secs: 8,
        }
    }
}

impl RangingSettings {
    pub fn offline_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationSettings {
    pub k: usize,
    pub rssi_floor: f64,
    pub update_hz: f64,
    pub ema_alpha: f64,
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        Self {
            k: 5,
            rssi_floor: RSSI_FLOOR,
            update_hz: 1.0,
            ema_alpha: 0.35,
        }
    }
}

impl LocalizationSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_hz.clamp(MIN_UPDATE_HZ, MAX_UPDATE_HZ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub ranging: RangingSettings,
    pub localization: LocalizationSettings,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        let r = &self.ranging;
        if r.sweep_interval_ms == 0 || r.countdown_interval_ms == 0 {
            return Err(EngineError::InvalidSettings(
                "timer intervals must be non-zero".into(),
            ));
        }
        if r.default_capture_secs == 0 || r.default_capture_secs > MAX_CAPTURE_SECS {
            return Err(EngineError::InvalidSettings(format!(
                "default capture window must be within 1..={MAX_CAPTURE_SECS}s"
            )));
        }

        let l = &self.localization;
        if l.k == 0 {
            return Err(EngineError::InvalidSettings("k must be at least 1".into()));
        }
        if !(l.update_hz.is_finite() && l.update_hz > 0.0 && l.update_hz <= MAX_UPDATE_HZ) {
            return Err(EngineError::InvalidSettings(format!(
                "update rate must be within (0, {MAX_UPDATE_HZ}] Hz, got {}",
                l.update_hz
            )));
        }
        if !(0.0..=1.0).contains(&l.ema_alpha) {
            return Err(EngineError::InvalidSettings(format!(
                "ema alpha must be within [0, 1], got {}",
                l.ema_alpha
            )));
        }
        if !l.rssi_floor.is_finite() {
            return Err(EngineError::InvalidSettings("rssi floor must be finite".into()));
        }
        Ok(())
    }

    /// Applies `BEACONLOC_UPDATE_HZ` when it parses to a positive rate.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(hz) = std::env::var(UPDATE_HZ_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|hz| hz.is_finite() && *hz > 0.0)
        {
            self.localization.update_hz = hz;
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<EngineSettings>(&contents)
                .ok()
                .filter(|settings| settings.validate().is_ok())
                .unwrap_or_default()
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> EngineSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: EngineSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: EngineSettings = serde_json::from_str(&contents)?;
        data.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = EngineSettings::default();
        settings.validate().expect("defaults must validate");
        assert_eq!(settings.localization.k, 5);
        assert_eq!(settings.ranging.offline_timeout(), Duration::from_secs(3));
        assert_eq!(settings.localization.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn tick_interval_is_clamped_to_slowest_rate() {
        let settings = LocalizationSettings {
            update_hz: 0.01,
            ..Default::default()
        };
        let interval = settings.tick_interval();
        assert!(interval > Duration::from_millis(4_999));
        assert!(interval < Duration::from_millis(5_001));
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        let mut settings = EngineSettings::default();
        settings.localization.ema_alpha = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(EngineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn rejects_runaway_update_rate() {
        let mut settings = EngineSettings::default();
        settings.localization.update_hz = 1e12;
        assert!(matches!(
            settings.validate(),
            Err(EngineError::InvalidSettings(_))
        ));
        // The derived period never collapses to zero even unvalidated.
        let interval = settings.localization.tick_interval();
        assert!(interval > Duration::from_micros(19_900));
        assert!(interval < Duration::from_micros(20_100));

        settings.localization.update_hz = MAX_UPDATE_HZ;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.settings(), EngineSettings::default());

        let mut updated = store.settings();
        updated.localization.k = 3;
        updated.ranging.default_capture_secs = 12;
        store.update(updated.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.settings(), updated);
    }

    #[test]
    fn store_refuses_invalid_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let mut bad = store.settings();
        bad.localization.k = 0;
        assert!(store.update(bad).is_err());
        assert_eq!(store.settings().localization.k, 5);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings(), EngineSettings::default());
    }
}
