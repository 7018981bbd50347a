use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::AppId;

const MAX_USAGE_WINDOW_MS: u64 = 60 * 60 * 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub poll_interval_ms: u64,
    pub usage_window_ms: u64,
    pub own_app_id: AppId,
    pub shell_app_ids: Vec<AppId>,
    pub state_sync_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            usage_window_ms: 1_000,
            own_app_id: "com.blockguard.app".into(),
            shell_app_ids: vec!["com.android.systemui".into()],
            state_sync_timeout_ms: 2_000,
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn usage_window(&self) -> Duration {
        Duration::from_millis(self.usage_window_ms)
    }

    pub fn state_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.state_sync_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("pollIntervalMs must be greater than zero");
        }
        if self.usage_window_ms == 0 || self.usage_window_ms > MAX_USAGE_WINDOW_MS {
            bail!("usageWindowMs must be between 1 and {MAX_USAGE_WINDOW_MS}");
        }
        if self.own_app_id.trim().is_empty() {
            bail!("ownAppId is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    engine: EngineSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// A missing file yields defaults; an unreadable one is logged and
    /// replaced by defaults on the next write.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<UserSettings>(&contents) {
                Ok(data) if data.engine.validate().is_ok() => data,
                Ok(_) => {
                    warn!("Settings at {} are invalid; using defaults", path.display());
                    UserSettings::default()
                }
                Err(err) => {
                    warn!("Failed to parse settings at {}: {err}; using defaults", path.display());
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn engine(&self) -> EngineSettings {
        self.read().engine.clone()
    }

    pub fn update_engine(&self, settings: EngineSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        guard.engine = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
