use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{
    queue::{QueueConfig, ResolutionStrategy},
    sync::{RewindPolicy, SegmentMergeConfig, SyncConfig},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const DEFAULT_BACKEND_URL: &str = "https://lamaq-signlink-hackx.hf.space";
pub const BACKEND_URL_ENV: &str = "SIGNLINK_BACKEND_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub backend_url: String,
    pub recency_ttl_ms: u64,
    pub next_up_count: usize,
    pub resolution: ResolutionStrategy,
    pub processed_capacity: Option<usize>,
    pub poll_interval_ms: u64,
    pub admit_tolerance_ms: u64,
    pub prefetch_window_ms: u64,
    pub rewind_policy: RewindPolicy,
    pub compose_segments: bool,
    pub use_llm: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            recency_ttl_ms: 3000,
            next_up_count: 3,
            resolution: ResolutionStrategy::Batch,
            processed_capacity: None,
            poll_interval_ms: 300,
            admit_tolerance_ms: 100,
            prefetch_window_ms: 8000,
            rewind_policy: RewindPolicy::Keep,
            compose_segments: false,
            use_llm: true,
        }
    }
}

impl UserSettings {
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            recency_ttl: Duration::from_millis(self.recency_ttl_ms),
            next_up: self.next_up_count,
            resolution: self.resolution,
            processed_capacity: self.processed_capacity,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            admit_tolerance: Duration::from_millis(self.admit_tolerance_ms),
            prefetch_window: Duration::from_millis(self.prefetch_window_ms),
            merge: SegmentMergeConfig::default(),
            rewind_policy: self.rewind_policy,
            compose_segments: self.compose_segments,
            use_llm: self.use_llm,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when it is missing or unreadable
    /// as settings JSON.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("ignoring corrupt settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    /// Backend URL with the environment override applied.
    pub fn effective_backend_url(&self) -> String {
        if let Ok(env_url) = env::var(BACKEND_URL_ENV) {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                log_debug!("Using backend URL from {}: {}", BACKEND_URL_ENV, trimmed);
                return trimmed.trim_end_matches('/').to_string();
            }
        }
        self.read().backend_url.trim_end_matches('/').to_string()
    }

    pub fn set_backend_url(&self, url: &str) -> Result<()> {
        let mut guard = self.write();
        guard.backend_url = url.trim().trim_end_matches('/').to_string();
        self.persist(&guard)
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn queue_config(&self) -> QueueConfig {
        self.read().queue_config()
    }

    pub fn sync_config(&self) -> SyncConfig {
        self.read().sync_config()
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("signlink.json")).unwrap();

        let settings = store.snapshot();
        assert_eq!(settings, UserSettings::default());
        assert_eq!(store.queue_config().recency_ttl, Duration::from_millis(3000));
        assert_eq!(store.sync_config().poll_interval, Duration::from_millis(300));
    }

    #[test]
    fn partial_and_corrupt_files_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"next_up_count": 5, "rewind_policy": "rearm"}"#).unwrap();
        let store = SettingsStore::new(partial).unwrap();
        assert_eq!(store.queue_config().next_up, 5);
        assert_eq!(store.sync_config().rewind_policy, RewindPolicy::Rearm);
        assert_eq!(store.snapshot().backend_url, DEFAULT_BACKEND_URL);

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        let store = SettingsStore::new(corrupt).unwrap();
        assert_eq!(store.snapshot(), UserSettings::default());
    }

    #[test]
    fn backend_url_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signlink.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_backend_url(" http://localhost:7860/ ").unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.snapshot().backend_url, "http://localhost:7860");
    }

    #[test]
    fn update_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signlink.json");
        let store = SettingsStore::new(path).unwrap();

        let mut settings = store.snapshot();
        settings.resolution = ResolutionStrategy::PerToken;
        settings.processed_capacity = Some(64);
        store.update(settings.clone()).unwrap();

        store.reload().unwrap();
        assert_eq!(store.snapshot(), settings);
        assert_eq!(store.queue_config().processed_capacity, Some(64));
    }
}
