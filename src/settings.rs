use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

fn default_tracking_interval_secs() -> u64 {
    1
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_idle_threshold_secs() -> u64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_base_url() -> String {
    "http://localhost:4000".into()
}

fn default_screenshot_interval_secs() -> u64 {
    60
}

fn default_inactivity_threshold_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Aggregator tick period.
    #[serde(default = "default_tracking_interval_secs")]
    pub tracking_interval_secs: u64,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Seconds of no input after which the user counts as idle.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base unit of the linear sync backoff.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_screenshot_interval_secs")]
    pub screenshot_interval_secs: u64,
    /// Idle duration that fires the inactivity capture trigger.
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracking_interval_secs: default_tracking_interval_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            base_url: default_base_url(),
            screenshot_interval_secs: default_screenshot_interval_secs(),
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            debug_logging: false,
        }
    }
}

impl Settings {
    /// Load settings from an optional JSON file, then apply env overrides.
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings at {}", path.display()))?
            }
            _ => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(value) = env_u64("TRACKING_INTERVAL") {
            self.tracking_interval_secs = value.max(1);
        }
        if let Some(value) = env_u64("SYNC_INTERVAL") {
            self.sync_interval_secs = value.max(1);
        }
        if let Some(value) = env_u64("IDLE_THRESHOLD") {
            self.idle_threshold_secs = value.max(1);
        }
        if let Some(value) = env_u64("MAX_RETRY_ATTEMPTS") {
            self.max_retry_attempts = value as u32;
        }
        if let Some(value) = env_u64("RETRY_DELAY") {
            self.retry_delay_secs = value.max(1);
        }
        if let Ok(value) = std::env::var("REMOTE_BASE_URL") {
            if !value.is_empty() {
                self.base_url = value;
            }
        }
        if let Some(value) = env_u64("SCREENSHOT_INTERVAL") {
            self.screenshot_interval_secs = value.max(1);
        }
        if let Some(value) = env_u64("INACTIVITY_THRESHOLD") {
            self.inactivity_threshold_secs = value.max(1);
        }
        if let Ok(value) = std::env::var("WORKPULSE_DEBUG") {
            self.debug_logging = value == "1" || value.eq_ignore_ascii_case("true");
        }
    }

    pub fn tracking_interval(&self) -> Duration {
        Duration::from_secs(self.tracking_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_secs(self.screenshot_interval_secs)
    }

    pub fn idle_threshold_secs_f64(&self) -> f64 {
        self.idle_threshold_secs as f64
    }

    pub fn inactivity_threshold_secs_f64(&self) -> f64 {
        self.inactivity_threshold_secs as f64
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
