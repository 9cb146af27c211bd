//! Pipeline configuration loaded from environment variables.
//!
//! Reads:
//! - `DATABASE_URL` (optional; in-memory stores when absent)
//! - `JOB_INTERVAL_SECS` (default 300), `JOB_INITIAL_DELAY_SECS` (default 5)
//! - `NOTIFY_INTERVAL_SECS` (default 60), `NOTIFY_BATCH_SIZE` (default 25)
//! - `SKETCH_RELEASE_DELAY_MINUTES` (default 600), `SKETCH_PROMISED_HOURS` (default 24)
//! - `GENERATION_TIMEOUT_SECS` (default 120)
//! - `GEMINI_API_KEY`, `GEMINI_TEXT_MODEL`, `GEMINI_IMAGE_MODEL`, `MOCK_MODE`
//! - `FALLBACK_IMAGE_URL_TEMPLATE`
//! - `STORAGE_DIR`, `STORAGE_PUBLIC_URL`
//! - `NOTIFY_WEBHOOK_URL`, `NOTIFICATIONS_ENABLED` (default true)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use celestia_ai::GeminiConfig;
use celestia_readings::ReleasePolicy;

use crate::scheduler::Schedule;
use crate::worker::{DEFAULT_FALLBACK_IMAGE_TEMPLATE, WorkerSettings};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is not a valid {expected}: {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub job_interval: Duration,
    pub job_initial_delay: Duration,
    pub notify_interval: Duration,
    pub notify_batch_size: usize,
    pub release_delay_minutes: u32,
    pub promised_window_hours: u32,
    pub generation_timeout: Duration,
    pub gemini_api_key: Option<String>,
    pub gemini_text_model: Option<String>,
    pub gemini_image_model: Option<String>,
    pub mock_mode: bool,
    pub fallback_image_template: String,
    pub storage_dir: Option<PathBuf>,
    pub storage_public_url: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub notifications_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            job_interval: Duration::from_secs(300),
            job_initial_delay: Duration::from_secs(5),
            notify_interval: Duration::from_secs(60),
            notify_batch_size: 25,
            release_delay_minutes: 600,
            promised_window_hours: 24,
            generation_timeout: Duration::from_secs(120),
            gemini_api_key: None,
            gemini_text_model: None,
            gemini_image_model: None,
            mock_mode: false,
            fallback_image_template: DEFAULT_FALLBACK_IMAGE_TEMPLATE.to_string(),
            storage_dir: None,
            storage_public_url: None,
            notify_webhook_url: None,
            notifications_enabled: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            database_url: get("DATABASE_URL"),
            job_interval: secs(&get, "JOB_INTERVAL_SECS", defaults.job_interval)?,
            job_initial_delay: secs(&get, "JOB_INITIAL_DELAY_SECS", defaults.job_initial_delay)?,
            notify_interval: secs(&get, "NOTIFY_INTERVAL_SECS", defaults.notify_interval)?,
            notify_batch_size: parsed(&get, "NOTIFY_BATCH_SIZE", "integer", defaults.notify_batch_size)?,
            release_delay_minutes: parsed(
                &get,
                "SKETCH_RELEASE_DELAY_MINUTES",
                "integer",
                defaults.release_delay_minutes,
            )?,
            promised_window_hours: parsed(
                &get,
                "SKETCH_PROMISED_HOURS",
                "integer",
                defaults.promised_window_hours,
            )?,
            generation_timeout: secs(&get, "GENERATION_TIMEOUT_SECS", defaults.generation_timeout)?,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_text_model: get("GEMINI_TEXT_MODEL"),
            gemini_image_model: get("GEMINI_IMAGE_MODEL"),
            mock_mode: flag(&get, "MOCK_MODE", defaults.mock_mode)?,
            fallback_image_template: get("FALLBACK_IMAGE_URL_TEMPLATE")
                .unwrap_or(defaults.fallback_image_template),
            storage_dir: get("STORAGE_DIR").map(PathBuf::from),
            storage_public_url: get("STORAGE_PUBLIC_URL"),
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
            notifications_enabled: flag(&get, "NOTIFICATIONS_ENABLED", defaults.notifications_enabled)?,
        };

        if config.job_interval.is_zero() {
            return Err(ConfigError::Zero("JOB_INTERVAL_SECS"));
        }
        if config.notify_interval.is_zero() {
            return Err(ConfigError::Zero("NOTIFY_INTERVAL_SECS"));
        }
        if config.notify_batch_size == 0 {
            return Err(ConfigError::Zero("NOTIFY_BATCH_SIZE"));
        }
        Ok(config)
    }

    pub fn release_policy(&self) -> ReleasePolicy {
        ReleasePolicy::new(self.release_delay_minutes, self.promised_window_hours)
    }

    pub fn job_schedule(&self) -> Schedule {
        Schedule::new(self.job_initial_delay, self.job_interval)
    }

    /// The notification sweep starts after one full interval.
    pub fn notify_schedule(&self) -> Schedule {
        Schedule::new(self.notify_interval, self.notify_interval)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            release_policy: self.release_policy(),
            generation_timeout: self.generation_timeout,
            fallback_image_template: self.fallback_image_template.clone(),
            notifications_enabled: self.notifications_enabled,
        }
    }

    /// Gemini settings, or `None` when the mock generator should be used.
    pub fn gemini(&self) -> Option<GeminiConfig> {
        if self.mock_mode {
            return None;
        }
        let mut config = GeminiConfig::new(self.gemini_api_key.clone()?);
        if let Some(model) = &self.gemini_text_model {
            config.text_model = model.clone();
        }
        if let Some(model) = &self.gemini_image_model {
            config.image_model = model.clone();
        }
        config.timeout = self.generation_timeout;
        Some(config)
    }

    /// Non-fatal configuration problems worth logging at start-up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(w) = self.release_policy().check_promise() {
            warnings.push(w);
        }
        if !self.mock_mode && self.gemini_api_key.is_none() {
            warnings.push("GEMINI_API_KEY not set; using the mock generator".to_string());
        }
        if self.storage_public_url.is_some() && self.storage_dir.is_none() {
            warnings.push("STORAGE_PUBLIC_URL ignored without STORAGE_DIR".to_string());
        }
        warnings
    }
}

fn parsed<G, T>(get: &G, key: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
        None => Ok(default),
    }
}

fn secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parsed(get, key, "number of seconds", default.as_secs()).map(Duration::from_secs)
}

fn flag<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "boolean",
            value,
        }),
    }
}
