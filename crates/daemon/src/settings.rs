//! Daemon configuration loaded from environment variables

use config::{Config, Environment};
use import_tagger_core::application::{EngineConfig, RequeuePolicy, WorkerConfig};
use import_tagger_core::error::AppError;
use import_tagger_infra_http::ApiConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REST_API_URL: &str = "https://api.snyk.io/rest/";
const DEFAULT_REST_API_VERSION: &str = "2024-10-15";
const DEFAULT_V1_API_URL: &str = "https://api.snyk.io/v1/";
const DEFAULT_PROJECT_ORIGINS: &str = "azure-repos";
const DEFAULT_DATA_DIR: &str = "~/.import-tagger";
const DEFAULT_MAX_TIMEOUT_MINUTES: u64 = 30;
/// One week
const MAX_TIMEOUT_MINUTES_LIMIT: u64 = 7 * 24 * 60;
const DEFAULT_MAX_ATTEMPTS: u64 = 5;
const DEFAULT_QUEUE_POLLING_INTERVAL_SECONDS: f64 = 10.0;
const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_STATUS_POLL_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_QUEUE_BATCH_SIZE: u64 = 1;
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Raw environment values; keys are lower-cased by the `Environment` source
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    snyk_token: Option<String>,
    storage_account_name: Option<String>,
    storage_queue_name: Option<String>,
    snyk_rest_api_url: Option<String>,
    snyk_rest_api_version: Option<String>,
    snyk_v1_api_url: Option<String>,
    snyk_project_origins: Option<String>,
    max_timeout_minutes: Option<String>,
    max_attempts: Option<String>,
    queue_polling_interval_seconds: Option<String>,
    visibility_timeout_seconds: Option<String>,
    status_poll_interval_seconds: Option<String>,
    queue_batch_size: Option<String>,
    requeue_backoff: Option<String>,
    http_timeout_seconds: Option<String>,
    queue_data_dir: Option<String>,
}

/// Fully validated daemon settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiConfig,
    pub storage_account_name: String,
    pub queue_name: String,
    pub data_dir: PathBuf,
    pub engine: EngineConfig,
    pub worker: WorkerConfig,
}

impl Settings {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::load(Environment::default().ignore_empty(true))
    }

    fn load(source: Environment) -> Result<Self, AppError> {
        let raw: RawSettings = Config::builder()
            .add_source(source)
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| AppError::Config(format!("Failed to read environment: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, AppError> {
        let mut problems = Problems::default();

        let token = problems.required("SNYK_TOKEN", raw.snyk_token);
        let storage_account_name = problems.required("STORAGE_ACCOUNT_NAME", raw.storage_account_name);
        let queue_name = problems.required("STORAGE_QUEUE_NAME", raw.storage_queue_name);

        let max_timeout_minutes = problems.positive_int(
            "MAX_TIMEOUT_MINUTES",
            raw.max_timeout_minutes,
            DEFAULT_MAX_TIMEOUT_MINUTES,
        );
        let max_timeout_minutes =
            problems.at_most("MAX_TIMEOUT_MINUTES", max_timeout_minutes, MAX_TIMEOUT_MINUTES_LIMIT);
        let max_attempts = problems.positive_int("MAX_ATTEMPTS", raw.max_attempts, DEFAULT_MAX_ATTEMPTS);
        let queue_polling_interval = problems.positive_seconds(
            "QUEUE_POLLING_INTERVAL_SECONDS",
            raw.queue_polling_interval_seconds,
            DEFAULT_QUEUE_POLLING_INTERVAL_SECONDS,
        );
        let visibility_timeout_seconds = problems.positive_int(
            "VISIBILITY_TIMEOUT_SECONDS",
            raw.visibility_timeout_seconds,
            DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
        );
        let status_poll_interval_seconds = problems.positive_int(
            "STATUS_POLL_INTERVAL_SECONDS",
            raw.status_poll_interval_seconds,
            DEFAULT_STATUS_POLL_INTERVAL_SECONDS,
        );
        let batch_size = problems.positive_int("QUEUE_BATCH_SIZE", raw.queue_batch_size, DEFAULT_QUEUE_BATCH_SIZE);
        let http_timeout_seconds = problems.positive_int(
            "HTTP_TIMEOUT_SECONDS",
            raw.http_timeout_seconds,
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        );
        let requeue_backoff = problems.flag("REQUEUE_BACKOFF", raw.requeue_backoff);
        let max_attempts = problems.fits_u32("MAX_ATTEMPTS", max_attempts);

        problems.into_result()?;

        let max_processing = Duration::from_secs(max_timeout_minutes * 60);
        let engine = EngineConfig {
            max_processing,
            max_attempts,
            status_poll_interval: Duration::from_secs(status_poll_interval_seconds),
        };

        let requeue = if requeue_backoff {
            RequeuePolicy::Backoff {
                max_processing,
                max_attempts,
            }
        } else {
            RequeuePolicy::LeaseExpiry
        };
        let worker = WorkerConfig {
            poll_interval: queue_polling_interval,
            visibility_timeout: Duration::from_secs(visibility_timeout_seconds),
            batch_size: usize::try_from(batch_size).unwrap_or(usize::MAX),
            requeue,
        };

        let api = ApiConfig {
            token,
            rest_api_url: raw.snyk_rest_api_url.unwrap_or_else(|| DEFAULT_REST_API_URL.to_string()),
            rest_api_version: raw
                .snyk_rest_api_version
                .unwrap_or_else(|| DEFAULT_REST_API_VERSION.to_string()),
            v1_api_url: raw.snyk_v1_api_url.unwrap_or_else(|| DEFAULT_V1_API_URL.to_string()),
            project_origins: raw
                .snyk_project_origins
                .unwrap_or_else(|| DEFAULT_PROJECT_ORIGINS.to_string()),
            timeout: Duration::from_secs(http_timeout_seconds),
        };

        let data_dir = raw.queue_data_dir.unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let data_dir = PathBuf::from(shellexpand::tilde(&data_dir).into_owned());

        Ok(Self {
            api,
            storage_account_name,
            queue_name,
            data_dir,
            engine,
            worker,
        })
    }

    /// SQLite store holding this account's queues
    pub fn queue_db_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.storage_account_name))
    }
}

/// Collects every configuration problem so they are reported together
#[derive(Default)]
struct Problems {
    missing: Vec<&'static str>,
    invalid: Vec<String>,
}

impl Problems {
    fn required(&mut self, name: &'static str, value: Option<String>) -> String {
        match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                self.missing.push(name);
                String::new()
            }
        }
    }

    fn positive_int(&mut self, name: &str, value: Option<String>, default: u64) -> u64 {
        let Some(raw) = value else {
            return default;
        };
        match raw.trim().parse::<u64>() {
            Ok(0) => {
                self.invalid.push(format!("{} must be greater than zero", name));
                default
            }
            Ok(v) => v,
            Err(e) => {
                self.invalid.push(format!("{}='{}': {}", name, raw, e));
                default
            }
        }
    }

    fn positive_seconds(&mut self, name: &str, value: Option<String>, default: f64) -> Duration {
        let Some(raw) = value else {
            return Duration::from_secs_f64(default);
        };
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => match Duration::try_from_secs_f64(v) {
                Ok(duration) => duration,
                Err(e) => {
                    self.invalid.push(format!("{}='{}': {}", name, raw, e));
                    Duration::from_secs_f64(default)
                }
            },
            Ok(_) => {
                self.invalid.push(format!("{} must be a positive number of seconds", name));
                Duration::from_secs_f64(default)
            }
            Err(e) => {
                self.invalid.push(format!("{}='{}': {}", name, raw, e));
                Duration::from_secs_f64(default)
            }
        }
    }

    fn flag(&mut self, name: &str, value: Option<String>) -> bool {
        let Some(raw) = value else {
            return false;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                self.invalid.push(format!("{}='{}': expected true or false", name, raw));
                false
            }
        }
    }

    fn at_most(&mut self, name: &str, value: u64, max: u64) -> u64 {
        if value > max {
            self.invalid.push(format!("{}={} exceeds the maximum of {}", name, value, max));
            return max;
        }
        value
    }

    fn fits_u32(&mut self, name: &str, value: u64) -> u32 {
        u32::try_from(value).unwrap_or_else(|_| {
            self.invalid.push(format!("{}={} is too large", name, value));
            u32::MAX
        })
    }

    fn into_result(self) -> Result<(), AppError> {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!(
                "Missing required environment variables: {}",
                self.missing.join(", ")
            ));
        }
        if !self.invalid.is_empty() {
            parts.push(format!("Invalid configuration: {}", self.invalid.join("; ")));
        }
        if parts.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(parts.join(". ")))
        }
    }
}
