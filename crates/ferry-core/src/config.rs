//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, Result};
use crate::naming::{DEFAULT_OBJECT_NAME_FORMAT, ObjectNameFormat};
use crate::retry::{DEFAULT_TRANSIENT_STATUS_CODES, RetryPolicy, TransientClassifier};

/// Upper bounds for retry settings read from a file.
pub const MAX_RETRIES_LIMIT: u32 = 32;
pub const MAX_MULTIPLIER: f64 = 10.0;

/// Retry settings as they appear in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_retries: 4,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of concurrent upload workers.
    pub num_workers: usize,

    /// Staging directory. `None` means an owned temporary directory that is
    /// removed on shutdown.
    pub staging_dir: Option<PathBuf>,

    pub object_name_format: String,

    /// How long a worker waits on an empty queue before re-checking shutdown.
    pub poll_interval_ms: u64,

    pub retry: RetryConfig,

    pub transient_status_codes: Vec<u16>,

    /// Upload a marker object on start to fail fast on bad credentials.
    pub validate_credentials: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            staging_dir: None,
            object_name_format: DEFAULT_OBJECT_NAME_FORMAT.to_string(),
            poll_interval_ms: 500,
            retry: RetryConfig::default(),
            transient_status_codes: DEFAULT_TRANSIENT_STATUS_CODES.to_vec(),
            validate_credentials: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FerryError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers < 1 {
            return Err(FerryError::InvalidWorkerCount(self.num_workers));
        }
        if self.object_name_format.is_empty() {
            return Err(FerryError::Config(
                "object_name_format must not be empty".into(),
            ));
        }
        ObjectNameFormat::parse(&self.object_name_format)?;
        if self.poll_interval_ms == 0 {
            return Err(FerryError::Config(
                "poll_interval_ms must be at least 1".into(),
            ));
        }
        if !(self.retry.multiplier.is_finite()
            && (1.0..=MAX_MULTIPLIER).contains(&self.retry.multiplier))
        {
            return Err(FerryError::Config(format!(
                "retry.multiplier must be between 1.0 and {MAX_MULTIPLIER}, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.max_retries > MAX_RETRIES_LIMIT {
            return Err(FerryError::Config(format!(
                "retry.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.retry.max_retries
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn classifier(&self) -> TransientClassifier {
        TransientClassifier::from_status_codes(self.transient_status_codes.iter().copied())
    }
}
