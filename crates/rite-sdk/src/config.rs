use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rite_ledger::layout::{DEFAULT_CONTROL_DIR, DEFAULT_LOCKFILE};
use rite_ledger::ControlLayout;
use rite_store::jail::{self, DEFAULT_MAX_PAYLOAD_BYTES};
use rite_store::RetryPolicy;

use crate::error::{SdkError, SdkResult};

/// Name of the configuration file inside the default control directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Project configuration.
///
/// Read from `<root>/.scaffold/config.toml` when present. Every field is
/// optional in the file and falls back to its default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiteConfig {
    /// Control-metadata directory, relative to the project root.
    pub control_dir: String,
    /// Live-state (`HEAD`) manifest file, relative to the project root.
    pub lockfile: String,
    /// Largest payload a single write may carry.
    pub max_payload_bytes: u64,
    pub retry: RetryConfig,
    pub lock: LockConfig,
    /// Extra paths the post-undo cleanup must never touch.
    pub protected_paths: Vec<String>,
    /// Actor recorded on every ledger entry.
    pub actor: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for RiteConfig {
    fn default() -> Self {
        Self {
            control_dir: DEFAULT_CONTROL_DIR.to_string(),
            lockfile: DEFAULT_LOCKFILE.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            retry: RetryConfig::default(),
            lock: LockConfig::default(),
            protected_paths: Vec::new(),
            actor: "rite".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 30_000,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RiteConfig {
    /// Load the configuration for the project at `root`, or the defaults if
    /// it has no config file.
    pub fn load(root: &Path) -> SdkResult<Self> {
        let path = root.join(DEFAULT_CONTROL_DIR).join(CONFIG_FILE);
        if !path.is_file() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&text)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SdkResult<()> {
        for (field, value) in [("control_dir", &self.control_dir), ("lockfile", &self.lockfile)] {
            let normalized = jail::normalize(value)
                .map_err(|e| SdkError::Config(format!("{field}: {e}")))?;
            if normalized.is_empty() {
                return Err(SdkError::Config(format!("{field} must name a path")));
            }
        }
        if jail::is_within(&self.lockfile, &self.control_dir) {
            return Err(SdkError::Config(
                "lockfile must live outside the control directory".into(),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(SdkError::Config("max_payload_bytes must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SdkError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn layout(&self) -> ControlLayout {
        ControlLayout::new(&self.control_dir, &self.lockfile)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_backoff_ms),
        )
    }
}
