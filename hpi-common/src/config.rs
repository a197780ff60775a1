//! Configuration loading and config-file resolution
//!
//! Bootstrap configuration is a single TOML file. Every section and every key is
//! optional; missing keys fall back to built-in defaults so an empty (or absent)
//! file yields a working configuration.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `HPI_CONFIG` environment variable
//! 3. `~/.config/hpi/config.toml`
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HPI_CONFIG";

/// Top-level bootstrap configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HpiConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Orchestrator scheduling and retention settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of hospital plans executing at once during a batch
    pub max_concurrent_plans: usize,
    /// Failed attempts allowed per task before it is permanently failed
    pub max_retries: u32,
    /// First retry backoff; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Upper bound for retry backoff
    pub retry_max_delay_ms: u64,
    /// Advisory offset between consecutive task schedule times
    pub stagger_minutes: i64,
    /// Age after which finished plans are archived by cleanup
    pub plan_retention_hours: i64,
    /// Age past archival after which archived plans are purged for good
    pub archive_retention_hours: i64,
    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_plans: 5,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            stagger_minutes: 2,
            plan_retention_hours: 24,
            archive_retention_hours: 168,
            event_capacity: 1000,
        }
    }
}

/// Hand-tuned scoring constants
///
/// Quality penalties are subtracted per failed rule of the given severity.
/// Readiness points are awarded per category when its fields are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub critical_penalty: u32,
    pub high_penalty: u32,
    pub medium_penalty: u32,
    pub low_penalty: u32,
    pub performance_points: f64,
    pub financial_points: f64,
    pub quality_points: f64,
    pub scheme_points: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_penalty: 20,
            high_penalty: 10,
            medium_penalty: 5,
            low_penalty: 2,
            performance_points: 40.0,
            financial_points: 30.0,
            quality_points: 20.0,
            scheme_points: 10.0,
        }
    }
}

/// Validation rule parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum age of `last_updated` before the freshness rule fails
    pub max_data_age_days: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_data_age_days: 90,
        }
    }
}

/// Per-source collector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorsConfig {
    pub government: CollectorConfig,
    pub hms: CollectorConfig,
    pub partner: CollectorConfig,
    pub analytics: CollectorConfig,
    pub survey: CollectorConfig,
}

/// Settings for one source collector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Disabled collectors are not registered, except Government and Survey,
    /// which every plan includes
    pub enabled: bool,
    /// Base URL of the JSON endpoint; `None` means offline/fixture mode
    pub base_url: Option<String>,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Advisory minimum interval between calls for the same hospital
    pub min_interval_ms: u64,
    /// Hospitals covered by this source (partner network membership)
    pub covered_hospitals: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            min_interval_ms: 1000,
            covered_hospitals: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve which config file (if any) should be loaded
///
/// Returns `None` when no explicit file was requested and the per-user default
/// does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|p| p.exists())
}

/// `~/.config/hpi/config.toml` (platform config dir)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hpi").join("config.toml"))
}

/// Load configuration from a TOML file
///
/// A missing file yields defaults with a warning; a file that exists but does
/// not parse is a configuration error.
pub fn load_config(path: &Path) -> Result<HpiConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(HpiConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: HpiConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    config.validate()?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Resolve and load configuration in one step
pub fn load_resolved(cli_arg: Option<&Path>) -> Result<HpiConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => load_config(&path),
        None => {
            info!("No config file found, using built-in defaults");
            Ok(HpiConfig::default())
        }
    }
}

impl HpiConfig {
    /// Reject values that would stall or break the orchestrator
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent_plans == 0 {
            return Err(Error::Config(
                "orchestrator.max_concurrent_plans must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.max_retries == 0 {
            return Err(Error::Config(
                "orchestrator.max_retries must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.retry_base_delay_ms > self.orchestrator.retry_max_delay_ms {
            return Err(Error::Config(
                "orchestrator.retry_base_delay_ms exceeds retry_max_delay_ms".to_string(),
            ));
        }
        let points = [
            self.scoring.performance_points,
            self.scoring.financial_points,
            self.scoring.quality_points,
            self.scoring.scheme_points,
        ];
        if points.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(Error::Config(
                "scoring readiness points must be finite and non-negative".to_string(),
            ));
        }
        if self.orchestrator.plan_retention_hours < 0
            || self.orchestrator.archive_retention_hours < 0
        {
            return Err(Error::Config(
                "orchestrator retention windows must not be negative".to_string(),
            ));
        }
        if self.validation.max_data_age_days <= 0 {
            return Err(Error::Config(
                "validation.max_data_age_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
