//! Quality Validator
//!
//! Applies every registered rule to a field → value map and folds the
//! results into a [`DataQualityReport`].
//!
//! # Scoring Algorithm
//! - `base = round(passed / total * 100)`
//! - `penalty = critical_failed * 20 + high_failed * 10 + medium_failed * 5 + low_failed * 2`
//! - `score = clamp(base - penalty, 1, 100)`
//! - `score = 0` when no rule applied
//!
//! Penalty constants come from [`ScoringConfig`] and default to the values above.
//!
//! # Example
//! ```rust,ignore
//! let validator = QualityValidator::with_defaults(&config.scoring, &config.validation)?;
//! let report = validator.validate(&data);
//! println!("Quality: {} ({} failed)", report.overall_score, report.failed);
//! ```

use super::rules::{RuleRegistry, Severity, ValidationResult};
use crate::types::DataMap;
use chrono::{DateTime, Utc};
use hpi_common::config::{ScoringConfig, ValidationConfig};
use hpi_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Per-severity score penalties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            critical: 20,
            high: 10,
            medium: 5,
            low: 2,
        }
    }
}

impl From<&ScoringConfig> for PenaltyWeights {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            critical: config.critical_penalty,
            high: config.high_penalty,
            medium: config.medium_penalty,
            low: config.low_penalty,
        }
    }
}

/// Aggregate validation outcome for one (hospital, source) collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// In `[1, 100]`, or 0 when `total_validations == 0`
    pub overall_score: u8,
    pub total_validations: usize,
    pub passed: usize,
    pub failed: usize,
    pub critical_failed: usize,
    pub high_failed: usize,
    pub medium_failed: usize,
    pub low_failed: usize,
    pub results: Vec<ValidationResult>,
}

impl DataQualityReport {
    /// Build a report from rule results, scoring with `weights`
    pub fn from_results(results: Vec<ValidationResult>, weights: &PenaltyWeights) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let count = |severity: Severity| {
            results
                .iter()
                .filter(|r| !r.passed && r.severity == severity)
                .count()
        };
        let critical_failed = count(Severity::Critical);
        let high_failed = count(Severity::High);
        let medium_failed = count(Severity::Medium);
        let low_failed = count(Severity::Low);

        let overall_score = if total == 0 {
            0
        } else {
            let base = (passed as f64 / total as f64 * 100.0).round() as i64;
            let penalty = critical_failed as i64 * weights.critical as i64
                + high_failed as i64 * weights.high as i64
                + medium_failed as i64 * weights.medium as i64
                + low_failed as i64 * weights.low as i64;
            (base - penalty).clamp(1, 100) as u8
        };

        Self {
            overall_score,
            total_validations: total,
            passed,
            failed: total - passed,
            critical_failed,
            high_failed,
            medium_failed,
            low_failed,
            results,
        }
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Fields touched by at least one failing rule
    pub fn failed_fields(&self) -> BTreeSet<String> {
        self.failed_results().map(|r| r.field.clone()).collect()
    }
}

/// Rule-registry driven validator
pub struct QualityValidator {
    registry: RuleRegistry,
    weights: PenaltyWeights,
}

impl QualityValidator {
    pub fn new(registry: RuleRegistry, weights: PenaltyWeights) -> Self {
        Self { registry, weights }
    }

    /// Default hospital rules with configured penalties and freshness limit
    pub fn with_defaults(scoring: &ScoringConfig, validation: &ValidationConfig) -> Result<Self> {
        Ok(Self::new(
            RuleRegistry::hospital_defaults(validation.max_data_age_days)?,
            PenaltyWeights::from(scoring),
        ))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn validate(&self, data: &DataMap) -> DataQualityReport {
        self.validate_at(data, Utc::now())
    }

    /// Validate with an explicit clock for freshness rules
    ///
    /// Every rule runs independently; a failing rule never stops the others.
    pub fn validate_at(&self, data: &DataMap, now: DateTime<Utc>) -> DataQualityReport {
        let results: Vec<ValidationResult> = self
            .registry
            .rules()
            .iter()
            .filter_map(|rule| rule.evaluate(data, now))
            .collect();

        let report = DataQualityReport::from_results(results, &self.weights);
        debug!(
            score = report.overall_score,
            total = report.total_validations,
            failed = report.failed,
            "Validation complete"
        );
        report
    }
}
