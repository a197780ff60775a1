//! Data quality validation
//!
//! Validation outcomes are data, never errors: a failing rule lowers the
//! source's quality score and is itemized in the report.
//!
//! # Modules
//! 1. **rules** - Rule definitions and the rule registry
//! 2. **quality_validator** - Applies a registry and scores the result

pub mod quality_validator;
pub mod rules;

pub use quality_validator::{DataQualityReport, PenaltyWeights, QualityValidator};
pub use rules::{RuleCheck, RuleKind, RuleRegistry, Severity, ValidationResult, ValidationRule};
