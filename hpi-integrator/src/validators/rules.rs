//! Validation rules and the rule registry
//!
//! A rule is a single testable constraint on one field (or, for consistency
//! and logic rules, a small set of fields). Rules are immutable once built;
//! the registry only allows adding rules with unique ids.

use crate::types::DataMap;
use chrono::{DateTime, NaiveDate, Utc};
use hpi_common::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Required,
    Range,
    Format,
    Consistency,
    Logic,
}

/// Failure severity; drives the quality-score penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Outcome of one rule against one data map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule_id: String,
    pub field: String,
    pub severity: Severity,
    pub passed: bool,
    /// Always non-empty when `passed` is false
    pub message: String,
    pub suggested_fix: Option<String>,
}

/// The check a rule performs, with its parameters
#[derive(Debug, Clone)]
pub enum RuleCheck {
    /// Field present and non-empty
    NonEmpty,
    /// Numeric value within `[min, max]`
    Range { min: f64, max: f64 },
    /// String form of the value matches `regex`
    Pattern { regex: Regex, description: String },
    /// `field ≤ factor × other_field`
    NotGreaterThan { other_field: String, factor: f64 },
    /// Every listed field present and non-empty
    RequiredSet { fields: Vec<String> },
    /// Field holds a date no older than `max_age_days`
    Freshness { max_age_days: i64 },
}

#[derive(Debug, Clone)]
pub struct ValidationRule {
    rule_id: String,
    field: String,
    kind: RuleKind,
    severity: Severity,
    check: RuleCheck,
}

impl ValidationRule {
    pub fn required(rule_id: &str, field: &str, severity: Severity) -> Self {
        Self::build(rule_id, field, RuleKind::Required, severity, RuleCheck::NonEmpty)
    }

    pub fn range(rule_id: &str, field: &str, min: f64, max: f64, severity: Severity) -> Self {
        Self::build(
            rule_id,
            field,
            RuleKind::Range,
            severity,
            RuleCheck::Range { min, max },
        )
    }

    /// Regex format rule; an invalid pattern is rejected
    pub fn format(
        rule_id: &str,
        field: &str,
        pattern: &str,
        description: &str,
        severity: Severity,
    ) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidInput(format!("rule {}: bad pattern: {}", rule_id, e)))?;
        Ok(Self::build(
            rule_id,
            field,
            RuleKind::Format,
            severity,
            RuleCheck::Pattern {
                regex,
                description: description.to_string(),
            },
        ))
    }

    /// Cross-field rule: `field ≤ factor × other_field`
    pub fn not_greater_than(
        rule_id: &str,
        field: &str,
        other_field: &str,
        factor: f64,
        severity: Severity,
    ) -> Self {
        Self::build(
            rule_id,
            field,
            RuleKind::Consistency,
            severity,
            RuleCheck::NotGreaterThan {
                other_field: other_field.to_string(),
                factor,
            },
        )
    }

    pub fn required_set(rule_id: &str, fields: &[&str], severity: Severity) -> Self {
        Self::build(
            rule_id,
            "required_fields",
            RuleKind::Logic,
            severity,
            RuleCheck::RequiredSet {
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        )
    }

    pub fn freshness(rule_id: &str, field: &str, max_age_days: i64, severity: Severity) -> Self {
        Self::build(
            rule_id,
            field,
            RuleKind::Logic,
            severity,
            RuleCheck::Freshness { max_age_days },
        )
    }

    fn build(
        rule_id: &str,
        field: &str,
        kind: RuleKind,
        severity: Severity,
        check: RuleCheck,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            field: field.to_string(),
            kind,
            severity,
            check,
        }
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn check(&self) -> &RuleCheck {
        &self.check
    }

    /// Evaluate against `data`
    ///
    /// Returns `None` when the rule does not apply: optional fields that are
    /// absent are not counted against the source.
    pub fn evaluate(&self, data: &DataMap, now: DateTime<Utc>) -> Option<ValidationResult> {
        let value = data.get(&self.field).filter(|v| !is_empty(v));

        let failure: Option<String> = match &self.check {
            RuleCheck::NonEmpty => match value {
                Some(_) => None,
                None => Some(format!("{} is missing or empty", self.field)),
            },
            RuleCheck::Range { min, max } => {
                let value = value?;
                match as_f64(value) {
                    Some(n) if n >= *min && n <= *max => None,
                    Some(n) => Some(format!(
                        "{} = {} is outside [{}, {}]",
                        self.field, n, min, max
                    )),
                    None => Some(format!("{} is not numeric: {}", self.field, value)),
                }
            }
            RuleCheck::Pattern { regex, description } => {
                let text = as_text(value?);
                if regex.is_match(&text) {
                    None
                } else {
                    Some(format!(
                        "{} = '{}' is not a valid {}",
                        self.field, text, description
                    ))
                }
            }
            RuleCheck::NotGreaterThan {
                other_field,
                factor,
            } => {
                let own = as_f64(value?)?;
                let other = data.get(other_field).and_then(as_f64)?;
                let limit = other * factor;
                if own <= limit {
                    None
                } else {
                    Some(format!(
                        "{} ({}) exceeds {} × {} ({})",
                        self.field, own, factor, other_field, limit
                    ))
                }
            }
            RuleCheck::RequiredSet { fields } => {
                let missing = missing_fields(data, fields);
                if missing.is_empty() {
                    None
                } else {
                    Some(format!("missing required fields: {}", missing.join(", ")))
                }
            }
            RuleCheck::Freshness { max_age_days } => {
                let value = value?;
                match parse_timestamp(value) {
                    Some(ts) => {
                        let age_days = (now - ts).num_days();
                        if age_days <= *max_age_days {
                            None
                        } else {
                            Some(format!(
                                "{} is {} days old (limit {} days)",
                                self.field, age_days, max_age_days
                            ))
                        }
                    }
                    None => Some(format!("{} is not a recognizable date: {}", self.field, value)),
                }
            }
        };

        let passed = failure.is_none();
        let suggested_fix = if passed {
            None
        } else {
            Some(self.suggested_fix(data))
        };

        Some(ValidationResult {
            rule_id: self.rule_id.clone(),
            field: self.field.clone(),
            severity: self.severity,
            passed,
            message: failure.unwrap_or_else(|| "passed".to_string()),
            suggested_fix,
        })
    }

    /// Deterministic remediation text from the rule's kind and parameters
    fn suggested_fix(&self, data: &DataMap) -> String {
        match &self.check {
            RuleCheck::NonEmpty => format!("Provide a non-empty value for {}", self.field),
            RuleCheck::Range { min, max } => format!(
                "{} value should be between {} and {}",
                self.field, min, max
            ),
            RuleCheck::Pattern { regex, description } => format!(
                "{} should be a valid {} matching pattern {}",
                self.field,
                description,
                regex.as_str()
            ),
            RuleCheck::NotGreaterThan {
                other_field,
                factor,
            } => {
                if (*factor - 1.0).abs() < f64::EPSILON {
                    format!("{} should not exceed {}", self.field, other_field)
                } else {
                    format!(
                        "{} should not exceed {} times {}",
                        self.field, factor, other_field
                    )
                }
            }
            RuleCheck::RequiredSet { fields } => format!(
                "Supply the missing fields: {}",
                missing_fields(data, fields).join(", ")
            ),
            RuleCheck::Freshness { max_age_days } => format!(
                "Refresh the data; {} must be within the last {} days",
                self.field, max_age_days
            ),
        }
    }
}

/// Ordered collection of rules with unique ids
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<ValidationRule>,
    ids: HashSet<String>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule; duplicate ids are rejected
    pub fn register(&mut self, rule: ValidationRule) -> Result<()> {
        if !self.ids.insert(rule.rule_id.clone()) {
            return Err(Error::InvalidInput(format!(
                "validation rule '{}' already registered",
                rule.rule_id
            )));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Built-in rules for hospital performance data
    pub fn hospital_defaults(max_data_age_days: i64) -> Result<Self> {
        use Severity::*;

        let mut registry = Self::new();
        let rules = vec![
            // Required
            ValidationRule::required("req_hospital_id", "hospital_id", Critical),
            ValidationRule::required("req_hospital_name", "hospital_name", High),
            // Range
            ValidationRule::range("range_bed_occupancy", "bed_occupancy_rate", 0.0, 100.0, High),
            ValidationRule::range("range_total_beds", "total_beds", 1.0, 10_000.0, High),
            ValidationRule::range("range_icu_beds", "icu_beds", 0.0, 5_000.0, Medium),
            ValidationRule::range("range_alos", "average_length_of_stay", 0.0, 365.0, Medium),
            ValidationRule::range(
                "range_patient_satisfaction",
                "patient_satisfaction_score",
                0.0,
                100.0,
                Medium,
            ),
            ValidationRule::range("range_mortality", "mortality_rate", 0.0, 100.0, High),
            ValidationRule::range("range_readmission", "readmission_rate", 0.0, 100.0, Medium),
            ValidationRule::range("range_total_revenue", "total_revenue", 0.0, 1.0e13, Medium),
            ValidationRule::range("range_operating_costs", "operating_costs", 0.0, 1.0e13, Medium),
            // Format
            ValidationRule::format("fmt_pincode", "pincode", r"^\d{6}$", "6-digit PIN code", Low)?,
            ValidationRule::format(
                "fmt_phone",
                "phone",
                r"^(\+91[\-\s]?)?[6-9]\d{9}$",
                "10-digit Indian phone number",
                Low,
            )?,
            ValidationRule::format(
                "fmt_email",
                "email",
                r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$",
                "email address",
                Low,
            )?,
            // Consistency
            ValidationRule::not_greater_than(
                "cons_scheme_revenue",
                "scheme_revenue",
                "total_revenue",
                1.0,
                High,
            ),
            ValidationRule::not_greater_than(
                "cons_operating_costs",
                "operating_costs",
                "total_revenue",
                3.0,
                Medium,
            ),
            ValidationRule::not_greater_than("cons_icu_beds", "icu_beds", "total_beds", 1.0, High),
            // Logic
            ValidationRule::required_set(
                "logic_core_fields",
                &["hospital_name", "city", "total_beds"],
                Medium,
            ),
            ValidationRule::freshness("logic_freshness", "last_updated", max_data_age_days, Low),
        ];

        for rule in rules {
            registry.register(rule)?;
        }
        Ok(registry)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn missing_fields(data: &DataMap, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| data.get(f.as_str()).map_or(true, is_empty))
        .cloned()
        .collect()
}

/// Numeric view of a JSON value (numbers and numeric strings)
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
