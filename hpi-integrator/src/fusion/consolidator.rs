//! Consolidator
//!
//! Merges per-source validated, enriched data into one [`ConsolidatedProfile`].
//!
//! # Merge Strategy
//! Sources are applied in the fixed order Government → HMS → Partner →
//! Analytics → Survey; a later source overwrites a field set by an earlier
//! one. The order of the input slice is irrelevant. Derived metrics are
//! recomputed on the merged map so they always reflect the winning inputs.
//!
//! # Scores
//! - **completeness** = essential fields present / essential fields defined × 100
//! - **benchmark_readiness** = sum of category points whose constituent fields
//!   are all present, capped at 100

use super::enricher::{Enricher, DERIVED_FIELDS};
use crate::error::ConsolidationError;
use crate::types::{DataMap, HospitalDescriptor, SourceKind};
use chrono::{DateTime, Utc};
use hpi_common::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Fields that define a benchmark-complete profile
pub const ESSENTIAL_FIELDS: [&str; 8] = [
    "total_beds",
    "bed_occupancy_rate",
    "average_length_of_stay",
    "total_revenue",
    "operating_costs",
    "patient_satisfaction_score",
    "mortality_rate",
    "readmission_rate",
];

const PERFORMANCE_FIELDS: &[&str] = &["bed_occupancy_rate", "average_length_of_stay", "total_beds"];
const FINANCIAL_FIELDS: &[&str] = &["total_revenue", "operating_costs"];
const QUALITY_FIELDS: &[&str] = &["patient_satisfaction_score", "readmission_rate"];
const SCHEME_FIELDS: &[&str] = &["scheme_revenue"];

/// Points awarded per readiness category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessWeights {
    pub performance: f64,
    pub financial: f64,
    pub quality: f64,
    pub scheme: f64,
}

impl Default for ReadinessWeights {
    fn default() -> Self {
        Self {
            performance: 40.0,
            financial: 30.0,
            quality: 20.0,
            scheme: 10.0,
        }
    }
}

impl From<&ScoringConfig> for ReadinessWeights {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            performance: config.performance_points,
            financial: config.financial_points,
            quality: config.quality_points,
            scheme: config.scheme_points,
        }
    }
}

/// Profile category a field is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    BasicInfo,
    Performance,
    Financial,
    Quality,
    GovernmentSchemes,
    Additional,
}

impl FieldCategory {
    pub fn of(field: &str) -> Self {
        match field {
            "hospital_id" | "hospital_name" | "city" | "city_tier" | "state" | "district"
            | "pincode" | "address" | "hospital_type" | "specialties" | "phone" | "email"
            | "website" | "accreditation" | "established_year" | "last_updated" => Self::BasicInfo,
            "total_beds" | "icu_beds" | "bed_occupancy_rate" | "average_length_of_stay"
            | "patient_admissions" | "outpatient_visits" | "surgeries_performed"
            | "icu_bed_ratio" => Self::Performance,
            "total_revenue" | "operating_costs" | "profit_margin" | "revenue_per_bed" => {
                Self::Financial
            }
            "patient_satisfaction_score" | "mortality_rate" | "readmission_rate"
            | "infection_rate" => Self::Quality,
            "scheme_revenue" | "government_scheme_dependency" | "pmjay_patients"
            | "cghs_empanelled" | "esi_empanelled" | "schemes" => Self::GovernmentSchemes,
            _ => Self::Additional,
        }
    }
}

/// One source's validated data, ready to merge
#[derive(Debug, Clone, PartialEq)]
pub struct SourceContribution {
    pub source: SourceKind,
    pub data: DataMap,
}

impl SourceContribution {
    pub fn new(source: SourceKind, data: DataMap) -> Self {
        Self { source, data }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileQuality {
    /// Percentage in `[0, 100]`
    pub completeness: f64,
    pub essential_present: usize,
    pub essential_total: usize,
    pub source_count: usize,
}

/// Unified hospital record after merging all sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedProfile {
    pub hospital_id: String,
    pub hospital_name: String,
    pub basic_info: DataMap,
    pub performance: DataMap,
    pub financial: DataMap,
    pub quality: DataMap,
    pub government_schemes: DataMap,
    pub additional: DataMap,
    /// Winning source per merged (non-derived) field
    pub field_sources: BTreeMap<String, SourceKind>,
    /// Contributing sources in merge order
    pub sources: Vec<SourceKind>,
    pub data_quality: ProfileQuality,
    pub benchmark_readiness: f64,
    pub consolidated_at: DateTime<Utc>,
}

impl ConsolidatedProfile {
    /// Look a field up in whichever category holds it
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.category(FieldCategory::of(field)).get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn category(&self, category: FieldCategory) -> &DataMap {
        match category {
            FieldCategory::BasicInfo => &self.basic_info,
            FieldCategory::Performance => &self.performance,
            FieldCategory::Financial => &self.financial,
            FieldCategory::Quality => &self.quality,
            FieldCategory::GovernmentSchemes => &self.government_schemes,
            FieldCategory::Additional => &self.additional,
        }
    }

    /// All fields flattened back into one map
    pub fn flatten(&self) -> DataMap {
        [
            &self.basic_info,
            &self.performance,
            &self.financial,
            &self.quality,
            &self.government_schemes,
            &self.additional,
        ]
        .into_iter()
        .flat_map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect()
    }

    fn category_mut(&mut self, category: FieldCategory) -> &mut DataMap {
        match category {
            FieldCategory::BasicInfo => &mut self.basic_info,
            FieldCategory::Performance => &mut self.performance,
            FieldCategory::Financial => &mut self.financial,
            FieldCategory::Quality => &mut self.quality,
            FieldCategory::GovernmentSchemes => &mut self.government_schemes,
            FieldCategory::Additional => &mut self.additional,
        }
    }
}

pub struct Consolidator {
    enricher: Enricher,
    weights: ReadinessWeights,
}

impl Consolidator {
    pub fn new(enricher: Enricher, weights: ReadinessWeights) -> Self {
        Self { enricher, weights }
    }

    pub fn from_config(scoring: &ScoringConfig) -> Self {
        Self::new(Enricher::new(), ReadinessWeights::from(scoring))
    }

    /// Merge contributions into one profile
    pub fn consolidate(
        &self,
        hospital: &HospitalDescriptor,
        contributions: &[SourceContribution],
    ) -> Result<ConsolidatedProfile, ConsolidationError> {
        if contributions.is_empty() {
            return Err(ConsolidationError::NoSourceData);
        }

        let mut ordered: Vec<&SourceContribution> = contributions.iter().collect();
        ordered.sort_by_key(|c| c.source.merge_rank());

        let mut merged = DataMap::new();
        let mut field_sources = BTreeMap::new();
        let mut sources = Vec::new();

        for contribution in ordered {
            if let Some(found) = contribution.data.get("hospital_id").and_then(Value::as_str) {
                if !hospital.matches_id(found) {
                    return Err(ConsolidationError::HospitalMismatch {
                        source_kind: contribution.source.to_string(),
                        expected: hospital.id.clone(),
                        found: found.to_string(),
                    });
                }
            }

            for (field, value) in &contribution.data {
                if DERIVED_FIELDS.contains(&field.as_str()) || value.is_null() {
                    continue;
                }
                merged.insert(field.clone(), value.clone());
                field_sources.insert(field.clone(), contribution.source);
            }
            if !sources.contains(&contribution.source) {
                sources.push(contribution.source);
            }
        }

        self.enricher.derive_metrics(&mut merged);

        let essential_present = ESSENTIAL_FIELDS
            .iter()
            .filter(|f| merged.contains_key(**f))
            .count();
        let completeness = essential_present as f64 / ESSENTIAL_FIELDS.len() as f64 * 100.0;
        let benchmark_readiness = self.readiness(&merged);

        let mut profile = ConsolidatedProfile {
            hospital_id: hospital.id.clone(),
            hospital_name: merged
                .get("hospital_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| hospital.name.clone()),
            basic_info: DataMap::new(),
            performance: DataMap::new(),
            financial: DataMap::new(),
            quality: DataMap::new(),
            government_schemes: DataMap::new(),
            additional: DataMap::new(),
            field_sources,
            data_quality: ProfileQuality {
                completeness: (completeness * 100.0).round() / 100.0,
                essential_present,
                essential_total: ESSENTIAL_FIELDS.len(),
                source_count: sources.len(),
            },
            sources,
            benchmark_readiness,
            consolidated_at: Utc::now(),
        };
        for (field, value) in merged {
            profile
                .category_mut(FieldCategory::of(&field))
                .insert(field, value);
        }

        debug!(
            hospital_id = %profile.hospital_id,
            sources = profile.sources.len(),
            completeness = profile.data_quality.completeness,
            readiness = profile.benchmark_readiness,
            "Consolidated hospital profile"
        );

        Ok(profile)
    }

    fn readiness(&self, data: &DataMap) -> f64 {
        let has_all = |fields: &[&str]| fields.iter().all(|f| data.contains_key(*f));
        let mut points = 0.0;
        if has_all(PERFORMANCE_FIELDS) {
            points += self.weights.performance;
        }
        if has_all(FINANCIAL_FIELDS) {
            points += self.weights.financial;
        }
        if has_all(QUALITY_FIELDS) {
            points += self.weights.quality;
        }
        if has_all(SCHEME_FIELDS) {
            points += self.weights.scheme;
        }
        points.min(100.0)
    }
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new(Enricher::new(), ReadinessWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contribution(source: SourceKind, value: Value) -> SourceContribution {
        SourceContribution::new(source, serde_json::from_value(value).unwrap())
    }

    fn hospital() -> HospitalDescriptor {
        HospitalDescriptor::new("H-1", "City Care")
    }

    #[test]
    fn test_later_source_wins() {
        let profile = Consolidator::default()
            .consolidate(
                &hospital(),
                &[
                    contribution(SourceKind::Survey, json!({ "total_beds": 120 })),
                    contribution(SourceKind::GovernmentApi, json!({ "total_beds": 100, "city": "Pune" })),
                ],
            )
            .unwrap();

        assert_eq!(profile.get("total_beds"), Some(&json!(120)));
        assert_eq!(profile.field_sources["total_beds"], SourceKind::Survey);
        assert_eq!(profile.field_sources["city"], SourceKind::GovernmentApi);
        assert_eq!(profile.sources, vec![SourceKind::GovernmentApi, SourceKind::Survey]);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = contribution(SourceKind::HmsApi, json!({ "total_revenue": 500.0, "total_beds": 5 }));
        let b = contribution(SourceKind::PartnerNetwork, json!({ "total_revenue": 900.0 }));
        let consolidator = Consolidator::default();

        let forward = consolidator
            .consolidate(&hospital(), &[a.clone(), b.clone()])
            .unwrap();
        let backward = consolidator.consolidate(&hospital(), &[b, a]).unwrap();

        assert_eq!(forward.flatten(), backward.flatten());
        assert_eq!(forward.get("revenue_per_bed"), Some(&json!(180.0)));
    }

    #[test]
    fn test_completeness_and_readiness() {
        let profile = Consolidator::default()
            .consolidate(
                &hospital(),
                &[contribution(
                    SourceKind::HmsApi,
                    json!({
                        "total_beds": 200,
                        "bed_occupancy_rate": 80.0,
                        "average_length_of_stay": 4.2,
                        "total_revenue": 1.0e8,
                        "operating_costs": 8.0e7,
                        "scheme_revenue": 2.0e7,
                    }),
                )],
            )
            .unwrap();

        assert_eq!(profile.data_quality.essential_present, 5);
        assert_eq!(profile.data_quality.completeness, 62.5);
        // performance + financial + scheme, no quality fields
        assert_eq!(profile.benchmark_readiness, 80.0);
        assert_eq!(profile.get("profit_margin"), Some(&json!(20.0)));
        assert!(profile.financial.contains_key("profit_margin"));
    }

    #[test]
    fn test_readiness_capped_at_100() {
        let consolidator = Consolidator::new(
            Enricher::new(),
            ReadinessWeights {
                performance: 90.0,
                financial: 90.0,
                quality: 0.0,
                scheme: 0.0,
            },
        );
        let profile = consolidator
            .consolidate(
                &hospital(),
                &[contribution(
                    SourceKind::GovernmentApi,
                    json!({
                        "total_beds": 10,
                        "bed_occupancy_rate": 50,
                        "average_length_of_stay": 3,
                        "total_revenue": 10,
                        "operating_costs": 5,
                    }),
                )],
            )
            .unwrap();
        assert_eq!(profile.benchmark_readiness, 100.0);
    }

    #[test]
    fn test_empty_input_is_error() {
        assert_eq!(
            Consolidator::default().consolidate(&hospital(), &[]),
            Err(ConsolidationError::NoSourceData)
        );
    }

    #[test]
    fn test_foreign_hospital_data_rejected() {
        let result = Consolidator::default().consolidate(
            &hospital(),
            &[contribution(SourceKind::HmsApi, json!({ "hospital_id": "H-2" }))],
        );
        assert!(matches!(
            result,
            Err(ConsolidationError::HospitalMismatch { .. })
        ));

        let case_variant = Consolidator::default().consolidate(
            &hospital(),
            &[contribution(SourceKind::HmsApi, json!({ "hospital_id": "h-1" }))],
        );
        assert!(case_variant.is_ok());
    }
}
