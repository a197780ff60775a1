//! Enricher
//!
//! Standardizes raw source data and derives metrics from fields that are
//! already present.
//!
//! # Standardization
//! - Field-name synonyms collapse onto canonical names (`beds` → `total_beds`)
//! - Revenue reported in crores/lakhs is converted to rupees
//! - Numeric strings become numbers; fractional occupancy becomes a percentage
//! - City tier is inferred from the city name when not reported
//! - Hospital type and specialty names are normalized
//!
//! # Derived Metrics
//! | Field | Formula | Precondition |
//! |---|---|---|
//! | `profit_margin` | `(revenue - costs) / revenue * 100` | revenue > 0, costs present |
//! | `revenue_per_bed` | `revenue / beds` | revenue > 0, beds > 0 |
//! | `government_scheme_dependency` | `scheme_revenue / revenue * 100` | revenue > 0, scheme revenue present |
//! | `icu_bed_ratio` | `icu_beds / beds * 100` | beds > 0, ICU beds present |
//!
//! A metric whose precondition fails is absent from the output, never zero.
//! Derivation only reads source fields and always rewrites derived ones, so
//! enriching enriched data yields the same derived values.

use crate::types::{CityTier, DataMap};
use crate::validators::rules::as_f64;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::trace;

/// Fields computed by [`Enricher::derive_metrics`]; never accepted from sources
pub const DERIVED_FIELDS: [&str; 4] = [
    "profit_margin",
    "revenue_per_bed",
    "government_scheme_dependency",
    "icu_bed_ratio",
];

/// Source field name → canonical field name
const FIELD_SYNONYMS: &[(&str, &str)] = &[
    ("name", "hospital_name"),
    ("hospital", "hospital_name"),
    ("id", "hospital_id"),
    ("beds", "total_beds"),
    ("bed_count", "total_beds"),
    ("bed_capacity", "total_beds"),
    ("icu_bed_count", "icu_beds"),
    ("revenue", "total_revenue"),
    ("annual_revenue", "total_revenue"),
    ("costs", "operating_costs"),
    ("expenses", "operating_costs"),
    ("operating_expenses", "operating_costs"),
    ("occupancy", "bed_occupancy_rate"),
    ("occupancy_rate", "bed_occupancy_rate"),
    ("alos", "average_length_of_stay"),
    ("avg_length_of_stay", "average_length_of_stay"),
    ("satisfaction_score", "patient_satisfaction_score"),
    ("patient_satisfaction", "patient_satisfaction_score"),
    ("pmjay_revenue", "scheme_revenue"),
    ("scheme_income", "scheme_revenue"),
    ("government_scheme_revenue", "scheme_revenue"),
    ("pin", "pincode"),
    ("pin_code", "pincode"),
    ("postal_code", "pincode"),
    ("contact_phone", "phone"),
    ("contact_email", "email"),
    ("type", "hospital_type"),
    ("specialities", "specialties"),
];

/// Fields that must hold numbers after standardization
const NUMERIC_FIELDS: &[&str] = &[
    "total_beds",
    "icu_beds",
    "bed_occupancy_rate",
    "average_length_of_stay",
    "patient_admissions",
    "outpatient_visits",
    "total_revenue",
    "operating_costs",
    "scheme_revenue",
    "patient_satisfaction_score",
    "mortality_rate",
    "readmission_rate",
    "infection_rate",
];

/// Alternate revenue units → multiplier to rupees
const REVENUE_UNITS: &[(&str, f64)] = &[("revenue_crores", 1.0e7), ("revenue_lakhs", 1.0e5)];

const TIER_1_CITIES: &[&str] = &[
    "mumbai",
    "delhi",
    "new delhi",
    "bangalore",
    "bengaluru",
    "chennai",
    "kolkata",
    "hyderabad",
    "pune",
    "ahmedabad",
];

const TIER_2_CITIES: &[&str] = &[
    "jaipur",
    "lucknow",
    "kanpur",
    "nagpur",
    "indore",
    "thane",
    "bhopal",
    "visakhapatnam",
    "patna",
    "vadodara",
    "ludhiana",
    "agra",
    "nashik",
    "coimbatore",
    "kochi",
    "madurai",
    "surat",
    "chandigarh",
    "mysore",
    "mysuru",
    "bhubaneswar",
    "guwahati",
    "dehradun",
];

const HOSPITAL_TYPES: &[(&str, &str)] = &[
    ("multi-speciality", "multi_specialty"),
    ("multi speciality", "multi_specialty"),
    ("multispeciality", "multi_specialty"),
    ("multi-specialty", "multi_specialty"),
    ("multi specialty", "multi_specialty"),
    ("multi_specialty", "multi_specialty"),
    ("super speciality", "super_specialty"),
    ("super-speciality", "super_specialty"),
    ("super specialty", "super_specialty"),
    ("super-specialty", "super_specialty"),
    ("super_specialty", "super_specialty"),
    ("govt", "government"),
    ("government", "government"),
    ("public", "government"),
    ("private", "private"),
    ("corporate", "private"),
    ("trust", "trust"),
    ("charitable", "trust"),
    ("ngo", "trust"),
    ("clinic", "clinic"),
    ("nursing home", "clinic"),
];

const SPECIALTIES: &[(&str, &str)] = &[
    ("cardio", "cardiology"),
    ("cardiac", "cardiology"),
    ("heart", "cardiology"),
    ("ortho", "orthopedics"),
    ("orthopaedics", "orthopedics"),
    ("neuro", "neurology"),
    ("onco", "oncology"),
    ("cancer", "oncology"),
    ("paeds", "pediatrics"),
    ("paediatrics", "pediatrics"),
    ("gynae", "gynecology"),
    ("obgyn", "obstetrics_gynecology"),
    ("ob/gyn", "obstetrics_gynecology"),
    ("ent", "otorhinolaryngology"),
    ("nephro", "nephrology"),
    ("gastro", "gastroenterology"),
    ("general medicine", "general_medicine"),
    ("general surgery", "general_surgery"),
];

/// Stateless field standardizer and metric deriver
#[derive(Debug, Clone, Copy, Default)]
pub struct Enricher;

impl Enricher {
    pub fn new() -> Self {
        Self
    }

    /// Standardize then derive metrics
    pub fn enrich(&self, raw: &DataMap) -> DataMap {
        let mut data = self.standardize(raw);
        self.derive_metrics(&mut data);
        data
    }

    /// Canonical names, units and vocabularies; derived fields are dropped
    pub fn standardize(&self, raw: &DataMap) -> DataMap {
        let mut data = DataMap::new();

        // Canonical keys first so they win over synonyms
        for (key, value) in raw {
            let key = normalize_key(key);
            if canonical_name(&key).is_none() && !DERIVED_FIELDS.contains(&key.as_str()) {
                data.insert(key, value.clone());
            }
        }
        for (key, value) in raw {
            if let Some(canonical) = canonical_name(&normalize_key(key)) {
                data.entry(canonical.to_string())
                    .or_insert_with(|| value.clone());
            }
        }

        for (unit_field, multiplier) in REVENUE_UNITS {
            if let Some(value) = data.remove(*unit_field) {
                if !data.contains_key("total_revenue") {
                    if let Some(amount) = as_f64(&value) {
                        data.insert("total_revenue".into(), number(amount * multiplier));
                    }
                }
            }
        }

        for field in NUMERIC_FIELDS {
            if let Some(value) = data.get_mut(*field).filter(|v| v.is_string()) {
                if let Some(n) = as_f64(value) {
                    *value = number(n);
                }
            }
        }

        if let Some(value) = data.get_mut("bed_occupancy_rate") {
            if let Some(rate) = as_f64(value) {
                if rate > 0.0 && rate < 1.0 {
                    *value = number(round2(rate * 100.0));
                }
            }
        }

        if !data.contains_key("city_tier") {
            if let Some(city) = data.get("city").and_then(Value::as_str) {
                let tier = infer_city_tier(city);
                data.insert("city_tier".into(), json!(tier.as_str()));
            }
        }

        if let Some(kind) = data.get("hospital_type").and_then(Value::as_str) {
            let normalized = normalize_hospital_type(kind);
            data.insert("hospital_type".into(), json!(normalized));
        }

        if let Some(value) = data.get("specialties") {
            if let Some(list) = normalize_specialties(value) {
                data.insert("specialties".into(), json!(list));
            }
        }

        trace!(fields = data.len(), "Standardized source data");
        data
    }

    /// Derived metrics `data` supports on its own, without the source fields
    pub fn source_metrics(&self, data: &DataMap) -> DataMap {
        let mut enriched = data.clone();
        self.derive_metrics(&mut enriched);
        enriched
            .into_iter()
            .filter(|(field, _)| DERIVED_FIELDS.contains(&field.as_str()))
            .collect()
    }

    /// Recompute every derived metric from the source fields in `data`
    pub fn derive_metrics(&self, data: &mut DataMap) {
        for field in DERIVED_FIELDS {
            data.remove(field);
        }

        let get = |field: &str| data.get(field).and_then(as_f64);
        let revenue = get("total_revenue").filter(|r| *r > 0.0);
        let costs = get("operating_costs");
        let beds = get("total_beds").filter(|b| *b > 0.0);
        let scheme = get("scheme_revenue");
        let icu = get("icu_beds");

        let mut derived = Vec::new();
        if let (Some(revenue), Some(costs)) = (revenue, costs) {
            derived.push(("profit_margin", (revenue - costs) / revenue * 100.0));
        }
        if let (Some(revenue), Some(beds)) = (revenue, beds) {
            derived.push(("revenue_per_bed", revenue / beds));
        }
        if let (Some(revenue), Some(scheme)) = (revenue, scheme) {
            derived.push(("government_scheme_dependency", scheme / revenue * 100.0));
        }
        if let (Some(beds), Some(icu)) = (beds, icu) {
            derived.push(("icu_bed_ratio", icu / beds * 100.0));
        }

        for (field, value) in derived {
            data.insert(field.to_string(), number(round2(value)));
        }
    }
}

/// Tier for an Indian city name; unknown cities are Tier 3
pub fn infer_city_tier(city: &str) -> CityTier {
    let city = city.trim().to_lowercase();
    if TIER_1_CITIES.contains(&city.as_str()) {
        CityTier::Tier1
    } else if TIER_2_CITIES.contains(&city.as_str()) {
        CityTier::Tier2
    } else {
        CityTier::Tier3
    }
}

/// Collapse hospital-type spellings; unknown types are slugified
pub fn normalize_hospital_type(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    HOSPITAL_TYPES
        .iter()
        .find(|(synonym, _)| *synonym == lowered)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| slug(&lowered))
}

/// Lower-case, map synonyms, dedup and sort a specialty list
///
/// Accepts a JSON array of strings or one comma-separated string.
pub fn normalize_specialties(value: &Value) -> Option<Vec<String>> {
    let names: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return None,
    };

    let normalized: BTreeSet<String> = names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .map(|n| {
            SPECIALTIES
                .iter()
                .find(|(synonym, _)| *synonym == n)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or_else(|| slug(&n))
        })
        .collect();

    Some(normalized.into_iter().collect())
}

fn canonical_name(key: &str) -> Option<&'static str> {
    FIELD_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| *canonical)
}

fn normalize_key(key: &str) -> String {
    slug(&key.trim().to_lowercase())
}

fn slug(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
