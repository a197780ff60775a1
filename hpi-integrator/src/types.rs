//! Core types shared by every pipeline stage
//!
//! Closed enums for source kind, priority, task status, plan phase and plan
//! status, plus the hospital descriptor that seeds a plan.
//!
//! # Pipeline
//! - **Collection:** one task per available source, tier by tier
//! - **Validation:** rule registry scores each source's raw data
//! - **Enrichment:** standardize fields, derive metrics
//! - **Consolidation:** merge sources into one hospital profile

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field → value map exchanged between collectors and pipeline stages
///
/// `BTreeMap` keeps iteration (and therefore serialized output) deterministic.
pub type DataMap = BTreeMap<String, serde_json::Value>;

/// External data source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GovernmentApi,
    HmsApi,
    PartnerNetwork,
    AnalyticsPlatform,
    Survey,
}

impl SourceKind {
    /// All kinds in consolidation merge order (later sources overwrite earlier ones)
    pub const MERGE_ORDER: [SourceKind; 5] = [
        SourceKind::GovernmentApi,
        SourceKind::HmsApi,
        SourceKind::PartnerNetwork,
        SourceKind::AnalyticsPlatform,
        SourceKind::Survey,
    ];

    /// Fixed scheduling priority for tasks against this source
    pub fn priority(self) -> Priority {
        match self {
            Self::GovernmentApi => Priority::Critical,
            Self::HmsApi => Priority::High,
            Self::PartnerNetwork | Self::AnalyticsPlatform => Priority::Medium,
            Self::Survey => Priority::Low,
        }
    }

    /// Government and Survey sources are always considered available
    pub fn is_universal_fallback(self) -> bool {
        matches!(self, Self::GovernmentApi | Self::Survey)
    }

    /// Position in [`SourceKind::MERGE_ORDER`]
    pub fn merge_rank(self) -> usize {
        Self::MERGE_ORDER
            .iter()
            .position(|k| *k == self)
            .unwrap_or(Self::MERGE_ORDER.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GovernmentApi => "government_api",
            Self::HmsApi => "hms_api",
            Self::PartnerNetwork => "partner_network",
            Self::AnalyticsPlatform => "analytics_platform",
            Self::Survey => "survey",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = hpi_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::MERGE_ORDER
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| hpi_common::Error::InvalidInput(format!("unknown source kind: {}", s)))
    }
}

/// Task priority tier; tiers execute strictly in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Execution order of tiers within a plan
    pub const EXECUTION_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// **Task state machine:** `Pending → Running → {Completed | Failed}`
///
/// A retryable failure moves a running task back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Plan phases, in the only order a plan may move through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanPhase {
    Initialization,
    DataCollection,
    Validation,
    Enrichment,
    Consolidation,
    Finalization,
}

impl PlanPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialization => "INITIALIZATION",
            Self::DataCollection => "DATA_COLLECTION",
            Self::Validation => "VALIDATION",
            Self::Enrichment => "ENRICHMENT",
            Self::Consolidation => "CONSOLIDATION",
            Self::Finalization => "FINALIZATION",
        }
    }
}

/// Overall plan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Indian city classification used for benchmarking peer groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityTier {
    Tier1,
    Tier2,
    Tier3,
}

impl CityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tier1 => "tier_1",
            Self::Tier2 => "tier_2",
            Self::Tier3 => "tier_3",
        }
    }
}

/// Known contact details for a hospital
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

/// Input to plan creation: who the hospital is and how to reach its systems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub city_tier: Option<CityTier>,
    #[serde(default)]
    pub hospital_type: Option<String>,
    /// Direct HMS API endpoint, when the hospital exposes one
    #[serde(default)]
    pub hms_endpoint: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

impl HospitalDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            city: None,
            city_tier: None,
            hospital_type: None,
            hms_endpoint: None,
            contact: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_hms_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.hms_endpoint = Some(endpoint.into());
        self
    }

    /// Whether a source-reported id names this hospital (trimmed, ASCII case-insensitive)
    pub fn matches_id(&self, reported: &str) -> bool {
        reported.trim().eq_ignore_ascii_case(self.id.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_priority_classes() {
        assert_eq!(SourceKind::GovernmentApi.priority(), Priority::Critical);
        assert_eq!(SourceKind::HmsApi.priority(), Priority::High);
        assert_eq!(SourceKind::PartnerNetwork.priority(), Priority::Medium);
        assert_eq!(SourceKind::AnalyticsPlatform.priority(), Priority::Medium);
        assert_eq!(SourceKind::Survey.priority(), Priority::Low);
    }

    #[test]
    fn test_universal_fallback_sources() {
        let fallbacks: Vec<_> = SourceKind::MERGE_ORDER
            .iter()
            .filter(|k| k.is_universal_fallback())
            .collect();
        assert_eq!(fallbacks, vec![&SourceKind::GovernmentApi, &SourceKind::Survey]);
    }

    #[test]
    fn test_phase_order_is_monotonic() {
        assert!(PlanPhase::Initialization < PlanPhase::DataCollection);
        assert!(PlanPhase::DataCollection < PlanPhase::Validation);
        assert!(PlanPhase::Validation < PlanPhase::Enrichment);
        assert!(PlanPhase::Enrichment < PlanPhase::Consolidation);
        assert!(PlanPhase::Consolidation < PlanPhase::Finalization);
    }

    #[test]
    fn test_hospital_id_matching() {
        let hospital = HospitalDescriptor::new("H-1", "City Care");
        assert!(hospital.matches_id("H-1"));
        assert!(hospital.matches_id(" h-1 "));
        assert!(!hospital.matches_id("H-2"));
        assert!(!hospital.matches_id(""));
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("hms_api".parse::<SourceKind>().unwrap(), SourceKind::HmsApi);
        assert!("fax".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_value(SourceKind::HmsApi).unwrap(),
            serde_json::json!("hms_api")
        );
        assert_eq!(
            serde_json::to_value(Priority::Critical).unwrap(),
            serde_json::json!("CRITICAL")
        );
        assert_eq!(
            serde_json::to_value(PlanPhase::DataCollection).unwrap(),
            serde_json::json!("DATA_COLLECTION")
        );
    }
}
