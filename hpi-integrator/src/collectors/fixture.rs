//! In-memory collector backed by pre-loaded records
//!
//! Used for offline runs: a hospitals file lists each hospital's descriptor
//! and, per source kind, the record that source would return.
//!
//! ```json
//! [
//!   {
//!     "hospital": { "id": "H-1", "name": "City Care", "city": "Pune" },
//!     "sources": {
//!       "government_api": { "hospital_id": "H-1", "total_beds": 120 },
//!       "survey": { "patient_satisfaction_score": 82 }
//!     }
//!   }
//! ]
//! ```

use super::{CollectionOutput, SourceCollector, DEFAULT_COLLECTOR_TIMEOUT};
use crate::error::CollectorError;
use crate::types::{DataMap, HospitalDescriptor, SourceKind};
use async_trait::async_trait;
use hpi_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One entry of a hospitals file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalFixture {
    pub hospital: HospitalDescriptor,
    /// Source kind name → record
    #[serde(default)]
    pub sources: BTreeMap<String, DataMap>,
}

impl HospitalFixture {
    /// Records keyed by parsed source kind; unknown kind names are rejected
    pub fn records(&self) -> Result<Vec<(SourceKind, &DataMap)>> {
        self.sources
            .iter()
            .map(|(name, data)| Ok((name.parse::<SourceKind>()?, data)))
            .collect()
    }
}

/// Read and parse a hospitals file
pub fn load_fixtures(path: &Path) -> Result<Vec<HospitalFixture>> {
    let content = std::fs::read_to_string(path)?;
    let fixtures: Vec<HospitalFixture> = serde_json::from_str(&content)?;
    for fixture in &fixtures {
        fixture.records().map_err(|e| {
            Error::InvalidInput(format!("hospital {}: {}", fixture.hospital.id, e))
        })?;
    }
    info!(path = %path.display(), hospitals = fixtures.len(), "Loaded hospital fixtures");
    Ok(fixtures)
}

/// Serves fixed records for one source kind
pub struct StaticCollector {
    kind: SourceKind,
    records: HashMap<String, DataMap>,
    timeout: Duration,
}

impl StaticCollector {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            records: HashMap::new(),
            timeout: DEFAULT_COLLECTOR_TIMEOUT,
        }
    }

    pub fn with_record(mut self, hospital_id: impl Into<String>, data: DataMap) -> Self {
        self.records.insert(hospital_id.into(), data);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Collector for `kind` holding every fixture record of that kind
    pub fn from_fixtures(kind: SourceKind, fixtures: &[HospitalFixture]) -> Result<Self> {
        let mut collector = Self::new(kind);
        for fixture in fixtures {
            for (record_kind, data) in fixture.records()? {
                if record_kind == kind {
                    collector
                        .records
                        .insert(fixture.hospital.id.clone(), data.clone());
                }
            }
        }
        Ok(collector)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SourceCollector for StaticCollector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn is_available(&self, hospital: &HospitalDescriptor) -> bool {
        self.kind.is_universal_fallback() || self.records.contains_key(&hospital.id)
    }

    async fn collect(
        &self,
        hospital: &HospitalDescriptor,
    ) -> std::result::Result<CollectionOutput, CollectorError> {
        self.records
            .get(&hospital.id)
            .map(|data| CollectionOutput::success(data.clone()))
            .ok_or_else(|| {
                CollectorError::Unavailable(format!(
                    "{} has no record for hospital {}",
                    self.kind, hospital.id
                ))
            })
    }
}
