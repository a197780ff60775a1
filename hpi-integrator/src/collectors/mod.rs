//! Source Collectors
//!
//! One collector per external source kind fetches raw data for one hospital.
//! The orchestrator only talks to collectors through [`CollectorRegistry`],
//! which enforces each collector's timeout and the fallback guarantee.
//!
//! # Collectors
//! 1. **http** - JSON-over-HTTP collector for any source kind
//! 2. **fixture** - In-memory records loaded from a hospitals file
//!
//! # Error Isolation
//! A collector failure is a [`CollectorError`] value for the task that made
//! the call; it never affects sibling tasks or other plans.

pub mod fixture;
pub mod http;

pub use fixture::{load_fixtures, HospitalFixture, StaticCollector};
pub use http::HttpCollector;

use crate::error::CollectorError;
use crate::types::{DataMap, HospitalDescriptor, SourceKind};
use async_trait::async_trait;
use hpi_common::config::{CollectorConfig, CollectorsConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-call collector timeout
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw result of one collector call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOutput {
    pub success: bool,
    #[serde(default)]
    pub data: DataMap,
    /// Collector's own opinion of the data; the validator's score is authoritative
    #[serde(default)]
    pub quality_score: Option<u8>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CollectionOutput {
    pub fn success(data: DataMap) -> Self {
        Self {
            success: true,
            data,
            quality_score: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: DataMap::new(),
            quality_score: None,
            error: Some(error.into()),
        }
    }
}

/// Uniform contract for every external data source
#[async_trait]
pub trait SourceCollector: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Upper bound on one `collect` call
    fn timeout(&self) -> Duration {
        DEFAULT_COLLECTOR_TIMEOUT
    }

    /// Plan-creation check: can this source serve the hospital?
    async fn is_available(&self, hospital: &HospitalDescriptor) -> bool;

    async fn collect(
        &self,
        hospital: &HospitalDescriptor,
    ) -> Result<CollectionOutput, CollectorError>;
}

/// One collector per source kind
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    collectors: HashMap<SourceKind, Arc<dyn SourceCollector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector, replacing any previous one for the same kind
    pub fn register(&mut self, collector: Arc<dyn SourceCollector>) {
        let kind = collector.kind();
        if self.collectors.insert(kind, collector).is_some() {
            debug!(source = %kind, "Replaced registered collector");
        }
    }

    /// One collector per source kind, as configured
    ///
    /// Kinds with a `base_url` are fetched over HTTP; the others serve the
    /// records in `fixtures`. Government API and Survey are planned for every
    /// hospital, so they stay registered even when `enabled = false`.
    pub fn from_config(
        config: &CollectorsConfig,
        fixtures: &[HospitalFixture],
    ) -> hpi_common::Result<Self> {
        let sources: [(SourceKind, &CollectorConfig); 5] = [
            (SourceKind::GovernmentApi, &config.government),
            (SourceKind::HmsApi, &config.hms),
            (SourceKind::PartnerNetwork, &config.partner),
            (SourceKind::AnalyticsPlatform, &config.analytics),
            (SourceKind::Survey, &config.survey),
        ];

        let mut registry = Self::new();
        for (kind, collector_config) in sources {
            if !collector_config.enabled {
                if kind.is_universal_fallback() {
                    warn!(source = %kind, "Fallback source cannot be disabled, keeping it");
                } else {
                    info!(source = %kind, "Collector disabled");
                    continue;
                }
            }
            let collector: Arc<dyn SourceCollector> = match collector_config.base_url {
                Some(_) => Arc::new(HttpCollector::new(kind, collector_config)?),
                None => Arc::new(
                    StaticCollector::from_fixtures(kind, fixtures)?
                        .with_timeout(Duration::from_secs(collector_config.timeout_secs.max(1))),
                ),
            };
            registry.register(collector);
        }
        Ok(registry)
    }

    pub fn with(mut self, collector: Arc<dyn SourceCollector>) -> Self {
        self.register(collector);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn SourceCollector>> {
        self.collectors.get(&kind)
    }

    pub fn contains(&self, kind: SourceKind) -> bool {
        self.collectors.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Availability of `kind` for `hospital`
    ///
    /// Government API and Survey are always available. Other kinds need a
    /// registered collector that answers the availability check within its timeout.
    pub async fn is_available(&self, kind: SourceKind, hospital: &HospitalDescriptor) -> bool {
        if kind.is_universal_fallback() {
            return true;
        }
        let Some(collector) = self.collectors.get(&kind) else {
            return false;
        };
        match tokio::time::timeout(collector.timeout(), collector.is_available(hospital)).await {
            Ok(available) => available,
            Err(_) => {
                warn!(source = %kind, hospital_id = %hospital.id, "Availability check timed out");
                false
            }
        }
    }

    /// Call the collector for `kind` under its timeout
    ///
    /// A payload with `success = false` becomes [`CollectorError::SourceReported`].
    pub async fn collect(
        &self,
        kind: SourceKind,
        hospital: &HospitalDescriptor,
    ) -> Result<CollectionOutput, CollectorError> {
        let collector = self.collectors.get(&kind).ok_or_else(|| {
            CollectorError::Unavailable(format!("no collector registered for {}", kind))
        })?;

        let limit = collector.timeout();
        let output = tokio::time::timeout(limit, collector.collect(hospital))
            .await
            .map_err(|_| CollectorError::Timeout(limit.as_millis() as u64))??;

        if output.success {
            Ok(output)
        } else {
            Err(CollectorError::SourceReported(
                output
                    .error
                    .unwrap_or_else(|| "source reported failure without detail".to_string()),
            ))
        }
    }
}
