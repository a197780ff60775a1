//! Test Helper Utilities
//!
//! Shared utilities for hpi-integrator integration tests: scripted source
//! collectors, a concurrency call tracker and orchestrator builders with fast
//! retry timings.

#![allow(dead_code)]

use async_trait::async_trait;
use hpi_common::config::HpiConfig;
use hpi_integrator::collectors::{CollectionOutput, CollectorRegistry, SourceCollector};
use hpi_integrator::fusion::{Consolidator, Enricher};
use hpi_integrator::orchestrator::RetryPolicy;
use hpi_integrator::store::PlanStore;
use hpi_integrator::types::{DataMap, HospitalDescriptor, SourceKind};
use hpi_integrator::validators::QualityValidator;
use hpi_integrator::{CollectorError, IntegrationOrchestrator, OrchestratorSettings};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Convert a `json!({...})` object into a [`DataMap`]
pub fn data(value: Value) -> DataMap {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn hospital(id: &str) -> HospitalDescriptor {
    HospitalDescriptor::new(id, format!("Hospital {}", id)).with_city("Pune")
}

/// Settings with millisecond backoff so retry tests stay fast
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_concurrent_plans: 5,
        max_retries: 3,
        retry: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(4)),
        ..OrchestratorSettings::default()
    }
}

/// Orchestrator over `registry` with default rules, a fresh store and fast retries
pub fn create_test_orchestrator(registry: CollectorRegistry) -> IntegrationOrchestrator {
    create_test_orchestrator_with(registry, fast_settings())
}

pub fn create_test_orchestrator_with(
    registry: CollectorRegistry,
    settings: OrchestratorSettings,
) -> IntegrationOrchestrator {
    let config = HpiConfig::default();
    let validator = QualityValidator::with_defaults(&config.scoring, &config.validation)
        .expect("default rules compile");
    IntegrationOrchestrator::new(
        registry,
        Arc::new(validator),
        Enricher::new(),
        Arc::new(Consolidator::from_config(&config.scoring)),
        Arc::new(PlanStore::new()),
        settings,
    )
}

/// What one scripted `collect` call does
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this record as-is
    Data(DataMap),
    /// Return `success: false` with this message
    Report(String),
    /// Fail with this error
    Fail(CollectorError),
    /// Never answer; the registry's timeout fires
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Start,
    End,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub source: SourceKind,
    pub hospital_id: String,
    pub event: CallEvent,
    pub at: Instant,
}

/// Tracks in-flight collector calls across every scripted collector
#[derive(Debug, Default)]
pub struct CallTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: HashMap<String, usize>,
    max_hospitals: usize,
    log: Vec<CallRecord>,
}

impl CallTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self, source: SourceKind, hospital_id: &str) {
        let mut state = self.state.lock().unwrap();
        *state.in_flight.entry(hospital_id.to_string()).or_default() += 1;
        let active = state.in_flight.values().filter(|n| **n > 0).count();
        state.max_hospitals = state.max_hospitals.max(active);
        state.log.push(CallRecord {
            source,
            hospital_id: hospital_id.to_string(),
            event: CallEvent::Start,
            at: Instant::now(),
        });
    }

    fn exit(&self, source: SourceKind, hospital_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(count) = state.in_flight.get_mut(hospital_id) {
            *count = count.saturating_sub(1);
        }
        state.log.push(CallRecord {
            source,
            hospital_id: hospital_id.to_string(),
            event: CallEvent::End,
            at: Instant::now(),
        });
    }

    /// Most hospitals that ever had a collector call in flight at once
    pub fn max_concurrent_hospitals(&self) -> usize {
        self.state.lock().unwrap().max_hospitals
    }

    pub fn log(&self) -> Vec<CallRecord> {
        self.state.lock().unwrap().log.clone()
    }

    /// Position of the first matching record in the log
    pub fn first(&self, source: SourceKind, event: CallEvent) -> Option<usize> {
        self.log()
            .iter()
            .position(|r| r.source == source && r.event == event)
    }

    /// Position of the last matching record in the log
    pub fn last(&self, source: SourceKind, event: CallEvent) -> Option<usize> {
        self.log()
            .iter()
            .rposition(|r| r.source == source && r.event == event)
    }
}

/// Marks a call finished even when the future is dropped by a timeout
struct CallGuard<'a> {
    tracker: Option<&'a CallTracker>,
    source: SourceKind,
    hospital_id: &'a str,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker {
            tracker.exit(self.source, self.hospital_id);
        }
    }
}

/// Collector whose answers are scripted per hospital
pub struct ScriptedCollector {
    kind: SourceKind,
    available: bool,
    available_for: Option<HashSet<String>>,
    fallback: Step,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    delay: Duration,
    timeout: Duration,
    calls: AtomicUsize,
    tracker: Option<Arc<CallTracker>>,
}

impl ScriptedCollector {
    /// Always returns `record`
    pub fn returning(kind: SourceKind, record: Value) -> Self {
        Self::with_fallback(kind, Step::Data(data(record)))
    }

    /// Always fails with `error`
    pub fn failing(kind: SourceKind, error: CollectorError) -> Self {
        Self::with_fallback(kind, Step::Fail(error))
    }

    /// Never answers
    pub fn hanging(kind: SourceKind) -> Self {
        Self::with_fallback(kind, Step::Hang)
    }

    pub fn with_fallback(kind: SourceKind, fallback: Step) -> Self {
        Self {
            kind,
            available: true,
            available_for: None,
            fallback,
            scripts: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            timeout: Duration::from_millis(500),
            calls: AtomicUsize::new(0),
            tracker: None,
        }
    }

    /// Queue answers for one hospital; once used up the fallback applies
    pub fn script(self, hospital_id: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(hospital_id.to_string(), steps.into());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn only_for(mut self, hospital_ids: &[&str]) -> Self {
        self.available_for = Some(hospital_ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tracked(mut self, tracker: Arc<CallTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self, hospital_id: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(hospital_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl SourceCollector for ScriptedCollector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn is_available(&self, hospital: &HospitalDescriptor) -> bool {
        self.available
            && self
                .available_for
                .as_ref()
                .map_or(true, |ids| ids.contains(&hospital.id))
    }

    async fn collect(
        &self,
        hospital: &HospitalDescriptor,
    ) -> Result<CollectionOutput, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tracker) = &self.tracker {
            tracker.enter(self.kind, &hospital.id);
        }
        let _guard = CallGuard {
            tracker: self.tracker.as_deref(),
            source: self.kind,
            hospital_id: &hospital.id,
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_step(&hospital.id) {
            Step::Data(record) => Ok(CollectionOutput::success(record)),
            Step::Report(message) => Ok(CollectionOutput::failure(message)),
            Step::Fail(error) => Err(error),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CollectorError::Timeout(3_600_000))
            }
        }
    }
}

/// Registry holding the given collectors
pub fn registry(collectors: Vec<Arc<ScriptedCollector>>) -> CollectorRegistry {
    collectors
        .into_iter()
        .fold(CollectorRegistry::new(), |registry, collector| {
            registry.with(collector)
        })
}

pub fn gov_record() -> Value {
    serde_json::json!({
        "city": "Pune",
        "total_beds": 250,
        "total_revenue": 150_000_000.0,
        "scheme_revenue": 20_000_000.0,
        "pincode": "411001"
    })
}

pub fn hms_record() -> Value {
    serde_json::json!({
        "city": "Pune",
        "total_beds": 250,
        "icu_beds": 30,
        "bed_occupancy_rate": 78.5,
        "average_length_of_stay": 4.1,
        "operating_costs": 110_000_000.0,
        "total_revenue": 150_000_000.0
    })
}

pub fn survey_record() -> Value {
    serde_json::json!({
        "city": "Pune",
        "total_beds": 250,
        "patient_satisfaction_score": 84.0,
        "readmission_rate": 6.2
    })
}
