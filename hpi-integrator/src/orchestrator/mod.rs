//! Integration Orchestrator
//!
//! Builds a plan per hospital, runs its tasks tier by tier, and drives the
//! validation → enrichment → consolidation pipeline over whatever the
//! sources returned.
//!
//! # Execution Model
//! - Tiers run strictly in order CRITICAL → HIGH → MEDIUM → LOW
//! - Tasks inside a tier run concurrently (no cap inside a tier)
//! - A tier starts only after every task of the previous tier is terminal
//! - Workers own a copy of their task and report each transition over a
//!   channel; the plan owner replays them onto the plan (single writer)
//!
//! # Failure Policy
//! Partial success is success: consolidation runs when at least one task
//! completed, and a plan fails only when no task completed. A payload that
//! names another hospital fails its own task, not the plan. Failures are
//! returned as plan data, never as errors.
//!
//! # Identity
//! Collectors are asked about one hospital, so a payload that omits
//! `hospital_id`, `hospital_name` or `city` inherits them from the plan's
//! [`HospitalDescriptor`] before it is validated.

pub mod batch;
pub mod retry;
pub mod statistics;

pub use batch::{BatchResult, HospitalOutcome};
pub use retry::RetryPolicy;
pub use statistics::{GlobalAnalytics, IntegrationStatus, PlanStatus, SourceStats, TaskSummary};

use crate::collectors::CollectorRegistry;
use crate::error::CollectorError;
use crate::fusion::enricher::infer_city_tier;
use crate::fusion::{Consolidator, Enricher, SourceContribution};
use crate::models::{FailureOutcome, IntegrationPlan, IntegrationTask, SourceIssue};
use crate::store::{CleanupSummary, PlanStore};
use crate::types::{DataMap, HospitalDescriptor, PlanPhase, Priority, SourceKind};
use crate::validators::QualityValidator;
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use hpi_common::config::{HpiConfig, OrchestratorConfig};
use hpi_common::events::{EventBus, IntegrationEvent};
use hpi_common::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tunables for plan creation and execution
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Batch worker-pool size
    pub max_concurrent_plans: usize,
    pub max_retries: u32,
    pub retry: RetryPolicy,
    /// Offset between consecutive tasks' `scheduled_time`
    pub stagger: ChronoDuration,
    /// Finished plans older than this are archived by cleanup
    pub plan_retention: ChronoDuration,
    /// Archived plans are purged this long after they became archivable
    pub archive_retention: ChronoDuration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_concurrent_plans: config.max_concurrent_plans.max(1),
            max_retries: config.max_retries.max(1),
            retry: RetryPolicy::from(config),
            stagger: ChronoDuration::minutes(config.stagger_minutes),
            plan_retention: ChronoDuration::hours(config.plan_retention_hours),
            archive_retention: ChronoDuration::hours(config.archive_retention_hours),
        }
    }
}

/// Task transition reported by a worker
#[derive(Debug)]
enum TaskUpdate {
    Started {
        task_id: Uuid,
    },
    Completed {
        task_id: Uuid,
        data: DataMap,
        quality_score: u8,
    },
    Failed {
        task_id: Uuid,
        error: String,
        retryable: bool,
    },
}

pub struct IntegrationOrchestrator {
    collectors: CollectorRegistry,
    validator: Arc<QualityValidator>,
    enricher: Enricher,
    consolidator: Arc<Consolidator>,
    store: Arc<PlanStore>,
    settings: OrchestratorSettings,
    event_bus: Option<EventBus>,
}

impl IntegrationOrchestrator {
    pub fn new(
        collectors: CollectorRegistry,
        validator: Arc<QualityValidator>,
        enricher: Enricher,
        consolidator: Arc<Consolidator>,
        store: Arc<PlanStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            collectors,
            validator,
            enricher,
            consolidator,
            store,
            settings,
            event_bus: None,
        }
    }

    /// Default validator and consolidator configured from `config`
    pub fn from_config(
        config: &HpiConfig,
        collectors: CollectorRegistry,
        store: Arc<PlanStore>,
    ) -> Result<Self> {
        let validator = QualityValidator::with_defaults(&config.scoring, &config.validation)?;
        Ok(Self::new(
            collectors,
            Arc::new(validator),
            Enricher::new(),
            Arc::new(Consolidator::from_config(&config.scoring)),
            store,
            OrchestratorSettings::from(&config.orchestrator),
        ))
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    /// Check source availability and build a pending plan for `hospital`
    ///
    /// Government API and Survey tasks are always present. Tasks are listed
    /// in tier order and their `scheduled_time` is staggered.
    pub async fn create_integration_plan(&self, hospital: HospitalDescriptor) -> IntegrationPlan {
        let candidates: Vec<SourceKind> = Priority::EXECUTION_ORDER
            .into_iter()
            .flat_map(|priority| {
                SourceKind::MERGE_ORDER
                    .into_iter()
                    .filter(move |kind| kind.priority() == priority)
            })
            .collect();

        let checks = candidates
            .iter()
            .map(|kind| self.collectors.is_available(*kind, &hospital));
        let availability = join_all(checks).await;

        let now = Utc::now();
        let tasks: Vec<IntegrationTask> = candidates
            .into_iter()
            .zip(availability)
            .filter(|(_, available)| *available)
            .enumerate()
            .map(|(index, (kind, _))| {
                IntegrationTask::new(
                    hospital.id.clone(),
                    kind,
                    self.settings.max_retries,
                    now + self.settings.stagger * index as i32,
                )
            })
            .collect();

        let plan = IntegrationPlan::new(hospital, tasks);
        info!(
            plan_id = %plan.plan_id,
            hospital_id = %plan.hospital_id(),
            tasks = plan.tasks.len(),
            sources = ?plan.tasks.iter().map(|t| t.source.as_str()).collect::<Vec<_>>(),
            "Integration plan created"
        );

        self.emit(IntegrationEvent::PlanCreated {
            plan_id: plan.plan_id,
            hospital_id: plan.hospital_id().to_string(),
            task_count: plan.tasks.len(),
            timestamp: Utc::now(),
        });
        self.store.put(plan.clone()).await;
        plan
    }

    /// Run a plan to completion and return its final state
    pub async fn execute_integration_plan(&self, mut plan: IntegrationPlan) -> IntegrationPlan {
        if let Err(e) = plan.begin() {
            warn!(plan_id = %plan.plan_id, error = %e, "Plan not executable");
            return plan;
        }
        self.advance(&mut plan, PlanPhase::DataCollection);
        self.store.put(plan.clone()).await;

        for priority in Priority::EXECUTION_ORDER {
            self.run_tier(&mut plan, priority).await;
            self.store.put(plan.clone()).await;
        }

        let completed = plan.completed_count();
        if completed == 0 {
            let reason = self.no_data_reason(&plan);
            warn!(plan_id = %plan.plan_id, hospital_id = %plan.hospital_id(), reason = %reason, "Plan failed");
            self.fail(&mut plan, reason);
            self.emit_finished(&plan);
            self.store.put(plan.clone()).await;
            return plan;
        }

        // Validation: drop fields that failed a rule
        self.advance(&mut plan, PlanPhase::Validation);
        let mut contributions = Vec::with_capacity(completed);
        let mut issues = Vec::new();
        for task in plan.completed_tasks() {
            let data = task.collected_data.clone().unwrap_or_default();
            let report = self.validator.validate(&data);
            let failed_fields = report.failed_fields();
            issues.extend(report.failed_results().map(|result| SourceIssue {
                source: task.source,
                result: result.clone(),
            }));
            let kept: DataMap = data
                .into_iter()
                .filter(|(field, _)| !failed_fields.contains(field))
                .collect();
            contributions.push(SourceContribution::new(task.source, kept));
        }
        debug!(plan_id = %plan.plan_id, issues = issues.len(), "Validation phase complete");
        plan.validation_issues = issues;

        // Enrichment: metrics each source supports on its own; the merged
        // profile recomputes them from the winning fields
        self.advance(&mut plan, PlanPhase::Enrichment);
        plan.source_metrics = contributions
            .iter()
            .map(|c| (c.source, self.enricher.source_metrics(&c.data)))
            .filter(|(_, metrics)| !metrics.is_empty())
            .collect();

        // Consolidation
        self.advance(&mut plan, PlanPhase::Consolidation);
        match self.consolidator.consolidate(&plan.hospital, &contributions) {
            Ok(profile) => match plan.finish_completed(profile) {
                Ok(transition) => self.emit(IntegrationEvent::PhaseChanged {
                    plan_id: plan.plan_id,
                    phase: transition.new_phase.as_str().to_string(),
                    timestamp: transition.transitioned_at,
                }),
                Err(e) => self.fail(&mut plan, e.to_string()),
            },
            Err(e) => {
                warn!(plan_id = %plan.plan_id, error = %e, "Consolidation failed");
                self.fail(&mut plan, format!("consolidation failed: {}", e));
            }
        }

        info!(
            plan_id = %plan.plan_id,
            hospital_id = %plan.hospital_id(),
            status = plan.overall_status.as_str(),
            completed,
            failed = plan.failed_count(),
            overall_quality = ?plan.overall_quality,
            "Plan finished"
        );
        self.emit_finished(&plan);
        self.store.put(plan.clone()).await;
        plan
    }

    /// Create and execute a plan for one hospital
    pub async fn integrate_hospital(&self, hospital: HospitalDescriptor) -> IntegrationPlan {
        let plan = self.create_integration_plan(hospital).await;
        self.execute_integration_plan(plan).await
    }

    /// Look up a stored plan and execute it
    pub async fn execute_plan_by_id(&self, plan_id: Uuid) -> Result<IntegrationPlan> {
        let plan = self.store.get(plan_id).await?;
        Ok(self.execute_integration_plan(plan).await)
    }

    /// Archive finished plans older than the retention window and purge
    /// archived ones past the archive window
    pub async fn cleanup_expired_plans(&self) -> CleanupSummary {
        self.store
            .cleanup(self.settings.plan_retention, self.settings.archive_retention)
            .await
    }

    /// Run every pending task of one tier concurrently
    async fn run_tier(&self, plan: &mut IntegrationPlan, priority: Priority) {
        let pending: Vec<IntegrationTask> = plan
            .pending_in_tier(priority)
            .into_iter()
            .cloned()
            .collect();
        if pending.is_empty() {
            return;
        }

        let plan_id = plan.plan_id;
        debug!(plan_id = %plan_id, tier = %priority, tasks = pending.len(), "Starting tier");
        self.emit(IntegrationEvent::TierStarted {
            plan_id,
            priority: priority.as_str().to_string(),
            task_count: pending.len(),
            timestamp: Utc::now(),
        });

        let hospital = plan.hospital.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let workers: Vec<_> = pending
            .into_iter()
            .map(|task| self.run_task(plan_id, &hospital, task, tx.clone()))
            .collect();
        drop(tx);

        let apply = async {
            while let Some(update) = rx.recv().await {
                apply_update(plan, update);
            }
        };
        tokio::join!(join_all(workers), apply);
    }

    /// Drive one task through its attempts on a private copy
    async fn run_task(
        &self,
        plan_id: Uuid,
        hospital: &HospitalDescriptor,
        mut task: IntegrationTask,
        updates: mpsc::UnboundedSender<TaskUpdate>,
    ) {
        let task_id = task.id;
        let source = task.source;

        loop {
            if let Err(e) = task.start() {
                warn!(task_id = %task_id, error = %e, "Task cannot start");
                return;
            }
            let _ = updates.send(TaskUpdate::Started { task_id });
            self.emit(IntegrationEvent::TaskStarted {
                plan_id,
                task_id,
                source: source.to_string(),
                attempt: task.attempt(),
                timestamp: Utc::now(),
            });

            let collected = self
                .collectors
                .collect(source, hospital)
                .await
                .and_then(|output| {
                    let mut data = self.enricher.standardize(&output.data);
                    bind_identity(hospital, &mut data)?;
                    Ok((data, output.quality_score))
                });

            match collected {
                Ok((data, reported_score)) => {
                    let quality_score = self.validator.validate(&data).overall_score;
                    if let Err(e) = task.complete(data.clone(), quality_score) {
                        warn!(task_id = %task_id, error = %e, "Task completion rejected");
                        return;
                    }
                    debug!(
                        plan_id = %plan_id,
                        source = %source,
                        quality_score,
                        reported_score = ?reported_score,
                        "Task completed"
                    );
                    let _ = updates.send(TaskUpdate::Completed {
                        task_id,
                        data,
                        quality_score,
                    });
                    self.emit(IntegrationEvent::TaskCompleted {
                        plan_id,
                        task_id,
                        source: source.to_string(),
                        quality_score,
                        timestamp: Utc::now(),
                    });
                    return;
                }
                Err(err) => {
                    let error = err.to_string();
                    let retryable = err.is_retryable();
                    let outcome = task.record_failure(error.clone(), retryable);
                    let _ = updates.send(TaskUpdate::Failed {
                        task_id,
                        error: error.clone(),
                        retryable,
                    });

                    match outcome {
                        Ok(FailureOutcome::Retry) => {
                            let delay = self.settings.retry.delay_for(task.retry_count);
                            warn!(
                                plan_id = %plan_id,
                                source = %source,
                                retry_count = task.retry_count,
                                max_retries = task.max_retries,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Collection failed, will retry after backoff"
                            );
                            self.emit(IntegrationEvent::TaskRetrying {
                                plan_id,
                                task_id,
                                source: source.to_string(),
                                retry_count: task.retry_count,
                                error,
                                timestamp: Utc::now(),
                            });
                            tokio::time::sleep(delay).await;
                        }
                        Ok(FailureOutcome::Failed) | Err(_) => {
                            warn!(
                                plan_id = %plan_id,
                                source = %source,
                                retry_count = task.retry_count,
                                error = %error,
                                "Task failed permanently"
                            );
                            self.emit(IntegrationEvent::TaskFailed {
                                plan_id,
                                task_id,
                                source: source.to_string(),
                                error,
                                timestamp: Utc::now(),
                            });
                            return;
                        }
                    }
                }
            }
        }
    }

    fn advance(&self, plan: &mut IntegrationPlan, phase: PlanPhase) {
        match plan.advance_phase(phase) {
            Ok(transition) => self.emit(IntegrationEvent::PhaseChanged {
                plan_id: plan.plan_id,
                phase: transition.new_phase.as_str().to_string(),
                timestamp: transition.transitioned_at,
            }),
            Err(e) => warn!(plan_id = %plan.plan_id, error = %e, "Phase change rejected"),
        }
    }

    fn fail(&self, plan: &mut IntegrationPlan, reason: String) {
        if let Some(transition) = plan.finish_failed(reason) {
            self.emit(IntegrationEvent::PhaseChanged {
                plan_id: plan.plan_id,
                phase: transition.new_phase.as_str().to_string(),
                timestamp: transition.transitioned_at,
            });
        }
    }

    fn emit_finished(&self, plan: &IntegrationPlan) {
        self.emit(IntegrationEvent::PlanFinished {
            plan_id: plan.plan_id,
            hospital_id: plan.hospital_id().to_string(),
            status: plan.overall_status.as_str().to_string(),
            overall_quality: plan.overall_quality,
            timestamp: Utc::now(),
        });
    }

    fn no_data_reason(&self, plan: &IntegrationPlan) -> String {
        if plan.tasks.is_empty() {
            return "no sources available".to_string();
        }
        let errors: Vec<String> = plan
            .tasks
            .iter()
            .map(|t| {
                format!(
                    "{}: {}",
                    t.source,
                    t.error.as_deref().unwrap_or("no result")
                )
            })
            .collect();
        format!("no source returned data ({})", errors.join("; "))
    }

    fn emit(&self, event: IntegrationEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}

/// Reject a payload about another hospital and fill identity gaps from `hospital`
fn bind_identity(
    hospital: &HospitalDescriptor,
    data: &mut DataMap,
) -> std::result::Result<(), CollectorError> {
    let reported = match data.get("hospital_id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };
    if let Some(found) = reported.filter(|id| !id.trim().is_empty()) {
        if !hospital.matches_id(&found) {
            return Err(CollectorError::HospitalMismatch {
                expected: hospital.id.clone(),
                found,
            });
        }
    }
    data.insert("hospital_id".to_string(), json!(hospital.id));

    fill_blank(data, "hospital_name", &hospital.name);
    if let Some(city) = &hospital.city {
        fill_blank(data, "city", city);
    }
    if !data.contains_key("city_tier") {
        let tier = hospital
            .city_tier
            .or_else(|| data.get("city").and_then(Value::as_str).map(infer_city_tier));
        if let Some(tier) = tier {
            data.insert("city_tier".to_string(), json!(tier.as_str()));
        }
    }
    Ok(())
}

fn fill_blank(data: &mut DataMap, field: &str, value: &str) {
    let blank = match data.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    };
    if blank && !value.trim().is_empty() {
        data.insert(field.to_string(), json!(value));
    }
}

/// Replay a worker's transition onto the canonical task
fn apply_update(plan: &mut IntegrationPlan, update: TaskUpdate) {
    let task_id = match &update {
        TaskUpdate::Started { task_id }
        | TaskUpdate::Completed { task_id, .. }
        | TaskUpdate::Failed { task_id, .. } => *task_id,
    };
    let plan_id = plan.plan_id;
    let Some(task) = plan.task_mut(task_id) else {
        warn!(plan_id = %plan_id, task_id = %task_id, "Update for unknown task");
        return;
    };

    let result = match update {
        TaskUpdate::Started { .. } => task.start(),
        TaskUpdate::Completed {
            data,
            quality_score,
            ..
        } => task.complete(data, quality_score),
        TaskUpdate::Failed {
            error, retryable, ..
        } => task.record_failure(error, retryable).map(|_| ()),
    };
    if let Err(e) = result {
        warn!(plan_id = %plan_id, task_id = %task_id, error = %e, "Task update rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> DataMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_bind_identity_fills_missing_fields() {
        let hospital = HospitalDescriptor::new("H-1", "City Care").with_city("Pune");
        let mut data = map(json!({ "total_beds": 100 }));

        bind_identity(&hospital, &mut data).unwrap();

        assert_eq!(data["hospital_id"], json!("H-1"));
        assert_eq!(data["hospital_name"], json!("City Care"));
        assert_eq!(data["city"], json!("Pune"));
        assert_eq!(data["city_tier"], json!("tier_1"));
    }

    #[test]
    fn test_bind_identity_keeps_reported_values() {
        let hospital = HospitalDescriptor::new("H-1", "City Care").with_city("Pune");
        let mut data = map(json!({
            "hospital_id": "h-1",
            "hospital_name": "City Care Multispeciality",
            "city": "Nashik"
        }));

        bind_identity(&hospital, &mut data).unwrap();

        assert_eq!(data["hospital_id"], json!("H-1"));
        assert_eq!(data["hospital_name"], json!("City Care Multispeciality"));
        assert_eq!(data["city"], json!("Nashik"));
    }

    #[test]
    fn test_bind_identity_rejects_other_hospital() {
        let hospital = HospitalDescriptor::new("H-1", "City Care");
        let mut data = map(json!({ "hospital_id": "H-2", "total_beds": 250 }));

        let err = bind_identity(&hospital, &mut data).unwrap_err();
        assert_eq!(
            err,
            CollectorError::HospitalMismatch {
                expected: "H-1".into(),
                found: "H-2".into(),
            }
        );
        assert!(!err.is_retryable());
    }
}
