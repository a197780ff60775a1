//! Batch integration across many hospitals
//!
//! Plans run through a fixed-size worker pool
//! (`futures::stream::buffer_unordered(max_concurrent_plans)`). A waiting
//! hospital only delays its start; a failed hospital is recorded and the
//! batch carries on.

use super::IntegrationOrchestrator;
use crate::models::IntegrationPlan;
use crate::types::{HospitalDescriptor, OverallStatus, SourceKind, TaskStatus};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use hpi_common::events::IntegrationEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Per-hospital line of a batch result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalOutcome {
    pub hospital_id: String,
    pub plan_id: Uuid,
    pub status: OverallStatus,
    pub overall_quality: Option<f64>,
    pub completed_sources: Vec<SourceKind>,
    pub failed_sources: Vec<SourceKind>,
    pub benchmark_readiness: Option<f64>,
    pub error: Option<String>,
}

impl HospitalOutcome {
    pub fn from_plan(plan: &IntegrationPlan) -> Self {
        let sources_with = |status: TaskStatus| {
            plan.tasks
                .iter()
                .filter(|t| t.status == status)
                .map(|t| t.source)
                .collect::<Vec<_>>()
        };
        Self {
            hospital_id: plan.hospital_id().to_string(),
            plan_id: plan.plan_id,
            status: plan.overall_status,
            overall_quality: plan.overall_quality,
            completed_sources: sources_with(TaskStatus::Completed),
            failed_sources: sources_with(TaskStatus::Failed),
            benchmark_readiness: plan
                .consolidated_data
                .as_ref()
                .map(|p| p.benchmark_readiness),
            error: plan.error.clone(),
        }
    }
}

/// Aggregate outcome of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub total_hospitals: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of hospitals whose plan completed
    pub success_rate: f64,
    /// Mean `overall_quality` over plans that have one
    pub average_quality: Option<f64>,
    /// Percentage of hospitals each source returned data for
    pub source_coverage: BTreeMap<SourceKind, f64>,
    /// Source with the most successful tasks (earliest in merge order on ties)
    pub most_common_source: Option<SourceKind>,
    pub outcomes: Vec<HospitalOutcome>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BatchResult {
    /// Aggregate finished plans; outcome order follows `plans`
    pub fn from_plans(
        batch_id: Uuid,
        plans: &[IntegrationPlan],
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let outcomes: Vec<HospitalOutcome> = plans.iter().map(HospitalOutcome::from_plan).collect();
        let total = outcomes.len();
        let successful = outcomes
            .iter()
            .filter(|o| o.status == OverallStatus::Completed)
            .count();

        let qualities: Vec<f64> = outcomes.iter().filter_map(|o| o.overall_quality).collect();
        let average_quality = if qualities.is_empty() {
            None
        } else {
            Some(qualities.iter().sum::<f64>() / qualities.len() as f64)
        };

        let mut successes: BTreeMap<SourceKind, usize> = BTreeMap::new();
        for outcome in &outcomes {
            for source in &outcome.completed_sources {
                *successes.entry(*source).or_default() += 1;
            }
        }

        let source_coverage = SourceKind::MERGE_ORDER
            .into_iter()
            .map(|kind| {
                let count = successes.get(&kind).copied().unwrap_or(0);
                (kind, percentage(count, total))
            })
            .collect();

        let most_common_source = SourceKind::MERGE_ORDER
            .into_iter()
            .filter_map(|kind| successes.get(&kind).map(|count| (kind, *count)))
            .fold(None, |best: Option<(SourceKind, usize)>, (kind, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((kind, count)),
            })
            .map(|(kind, _)| kind);

        Self {
            batch_id,
            total_hospitals: total,
            successful,
            failed: total - successful,
            success_rate: percentage(successful, total),
            average_quality,
            source_coverage,
            most_common_source,
            outcomes,
            started_at,
            duration_ms,
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

impl IntegrationOrchestrator {
    /// Integrate every hospital with at most `max_concurrent_plans` in flight
    pub async fn batch_hospital_integration(&self, hospitals: Vec<HospitalDescriptor>) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let total = hospitals.len();
        let pool_size = self.settings.max_concurrent_plans.max(1);
        let finished = AtomicUsize::new(0);

        info!(batch_id = %batch_id, hospitals = total, pool_size, "Starting batch integration");

        let mut indexed: Vec<(usize, IntegrationPlan)> =
            stream::iter(hospitals.into_iter().enumerate())
                .map(|(index, hospital)| {
                    let finished = &finished;
                    async move {
                        let plan = self.integrate_hospital(hospital).await;
                        let completed = finished.fetch_add(1, Ordering::Relaxed) + 1;
                        self.emit(IntegrationEvent::BatchProgress {
                            batch_id,
                            completed,
                            total,
                            timestamp: Utc::now(),
                        });
                        (index, plan)
                    }
                })
                .buffer_unordered(pool_size)
                .collect()
                .await;

        indexed.sort_by_key(|(index, _)| *index);
        let plans: Vec<IntegrationPlan> = indexed.into_iter().map(|(_, plan)| plan).collect();

        let result = BatchResult::from_plans(
            batch_id,
            &plans,
            started_at,
            start.elapsed().as_millis() as u64,
        );
        info!(
            batch_id = %batch_id,
            successful = result.successful,
            failed = result.failed,
            success_rate = result.success_rate,
            average_quality = ?result.average_quality,
            duration_ms = result.duration_ms,
            "Batch integration complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntegrationTask;
    use crate::types::DataMap;

    fn plan_with(hospital_id: &str, outcomes: &[(SourceKind, bool)]) -> IntegrationPlan {
        let tasks = outcomes
            .iter()
            .map(|(kind, success)| {
                let mut task = IntegrationTask::new(hospital_id, *kind, 1, Utc::now());
                task.start().unwrap();
                if *success {
                    task.complete(DataMap::new(), 80).unwrap();
                } else {
                    task.record_failure("down", false).unwrap();
                }
                task
            })
            .collect();
        let mut plan = IntegrationPlan::new(HospitalDescriptor::new(hospital_id, "H"), tasks);
        if outcomes.iter().any(|(_, success)| *success) {
            plan.overall_status = OverallStatus::Completed;
            plan.overall_quality = plan.mean_quality();
        } else {
            plan.overall_status = OverallStatus::Failed;
        }
        plan
    }

    #[test]
    fn test_batch_aggregates() {
        let plans = vec![
            plan_with("H-1", &[(SourceKind::GovernmentApi, true), (SourceKind::Survey, true)]),
            plan_with("H-2", &[(SourceKind::GovernmentApi, false), (SourceKind::Survey, true)]),
            plan_with("H-3", &[(SourceKind::GovernmentApi, false), (SourceKind::Survey, false)]),
            plan_with("H-4", &[(SourceKind::HmsApi, true)]),
        ];
        let result = BatchResult::from_plans(Uuid::new_v4(), &plans, Utc::now(), 10);

        assert_eq!(result.total_hospitals, 4);
        assert_eq!(result.successful, 3);
        assert_eq!(result.failed, 1);
        assert_eq!(result.success_rate, 75.0);
        assert_eq!(result.average_quality, Some(80.0));
        assert_eq!(result.source_coverage[&SourceKind::Survey], 50.0);
        assert_eq!(result.source_coverage[&SourceKind::GovernmentApi], 25.0);
        assert_eq!(result.source_coverage[&SourceKind::PartnerNetwork], 0.0);
        assert_eq!(result.most_common_source, Some(SourceKind::Survey));
        assert_eq!(result.outcomes[2].error, None);
        assert_eq!(result.outcomes[2].status, OverallStatus::Failed);
    }

    #[test]
    fn test_empty_batch() {
        let result = BatchResult::from_plans(Uuid::new_v4(), &[], Utc::now(), 0);
        assert_eq!(result.success_rate, 0.0);
        assert!(result.average_quality.is_none());
        assert!(result.most_common_source.is_none());
    }
}
