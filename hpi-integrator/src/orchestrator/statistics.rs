//! Plan status and global analytics
//!
//! Read-only views over the plan store for the status surface:
//! - `get_integration_status(Some(id))` → [`PlanStatus`] for one plan
//! - `get_integration_status(None)` → [`GlobalAnalytics`] across every plan

use super::IntegrationOrchestrator;
use crate::models::{IntegrationPlan, IntegrationTask};
use crate::types::{OverallStatus, PlanPhase, Priority, SourceKind, TaskStatus};
use chrono::{DateTime, Utc};
use hpi_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One task as shown in a plan status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: Uuid,
    pub source: SourceKind,
    pub priority: Priority,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
    pub quality_score: Option<u8>,
    pub completion_time: Option<DateTime<Utc>>,
}

impl From<&IntegrationTask> for TaskSummary {
    fn from(task: &IntegrationTask) -> Self {
        Self {
            task_id: task.id,
            source: task.source,
            priority: task.priority,
            status: task.status,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            error: task.error.clone(),
            quality_score: task.quality_score,
            completion_time: task.completion_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatus {
    pub plan_id: Uuid,
    pub hospital_id: String,
    pub hospital_name: String,
    pub current_phase: PlanPhase,
    pub overall_status: OverallStatus,
    pub overall_quality: Option<f64>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub tasks: Vec<TaskSummary>,
    pub completeness: Option<f64>,
    pub benchmark_readiness: Option<f64>,
    pub validation_issue_count: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&IntegrationPlan> for PlanStatus {
    fn from(plan: &IntegrationPlan) -> Self {
        Self {
            plan_id: plan.plan_id,
            hospital_id: plan.hospital.id.clone(),
            hospital_name: plan.hospital.name.clone(),
            current_phase: plan.current_phase,
            overall_status: plan.overall_status,
            overall_quality: plan.overall_quality,
            total_tasks: plan.tasks.len(),
            completed_tasks: plan.completed_count(),
            failed_tasks: plan.failed_count(),
            tasks: plan.tasks.iter().map(TaskSummary::from).collect(),
            completeness: plan
                .consolidated_data
                .as_ref()
                .map(|p| p.data_quality.completeness),
            benchmark_readiness: plan
                .consolidated_data
                .as_ref()
                .map(|p| p.benchmark_readiness),
            validation_issue_count: plan.validation_issues.len(),
            error: plan.error.clone(),
            created_at: plan.created_at,
            completed_at: plan.completed_at,
        }
    }
}

/// Per-source task outcome counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Tasks that reached a terminal status
    pub attempted: usize,
    pub completed: usize,
    /// `completed / attempted * 100`, 0 when nothing was attempted
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAnalytics {
    pub total_plans: usize,
    pub active_plans: usize,
    pub completed_plans: usize,
    pub failed_plans: usize,
    pub archived_plans: usize,
    pub average_quality: Option<f64>,
    pub source_success_rates: BTreeMap<SourceKind, SourceStats>,
    pub generated_at: DateTime<Utc>,
}

impl GlobalAnalytics {
    pub fn from_plans(plans: &[IntegrationPlan], archived_plans: usize) -> Self {
        let count = |status: OverallStatus| plans.iter().filter(|p| p.overall_status == status).count();

        let qualities: Vec<f64> = plans.iter().filter_map(|p| p.overall_quality).collect();
        let average_quality = if qualities.is_empty() {
            None
        } else {
            Some(qualities.iter().sum::<f64>() / qualities.len() as f64)
        };

        let mut source_success_rates: BTreeMap<SourceKind, SourceStats> = BTreeMap::new();
        for task in plans.iter().flat_map(|p| p.tasks.iter()).filter(|t| t.is_terminal()) {
            let stats = source_success_rates.entry(task.source).or_default();
            stats.attempted += 1;
            if task.status == TaskStatus::Completed {
                stats.completed += 1;
            }
        }
        for stats in source_success_rates.values_mut() {
            stats.success_rate = stats.completed as f64 / stats.attempted as f64 * 100.0;
        }

        Self {
            total_plans: plans.len(),
            active_plans: plans.iter().filter(|p| !p.is_finished()).count(),
            completed_plans: count(OverallStatus::Completed),
            failed_plans: count(OverallStatus::Failed),
            archived_plans,
            average_quality,
            source_success_rates,
            generated_at: Utc::now(),
        }
    }
}

/// Answer of [`IntegrationOrchestrator::get_integration_status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntegrationStatus {
    Plan(Box<PlanStatus>),
    Global(GlobalAnalytics),
}

impl IntegrationOrchestrator {
    /// Status of one plan, or analytics over every live plan
    ///
    /// An unknown `plan_id` yields `Error::NotFound`.
    pub async fn get_integration_status(&self, plan_id: Option<Uuid>) -> Result<IntegrationStatus> {
        match plan_id {
            Some(plan_id) => {
                let plan = self.store.get(plan_id).await?;
                Ok(IntegrationStatus::Plan(Box::new(PlanStatus::from(&plan))))
            }
            None => {
                let plans = self.store.list_all().await;
                let archived = self.store.list_archived().await.len();
                Ok(IntegrationStatus::Global(GlobalAnalytics::from_plans(
                    &plans, archived,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataMap, HospitalDescriptor};

    #[test]
    fn test_global_analytics_counts() {
        let mut done = IntegrationPlan::new(
            HospitalDescriptor::new("H-1", "A"),
            vec![
                IntegrationTask::new("H-1", SourceKind::GovernmentApi, 1, Utc::now()),
                IntegrationTask::new("H-1", SourceKind::Survey, 1, Utc::now()),
            ],
        );
        let ids: Vec<Uuid> = done.tasks.iter().map(|t| t.id).collect();
        let gov = done.task_mut(ids[0]).unwrap();
        gov.start().unwrap();
        gov.complete(DataMap::new(), 90).unwrap();
        let survey = done.task_mut(ids[1]).unwrap();
        survey.start().unwrap();
        survey.record_failure("no reply", false).unwrap();
        done.overall_status = OverallStatus::Completed;
        done.overall_quality = Some(90.0);

        let pending = IntegrationPlan::new(
            HospitalDescriptor::new("H-2", "B"),
            vec![IntegrationTask::new("H-2", SourceKind::Survey, 1, Utc::now())],
        );

        let analytics = GlobalAnalytics::from_plans(&[done, pending], 3);
        assert_eq!(analytics.total_plans, 2);
        assert_eq!(analytics.active_plans, 1);
        assert_eq!(analytics.completed_plans, 1);
        assert_eq!(analytics.archived_plans, 3);
        assert_eq!(analytics.average_quality, Some(90.0));
        assert_eq!(analytics.source_success_rates[&SourceKind::GovernmentApi].success_rate, 100.0);
        // Pending tasks are not counted as attempts
        assert_eq!(analytics.source_success_rates[&SourceKind::Survey].attempted, 1);
        assert_eq!(analytics.source_success_rates[&SourceKind::Survey].success_rate, 0.0);
    }

    #[test]
    fn test_plan_status_summarizes_tasks() {
        let plan = IntegrationPlan::new(
            HospitalDescriptor::new("H-9", "Nine"),
            vec![IntegrationTask::new("H-9", SourceKind::HmsApi, 3, Utc::now())],
        );
        let status = PlanStatus::from(&plan);
        assert_eq!(status.total_tasks, 1);
        assert_eq!(status.tasks[0].priority, Priority::High);
        assert_eq!(status.tasks[0].status, TaskStatus::Pending);
        assert!(status.benchmark_readiness.is_none());
    }
}
