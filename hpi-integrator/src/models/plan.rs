//! Integration plan: every task needed for one hospital's data refresh
//!
//! The phase only moves forward:
//! `INITIALIZATION → DATA_COLLECTION → VALIDATION → ENRICHMENT → CONSOLIDATION → FINALIZATION`.
//! A plan with no completed task jumps straight to `FINALIZATION`.

use super::task::IntegrationTask;
use crate::fusion::ConsolidatedProfile;
use crate::types::{
    DataMap, HospitalDescriptor, OverallStatus, PlanPhase, Priority, SourceKind, TaskStatus,
};
use crate::validators::ValidationResult;
use chrono::{DateTime, Utc};
use hpi_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Data categories a refresh targets
pub const DEFAULT_TARGET_DATA_TYPES: [&str; 4] =
    ["performance", "financial", "quality", "government_schemes"];

/// Phase change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub plan_id: Uuid,
    pub old_phase: PlanPhase,
    pub new_phase: PlanPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// Failing validation result attributed to the source that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIssue {
    pub source: SourceKind,
    #[serde(flatten)]
    pub result: ValidationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPlan {
    pub plan_id: Uuid,
    pub hospital: HospitalDescriptor,
    pub target_data_types: Vec<String>,
    pub tasks: Vec<IntegrationTask>,
    pub current_phase: PlanPhase,
    pub overall_status: OverallStatus,
    /// Set only when consolidation ran
    pub consolidated_data: Option<ConsolidatedProfile>,
    /// Mean quality score of completed tasks
    pub overall_quality: Option<f64>,
    /// Rule failures found during the validation phase
    #[serde(default)]
    pub validation_issues: Vec<SourceIssue>,
    /// Derived metrics each source's validated data supports on its own
    #[serde(default)]
    pub source_metrics: BTreeMap<SourceKind, DataMap>,
    /// Plan-level failure reason
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IntegrationPlan {
    pub fn new(hospital: HospitalDescriptor, tasks: Vec<IntegrationTask>) -> Self {
        Self {
            plan_id: Uuid::new_v4(),
            hospital,
            target_data_types: DEFAULT_TARGET_DATA_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            tasks,
            current_phase: PlanPhase::Initialization,
            overall_status: OverallStatus::Pending,
            consolidated_data: None,
            overall_quality: None,
            validation_issues: Vec::new(),
            source_metrics: BTreeMap::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn hospital_id(&self) -> &str {
        &self.hospital.id
    }

    /// `Pending → InProgress`
    pub fn begin(&mut self) -> Result<()> {
        if self.overall_status != OverallStatus::Pending {
            return Err(Error::InvalidState(format!(
                "plan {} already {}",
                self.plan_id,
                self.overall_status.as_str()
            )));
        }
        self.overall_status = OverallStatus::InProgress;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Move to a later phase; moving backwards or standing still is rejected
    pub fn advance_phase(&mut self, new_phase: PlanPhase) -> Result<PhaseTransition> {
        if new_phase <= self.current_phase {
            return Err(Error::InvalidState(format!(
                "plan {} cannot move from {} to {}",
                self.plan_id,
                self.current_phase.as_str(),
                new_phase.as_str()
            )));
        }
        let old_phase = self.current_phase;
        self.current_phase = new_phase;
        for task in &mut self.tasks {
            task.follow_phase(new_phase);
        }
        Ok(PhaseTransition {
            plan_id: self.plan_id,
            old_phase,
            new_phase,
            transitioned_at: Utc::now(),
        })
    }

    pub fn task(&self, task_id: Uuid) -> Option<&IntegrationTask> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: Uuid) -> Option<&mut IntegrationTask> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// Pending tasks in one priority tier
    pub fn pending_in_tier(&self, priority: Priority) -> Vec<&IntegrationTask> {
        self.tasks
            .iter()
            .filter(|t| t.priority == priority && t.status == TaskStatus::Pending)
            .collect()
    }

    pub fn completed_tasks(&self) -> impl Iterator<Item = &IntegrationTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
    }

    pub fn completed_count(&self) -> usize {
        self.completed_tasks().count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count()
    }

    /// Mean quality score of completed tasks, `None` when none completed
    pub fn mean_quality(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .completed_tasks()
            .filter_map(|t| t.quality_score)
            .map(f64::from)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    /// Finish successfully; only legal once consolidation has run
    pub fn finish_completed(&mut self, profile: ConsolidatedProfile) -> Result<PhaseTransition> {
        if self.current_phase != PlanPhase::Consolidation {
            return Err(Error::InvalidState(format!(
                "plan {} cannot complete from phase {}",
                self.plan_id,
                self.current_phase.as_str()
            )));
        }
        let transition = self.advance_phase(PlanPhase::Finalization)?;
        self.consolidated_data = Some(profile);
        self.overall_quality = self.mean_quality();
        self.overall_status = OverallStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(transition)
    }

    /// Finish as failed, recording why
    pub fn finish_failed(&mut self, error: impl Into<String>) -> Option<PhaseTransition> {
        let transition = self.advance_phase(PlanPhase::Finalization).ok();
        self.overall_quality = self.mean_quality();
        self.overall_status = OverallStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        transition
    }

    pub fn is_finished(&self) -> bool {
        self.overall_status.is_finished()
    }
}
