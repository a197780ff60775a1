//! Integration task state machine
//!
//! One task = one collection attempt series for a (hospital, source) pair.
//!
//! ```text
//! Pending ──start──▶ Running ──complete──▶ Completed
//!    ▲                  │
//!    └──retryable──────┤
//!                       └──exhausted / fatal──▶ Failed
//! ```
//!
//! `retry_count` counts failed attempts. A task only enters `Running` while
//! `retry_count < max_retries`, so `retry_count` never exceeds `max_retries`.
//!
//! `phase` follows the plan while the task's data is still in play: a failed
//! task stays at `DATA_COLLECTION`, a completed one advances with the plan
//! up to `FINALIZATION`.

use crate::types::{DataMap, PlanPhase, Priority, SourceKind, TaskStatus};
use chrono::{DateTime, Utc};
use hpi_common::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happens to a task after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Task is back in `Pending` and should be retried after backoff
    Retry,
    /// Task is permanently `Failed`
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationTask {
    pub id: Uuid,
    pub hospital_id: String,
    pub source: SourceKind,
    pub priority: Priority,
    /// Latest plan phase this task took part in
    pub phase: PlanPhase,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Most recent failure message
    pub error: Option<String>,
    pub collected_data: Option<DataMap>,
    /// Set only once the task is `Completed`
    pub quality_score: Option<u8>,
    /// Advisory dispatch time used to spread load on shared endpoints
    pub scheduled_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

impl IntegrationTask {
    /// Create a pending task; `max_retries` is raised to at least 1
    pub fn new(
        hospital_id: impl Into<String>,
        source: SourceKind,
        max_retries: u32,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hospital_id: hospital_id.into(),
            source,
            priority: source.priority(),
            phase: PlanPhase::Initialization,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: max_retries.max(1),
            error: None,
            collected_data: None,
            quality_score: None,
            scheduled_time,
            started_at: None,
            completion_time: None,
        }
    }

    /// `Pending → Running`
    pub fn start(&mut self) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.invalid("start", TaskStatus::Running));
        }
        if self.retry_count >= self.max_retries {
            return Err(Error::InvalidState(format!(
                "task {} exhausted its {} attempts",
                self.id, self.max_retries
            )));
        }
        self.status = TaskStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// `Running → Completed`, recording the collected data and its quality score
    pub fn complete(&mut self, data: DataMap, quality_score: u8) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid("complete", TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.collected_data = Some(data);
        self.quality_score = Some(quality_score);
        self.completion_time = Some(Utc::now());
        Ok(())
    }

    /// Record a failed attempt of a running task
    ///
    /// Retryable failures re-enter `Pending` while attempts remain; anything
    /// else ends in terminal `Failed` with `error` populated.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
    ) -> Result<FailureOutcome> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid("record failure on", TaskStatus::Failed));
        }

        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.error = Some(error.into());

        if retryable && self.retry_count < self.max_retries {
            self.status = TaskStatus::Pending;
            Ok(FailureOutcome::Retry)
        } else {
            self.status = TaskStatus::Failed;
            self.completion_time = Some(Utc::now());
            Ok(FailureOutcome::Failed)
        }
    }

    /// Track the plan moving to `phase`
    ///
    /// Collection concerns every task; later phases only concern tasks whose
    /// data was collected.
    pub fn follow_phase(&mut self, phase: PlanPhase) {
        let involved = match phase {
            PlanPhase::Initialization | PlanPhase::DataCollection => true,
            _ => self.status == TaskStatus::Completed,
        };
        if involved && phase > self.phase {
            self.phase = phase;
        }
    }

    /// 1-based number of the current (or most recent) attempt
    pub fn attempt(&self) -> u32 {
        match self.status {
            TaskStatus::Failed => self.retry_count,
            _ => self.retry_count + 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn invalid(&self, action: &str, target: TaskStatus) -> Error {
        Error::InvalidState(format!(
            "cannot {} task {} ({:?} → {:?})",
            action, self.id, self.status, target
        ))
    }
}
