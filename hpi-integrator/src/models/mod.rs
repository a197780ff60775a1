//! Plan and task data model

pub mod plan;
pub mod task;

pub use plan::{IntegrationPlan, PhaseTransition, SourceIssue, DEFAULT_TARGET_DATA_TYPES};
pub use task::{FailureOutcome, IntegrationTask};
