//! hpi-integrator library interface
//!
//! Collects hospital performance data from several unreliable sources,
//! validates and enriches it, and consolidates one profile per hospital.
//!
//! # Pipeline
//! - **collectors:** one [`collectors::SourceCollector`] per source kind
//! - **validators:** rule registry and quality scoring
//! - **fusion:** enrichment and consolidation
//! - **orchestrator:** plans, tier scheduling, retries, batches, analytics
//! - **store:** keyed in-memory plan store with JSON snapshots

pub mod collectors;
pub mod error;
pub mod fusion;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod types;
pub mod validators;

pub use crate::error::{CollectorError, ConsolidationError};
pub use crate::orchestrator::{IntegrationOrchestrator, OrchestratorSettings};
pub use crate::store::PlanStore;
