//! Enrichment and consolidation
//!
//! Standardize → derive metrics → merge per-source data into one profile.

pub mod consolidator;
pub mod enricher;

pub use consolidator::{
    ConsolidatedProfile, Consolidator, FieldCategory, ProfileQuality, ReadinessWeights,
    SourceContribution, ESSENTIAL_FIELDS,
};
pub use enricher::{Enricher, DERIVED_FIELDS};
