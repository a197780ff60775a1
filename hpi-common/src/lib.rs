//! # HPI Common Library
//!
//! Shared code for the hospital performance integration services:
//! - Error type and result alias
//! - TOML bootstrap configuration and config-file resolution
//! - Structured logging bootstrap
//! - Integration event types and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
