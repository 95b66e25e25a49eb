//! Core domain types and pure derivations

pub mod config;
pub mod log;
pub mod metrics;
pub mod model;
pub mod policy;

// Re-export main types for cleaner imports
pub use model::{FundCategory, FundProfile, NavObservation, UpdateLogEntry, UpdateStatus};
pub use policy::{RiskTier, RiskTierPolicy};
