//! Token-budgeted context management for deskhive.
//!
//! Maintains a tiered collection of content fragments ("layers") against a
//! fixed token ceiling. Layers move between tiers via promotion, demotion
//! and archival; when usage runs hot, a priority-ordered pruning pass evicts
//! the least valuable unprotected layers until usage drops back under a
//! target fraction of the ceiling.

pub mod engine;
pub mod estimator;
pub mod snapshot;

pub use engine::BudgetEngine;
pub use estimator::HeuristicEstimator;
pub use snapshot::{BudgetSnapshot, TierTotals, WarningLevel};
