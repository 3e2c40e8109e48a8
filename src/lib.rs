//! Policy Intake Advisor
//!
//! A conversational intake service for insurance needs analysis:
//! - Collects six profile fields through a per-user state machine
//! - Extracts product documents (coverage tables or cash-value schedules)
//! - Computes a coverage-gap assessment from fixed need heuristics
//! - Estimates IRR for cash-value ("wealth") products
//! - Generates an advisory script and persists the finalized profile
//!
//! FLOW:
//! INBOUND TEXT → STATE MACHINE → (final step) ORCHESTRATOR →
//! {EXTRACT, GAP, IRR, NARRATIVE, PERSIST} → OUTBOUND TEXT

pub mod analysis;
pub mod api;
pub mod error;
pub mod extract;
pub mod finance;
pub mod gap;
pub mod intake;
pub mod models;
pub mod narrative;
pub mod store;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use models::*;
pub use analysis::{AnalysisOrchestrator, AnalysisOutcome};
pub use intake::IntakeEngine;
