//! Simulated agents for the Metaverse simulation.
//!
//! An [`AgentRunner`] wraps one [`metaverse_core::Agent`] and exposes the
//! three best-effort operations the orchestrator drives every tick:
//! task execution, self-improvement and collaboration. Improvement itself is
//! delegated to an [`ImprovementProvider`].

pub mod config;
pub mod performance;
pub mod provider;
pub mod runner;

pub use config::AgentConfig;
pub use performance::{PerformanceEvaluator, PerformanceReport};
pub use provider::{ImprovementProvider, VersionBumpProvider};
pub use runner::{AgentOutcome, AgentRunner};
