//! Core entities and error definitions for the Metaverse simulation.
//!
//! This crate provides the types shared across all Metaverse crates: the
//! environment, agent and task entities, the task lifecycle state machine,
//! and the knowledge merge algorithm.
//!
//! # Main types
//!
//! - [`MetaverseError`] - Unified error enum for all Metaverse subsystems.
//! - [`MetaverseResult`] - Convenience alias for `Result<T, MetaverseError>`.
//! - [`Task`] - A unit of work moving through `unassigned -> assigned -> completed`.
//! - [`Agent`] - An autonomous actor with an evolving [`KnowledgeBase`].
//! - [`Environment`] - An isolated arena holding agents, tasks and a capacity.
//! - [`merge`] - Order-dependent knowledge merge used during collaboration.

/// Agent entity and performance figures.
pub mod agent;
/// Environment entity and health status.
pub mod environment;
/// Error taxonomy.
pub mod error;
/// Knowledge base and merge algorithm.
pub mod knowledge;
/// Task entity and lifecycle transitions.
pub mod task;

pub use agent::{Agent, AgentStatus, Performance};
pub use environment::{Environment, EnvironmentStatus};
pub use error::{MetaverseError, MetaverseResult};
pub use knowledge::{merge, merge_with, KnowledgeBase, KnowledgeValue, MergeStrategy};
pub use task::{Task, TaskStatus};
