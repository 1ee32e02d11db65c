//! Environment simulation and multi-agent orchestration for Metaverse.
//!
//! Every environment is owned by a single [`EnvironmentDriver`] task that
//! serializes all mutation, including its own scheduled run and the global
//! ticks sent by the [`MetaverseOrchestrator`].
//!
//! # Main types
//!
//! - [`MetaverseOrchestrator`] - Provisions the starter world and runs the global loop.
//! - [`EnvironmentSimulator`] - Registry of running environments.
//! - [`TickEngine`] - Assignment, completion, monitoring and scaling passes.
//! - [`EnvironmentMonitor`] - Synthetic health metrics and overload detection.
//! - [`ConnectionOptimizer`] - Symmetric pairwise linking of environments.

/// Simulation configuration and starter environments.
pub mod config;
/// Single-writer environment actor.
pub mod driver;
/// Global orchestration loop.
pub mod engine;
/// Environment health monitoring.
pub mod monitor;
/// Environment connection optimizer.
pub mod optimizer;
/// Injectable randomness and decision policies.
pub mod policy;
/// Environment registry.
pub mod simulator;
/// Per-environment tick passes.
pub mod tick;

pub use config::{SimulationConfig, StarterEnvironment};
pub use driver::{EnvironmentDriver, EnvironmentHandle};
pub use engine::{
    AgentFailure, AgentOperation, AgentPerformance, InitReport, MetaverseOrchestrator, RunReport,
    StepReport,
};
pub use monitor::{
    EnvironmentMetrics, EnvironmentMonitor, FixedMetricsSampler, MetricsSampler, MonitorReport,
    RandomMetricsSampler,
};
pub use optimizer::ConnectionOptimizer;
pub use policy::{
    CompletionPolicy, ConnectionPolicy, FixedCompletion, FixedConnection, ProbabilisticCompletion,
    RandomConnection, SameTypeConnection, SimRng,
};
pub use simulator::EnvironmentSimulator;
pub use tick::{assign_task, scale_capacity, TickEngine, TickReport};
