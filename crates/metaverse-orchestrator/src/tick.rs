use crate::config::SimulationConfig;
use crate::monitor::{EnvironmentMonitor, MonitorReport, RandomMetricsSampler};
use crate::policy::{CompletionPolicy, ProbabilisticCompletion, SimRng};
use metaverse_core::{AgentStatus, Environment, EnvironmentStatus, MetaverseResult, Task};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a single tick did to one environment.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub environment_id: Uuid,
    /// Ids of tasks bound to an agent during the assignment pass.
    pub assigned: Vec<Uuid>,
    /// Tasks that reached `completed` during this tick.
    pub completed: Vec<Task>,
    pub health: MonitorReport,
    /// Capacity after the scaling pass.
    pub capacity: u32,
    pub scaled: bool,
}

/// Capacity after one scale-up: `ceil(capacity * factor)`, never below the
/// current value and never above `max_capacity` unless already there.
pub fn scale_capacity(capacity: u32, factor: f64, max_capacity: Option<u32>) -> u32 {
    let scaled = (f64::from(capacity) * factor).ceil();
    let scaled = if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    };
    let scaled = match max_capacity {
        Some(max) => scaled.min(max),
        None => scaled,
    };
    scaled.max(capacity)
}

/// Bind `agent_id` to an unassigned task and mark the member busy.
///
/// Fails with a not-found error when either id is unknown, and with
/// `InvalidTransition` when the task is not unassigned. Nothing is written
/// unless the whole operation succeeds.
pub fn assign_task(
    environment: &mut Environment,
    task_id: Uuid,
    agent_id: Uuid,
) -> MetaverseResult<Task> {
    environment.agent(agent_id)?;
    let assigned = environment.task(task_id)?.assign(agent_id)?;
    environment.replace_task(assigned.clone())?;

    let agent = environment.agent_mut(agent_id)?;
    agent.status = AgentStatus::Busy;
    agent.track_task(task_id);
    Ok(assigned)
}

/// The four-pass environment advance: assign, complete, monitor, scale.
#[derive(Clone)]
pub struct TickEngine {
    monitor: EnvironmentMonitor,
    completion: Arc<dyn CompletionPolicy>,
    scale_factor: f64,
    max_capacity: Option<u32>,
}

impl TickEngine {
    pub fn new(monitor: EnvironmentMonitor, completion: Arc<dyn CompletionPolicy>) -> Self {
        Self {
            monitor,
            completion,
            scale_factor: 1.5,
            max_capacity: None,
        }
    }

    pub fn with_scaling(mut self, scale_factor: f64, max_capacity: Option<u32>) -> Self {
        self.scale_factor = scale_factor;
        self.max_capacity = max_capacity;
        self
    }

    /// Engine with random metrics and probabilistic completion drawn from `rng`.
    pub fn from_config(config: &SimulationConfig, rng: &SimRng) -> Self {
        let monitor = EnvironmentMonitor::new(Arc::new(RandomMetricsSampler::new(rng.clone())))
            .with_threshold(config.overload_threshold);
        let completion = Arc::new(ProbabilisticCompletion::new(
            config.task_completion_probability,
            rng.clone(),
        ));
        Self::new(monitor, completion).with_scaling(config.scale_factor, config.max_capacity)
    }

    pub fn tick(&self, environment: &mut Environment) -> TickReport {
        let assigned = self.assignment_pass(environment);
        let completed = self.completion_pass(environment);

        let health = self.monitor.monitor(environment);
        environment.status = health.status;

        let mut scaled = false;
        if health.status == EnvironmentStatus::Overloaded {
            let new_capacity =
                scale_capacity(environment.capacity, self.scale_factor, self.max_capacity);
            scaled = new_capacity != environment.capacity;
            if scaled {
                environment.capacity = new_capacity;
                info!(
                    environment_id = %environment.id,
                    cpu_usage = health.metrics.cpu_usage,
                    new_capacity,
                    "Scaled environment"
                );
            } else {
                debug!(
                    environment_id = %environment.id,
                    capacity = environment.capacity,
                    "Overloaded at capacity ceiling"
                );
            }
        }

        debug!(
            environment_id = %environment.id,
            assigned = assigned.len(),
            completed = completed.len(),
            status = %environment.status,
            "Environment ticked"
        );

        TickReport {
            environment_id: environment.id,
            assigned,
            completed,
            health,
            capacity: environment.capacity,
            scaled,
        }
    }

    fn assignment_pass(&self, environment: &mut Environment) -> Vec<Uuid> {
        let idle: Vec<Uuid> = environment
            .agents
            .iter()
            .filter(|a| a.is_idle())
            .map(|a| a.id)
            .collect();

        let mut assigned = Vec::new();
        for agent_id in idle {
            let Some(task_id) = environment.first_unassigned().map(|t| t.id) else {
                break;
            };
            match assign_task(environment, task_id, agent_id) {
                Ok(task) => {
                    debug!(task_id = %task.id, agent_id = %agent_id, "Task assigned");
                    assigned.push(task.id);
                }
                Err(e) => warn!(task_id = %task_id, agent_id = %agent_id, error = %e, "Assignment skipped"),
            }
        }
        assigned
    }

    fn completion_pass(&self, environment: &mut Environment) -> Vec<Task> {
        let mut completed = Vec::new();
        for slot in &mut environment.tasks {
            if !slot.is_assigned() || !self.completion.should_complete(slot) {
                continue;
            }
            match slot.complete() {
                Ok(done) => {
                    *slot = done.clone();
                    completed.push(done);
                }
                Err(e) => warn!(task_id = %slot.id, error = %e, "Completion skipped"),
            }
        }

        for task in &completed {
            let Some(agent_id) = task.assigned_agent_id else {
                continue;
            };
            let still_busy = environment
                .tasks
                .iter()
                .any(|t| t.is_assigned() && t.assigned_agent_id == Some(agent_id));
            if still_busy {
                continue;
            }
            // The member may have been removed since assignment.
            if let Ok(agent) = environment.agent_mut(agent_id) {
                if agent.status == AgentStatus::Busy {
                    agent.status = AgentStatus::Idle;
                }
            }
        }
        completed
    }
}

impl std::fmt::Debug for TickEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickEngine")
            .field("monitor", &self.monitor)
            .field("scale_factor", &self.scale_factor)
            .field("max_capacity", &self.max_capacity)
            .finish_non_exhaustive()
    }
}
