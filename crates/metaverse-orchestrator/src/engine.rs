use crate::config::SimulationConfig;
use crate::optimizer::ConnectionOptimizer;
use crate::policy::{RandomConnection, SimRng};
use crate::simulator::EnvironmentSimulator;
use crate::tick::{TickEngine, TickReport};
use futures_util::future::join_all;
use metaverse_agent::{AgentConfig, AgentOutcome, AgentRunner, ImprovementProvider, PerformanceReport};
use metaverse_core::{Agent, Environment, KnowledgeBase, MetaverseError, MetaverseResult, Task};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Which best-effort agent operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOperation {
    PerformTask,
    SelfImprove,
    Collaborate,
}

/// A failed agent operation. The agent kept its previous state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFailure {
    pub agent_id: Uuid,
    pub operation: AgentOperation,
    pub reason: String,
}

/// Entities provisioned by [`MetaverseOrchestrator::initialize`].
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub environments: Vec<Uuid>,
    pub agents: Vec<Uuid>,
    pub tasks: Vec<Uuid>,
}

/// One global tick.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub environments: Vec<TickReport>,
    /// Completed tasks handed to their agents during this step, including
    /// those completed by the environments' own scheduled runs.
    pub tasks_completed: usize,
    pub tasks_spawned: Vec<Task>,
    pub collaborations: usize,
    pub agent_failures: Vec<AgentFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPerformance {
    pub agent_id: Uuid,
    pub report: PerformanceReport,
}

/// Totals for a whole [`MetaverseOrchestrator::run_for`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    pub tasks_completed: usize,
    pub tasks_spawned: usize,
    pub collaborations: usize,
    pub agent_failures: Vec<AgentFailure>,
    pub performance: Vec<AgentPerformance>,
}

/// Top-level driver: owns the simulator and every agent runner.
pub struct MetaverseOrchestrator {
    config: SimulationConfig,
    agent_config: AgentConfig,
    provider: Arc<dyn ImprovementProvider>,
    simulator: EnvironmentSimulator,
    runners: Vec<AgentRunner>,
    homes: HashMap<Uuid, Uuid>,
    completed: Vec<Task>,
    rng: SimRng,
}

impl MetaverseOrchestrator {
    /// Orchestrator with random metrics and completion draws. The
    /// simulation-level merge strategy overrides the agent config's.
    pub fn new(
        config: SimulationConfig,
        agent_config: AgentConfig,
        provider: Arc<dyn ImprovementProvider>,
    ) -> MetaverseResult<Self> {
        let rng = SimRng::new(config.seed);
        let engine = TickEngine::from_config(&config, &rng);
        Self::with_engine(config, agent_config, provider, engine, rng)
    }

    /// Orchestrator with an explicit tick engine, e.g. one built from
    /// deterministic policies.
    pub fn with_engine(
        config: SimulationConfig,
        mut agent_config: AgentConfig,
        provider: Arc<dyn ImprovementProvider>,
        engine: TickEngine,
        rng: SimRng,
    ) -> MetaverseResult<Self> {
        config.validate()?;
        agent_config.validate()?;
        agent_config.merge_strategy = config.merge_strategy;

        let simulator = EnvironmentSimulator::new(engine, config.tick_interval());
        Ok(Self {
            config,
            agent_config,
            provider,
            simulator,
            runners: Vec::new(),
            homes: HashMap::new(),
            completed: Vec::new(),
            rng,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn simulator(&self) -> &EnvironmentSimulator {
        &self.simulator
    }

    /// Current agent states, in registration order.
    pub fn agents(&self) -> Vec<&Agent> {
        self.runners.iter().map(|r| r.agent()).collect()
    }

    pub fn knowledge_base(&self, agent_id: Uuid) -> Option<&KnowledgeBase> {
        self.runners
            .iter()
            .find(|r| r.id() == agent_id)
            .map(|r| r.knowledge_base())
    }

    /// The environment an agent was registered into.
    pub fn home_of(&self, agent_id: Uuid) -> Option<Uuid> {
        self.homes.get(&agent_id).copied()
    }

    pub async fn snapshots(&self) -> MetaverseResult<Vec<Environment>> {
        self.simulator.snapshots().await
    }

    /// Register an agent with an environment and start driving it.
    pub async fn add_agent(&mut self, environment_id: Uuid, agent: Agent) -> MetaverseResult<Uuid> {
        let agent_id = agent.id;
        self.simulator.add_agent(environment_id, agent.clone()).await?;
        self.runners.push(AgentRunner::new(
            agent,
            self.provider.clone(),
            self.agent_config.clone(),
        ));
        self.homes.insert(agent_id, environment_id);
        info!(agent_id = %agent_id, environment_id = %environment_id, "Agent registered");
        Ok(agent_id)
    }

    /// Provision the starter environments, one agent and one assigned task
    /// in each, then start every environment's own scheduled run.
    pub async fn initialize(&mut self) -> MetaverseResult<InitReport> {
        match self.provision().await {
            Ok(report) => {
                info!(
                    environments = report.environments.len(),
                    agents = report.agents.len(),
                    tasks = report.tasks.len(),
                    "Metaverse initialized"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Metaverse initialization failed");
                Err(e)
            }
        }
    }

    async fn provision(&mut self) -> MetaverseResult<InitReport> {
        let mut report = InitReport {
            environments: Vec::new(),
            agents: Vec::new(),
            tasks: Vec::new(),
        };

        let starters = self.config.starter_environments.clone();
        for starter in &starters {
            let environment = self.simulator.create_environment(
                &starter.name,
                &starter.env_type,
                starter.capacity,
            )?;
            let agent = Agent::new(&starter.agent_type, starter.initial_knowledge());
            let agent_id = self.add_agent(environment.id, agent).await?;

            let task = self
                .simulator
                .create_task(environment.id, &starter.task_description, &starter.task_type)
                .await?;
            self.simulator
                .assign_task_to_agent(environment.id, task.id, agent_id)
                .await?;

            report.environments.push(environment.id);
            report.agents.push(agent_id);
            report.tasks.push(task.id);
        }

        if self.config.environment_run_ticks > 0 {
            for environment_id in &report.environments {
                self.simulator
                    .run_for(*environment_id, self.config.environment_run_ticks)
                    .await?;
            }
        }
        Ok(report)
    }

    /// Run `ticks` global ticks, sleeping one tick interval between them,
    /// then refresh every agent's performance figures.
    pub async fn run_for(&mut self, ticks: u64) -> MetaverseResult<RunReport> {
        info!(ticks, "Metaverse run started");
        let mut report = RunReport::default();

        for tick in 0..ticks {
            let step = match self.step().await {
                Ok(step) => step,
                Err(e) => {
                    error!(tick, error = %e, "Metaverse tick failed");
                    return Err(e);
                }
            };
            report.ticks += 1;
            report.tasks_completed += step.tasks_completed;
            report.tasks_spawned += step.tasks_spawned.len();
            report.collaborations += step.collaborations;
            report.agent_failures.extend(step.agent_failures);

            if tick + 1 < ticks {
                tokio::time::sleep(self.config.tick_interval()).await;
            }
        }

        self.sync_assignments().await?;
        report.performance = self.refresh_performance();
        info!(
            ticks = report.ticks,
            tasks_completed = report.tasks_completed,
            tasks_spawned = report.tasks_spawned,
            failures = report.agent_failures.len(),
            "Metaverse run completed"
        );
        Ok(report)
    }

    /// One global tick: advance environments, feed completed tasks to their
    /// agents, improve and collaborate, and maybe spawn a task.
    pub async fn step(&mut self) -> MetaverseResult<StepReport> {
        let ids = self.simulator.environment_ids().to_vec();

        let ticks = join_all(ids.iter().map(|id| self.simulator.tick(*id))).await;
        let environments = ticks.into_iter().collect::<MetaverseResult<Vec<_>>>()?;
        self.sync_assignments().await?;

        let mut failures = Vec::new();
        let tasks_completed = self.feed_completed(&ids, &mut failures).await?;
        let collaborations = self.advance_agents(&mut failures).await;
        let tasks_spawned = self.maybe_spawn_task(&ids).await?.into_iter().collect();

        Ok(StepReport {
            environments,
            tasks_completed,
            tasks_spawned,
            collaborations,
            agent_failures: failures,
        })
    }

    /// Mirror every environment's assignments onto the matching runners,
    /// including those made by scheduled runs.
    async fn sync_assignments(&mut self) -> MetaverseResult<()> {
        for environment in self.simulator.snapshots().await? {
            for member in &environment.agents {
                if let Some(runner) = self.runners.iter_mut().find(|r| r.id() == member.id) {
                    runner.track_assignments(&member.assigned_tasks);
                }
            }
        }
        Ok(())
    }

    async fn feed_completed(
        &mut self,
        ids: &[Uuid],
        failures: &mut Vec<AgentFailure>,
    ) -> MetaverseResult<usize> {
        let mut fed = 0;
        for environment_id in ids {
            for task in self.simulator.drain_completed(*environment_id).await? {
                fed += 1;
                let runner = task
                    .assigned_agent_id
                    .and_then(|agent_id| self.runners.iter_mut().find(|r| r.id() == agent_id));
                match runner {
                    Some(runner) => {
                        if let AgentOutcome::Failed { reason } =
                            runner.perform_task(&task, *environment_id).await
                        {
                            failures.push(AgentFailure {
                                agent_id: runner.id(),
                                operation: AgentOperation::PerformTask,
                                reason,
                            });
                        }
                    }
                    None => warn!(task_id = %task.id, "Completed task has no registered agent"),
                }
                self.completed.push(task);
            }
        }
        Ok(fed)
    }

    async fn advance_agents(&mut self, failures: &mut Vec<AgentFailure>) -> usize {
        let mut collaborations = 0;
        for index in 0..self.runners.len() {
            if let AgentOutcome::Failed { reason } = self.runners[index].self_improve().await {
                failures.push(AgentFailure {
                    agent_id: self.runners[index].id(),
                    operation: AgentOperation::SelfImprove,
                    reason,
                });
            }

            if !self.rng.chance(self.config.collaboration_probability) {
                continue;
            }
            let peers: Vec<KnowledgeBase> = self
                .rng
                .sample_indices(self.runners.len() - 1, self.config.max_collaborators)
                .into_iter()
                .map(|k| if k >= index { k + 1 } else { k })
                .map(|k| self.runners[k].knowledge_base().clone())
                .collect();
            if peers.is_empty() {
                continue;
            }
            match self.runners[index].collaborate(&peers) {
                AgentOutcome::Completed => collaborations += 1,
                AgentOutcome::Failed { reason } => failures.push(AgentFailure {
                    agent_id: self.runners[index].id(),
                    operation: AgentOperation::Collaborate,
                    reason,
                }),
            }
        }
        collaborations
    }

    async fn maybe_spawn_task(&self, ids: &[Uuid]) -> MetaverseResult<Option<Task>> {
        if !self.rng.chance(self.config.task_spawn_probability) {
            return Ok(None);
        }
        let (Some(env_index), Some(type_index)) = (
            self.rng.index(ids.len()),
            self.rng.index(self.config.task_types.len()),
        ) else {
            return Ok(None);
        };
        let task_type = &self.config.task_types[type_index];
        let task = self
            .simulator
            .create_task(ids[env_index], format!("Perform {task_type}"), task_type.as_str())
            .await?;
        Ok(Some(task))
    }

    fn refresh_performance(&mut self) -> Vec<AgentPerformance> {
        let completed = &self.completed;
        self.runners
            .iter_mut()
            .map(|runner| AgentPerformance {
                agent_id: runner.id(),
                report: runner.refresh_performance(completed),
            })
            .collect()
    }

    /// Link environments pairwise with the configured connection probability.
    pub async fn optimize_connections(&self) -> MetaverseResult<Vec<(Uuid, Uuid)>> {
        let optimizer = ConnectionOptimizer::new(Arc::new(RandomConnection::new(
            self.config.connection_probability,
            self.rng.clone(),
        )));
        self.simulator.optimize_connections(&optimizer).await
    }

    /// Look up a runner, reporting unknown ids explicitly.
    pub fn agent(&self, agent_id: Uuid) -> MetaverseResult<&Agent> {
        self.runners
            .iter()
            .find(|r| r.id() == agent_id)
            .map(|r| r.agent())
            .ok_or(MetaverseError::UnknownAgent(agent_id))
    }
}

impl std::fmt::Debug for MetaverseOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaverseOrchestrator")
            .field("simulator", &self.simulator)
            .field("agents", &self.runners.len())
            .field("completed", &self.completed.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::monitor::{EnvironmentMonitor, FixedMetricsSampler};
    use crate::policy::FixedCompletion;
    use metaverse_agent::VersionBumpProvider;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            tick_interval_ms: 1,
            environment_run_ticks: 0,
            collaboration_probability: 0.0,
            task_spawn_probability: 0.0,
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    fn orchestrator(config: SimulationConfig, complete: bool) -> MetaverseOrchestrator {
        let engine = TickEngine::new(
            EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(10.0))),
            Arc::new(FixedCompletion(complete)),
        );
        let rng = SimRng::new(config.seed);
        MetaverseOrchestrator::with_engine(
            config,
            AgentConfig::instant(),
            Arc::new(VersionBumpProvider),
            engine,
            rng,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_provisions_starters() {
        let mut orch = orchestrator(quiet_config(), false);
        let report = orch.initialize().await.unwrap();
        assert_eq!(report.environments.len(), 3);
        assert_eq!(report.agents.len(), 3);

        let snapshots = orch.snapshots().await.unwrap();
        let capacities: Vec<u32> = snapshots.iter().map(|e| e.capacity).collect();
        assert_eq!(capacities, vec![100, 150, 200]);
        for (env, agent_id) in snapshots.iter().zip(&report.agents) {
            assert_eq!(env.agents.len(), 1);
            assert_eq!(env.tasks.len(), 1);
            assert_eq!(env.tasks[0].assigned_agent_id, Some(*agent_id));
            assert_eq!(orch.home_of(*agent_id), Some(env.id));
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            collaboration_probability: 2.0,
            ..quiet_config()
        };
        let result = MetaverseOrchestrator::new(config, AgentConfig::instant(), Arc::new(VersionBumpProvider));
        assert!(matches!(result, Err(MetaverseError::Config(_))));
    }

    #[tokio::test]
    async fn test_completed_tasks_feed_agents() {
        let mut orch = orchestrator(quiet_config(), true);
        let report = orch.initialize().await.unwrap();

        let step = orch.step().await.unwrap();
        assert_eq!(step.tasks_completed, 3);
        assert!(step.agent_failures.is_empty());

        let urban = report.agents[0];
        // 5 + 1 from the completed seed task
        assert_eq!(orch.knowledge_base(urban).unwrap().strength("urban_planning"), Some(6.0));
        // perform_task and self_improve each bump once
        assert_eq!(orch.agent(urban).unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_run_refreshes_performance() {
        let mut orch = orchestrator(quiet_config(), true);
        orch.initialize().await.unwrap();
        let report = orch.run_for(2).await.unwrap();
        assert_eq!(report.ticks, 2);
        assert_eq!(report.tasks_completed, 3);
        assert_eq!(report.performance.len(), 3);
        for entry in &report.performance {
            assert_eq!(entry.report.task_completion_rate, 1.0);
            assert_eq!(entry.report.score, 100.0);
        }
    }

    #[tokio::test]
    async fn test_spawn_and_collaborate_always() {
        let config = SimulationConfig {
            collaboration_probability: 1.0,
            task_spawn_probability: 1.0,
            ..quiet_config()
        };
        let mut orch = orchestrator(config, false);
        orch.initialize().await.unwrap();

        let step = orch.step().await.unwrap();
        assert_eq!(step.tasks_spawned.len(), 1);
        assert_eq!(step.collaborations, 3);
        let spawned = &step.tasks_spawned[0];
        assert!(orch.config().task_types.contains(&spawned.task_type));
        assert!(spawned.is_unassigned());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_explicit() {
        let orch = orchestrator(quiet_config(), false);
        let missing = Uuid::new_v4();
        let err = orch.agent(missing).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, MetaverseError::UnknownAgent(id) if id == missing));
        assert!(!err.to_string().contains(&Uuid::nil().to_string()));
        assert!(orch
            .simulator()
            .create_task(Uuid::new_v4(), "x", "analysis")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
