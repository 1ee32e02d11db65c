use crate::driver::{EnvironmentDriver, EnvironmentHandle};
use crate::optimizer::ConnectionOptimizer;
use crate::tick::{TickEngine, TickReport};
use metaverse_core::{Agent, Environment, MetaverseError, MetaverseResult, Task};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Registry of running environments.
///
/// Each registered environment is owned by its own [`EnvironmentDriver`];
/// the simulator only holds handles. Dropping the simulator stops every
/// driver.
pub struct EnvironmentSimulator {
    environments: HashMap<Uuid, EnvironmentHandle>,
    order: Vec<Uuid>,
    engine: Arc<TickEngine>,
    tick_interval: Duration,
}

impl EnvironmentSimulator {
    pub fn new(engine: TickEngine, tick_interval: Duration) -> Self {
        Self {
            environments: HashMap::new(),
            order: Vec::new(),
            engine: Arc::new(engine),
            tick_interval,
        }
    }

    /// Register a new environment in status `initializing` and start its
    /// driver. Must be called from within a tokio runtime.
    ///
    /// Fails with a config error when `capacity` is zero.
    pub fn create_environment(
        &mut self,
        name: impl Into<String>,
        env_type: impl Into<String>,
        capacity: u32,
    ) -> MetaverseResult<Environment> {
        let name: String = name.into();
        if capacity == 0 {
            return Err(MetaverseError::Config(format!(
                "environment '{name}' needs a positive capacity"
            )));
        }
        let environment = Environment::new(name, env_type, capacity);
        let snapshot = environment.clone();
        let handle = EnvironmentDriver::spawn(environment, self.engine.clone(), self.tick_interval);

        self.order.push(snapshot.id);
        self.environments.insert(snapshot.id, handle);
        info!(
            environment_id = %snapshot.id,
            name = %snapshot.name,
            env_type = %snapshot.env_type,
            capacity = snapshot.capacity,
            "Environment created"
        );
        Ok(snapshot)
    }

    /// Environment ids in creation order.
    pub fn environment_ids(&self) -> &[Uuid] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn handle(&self, environment_id: Uuid) -> MetaverseResult<&EnvironmentHandle> {
        self.environments
            .get(&environment_id)
            .ok_or(MetaverseError::EnvironmentNotFound(environment_id))
    }

    pub async fn add_agent(&self, environment_id: Uuid, agent: Agent) -> MetaverseResult<()> {
        self.handle(environment_id)?.add_agent(agent).await
    }

    /// Returns whether the agent was a member.
    pub async fn remove_agent(&self, environment_id: Uuid, agent_id: Uuid) -> MetaverseResult<bool> {
        self.handle(environment_id)?.remove_agent(agent_id).await
    }

    pub async fn create_task(
        &self,
        environment_id: Uuid,
        description: impl Into<String>,
        task_type: impl Into<String>,
    ) -> MetaverseResult<Task> {
        self.handle(environment_id)?
            .create_task(description.into(), task_type.into())
            .await
    }

    pub async fn assign_task_to_agent(
        &self,
        environment_id: Uuid,
        task_id: Uuid,
        agent_id: Uuid,
    ) -> MetaverseResult<Task> {
        self.handle(environment_id)?
            .assign_task(task_id, agent_id)
            .await
    }

    /// Advance one environment by a single tick.
    pub async fn tick(&self, environment_id: Uuid) -> MetaverseResult<TickReport> {
        self.handle(environment_id)?.tick().await
    }

    /// Schedule `ticks` more ticks for one environment, one per tick
    /// interval, extending any run already in progress.
    pub async fn run_for(&self, environment_id: Uuid, ticks: u64) -> MetaverseResult<()> {
        self.handle(environment_id)?.run_for(ticks).await
    }

    pub async fn drain_completed(&self, environment_id: Uuid) -> MetaverseResult<Vec<Task>> {
        self.handle(environment_id)?.drain_completed().await
    }

    pub async fn snapshot(&self, environment_id: Uuid) -> MetaverseResult<Environment> {
        self.handle(environment_id)?.snapshot().await
    }

    /// Snapshots of every environment in creation order.
    pub async fn snapshots(&self) -> MetaverseResult<Vec<Environment>> {
        let mut snapshots = Vec::with_capacity(self.order.len());
        for id in &self.order {
            snapshots.push(self.snapshot(*id).await?);
        }
        Ok(snapshots)
    }

    /// Link environments chosen by the optimizer, on both sides of each pair.
    /// Returns the newly linked pairs.
    pub async fn optimize_connections(
        &self,
        optimizer: &ConnectionOptimizer,
    ) -> MetaverseResult<Vec<(Uuid, Uuid)>> {
        let mut snapshots = self.snapshots().await?;
        let links = optimizer.optimize(&mut snapshots);
        for (a, b) in &links {
            self.handle(*a)?.link(*b).await?;
            self.handle(*b)?.link(*a).await?;
        }
        info!(links = links.len(), "Connections optimized");
        Ok(links)
    }
}

impl std::fmt::Debug for EnvironmentSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentSimulator")
            .field("environments", &self.order)
            .field("engine", &self.engine)
            .field("tick_interval", &self.tick_interval)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::monitor::{EnvironmentMonitor, FixedMetricsSampler};
    use crate::policy::{FixedCompletion, FixedConnection};
    use metaverse_core::{EnvironmentStatus, KnowledgeBase};

    fn simulator() -> EnvironmentSimulator {
        let engine = TickEngine::new(
            EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(20.0))),
            Arc::new(FixedCompletion(false)),
        );
        EnvironmentSimulator::new(engine, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_create_environment_registers() {
        let mut sim = simulator();
        let env = sim.create_environment("Urban Planning", "urban", 100).unwrap();
        assert_eq!(env.status, EnvironmentStatus::Initializing);
        assert_eq!(sim.environment_ids(), &[env.id]);
        assert_eq!(sim.snapshot(env.id).await.unwrap(), env);
    }

    #[tokio::test]
    async fn test_create_environment_rejects_zero_capacity() {
        let mut sim = simulator();
        let err = sim.create_environment("Empty", "urban", 0).unwrap_err();
        assert!(matches!(err, MetaverseError::Config(_)));
        assert!(sim.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_environment_is_explicit() {
        let sim = simulator();
        let missing = Uuid::new_v4();

        let err = sim.create_task(missing, "x", "analysis").await.unwrap_err();
        assert!(matches!(err, MetaverseError::EnvironmentNotFound(id) if id == missing));
        assert!(sim.tick(missing).await.unwrap_err().is_not_found());
        assert!(sim
            .add_agent(missing, Agent::new("urban", KnowledgeBase::new()))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(sim
            .assign_task_to_agent(missing, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_assign_reports_missing_members() {
        let mut sim = simulator();
        let env = sim.create_environment("Climate Model", "climate", 150).unwrap();
        let task = sim
            .create_task(env.id, "Predict weather patterns", "climate_modeling")
            .await
            .unwrap();

        let err = sim
            .assign_task_to_agent(env.id, task.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, MetaverseError::AgentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_optimize_connections_links_both_sides() {
        let mut sim = simulator();
        let a = sim.create_environment("A", "urban", 10).unwrap();
        let b = sim.create_environment("B", "climate", 10).unwrap();
        let c = sim.create_environment("C", "finance", 10).unwrap();

        let links = sim
            .optimize_connections(&ConnectionOptimizer::new(Arc::new(FixedConnection(true))))
            .await
            .unwrap();
        assert_eq!(links.len(), 3);

        let snapshots = sim.snapshots().await.unwrap();
        for env in &snapshots {
            assert_eq!(env.connections.len(), 2);
        }
        assert!(snapshots[0].is_connected(b.id) && snapshots[1].is_connected(a.id));
        assert!(snapshots[2].is_connected(a.id));
        assert_eq!(snapshots[2].id, c.id);

        // Re-running adds nothing new.
        let again = sim
            .optimize_connections(&ConnectionOptimizer::new(Arc::new(FixedConnection(true))))
            .await
            .unwrap();
        assert!(again.is_empty());
    }
}
