//! Single-writer actor owning one environment.
//!
//! Every read and write of an environment goes through its driver's command
//! queue. The environment's own scheduled run ticks inside the same task, so
//! scheduled ticks and externally requested ticks are strictly serialized.

use crate::tick::{assign_task, TickEngine, TickReport};
use metaverse_core::{Agent, Environment, MetaverseError, MetaverseResult, Task};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 64;

enum Command {
    Tick {
        reply: oneshot::Sender<TickReport>,
    },
    CreateTask {
        description: String,
        task_type: String,
        reply: oneshot::Sender<Task>,
    },
    AddAgent {
        agent: Agent,
        reply: oneshot::Sender<()>,
    },
    RemoveAgent {
        agent_id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    AssignTask {
        task_id: Uuid,
        agent_id: Uuid,
        reply: oneshot::Sender<MetaverseResult<Task>>,
    },
    Link {
        peer: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Environment>,
    },
    RunFor {
        ticks: u64,
        reply: oneshot::Sender<()>,
    },
    DrainCompleted {
        reply: oneshot::Sender<Vec<Task>>,
    },
}

struct Schedule {
    interval: Interval,
    remaining: u64,
}

pub struct EnvironmentDriver {
    environment: Environment,
    engine: Arc<TickEngine>,
    period: Duration,
    schedule: Option<Schedule>,
    /// Completions not yet drained. A task completes at most once, so this
    /// never outgrows the environment's own task list.
    outbox: Vec<Task>,
}

impl EnvironmentDriver {
    /// Spawn the driver on the current tokio runtime and return its handle.
    /// The driver stops once every handle is dropped.
    pub fn spawn(environment: Environment, engine: Arc<TickEngine>, period: Duration) -> EnvironmentHandle {
        let id = environment.id;
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let driver = Self {
            environment,
            engine,
            period,
            schedule: None,
            outbox: Vec::new(),
        };
        tokio::spawn(driver.run(rx));
        EnvironmentHandle { id, tx }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!(environment_id = %self.environment.id, "Environment driver started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = next_scheduled(&mut self.schedule) => self.scheduled_tick(),
            }
        }
        debug!(environment_id = %self.environment.id, "Environment driver stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Tick { reply } => {
                let report = self.tick();
                let _ = reply.send(report);
            }
            Command::CreateTask {
                description,
                task_type,
                reply,
            } => {
                let task = self.environment.create_task(description, task_type);
                info!(environment_id = %self.environment.id, task_id = %task.id, task_type = %task.task_type, "Task created");
                let _ = reply.send(task);
            }
            Command::AddAgent { agent, reply } => {
                self.environment.add_agent(agent);
                let _ = reply.send(());
            }
            Command::RemoveAgent { agent_id, reply } => {
                let _ = reply.send(self.environment.remove_agent(agent_id));
            }
            Command::AssignTask {
                task_id,
                agent_id,
                reply,
            } => {
                let _ = reply.send(assign_task(&mut self.environment, task_id, agent_id));
            }
            Command::Link { peer, reply } => {
                let _ = reply.send(self.environment.link(peer));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.environment.clone());
            }
            Command::RunFor { ticks, reply } => {
                self.start_run(ticks);
                let _ = reply.send(());
            }
            Command::DrainCompleted { reply } => {
                let _ = reply.send(std::mem::take(&mut self.outbox));
            }
        }
    }

    fn tick(&mut self) -> TickReport {
        let report = self.engine.tick(&mut self.environment);
        self.outbox.extend(report.completed.iter().cloned());
        report
    }

    /// Extends a run already in progress instead of restarting it.
    fn start_run(&mut self, ticks: u64) {
        if ticks == 0 {
            debug!(environment_id = %self.environment.id, "Empty run ignored");
            return;
        }
        if let Some(schedule) = self.schedule.as_mut() {
            schedule.remaining = schedule.remaining.saturating_add(ticks);
            info!(
                environment_id = %self.environment.id,
                ticks,
                remaining = schedule.remaining,
                "Simulation extended for environment"
            );
            return;
        }
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.schedule = Some(Schedule {
            interval,
            remaining: ticks,
        });
        info!(environment_id = %self.environment.id, ticks, "Simulation started for environment");
    }

    fn scheduled_tick(&mut self) {
        self.tick();
        let finished = match self.schedule.as_mut() {
            Some(schedule) => {
                schedule.remaining = schedule.remaining.saturating_sub(1);
                schedule.remaining == 0
            }
            None => true,
        };
        if finished {
            self.schedule = None;
            info!(environment_id = %self.environment.id, "Simulation completed for environment");
        }
    }
}

async fn next_scheduled(schedule: &mut Option<Schedule>) {
    match schedule {
        Some(schedule) => {
            schedule.interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Cloneable address of a running [`EnvironmentDriver`].
#[derive(Debug, Clone)]
pub struct EnvironmentHandle {
    id: Uuid,
    tx: mpsc::Sender<Command>,
}

impl EnvironmentHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> MetaverseResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| MetaverseError::DriverClosed(self.id))?;
        rx.await.map_err(|_| MetaverseError::DriverClosed(self.id))
    }

    pub async fn tick(&self) -> MetaverseResult<TickReport> {
        self.request(|reply| Command::Tick { reply }).await
    }

    pub async fn create_task(&self, description: String, task_type: String) -> MetaverseResult<Task> {
        self.request(|reply| Command::CreateTask {
            description,
            task_type,
            reply,
        })
        .await
    }

    pub async fn add_agent(&self, agent: Agent) -> MetaverseResult<()> {
        self.request(|reply| Command::AddAgent { agent, reply }).await
    }

    pub async fn remove_agent(&self, agent_id: Uuid) -> MetaverseResult<bool> {
        self.request(|reply| Command::RemoveAgent { agent_id, reply })
            .await
    }

    pub async fn assign_task(&self, task_id: Uuid, agent_id: Uuid) -> MetaverseResult<Task> {
        self.request(|reply| Command::AssignTask {
            task_id,
            agent_id,
            reply,
        })
        .await?
    }

    pub async fn link(&self, peer: Uuid) -> MetaverseResult<bool> {
        self.request(|reply| Command::Link { peer, reply }).await
    }

    pub async fn snapshot(&self) -> MetaverseResult<Environment> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Schedule `ticks` more ticks, one per period. A run already in progress
    /// is extended, and zero ticks is a no-op. Returns once the run is
    /// scheduled, not when it finishes.
    pub async fn run_for(&self, ticks: u64) -> MetaverseResult<()> {
        self.request(|reply| Command::RunFor { ticks, reply }).await
    }

    /// Take every task completed since the last drain, in completion order.
    pub async fn drain_completed(&self) -> MetaverseResult<Vec<Task>> {
        self.request(|reply| Command::DrainCompleted { reply })
            .await
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Tick { .. } => "Tick",
            Command::CreateTask { .. } => "CreateTask",
            Command::AddAgent { .. } => "AddAgent",
            Command::RemoveAgent { .. } => "RemoveAgent",
            Command::AssignTask { .. } => "AssignTask",
            Command::Link { .. } => "Link",
            Command::Snapshot { .. } => "Snapshot",
            Command::RunFor { .. } => "RunFor",
            Command::DrainCompleted { .. } => "DrainCompleted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::monitor::{EnvironmentMonitor, FixedMetricsSampler};
    use crate::policy::FixedCompletion;
    use metaverse_core::KnowledgeBase;

    fn spawn(complete: bool, period: Duration) -> EnvironmentHandle {
        let engine = TickEngine::new(
            EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(95.0))),
            Arc::new(FixedCompletion(complete)),
        );
        EnvironmentDriver::spawn(
            Environment::new("Urban Planning", "urban", 100),
            Arc::new(engine),
            period,
        )
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let handle = spawn(false, Duration::from_secs(60));
        let agent = Agent::new("urban", KnowledgeBase::new());
        let agent_id = agent.id;
        handle.add_agent(agent).await.unwrap();
        let task = handle
            .create_task("Optimize traffic flow".into(), "urban_planning".into())
            .await
            .unwrap();
        assert_eq!(task.environment_id, handle.id());

        let assigned = handle.assign_task(task.id, agent_id).await.unwrap();
        assert_eq!(assigned.assigned_agent_id, Some(agent_id));

        let err = handle.assign_task(task.id, agent_id).await.unwrap_err();
        assert!(matches!(err, MetaverseError::InvalidTransition { .. }));

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.task(task.id).unwrap().is_assigned());
        assert!(handle.remove_agent(agent_id).await.unwrap());
        assert!(!handle.remove_agent(agent_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_tick_completions_reach_outbox() {
        let handle = spawn(true, Duration::from_secs(60));
        let agent = Agent::new("urban", KnowledgeBase::new());
        handle.add_agent(agent).await.unwrap();
        handle
            .create_task("Analyze".into(), "analysis".into())
            .await
            .unwrap();

        // The completion pass runs after assignment, so one tick does both.
        let first = handle.tick().await.unwrap();
        assert_eq!(first.assigned.len(), 1);
        assert_eq!(first.completed.len(), 1);
        assert_eq!(first.capacity, 150);
        let second = handle.tick().await.unwrap();
        assert!(second.assigned.is_empty());
        assert!(second.completed.is_empty());

        let drained = handle.drain_completed().await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, first.completed[0].id);
        assert!(handle.drain_completed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outbox_keeps_every_completion() {
        let handle = spawn(true, Duration::from_secs(60));
        for _ in 0..1500 {
            handle
                .add_agent(Agent::new("urban", KnowledgeBase::new()))
                .await
                .unwrap();
            handle
                .create_task("Analyze".into(), "analysis".into())
                .await
                .unwrap();
        }

        let report = handle.tick().await.unwrap();
        assert_eq!(report.completed.len(), 1500);
        let drained = handle.drain_completed().await.unwrap();
        assert_eq!(drained.len(), 1500);
    }

    #[tokio::test]
    async fn test_scheduled_run_stops_after_ticks() {
        let handle = spawn(false, Duration::from_millis(5));
        handle.run_for(3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Three overloaded ticks: 100 -> 150 -> 225 -> 338, then no more.
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.capacity, 338);
    }

    #[tokio::test]
    async fn test_run_for_extends_active_run() {
        let handle = spawn(false, Duration::from_millis(20));
        handle.run_for(3).await.unwrap();
        handle.run_for(0).await.unwrap();
        handle.run_for(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Four ticks in total: 100 -> 150 -> 225 -> 338 -> 507.
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.capacity, 507);
    }

    #[tokio::test]
    async fn test_zero_tick_run_keeps_active_run() {
        let handle = spawn(false, Duration::from_millis(20));
        handle.run_for(3).await.unwrap();
        handle.run_for(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.capacity, 338);
    }

    #[tokio::test]
    async fn test_link_is_one_sided_and_deduplicated() {
        let handle = spawn(false, Duration::from_secs(60));
        let peer = Uuid::new_v4();
        assert!(handle.link(peer).await.unwrap());
        assert!(!handle.link(peer).await.unwrap());
        assert!(!handle.link(handle.id()).await.unwrap());
    }
}
