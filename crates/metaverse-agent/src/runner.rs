use crate::config::AgentConfig;
use crate::performance::{PerformanceEvaluator, PerformanceReport};
use crate::provider::{check_successor, ImprovementProvider};
use metaverse_core::{
    merge_with, Agent, KnowledgeBase, MetaverseError, MetaverseResult, Task,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Result of a best-effort agent operation.
///
/// Failures never propagate as errors: the agent keeps its previous state
/// and the caller decides whether to log, count or escalate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AgentOutcome {
    Completed,
    Failed { reason: String },
}

impl AgentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AgentOutcome::Completed)
    }
}

/// Drives one agent: executes tasks, self-improves and collaborates.
///
/// Every mutating operation works on a candidate copy and only adopts it
/// once the whole operation succeeded, so a failure leaves the agent
/// exactly as it was.
pub struct AgentRunner {
    agent: Agent,
    provider: Arc<dyn ImprovementProvider>,
    config: AgentConfig,
}

impl AgentRunner {
    pub fn new(agent: Agent, provider: Arc<dyn ImprovementProvider>, config: AgentConfig) -> Self {
        Self {
            agent,
            provider,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.agent.id
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Read-only view of the current knowledge.
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.agent.knowledge_base
    }

    /// Execute `task` inside `environment_id`: wait a random delay, learn from
    /// the task type, then ask the provider for an improved snapshot.
    pub async fn perform_task(&mut self, task: &Task, environment_id: Uuid) -> AgentOutcome {
        info!(agent_id = %self.agent.id, task_id = %task.id, "Agent starting task");

        let result = self.execute(task, environment_id).await;
        match result {
            Ok(updated) => {
                self.agent = updated;
                info!(agent_id = %self.agent.id, task_id = %task.id, "Agent completed task");
                AgentOutcome::Completed
            }
            Err(e) => {
                error!(
                    agent_id = %self.agent.id,
                    task_id = %task.id,
                    error = %e,
                    "Agent task execution failed"
                );
                AgentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn execute(&self, task: &Task, environment_id: Uuid) -> MetaverseResult<Agent> {
        if task.environment_id != environment_id {
            return Err(MetaverseError::Execution(format!(
                "task {} belongs to environment {}, not {}",
                task.id, task.environment_id, environment_id
            )));
        }

        let delay_ms = match self.config.max_execution_delay_ms {
            0 => 0,
            max => rand::thread_rng().gen_range(0..=max),
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let mut candidate = self.agent.clone();
        candidate.knowledge_base.learn(&task.task_type);
        candidate.track_task(task.id);

        self.improve(&candidate).await
    }

    /// Merge peer knowledge into this agent's own. This agent's knowledge is
    /// always the first element of the merge sequence.
    pub fn collaborate(&mut self, peer_knowledge: &[KnowledgeBase]) -> AgentOutcome {
        let mut bases = Vec::with_capacity(peer_knowledge.len() + 1);
        bases.push(self.agent.knowledge_base.clone());
        bases.extend(peer_knowledge.iter().cloned());

        self.agent.knowledge_base = merge_with(&bases, self.config.merge_strategy);

        info!(
            agent_id = %self.agent.id,
            peers = peer_knowledge.len(),
            topics = self.agent.knowledge_base.len(),
            "Agent collaborated"
        );
        AgentOutcome::Completed
    }

    /// Ask the provider for an improved snapshot and adopt it.
    pub async fn self_improve(&mut self) -> AgentOutcome {
        match self.improve(&self.agent).await {
            Ok(updated) => {
                self.agent = updated;
                info!(agent_id = %self.agent.id, version = self.agent.version, "Agent self-improved");
                AgentOutcome::Completed
            }
            Err(e) => {
                error!(agent_id = %self.agent.id, error = %e, "Agent self-improvement failed");
                AgentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn improve(&self, candidate: &Agent) -> MetaverseResult<Agent> {
        let improved = self.provider.improve(candidate).await.map_err(|e| match e {
            MetaverseError::ProviderFailure(_) => e,
            other => MetaverseError::ProviderFailure(other.to_string()),
        })?;
        check_successor(candidate, &improved)?;
        Ok(improved)
    }

    /// Record tasks an environment bound to this agent. Already known ids
    /// are skipped.
    pub fn track_assignments(&mut self, task_ids: &[Uuid]) {
        for task_id in task_ids {
            self.agent.track_task(*task_id);
        }
    }

    /// Recompute the agent's performance figures from its completed tasks.
    pub fn refresh_performance(&mut self, completed: &[Task]) -> PerformanceReport {
        let report = PerformanceEvaluator::evaluate(&self.agent, completed);
        self.agent.performance = report.performance();
        report
    }
}
