use crate::agent::Agent;
use crate::error::{MetaverseError, MetaverseResult};
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Health classification of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Initializing,
    Normal,
    Overloaded,
}

impl std::fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentStatus::Initializing => write!(f, "initializing"),
            EnvironmentStatus::Normal => write!(f, "normal"),
            EnvironmentStatus::Overloaded => write!(f, "overloaded"),
        }
    }
}

/// An isolated simulation arena.
///
/// Tasks are kept in creation order and every task carries this
/// environment's id. `connections` holds peer ids; symmetry across peers is
/// maintained by whoever links two environments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: String,
    pub capacity: u32,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub connections: BTreeSet<Uuid>,
    pub status: EnvironmentStatus,
}

impl Environment {
    pub fn new(name: impl Into<String>, env_type: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            env_type: env_type.into(),
            capacity,
            agents: Vec::new(),
            tasks: Vec::new(),
            connections: BTreeSet::new(),
            status: EnvironmentStatus::Initializing,
        }
    }

    /// Add an agent, replacing any existing member with the same id.
    pub fn add_agent(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    /// Remove an agent by id. Returns whether a member was removed.
    pub fn remove_agent(&mut self, agent_id: Uuid) -> bool {
        let before = self.agents.len();
        self.agents.retain(|a| a.id != agent_id);
        self.agents.len() != before
    }

    pub fn agent(&self, agent_id: Uuid) -> MetaverseResult<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id == agent_id)
            .ok_or(MetaverseError::AgentNotFound {
                environment_id: self.id,
                agent_id,
            })
    }

    pub fn agent_mut(&mut self, agent_id: Uuid) -> MetaverseResult<&mut Agent> {
        let environment_id = self.id;
        self.agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or(MetaverseError::AgentNotFound {
                environment_id,
                agent_id,
            })
    }

    /// Create a new unassigned task owned by this environment and append it.
    pub fn create_task(
        &mut self,
        description: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Task {
        let task = Task::new(description, task_type, self.id);
        self.tasks.push(task.clone());
        task
    }

    pub fn task(&self, task_id: Uuid) -> MetaverseResult<&Task> {
        self.tasks
            .iter()
            .find(|t| t.id == task_id)
            .ok_or(MetaverseError::TaskNotFound {
                environment_id: self.id,
                task_id,
            })
    }

    /// Replace the stored record of a task with an updated copy.
    pub fn replace_task(&mut self, updated: Task) -> MetaverseResult<()> {
        let environment_id = self.id;
        let slot = self
            .tasks
            .iter_mut()
            .find(|t| t.id == updated.id)
            .ok_or(MetaverseError::TaskNotFound {
                environment_id,
                task_id: updated.id,
            })?;
        *slot = updated;
        Ok(())
    }

    /// The earliest-created task still waiting for an agent.
    pub fn first_unassigned(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.is_unassigned())
    }

    pub fn count_tasks(&self, predicate: impl Fn(&Task) -> bool) -> usize {
        self.tasks.iter().filter(|t| predicate(*t)).count()
    }

    /// Record a one-sided link to a peer. Returns false if already linked
    /// or if `peer` is this environment.
    pub fn link(&mut self, peer: Uuid) -> bool {
        peer != self.id && self.connections.insert(peer)
    }

    pub fn is_connected(&self, peer: Uuid) -> bool {
        self.connections.contains(&peer)
    }
}
