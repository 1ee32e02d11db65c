use crate::knowledge::KnowledgeBase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Availability of an agent inside its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
}

/// Rolling performance figures for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub task_completion_rate: f64,
    /// Mean creation-to-completion time, in milliseconds.
    pub average_completion_time: f64,
}

/// An autonomous actor with accumulating knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    /// Domain tag, e.g. `urban`.
    #[serde(rename = "type")]
    pub agent_type: String,
    pub knowledge_base: KnowledgeBase,
    pub capabilities: Vec<String>,
    pub performance: Performance,
    pub status: AgentStatus,
    pub assigned_tasks: Vec<Uuid>,
    /// Bumped by the improvement provider; never decreases.
    pub version: u32,
}

impl Agent {
    /// Create an idle agent at version 1 with the given starting knowledge.
    pub fn new(agent_type: impl Into<String>, initial_knowledge: KnowledgeBase) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            knowledge_base: initial_knowledge,
            capabilities: Vec::new(),
            performance: Performance::default(),
            status: AgentStatus::Idle,
            assigned_tasks: Vec::new(),
            version: 1,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    /// Record a task id once; repeated calls are ignored.
    pub fn track_task(&mut self, task_id: Uuid) {
        if !self.assigned_tasks.contains(&task_id) {
            self.assigned_tasks.push(task_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_creation() {
        let kb = KnowledgeBase::from_strengths([("urban_planning", 5.0)]);
        let agent = Agent::new("urban", kb.clone());
        assert_eq!(agent.agent_type, "urban");
        assert_eq!(agent.knowledge_base, kb);
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.version, 1);
        assert!(agent.capabilities.is_empty());
        assert!(agent.assigned_tasks.is_empty());
        assert_eq!(agent.performance, Performance::default());
    }

    #[test]
    fn test_track_task_dedups() {
        let mut agent = Agent::new("finance", KnowledgeBase::new());
        let task = Uuid::new_v4();
        agent.track_task(task);
        agent.track_task(task);
        assert_eq!(agent.assigned_tasks, vec![task]);
    }

    #[test]
    fn test_agent_serialization() {
        let agent = Agent::new("climate", KnowledgeBase::new())
            .with_capabilities(vec!["forecast".into()]);
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["type"], "climate");
        assert_eq!(json["status"], "idle");
        assert_eq!(json["performance"]["taskCompletionRate"], 0.0);
        let parsed: Agent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, agent);
    }
}
