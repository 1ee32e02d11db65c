use crate::error::{MetaverseError, MetaverseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task. Transitions only move forward:
/// `Unassigned -> Assigned -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Unassigned,
    Assigned,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Unassigned => write!(f, "unassigned"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A unit of work bound to exactly one environment.
///
/// `assigned_agent_id` is set iff the status is `Assigned` or `Completed`,
/// and `completed_at` is set iff the status is `Completed`. The transition
/// methods are the only way to move between states and refuse to run from
/// a disallowed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    /// Topic key, matched against knowledge base keys.
    #[serde(rename = "type")]
    pub task_type: String,
    pub environment_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_agent_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new unassigned task. Always succeeds.
    pub fn new(
        description: impl Into<String>,
        task_type: impl Into<String>,
        environment_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            task_type: task_type.into(),
            environment_id,
            status: TaskStatus::Unassigned,
            created_at: Utc::now(),
            assigned_agent_id: None,
            completed_at: None,
        }
    }

    /// Bind the task to an agent. Only valid from `Unassigned`.
    ///
    /// Returns the updated record; the caller replaces its stored copy.
    pub fn assign(&self, agent_id: Uuid) -> MetaverseResult<Task> {
        if self.status != TaskStatus::Unassigned {
            return Err(self.invalid("assign"));
        }
        Ok(Task {
            status: TaskStatus::Assigned,
            assigned_agent_id: Some(agent_id),
            ..self.clone()
        })
    }

    /// Mark the task completed now. Only valid from `Assigned`.
    pub fn complete(&self) -> MetaverseResult<Task> {
        self.complete_at(Utc::now())
    }

    /// Mark the task completed at the given instant. Only valid from `Assigned`.
    pub fn complete_at(&self, at: DateTime<Utc>) -> MetaverseResult<Task> {
        if self.status != TaskStatus::Assigned {
            return Err(self.invalid("complete"));
        }
        Ok(Task {
            status: TaskStatus::Completed,
            completed_at: Some(at),
            ..self.clone()
        })
    }

    pub fn is_unassigned(&self) -> bool {
        self.status == TaskStatus::Unassigned
    }

    pub fn is_assigned(&self) -> bool {
        self.status == TaskStatus::Assigned
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Time from creation to completion, if completed.
    pub fn completion_time(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }

    fn invalid(&self, action: &'static str) -> MetaverseError {
        MetaverseError::InvalidTransition {
            task_id: self.id,
            from: self.status.to_string(),
            action,
        }
    }
}
