use metaverse_core::{Agent, Performance, Task};
use serde::{Deserialize, Serialize};

/// Score and metrics for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// `task_completion_rate * 100`.
    pub score: f64,
    pub task_completion_rate: f64,
    pub average_completion_time_ms: f64,
}

impl PerformanceReport {
    pub fn performance(&self) -> Performance {
        Performance {
            task_completion_rate: self.task_completion_rate,
            average_completion_time: self.average_completion_time_ms,
        }
    }
}

/// Scores agents from the tasks they completed.
pub struct PerformanceEvaluator;

impl PerformanceEvaluator {
    /// Only tasks that are completed and were assigned to `agent` count.
    /// With no assigned tasks the rate is zero; with no completed tasks the
    /// average time is zero.
    pub fn evaluate(agent: &Agent, tasks: &[Task]) -> PerformanceReport {
        let done: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.is_completed() && t.assigned_agent_id == Some(agent.id))
            .collect();

        let task_completion_rate = if agent.assigned_tasks.is_empty() {
            0.0
        } else {
            (done.len() as f64 / agent.assigned_tasks.len() as f64).min(1.0)
        };

        let average_completion_time_ms = if done.is_empty() {
            0.0
        } else {
            let total: i64 = done
                .iter()
                .filter_map(|t| t.completion_time())
                .map(|d| d.num_milliseconds())
                .sum();
            total as f64 / done.len() as f64
        };

        PerformanceReport {
            score: task_completion_rate * 100.0,
            task_completion_rate,
            average_completion_time_ms,
        }
    }
}
