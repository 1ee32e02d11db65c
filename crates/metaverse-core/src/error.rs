use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`MetaverseError`].
pub type MetaverseResult<T> = Result<T, MetaverseError>;

/// Top-level error type for the Metaverse simulation.
#[derive(Error, Debug)]
pub enum MetaverseError {
    /// The referenced environment id is absent from the registry.
    #[error("Environment {0} not found")]
    EnvironmentNotFound(Uuid),

    /// The referenced task does not belong to the environment.
    #[error("Task {task_id} not found in environment {environment_id}")]
    TaskNotFound { environment_id: Uuid, task_id: Uuid },

    /// The referenced agent is not a member of the environment.
    #[error("Agent {agent_id} not found in environment {environment_id}")]
    AgentNotFound { environment_id: Uuid, agent_id: Uuid },

    /// The referenced agent was never registered with the orchestrator.
    #[error("Agent {0} is not registered")]
    UnknownAgent(Uuid),

    /// A task state change was requested from a disallowed state.
    #[error("Invalid transition for task {task_id}: cannot {action} from '{from}'")]
    InvalidTransition {
        task_id: Uuid,
        from: String,
        action: &'static str,
    },

    /// The improvement provider rejected or failed.
    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    /// Simulated task execution failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration parsing or validation failed.
    #[error("Config error: {0}")]
    Config(String),

    /// The driver that owns an environment stopped accepting commands.
    #[error("Driver for environment {0} is closed")]
    DriverClosed(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetaverseError {
    /// True for lookup failures (environment, task or agent missing).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MetaverseError::EnvironmentNotFound(_)
                | MetaverseError::TaskNotFound { .. }
                | MetaverseError::AgentNotFound { .. }
                | MetaverseError::UnknownAgent(_)
        )
    }
}
