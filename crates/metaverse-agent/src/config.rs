use metaverse_core::{MergeStrategy, MetaverseError, MetaverseResult};
use serde::{Deserialize, Serialize};

/// Tunables for a simulated agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound of the random execution delay in `perform_task`.
    #[serde(default = "default_max_execution_delay_ms")]
    pub max_execution_delay_ms: u64,
    /// Rule used to combine knowledge during collaboration.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

fn default_max_execution_delay_ms() -> u64 {
    5000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_execution_delay_ms: default_max_execution_delay_ms(),
            merge_strategy: MergeStrategy::default(),
        }
    }
}

impl AgentConfig {
    /// Config with no execution delay, for tests and fast runs.
    pub fn instant() -> Self {
        Self {
            max_execution_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> MetaverseResult<()> {
        // One minute is far beyond any per-tick budget.
        if self.max_execution_delay_ms > 60_000 {
            return Err(MetaverseError::Config(format!(
                "max_execution_delay_ms must be at most 60000, got {}",
                self.max_execution_delay_ms
            )));
        }
        Ok(())
    }
}
