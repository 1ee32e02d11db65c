use async_trait::async_trait;
use metaverse_core::{Agent, MetaverseError, MetaverseResult};

/// Trait for capability improvement providers.
///
/// Given the current agent snapshot, a provider returns an improved
/// snapshot. The improvement logic itself is opaque to the simulation; the
/// only contract is that the returned agent keeps the same id and does not
/// lower its version.
///
/// To plug in a new provider:
/// 1. Implement `ImprovementProvider` for your struct
/// 2. Hand it to [`crate::AgentRunner::new`] as an `Arc<dyn ImprovementProvider>`
#[async_trait]
pub trait ImprovementProvider: Send + Sync {
    /// Return an improved copy of `agent`.
    async fn improve(&self, agent: &Agent) -> MetaverseResult<Agent>;
}

/// Default provider: bumps the version and leaves everything else alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionBumpProvider;

#[async_trait]
impl ImprovementProvider for VersionBumpProvider {
    async fn improve(&self, agent: &Agent) -> MetaverseResult<Agent> {
        let mut improved = agent.clone();
        improved.version = agent.version.saturating_add(1);
        Ok(improved)
    }
}

/// Check that a provider's answer is a legal successor of `before`.
pub(crate) fn check_successor(before: &Agent, after: &Agent) -> MetaverseResult<()> {
    if after.id != before.id {
        return Err(MetaverseError::ProviderFailure(format!(
            "provider returned agent {} for agent {}",
            after.id, before.id
        )));
    }
    if after.version < before.version {
        return Err(MetaverseError::ProviderFailure(format!(
            "provider lowered version of agent {} from {} to {}",
            before.id, before.version, after.version
        )));
    }
    Ok(())
}
