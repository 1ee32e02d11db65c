use crate::policy::ConnectionPolicy;
use metaverse_core::Environment;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Links environments pairwise according to a [`ConnectionPolicy`].
#[derive(Clone)]
pub struct ConnectionOptimizer {
    policy: Arc<dyn ConnectionPolicy>,
}

impl ConnectionOptimizer {
    pub fn new(policy: Arc<dyn ConnectionPolicy>) -> Self {
        Self { policy }
    }

    /// Visit every unordered pair once (`i < j`) and link both sides when the
    /// policy approves. Returns only pairs that were not already linked.
    pub fn optimize(&self, environments: &mut [Environment]) -> Vec<(Uuid, Uuid)> {
        let mut linked = Vec::new();
        for i in 0..environments.len() {
            for j in (i + 1)..environments.len() {
                if !self.policy.should_connect(&environments[i], &environments[j]) {
                    continue;
                }
                let (left, right) = environments.split_at_mut(j);
                let (a, b) = (&mut left[i], &mut right[0]);
                let forward = a.link(b.id);
                let backward = b.link(a.id);
                if forward || backward {
                    debug!(from = %a.id, to = %b.id, "Environments linked");
                    linked.push((a.id, b.id));
                }
            }
        }
        linked
    }
}

impl std::fmt::Debug for ConnectionOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptimizer").finish_non_exhaustive()
    }
}
