use metaverse_core::{KnowledgeBase, MergeStrategy, MetaverseError, MetaverseResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A starter environment provisioned by `initialize`, together with its
/// seed agent and seed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarterEnvironment {
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: String,
    pub capacity: u32,
    pub agent_type: String,
    #[serde(default)]
    pub knowledge: BTreeMap<String, f64>,
    pub task_description: String,
    pub task_type: String,
}

impl StarterEnvironment {
    fn new(
        name: &str,
        env_type: &str,
        capacity: u32,
        topic: &str,
        task_description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            env_type: env_type.to_string(),
            capacity,
            agent_type: env_type.to_string(),
            knowledge: BTreeMap::from([(topic.to_string(), 5.0)]),
            task_description: task_description.to_string(),
            task_type: topic.to_string(),
        }
    }

    pub fn initial_knowledge(&self) -> KnowledgeBase {
        KnowledgeBase::from_strengths(self.knowledge.iter().map(|(k, v)| (k.clone(), *v)))
    }
}

/// Simulation tunables. Every field has a default, so an empty TOML table
/// yields the stock three-environment world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Length of each environment's own run started by `initialize`.
    /// Zero skips the per-environment runs.
    #[serde(default = "default_environment_run_ticks")]
    pub environment_run_ticks: u64,
    #[serde(default = "default_task_completion_probability")]
    pub task_completion_probability: f64,
    #[serde(default = "default_collaboration_probability")]
    pub collaboration_probability: f64,
    #[serde(default = "default_max_collaborators")]
    pub max_collaborators: usize,
    #[serde(default = "default_task_spawn_probability")]
    pub task_spawn_probability: f64,
    #[serde(default = "default_task_types")]
    pub task_types: Vec<String>,
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: f64,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    /// Capacity ceiling for scale-ups. Unset means unbounded.
    #[serde(default)]
    pub max_capacity: Option<u32>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default = "default_connection_probability")]
    pub connection_probability: f64,
    /// Seed for every random draw; unset draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_starter_environments")]
    pub starter_environments: Vec<StarterEnvironment>,
}

fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_environment_run_ticks() -> u64 {
    3600
}
fn default_task_completion_probability() -> f64 {
    0.1
}
fn default_collaboration_probability() -> f64 {
    0.1
}
fn default_max_collaborators() -> usize {
    2
}
fn default_task_spawn_probability() -> f64 {
    0.2
}
fn default_task_types() -> Vec<String> {
    ["data_collection", "analysis", "optimization", "prediction"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_overload_threshold() -> f64 {
    crate::monitor::DEFAULT_OVERLOAD_THRESHOLD
}
fn default_scale_factor() -> f64 {
    1.5
}
fn default_connection_probability() -> f64 {
    0.5
}
fn default_starter_environments() -> Vec<StarterEnvironment> {
    vec![
        StarterEnvironment::new(
            "Urban Planning",
            "urban",
            100,
            "urban_planning",
            "Optimize traffic flow",
        ),
        StarterEnvironment::new(
            "Climate Model",
            "climate",
            150,
            "climate_modeling",
            "Predict weather patterns",
        ),
        StarterEnvironment::new(
            "Financial Market",
            "finance",
            200,
            "market_analysis",
            "Analyze market trends",
        ),
    ]
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            environment_run_ticks: default_environment_run_ticks(),
            task_completion_probability: default_task_completion_probability(),
            collaboration_probability: default_collaboration_probability(),
            max_collaborators: default_max_collaborators(),
            task_spawn_probability: default_task_spawn_probability(),
            task_types: default_task_types(),
            overload_threshold: default_overload_threshold(),
            scale_factor: default_scale_factor(),
            max_capacity: None,
            merge_strategy: MergeStrategy::default(),
            connection_probability: default_connection_probability(),
            seed: None,
            starter_environments: default_starter_environments(),
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> MetaverseResult<()> {
        let probabilities = [
            ("task_completion_probability", self.task_completion_probability),
            ("collaboration_probability", self.collaboration_probability),
            ("task_spawn_probability", self.task_spawn_probability),
            ("connection_probability", self.connection_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(MetaverseError::Config(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }

        if self.tick_interval_ms == 0 {
            return Err(MetaverseError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.scale_factor > 1.0) {
            return Err(MetaverseError::Config(format!(
                "scale_factor must be greater than 1, got {}",
                self.scale_factor
            )));
        }
        if !(0.0..=100.0).contains(&self.overload_threshold) {
            return Err(MetaverseError::Config(format!(
                "overload_threshold must be a CPU percentage, got {}",
                self.overload_threshold
            )));
        }
        if self.task_types.is_empty() {
            return Err(MetaverseError::Config(
                "task_types must not be empty".to_string(),
            ));
        }

        for starter in &self.starter_environments {
            if starter.capacity == 0 {
                return Err(MetaverseError::Config(format!(
                    "starter environment '{}' needs a positive capacity",
                    starter.name
                )));
            }
            if let Some(max) = self.max_capacity {
                if starter.capacity > max {
                    return Err(MetaverseError::Config(format!(
                        "starter environment '{}' capacity {} exceeds max_capacity {max}",
                        starter.name, starter.capacity
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.environment_run_ticks, 3600);
        assert_eq!(config.starter_environments.len(), 3);
        assert_eq!(config.task_types.len(), 4);
        assert!(config.max_capacity.is_none());
    }

    #[test]
    fn test_empty_toml_matches_default() {
        let config: SimulationConfig = toml::from_str("").unwrap();
        assert_eq!(config.task_completion_probability, 0.1);
        assert_eq!(config.scale_factor, 1.5);
        assert_eq!(config.starter_environments[0].name, "Urban Planning");
        assert_eq!(
            config.starter_environments[2].initial_knowledge().strength("market_analysis"),
            Some(5.0)
        );
    }

    #[test]
    fn test_toml_overrides() {
        let config: SimulationConfig = toml::from_str(
            r#"
            tick_interval_ms = 50
            seed = 9
            max_capacity = 500
            merge_strategy = "running_mean"

            [[starter_environments]]
            name = "Harbor"
            type = "logistics"
            capacity = 40
            agent_type = "logistics"
            task_description = "Schedule berths"
            task_type = "scheduling"
            knowledge = { scheduling = 2.0 }
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.max_capacity, Some(500));
        assert_eq!(config.merge_strategy, MergeStrategy::RunningMean);
        assert_eq!(config.starter_environments.len(), 1);
        assert_eq!(config.starter_environments[0].env_type, "logistics");
    }

    #[test]
    fn test_validation_failures() {
        let bad_probability = SimulationConfig {
            task_spawn_probability: 1.5,
            ..SimulationConfig::default()
        };
        assert!(bad_probability.validate().is_err());

        let bad_scale = SimulationConfig {
            scale_factor: 1.0,
            ..SimulationConfig::default()
        };
        assert!(bad_scale.validate().is_err());

        let low_ceiling = SimulationConfig {
            max_capacity: Some(120),
            ..SimulationConfig::default()
        };
        let err = low_ceiling.validate().unwrap_err();
        assert!(err.to_string().contains("Climate Model"));

        let no_types = SimulationConfig {
            task_types: vec![],
            ..SimulationConfig::default()
        };
        assert!(no_types.validate().is_err());

        let zero_tick = SimulationConfig {
            tick_interval_ms: 0,
            ..SimulationConfig::default()
        };
        assert!(zero_tick.validate().is_err());
    }
}
