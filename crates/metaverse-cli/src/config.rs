use metaverse_agent::AgentConfig;
use metaverse_orchestrator::SimulationConfig;
use serde::Deserialize;
use std::path::Path;

/// Contents of `metaverse.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct MetaverseConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Global ticks executed by `metaverse run` unless overridden.
    #[serde(default = "default_duration")]
    pub duration: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
        }
    }
}

fn default_duration() -> u64 {
    60
}

impl MetaverseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.simulation.validate()?;
        self.agent.validate()?;
        Ok(())
    }
}

/// Read, parse and validate a config file.
pub async fn load(path: &Path) -> anyhow::Result<MetaverseConfig> {
    let config_str = tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
    })?;
    let config: MetaverseConfig = toml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_empty_file_uses_defaults() {
        let file = write_config("");
        let config = load(file.path()).await.unwrap();
        assert_eq!(config.run.duration, 60);
        assert_eq!(config.simulation.tick_interval_ms, 1000);
        assert_eq!(config.agent.max_execution_delay_ms, 5000);
        assert_eq!(config.simulation.starter_environments.len(), 3);
    }

    #[tokio::test]
    async fn test_load_sections() {
        let file = write_config(
            r#"
            [simulation]
            tick_interval_ms = 100
            seed = 1
            task_types = ["analysis"]

            [agent]
            max_execution_delay_ms = 0

            [run]
            duration = 5
            "#,
        );
        let config = load(file.path()).await.unwrap();
        assert_eq!(config.run.duration, 5);
        assert_eq!(config.simulation.seed, Some(1));
        assert_eq!(config.simulation.task_types, vec!["analysis".to_string()]);
        assert_eq!(config.agent.max_execution_delay_ms, 0);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_values() {
        let file = write_config("[simulation]\nscale_factor = 0.5\n");
        let err = load(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("scale_factor"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.toml")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
