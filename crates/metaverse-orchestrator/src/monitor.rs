use crate::policy::SimRng;
use metaverse_core::{Environment, EnvironmentStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default CPU percentage above which an environment counts as overloaded.
pub const DEFAULT_OVERLOAD_THRESHOLD: f64 = 90.0;

/// Synthetic health metrics for one environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentMetrics {
    /// Percent, `0..100`.
    pub cpu_usage: f64,
    /// Percent, `0..100`.
    pub memory_usage: f64,
    /// Milliseconds, `0..1000`.
    pub network_latency: f64,
}

/// Outcome of one monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub status: EnvironmentStatus,
    pub metrics: EnvironmentMetrics,
}

/// Source of metrics for the monitor.
pub trait MetricsSampler: Send + Sync {
    fn sample(&self, environment: &Environment) -> EnvironmentMetrics;
}

/// Uniform random metrics within the documented ranges.
#[derive(Debug, Clone)]
pub struct RandomMetricsSampler {
    rng: SimRng,
}

impl RandomMetricsSampler {
    pub fn new(rng: SimRng) -> Self {
        Self { rng }
    }
}

impl MetricsSampler for RandomMetricsSampler {
    fn sample(&self, _environment: &Environment) -> EnvironmentMetrics {
        EnvironmentMetrics {
            cpu_usage: self.rng.uniform(0.0, 100.0),
            memory_usage: self.rng.uniform(0.0, 100.0),
            network_latency: self.rng.uniform(0.0, 1000.0),
        }
    }
}

/// Returns the same metrics every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedMetricsSampler(pub EnvironmentMetrics);

impl FixedMetricsSampler {
    /// Sampler reporting only a CPU figure.
    pub fn cpu(cpu_usage: f64) -> Self {
        Self(EnvironmentMetrics {
            cpu_usage,
            memory_usage: 0.0,
            network_latency: 0.0,
        })
    }
}

impl MetricsSampler for FixedMetricsSampler {
    fn sample(&self, _environment: &Environment) -> EnvironmentMetrics {
        self.0
    }
}

/// Samples metrics and classifies environment health.
#[derive(Clone)]
pub struct EnvironmentMonitor {
    sampler: Arc<dyn MetricsSampler>,
    overload_threshold: f64,
}

impl EnvironmentMonitor {
    pub fn new(sampler: Arc<dyn MetricsSampler>) -> Self {
        Self {
            sampler,
            overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, overload_threshold: f64) -> Self {
        self.overload_threshold = overload_threshold;
        self
    }

    pub fn overload_threshold(&self) -> f64 {
        self.overload_threshold
    }

    /// `Overloaded` when CPU usage is strictly above the threshold,
    /// `Normal` otherwise.
    pub fn monitor(&self, environment: &Environment) -> MonitorReport {
        let metrics = self.sampler.sample(environment);
        let status = if metrics.cpu_usage > self.overload_threshold {
            EnvironmentStatus::Overloaded
        } else {
            EnvironmentStatus::Normal
        };
        MonitorReport { status, metrics }
    }
}

impl std::fmt::Debug for EnvironmentMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentMonitor")
            .field("overload_threshold", &self.overload_threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new("Urban Planning", "urban", 100)
    }

    #[test]
    fn test_threshold_is_strict() {
        let at = EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(90.0)));
        assert_eq!(at.monitor(&env()).status, EnvironmentStatus::Normal);

        let above = EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(90.5)));
        assert_eq!(above.monitor(&env()).status, EnvironmentStatus::Overloaded);
    }

    #[test]
    fn test_custom_threshold() {
        let monitor =
            EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(60.0))).with_threshold(50.0);
        let report = monitor.monitor(&env());
        assert_eq!(report.status, EnvironmentStatus::Overloaded);
        assert_eq!(report.metrics.cpu_usage, 60.0);
    }

    #[test]
    fn test_random_metrics_in_range() {
        let sampler = RandomMetricsSampler::new(SimRng::seeded(5));
        for _ in 0..500 {
            let m = sampler.sample(&env());
            assert!((0.0..100.0).contains(&m.cpu_usage));
            assert!((0.0..100.0).contains(&m.memory_usage));
            assert!((0.0..1000.0).contains(&m.network_latency));
        }
    }

    #[test]
    fn test_report_serialization() {
        let monitor = EnvironmentMonitor::new(Arc::new(FixedMetricsSampler::cpu(95.0)));
        let json = serde_json::to_value(monitor.monitor(&env())).unwrap();
        assert_eq!(json["status"], "overloaded");
        assert_eq!(json["metrics"]["cpuUsage"], 95.0);
    }
}
