use metaverse_core::{Environment, Task};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Shared random source for every stochastic decision in a simulation.
///
/// Cloning shares the underlying generator, so a seeded run draws one
/// reproducible sequence across all policies that hold a clone.
#[derive(Clone)]
pub struct SimRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SimRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// True with probability `p`; `p <= 0` never fires, `p >= 1` always does.
    pub fn chance(&self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.inner.lock().gen::<f64>() < p
    }

    /// Uniform draw in `[low, high)`. Returns `low` for an empty range.
    pub fn uniform(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.lock().gen_range(low..high)
    }

    /// Uniform index into a collection of `len` items.
    pub fn index(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.inner.lock().gen_range(0..len))
    }

    /// Up to `amount` distinct indices from `0..len`, in random order.
    pub fn sample_indices(&self, len: usize, amount: usize) -> Vec<usize> {
        let mut rng = self.inner.lock();
        rand::seq::index::sample(&mut *rng, len, amount.min(len)).into_vec()
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRng").finish_non_exhaustive()
    }
}

/// Decides whether an assigned task completes during a tick.
pub trait CompletionPolicy: Send + Sync {
    fn should_complete(&self, task: &Task) -> bool;
}

/// Independent draw per task with a fixed probability (default 10%).
#[derive(Debug, Clone)]
pub struct ProbabilisticCompletion {
    probability: f64,
    rng: SimRng,
}

impl ProbabilisticCompletion {
    pub fn new(probability: f64, rng: SimRng) -> Self {
        Self { probability, rng }
    }
}

impl CompletionPolicy for ProbabilisticCompletion {
    fn should_complete(&self, _task: &Task) -> bool {
        self.rng.chance(self.probability)
    }
}

/// Always (`true`) or never (`false`) completes.
#[derive(Debug, Clone, Copy)]
pub struct FixedCompletion(pub bool);

impl CompletionPolicy for FixedCompletion {
    fn should_complete(&self, _task: &Task) -> bool {
        self.0
    }
}

/// Decides whether two environments should be linked.
pub trait ConnectionPolicy: Send + Sync {
    fn should_connect(&self, a: &Environment, b: &Environment) -> bool;
}

/// Uniform random link decision (default probability 0.5).
#[derive(Debug, Clone)]
pub struct RandomConnection {
    probability: f64,
    rng: SimRng,
}

impl RandomConnection {
    pub fn new(probability: f64, rng: SimRng) -> Self {
        Self { probability, rng }
    }
}

impl ConnectionPolicy for RandomConnection {
    fn should_connect(&self, _a: &Environment, _b: &Environment) -> bool {
        self.rng.chance(self.probability)
    }
}

/// Links every pair (`true`) or none (`false`).
#[derive(Debug, Clone, Copy)]
pub struct FixedConnection(pub bool);

impl ConnectionPolicy for FixedConnection {
    fn should_connect(&self, _a: &Environment, _b: &Environment) -> bool {
        self.0
    }
}

/// Links environments that share a domain tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameTypeConnection;

impl ConnectionPolicy for SameTypeConnection {
    fn should_connect(&self, a: &Environment, b: &Environment) -> bool {
        a.env_type == b.env_type
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_chance_edges() {
        let rng = SimRng::seeded(7);
        assert!((0..100).all(|_| !rng.chance(0.0)));
        assert!((0..100).all(|_| rng.chance(1.0)));
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = SimRng::seeded(42);
        let b = SimRng::seeded(42);
        let xs: Vec<f64> = (0..5).map(|_| a.uniform(0.0, 100.0)).collect();
        let ys: Vec<f64> = (0..5).map(|_| b.uniform(0.0, 100.0)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_clones_share_sequence() {
        let a = SimRng::seeded(1);
        let b = a.clone();
        let reference = SimRng::seeded(1);
        let first = a.uniform(0.0, 1.0);
        let second = b.uniform(0.0, 1.0);
        assert_eq!(first, reference.uniform(0.0, 1.0));
        assert_eq!(second, reference.uniform(0.0, 1.0));
    }

    #[test]
    fn test_index_and_sample() {
        let rng = SimRng::seeded(3);
        assert_eq!(rng.index(0), None);
        assert!(rng.index(4).unwrap() < 4);

        let picked = rng.sample_indices(5, 2);
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert_eq!(rng.sample_indices(1, 2).len(), 1);
        assert!(rng.sample_indices(0, 2).is_empty());
    }

    #[test]
    fn test_probabilistic_completion_rate() {
        let policy = ProbabilisticCompletion::new(0.1, SimRng::seeded(11));
        let task = Task::new("t", "analysis", Uuid::new_v4());
        let hits = (0..10_000).filter(|_| policy.should_complete(&task)).count();
        assert!((700..1300).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn test_same_type_connection() {
        let a = Environment::new("A", "urban", 10);
        let b = Environment::new("B", "urban", 10);
        let c = Environment::new("C", "finance", 10);
        assert!(SameTypeConnection.should_connect(&a, &b));
        assert!(!SameTypeConnection.should_connect(&a, &c));
    }
}
