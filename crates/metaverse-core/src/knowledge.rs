use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;

/// A single knowledge entry. Strengths are merged numerically; notes are
/// carried over as-is and overwritten by later inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KnowledgeValue {
    Strength(f64),
    Note(String),
}

impl KnowledgeValue {
    pub fn as_strength(&self) -> Option<f64> {
        match self {
            KnowledgeValue::Strength(v) => Some(*v),
            KnowledgeValue::Note(_) => None,
        }
    }
}

impl From<f64> for KnowledgeValue {
    fn from(v: f64) -> Self {
        KnowledgeValue::Strength(v.max(0.0))
    }
}

impl From<&str> for KnowledgeValue {
    fn from(v: &str) -> Self {
        KnowledgeValue::Note(v.to_string())
    }
}

/// Mapping from topic key to accumulated strength.
///
/// Strengths are never negative: every constructor clamps at zero and the
/// only mutations are increments and averages of non-negative values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBase(BTreeMap<String, KnowledgeValue>);

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a knowledge base from `(topic, strength)` pairs.
    pub fn from_strengths<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), KnowledgeValue::from(v)))
                .collect(),
        )
    }

    pub fn get(&self, topic: &str) -> Option<&KnowledgeValue> {
        self.0.get(topic)
    }

    /// Numeric strength for a topic, `None` if absent or not numeric.
    pub fn strength(&self, topic: &str) -> Option<f64> {
        self.0.get(topic).and_then(KnowledgeValue::as_strength)
    }

    pub fn insert(&mut self, topic: impl Into<String>, value: impl Into<KnowledgeValue>) {
        self.0.insert(topic.into(), value.into());
    }

    /// Increment the counter for `topic` by one. Absent topics start at zero;
    /// a non-numeric entry is replaced by a strength of one.
    pub fn learn(&mut self, topic: &str) {
        let next = self.strength(topic).unwrap_or(0.0) + 1.0;
        self.0
            .insert(topic.to_string(), KnowledgeValue::Strength(next));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, KnowledgeValue> {
        self.0.iter()
    }

    /// Sum of all numeric strengths.
    pub fn total_strength(&self) -> f64 {
        self.0.values().filter_map(KnowledgeValue::as_strength).sum()
    }
}

impl<'a> IntoIterator for &'a KnowledgeBase {
    type Item = (&'a String, &'a KnowledgeValue);
    type IntoIter = btree_map::Iter<'a, String, KnowledgeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// How numeric entries sharing a key are combined during a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Each incoming value is averaged with the running accumulator:
    /// `(existing + incoming) / 2`. Order-dependent for three or more inputs.
    #[default]
    PairwiseAverage,
    /// True arithmetic mean over every numeric value seen for the key.
    RunningMean,
}

/// Merge knowledge bases in sequence order with the default
/// [`MergeStrategy::PairwiseAverage`] rule.
///
/// `[{x:10}, {x:20}, {x:40}]` yields `x = ((10 + 20) / 2 + 40) / 2 = 27.5`.
pub fn merge(bases: &[KnowledgeBase]) -> KnowledgeBase {
    merge_with(bases, MergeStrategy::PairwiseAverage)
}

/// Merge knowledge bases in sequence order.
///
/// For every `(key, value)`: when the key is already present and both the
/// stored and incoming values are strengths, they are combined according to
/// `strategy`; otherwise the incoming value overwrites.
pub fn merge_with(bases: &[KnowledgeBase], strategy: MergeStrategy) -> KnowledgeBase {
    let mut merged: BTreeMap<String, KnowledgeValue> = BTreeMap::new();
    // Number of numeric samples folded into each key (running mean only).
    let mut samples: HashMap<&str, u32> = HashMap::new();

    for base in bases {
        for (key, value) in base {
            let combined = match (merged.get(key), value) {
                (Some(KnowledgeValue::Strength(existing)), KnowledgeValue::Strength(incoming)) => {
                    match strategy {
                        MergeStrategy::PairwiseAverage => (existing + incoming) / 2.0,
                        MergeStrategy::RunningMean => {
                            let n = samples.get(key.as_str()).copied().unwrap_or(1);
                            existing + (incoming - existing) / f64::from(n + 1)
                        }
                    }
                }
                _ => {
                    samples.remove(key.as_str());
                    if value.as_strength().is_some() {
                        samples.insert(key.as_str(), 1);
                    }
                    merged.insert(key.clone(), value.clone());
                    continue;
                }
            };
            *samples.entry(key.as_str()).or_insert(1) += 1;
            merged.insert(key.clone(), KnowledgeValue::Strength(combined));
        }
    }

    KnowledgeBase(merged)
}
