//! Repeated-read disagreement detection
//!
//! `Observations` is the per-attempt buffer: every value read for a key
//! inside one transaction attempt. It is cleared at the start of each
//! attempt so a retried attempt never mixes in values from an aborted one.
//!
//! `AnomalyLedger` is the per-run evidence store shared by all workers.
//! Entries are insert-only: once a key holds a set of conflicting values,
//! later anomalies only add to that set. The ledger is read after all
//! workers have joined.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hash;

use dashmap::DashMap;

/// Values read per key within one transaction attempt
#[derive(Debug, Clone)]
pub struct Observations<K, V> {
    values: BTreeMap<K, Vec<V>>,
}

impl<K: Ord + Clone, V: Ord + Clone> Observations<K, V> {
    /// Empty buffer
    pub fn new() -> Self {
        Observations {
            values: BTreeMap::new(),
        }
    }

    /// Forget everything observed so far
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Record one read of `key`
    pub fn observe(&mut self, key: K, value: V) {
        self.values.entry(key).or_default().push(value);
    }

    /// Number of keys observed
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was observed
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total number of reads recorded
    pub fn reads(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    /// Distinct values read for `key`
    pub fn distinct(&self, key: &K) -> BTreeSet<V> {
        self.values
            .get(key)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys whose reads disagree (more than one distinct value), with the
    /// full distinct set
    pub fn disagreements(&self) -> Vec<(K, BTreeSet<V>)> {
        self.values
            .iter()
            .filter_map(|(key, values)| {
                let distinct: BTreeSet<V> = values.iter().cloned().collect();
                (distinct.len() > 1).then(|| (key.clone(), distinct))
            })
            .collect()
    }

    /// Keys with at least one value failing `is_valid`, with the failing
    /// distinct values
    pub fn violations<P>(&self, is_valid: P) -> Vec<(K, BTreeSet<V>)>
    where
        P: Fn(&V) -> bool,
    {
        self.values
            .iter()
            .filter_map(|(key, values)| {
                let bad: BTreeSet<V> = values.iter().filter(|v| !is_valid(v)).cloned().collect();
                (!bad.is_empty()).then(|| (key.clone(), bad))
            })
            .collect()
    }
}

impl<K: Ord + Clone, V: Ord + Clone> Default for Observations<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert-only map from key to the ordered set of anomalous values seen
#[derive(Debug)]
pub struct AnomalyLedger<K: Eq + Hash, V> {
    entries: DashMap<K, BTreeSet<V>>,
}

impl<K, V> AnomalyLedger<K, V>
where
    K: Eq + Hash + Ord + Clone,
    V: Ord + Clone,
{
    /// Empty ledger
    pub fn new() -> Self {
        AnomalyLedger {
            entries: DashMap::new(),
        }
    }

    /// Merge `values` into the entry for `key`
    pub fn record<I>(&self, key: K, values: I)
    where
        I: IntoIterator<Item = V>,
    {
        self.entries.entry(key).or_default().extend(values);
    }

    /// Merge every disagreement in `observations`; returns how many keys
    /// disagreed
    pub fn record_disagreements(&self, observations: &Observations<K, V>) -> usize {
        let disagreements = observations.disagreements();
        let count = disagreements.len();
        for (key, values) in disagreements {
            self.record(key, values);
        }
        count
    }

    /// Number of keys with recorded anomalies
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no anomaly was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values recorded for `key`
    pub fn get(&self, key: &K) -> Option<BTreeSet<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Ordered copy of every entry
    pub fn snapshot(&self) -> BTreeMap<K, BTreeSet<V>> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<K, V> Default for AnomalyLedger<K, V>
where
    K: Eq + Hash + Ord + Clone,
    V: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
