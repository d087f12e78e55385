//! Trade watermark filtering for overlapping history polls.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// High-water mark for one pair: the largest admitted key, plus the ids of the
/// trades admitted at exactly that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark<W> {
    pub key: W,
    #[serde(default)]
    pub boundary_ids: BTreeSet<String>,
}

impl<W: Ord> Watermark<W> {
    /// A mark with no known trades at `key`.
    pub fn new(key: W) -> Self {
        Self {
            key,
            boundary_ids: BTreeSet::new(),
        }
    }

    /// Whether a trade with this key and id has not been seen.
    pub fn admits(&self, key: &W, id: &str) -> bool {
        *key > self.key || (*key == self.key && !self.boundary_ids.contains(id))
    }

    /// Move forward to `other`; boundary ids merge when the keys are equal.
    fn merge(&mut self, other: Watermark<W>) {
        if other.key > self.key {
            *self = other;
        } else if other.key == self.key {
            self.boundary_ids.extend(other.boundary_ids);
        }
    }
}

/// Per-pair high-water mark gate.
///
/// A trade is admitted if its key is greater than the pair's watermark, or
/// equal to it with an id not yet seen at that key. Admitted trades come back
/// oldest first and the watermark moves to the largest admitted key, so a
/// batch in any order is handled the same.
///
/// Each pair is expected to have a single poller at a time.
#[derive(Debug)]
pub struct TradeDeduplicator<W> {
    watermarks: DashMap<String, Watermark<W>>,
}

impl<W: Ord + Clone> Default for TradeDeduplicator<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Ord + Clone> TradeDeduplicator<W> {
    pub fn new() -> Self {
        Self {
            watermarks: DashMap::new(),
        }
    }

    /// Filter `trades` down to the ones not seen before and advance the watermark.
    pub fn admit<T, K, I>(&self, trading_pair: &str, trades: Vec<T>, key: K, id: I) -> Vec<T>
    where
        K: Fn(&T) -> W,
        I: Fn(&T) -> String,
    {
        let current = self.watermarks.get(trading_pair).map(|w| w.clone());
        let mut batch_ids = HashSet::new();
        let mut admitted: Vec<(W, String, T)> = trades
            .into_iter()
            .map(|trade| (key(&trade), id(&trade), trade))
            .filter(|(k, i, _)| current.as_ref().map_or(true, |c| c.admits(k, i)))
            .filter(|(_, i, _)| batch_ids.insert(i.clone()))
            .collect();

        admitted.sort_by(|(a, _, _), (b, _, _)| a.cmp(b));

        if let Some((max, _, _)) = admitted.last() {
            let boundary_ids = admitted
                .iter()
                .filter(|(k, _, _)| k == max)
                .map(|(_, i, _)| i.clone())
                .collect();
            self.advance(
                trading_pair,
                Watermark {
                    key: max.clone(),
                    boundary_ids,
                },
            );
        }

        admitted.into_iter().map(|(_, _, trade)| trade).collect()
    }

    /// Raise the watermark without emitting anything. Never lowers it.
    pub fn prime(&self, trading_pair: &str, key: W) {
        self.advance(trading_pair, Watermark::new(key));
    }

    fn advance(&self, trading_pair: &str, watermark: Watermark<W>) {
        match self.watermarks.entry(trading_pair.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => entry.get_mut().merge(watermark),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(watermark);
            }
        }
    }

    /// Current watermark key for the pair.
    pub fn watermark(&self, trading_pair: &str) -> Option<W> {
        self.watermarks.get(trading_pair).map(|w| w.key.clone())
    }

    pub fn has_watermark(&self, trading_pair: &str) -> bool {
        self.watermarks.contains_key(trading_pair)
    }

    /// All watermarks, sorted by pair.
    pub fn export(&self) -> BTreeMap<String, Watermark<W>> {
        self.watermarks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Restore exported watermarks; existing higher marks are kept.
    pub fn restore(&self, watermarks: impl IntoIterator<Item = (String, Watermark<W>)>) {
        for (pair, watermark) in watermarks {
            self.advance(&pair, watermark);
        }
    }
}
