//! Banned legs for the current run.
//!
//! A banned (bookie, label) pair knocks out every matched group that
//! contains it. Bans are append-only; they live until the pipeline closes.

use std::collections::HashSet;
use tracing::info;

use crate::types::{BannedEntry, LegId, MatchedGroup};

#[derive(Debug, Clone, Default)]
pub struct BanRegistry {
    /// Insertion order, for reporting.
    entries: Vec<BannedEntry>,
    index: HashSet<BannedEntry>,
}

impl BanRegistry {
    pub fn new(initial: impl IntoIterator<Item = BannedEntry>) -> Self {
        let mut registry = Self::default();
        registry.ban(initial);
        registry
    }

    /// Ban legs. Already-banned legs are ignored. Returns how many were new.
    pub fn ban(&mut self, legs: impl IntoIterator<Item = BannedEntry>) -> usize {
        let mut added = 0;
        for leg in legs {
            if self.index.insert(leg.clone()) {
                info!(leg = %leg, "Leg banned");
                self.entries.push(leg);
                added += 1;
            }
        }
        added
    }

    pub fn is_banned(&self, leg: &LegId) -> bool {
        self.index.contains(leg)
    }

    /// Whether any leg of the group is banned.
    pub fn has_banned_leg(&self, group: &MatchedGroup) -> bool {
        group.legs.iter().any(|bet| self.is_banned(&bet.id()))
    }

    pub fn entries(&self) -> &[BannedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
