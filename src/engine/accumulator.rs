//! Accumulation window.
//!
//! Odds from different bookies refresh at different rates, so an
//! arbitrage often shows up for a single poll and vanishes. A candidate
//! only counts as stable once its signature has been seen in
//! `threshold` consecutive cycles. Missing a single cycle resets it.

use std::collections::HashMap;
use tracing::trace;

use crate::types::{Candidate, Signature};

/// Default number of consecutive cycles before a candidate is stable.
pub const DEFAULT_STREAK_THRESHOLD: u32 = 5;

#[derive(Debug, Clone)]
pub struct AccumulatorEntry {
    pub streak: u32,
    /// Latest snapshot of the candidate under this signature.
    pub snapshot: Candidate,
}

#[derive(Debug)]
pub struct Accumulator {
    threshold: u32,
    entries: HashMap<Signature, AccumulatorEntry>,
}

impl Accumulator {
    /// Thresholds below 1 are treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Fold one cycle's candidates into the window.
    ///
    /// Signatures seen last cycle have their streak bumped; new ones start
    /// at 1; signatures absent this cycle are dropped. A signature listed
    /// twice in the same cycle counts once.
    pub fn accumulate(&mut self, candidates: &[Candidate]) {
        let mut previous = std::mem::take(&mut self.entries);

        for candidate in candidates {
            let signature = candidate.signature();
            if let Some(entry) = self.entries.get_mut(&signature) {
                entry.snapshot = candidate.clone();
                continue;
            }
            let streak = previous.remove(&signature).map_or(1, |e| e.streak + 1);
            trace!(signature = %signature, streak, "Candidate accumulated");
            self.entries.insert(
                signature,
                AccumulatorEntry {
                    streak,
                    snapshot: candidate.clone(),
                },
            );
        }
    }

    pub fn streak(&self, signature: &Signature) -> u32 {
        self.entries.get(signature).map_or(0, |e| e.streak)
    }

    pub fn is_stable(&self, candidate: &Candidate) -> bool {
        self.streak(&candidate.signature()) >= self.threshold
    }

    pub fn get(&self, signature: &Signature) -> Option<&AccumulatorEntry> {
        self.entries.get(signature)
    }

    /// Forget everything (called when an opportunity goes to verification).
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new(DEFAULT_STREAK_THRESHOLD)
    }
}
