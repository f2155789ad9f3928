//! Cross-bookie event matching.
//!
//! Groups the outcomes that belong to the same real-world event into
//! N-way tuples, one outcome per bookie, ready for arbitrage scoring.
//! Bookies name the same match differently ("Club América vs Cruz Azul"
//! vs "America - Cruz Azul"), so titles are compared with a fuzzy word
//! similarity rather than exact equality.

use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

use crate::types::{BookieBet, BookieEvents, Event, MatchedGroup};

/// Turns one cycle's events into matched groups. Must be a pure function
/// of its input.
#[cfg_attr(test, mockall::automock)]
pub trait Matcher: Send + Sync {
    fn match_events(&self, cycle: &[BookieEvents]) -> Result<Vec<MatchedGroup>>;
}

// ---------------------------------------------------------------------------
// Text similarity
// ---------------------------------------------------------------------------

/// Default minimum similarity for two titles to be the same event.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

/// Compute a normalised similarity score between two event titles.
///
/// Weighted combination of word-token Jaccard index and containment
/// (so "America vs Cruz Azul" still matches "Club America vs Cruz Azul").
/// Returns 0.0 (no similarity) to 1.0 (identical after normalisation).
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let norm = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1 && *w != "vs")
            .map(String::from)
            .collect()
    };

    let set_a = norm(a);
    let set_b = norm(b);

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    let jaccard = intersection / union;

    let containment = intersection / set_a.len().min(set_b.len()) as f64;

    (0.6 * jaccard + 0.4 * containment).min(1.0)
}

// ---------------------------------------------------------------------------
// Title matcher
// ---------------------------------------------------------------------------

/// Default matcher for N-way markets (e.g. 1X2 with three bookies).
///
/// The first bookie's events anchor each match; every other bookie
/// contributes its most similar event above the threshold. Outcomes are
/// aligned by position, and every assignment of a distinct outcome slot
/// to each bookie becomes one group.
#[derive(Debug, Clone)]
pub struct TitleMatcher {
    ways: usize,
    threshold: f64,
}

impl TitleMatcher {
    pub fn new(ways: usize, threshold: f64) -> Self {
        Self { ways, threshold }
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    fn best_match<'a>(&self, anchor: &Event, candidates: &'a [Event]) -> Option<&'a Event> {
        let mut best: Option<(&Event, f64)> = None;
        for event in candidates.iter().filter(|e| e.outcomes.len() == self.ways) {
            let score = title_similarity(&anchor.title, &event.title);
            if score >= self.threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((event, score));
            }
        }
        best.map(|(e, _)| e)
    }
}

impl Matcher for TitleMatcher {
    fn match_events(&self, cycle: &[BookieEvents]) -> Result<Vec<MatchedGroup>> {
        if self.ways < 2 || cycle.len() != self.ways {
            debug!(
                ways = self.ways,
                bookies = cycle.len(),
                "Bookie count does not match market ways, nothing to match"
            );
            return Ok(Vec::new());
        }

        let slots = permutations(self.ways);
        let mut groups = Vec::new();

        for anchor in cycle[0].events.iter().filter(|e| e.outcomes.len() == self.ways) {
            let mut matched: Vec<&Event> = vec![anchor];
            for other in &cycle[1..] {
                match self.best_match(anchor, &other.events) {
                    Some(event) => matched.push(event),
                    None => break,
                }
            }
            if matched.len() != self.ways {
                continue;
            }

            for assignment in &slots {
                let legs = assignment
                    .iter()
                    .enumerate()
                    .map(|(source, &slot)| BookieBet {
                        bookie: cycle[source].bookie.clone(),
                        outcome: matched[source].outcomes[slot].clone(),
                    })
                    .collect();
                groups.push(MatchedGroup {
                    event: anchor.title.clone(),
                    legs,
                });
            }
        }

        debug!(groups = groups.len(), "Events matched");
        Ok(groups)
    }
}

/// All orderings of `0..n`, in lexicographic order.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn extend(current: &mut Vec<usize>, used: &mut [bool], out: &mut Vec<Vec<usize>>) {
        if current.len() == used.len() {
            out.push(current.clone());
            return;
        }
        for i in 0..used.len() {
            if !used[i] {
                used[i] = true;
                current.push(i);
                extend(current, used, out);
                current.pop();
                used[i] = false;
            }
        }
    }

    let mut out = Vec::new();
    extend(&mut Vec::with_capacity(n), &mut vec![false; n], &mut out);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
