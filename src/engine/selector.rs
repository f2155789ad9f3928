//! Picks the single opportunity worth verifying this cycle.

use super::accumulator::Accumulator;
use crate::types::Candidate;

/// The most profitable candidate. On a tie the first one wins, which
/// keeps the choice deterministic in the matcher's bookie order.
pub fn best<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        if best.map_or(true, |b| candidate.profit > b.profit) {
            best = Some(candidate);
        }
    }
    best
}

/// The best candidate among those the window considers stable.
pub fn select<'a>(candidates: &'a [Candidate], window: &Accumulator) -> Option<&'a Candidate> {
    best(candidates.iter().filter(|c| window.is_stable(c)))
}
