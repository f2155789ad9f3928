//! Shared types for the SUREBET pipeline.
//!
//! These types form the data model used across all modules.
//! Bookies produce `Event`s, the matcher turns them into `MatchedGroup`s,
//! the builder scores those as `Candidate`s, and the engine drives a
//! selected candidate through verification and placement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::bookies::BetSlip;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// An amount in a given currency. Currency formatting is left to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A tradable outcome on one bookie, e.g. "Home" at 2.10.
///
/// Carries the bookie-side slip used to verify, place or clean a bet on it.
#[derive(Clone)]
pub struct Outcome {
    pub label: String,
    pub odds: Decimal,
    /// Maximum stake advertised by the bookie, when known.
    pub max_stake: Option<Decimal>,
    pub slip: Arc<dyn BetSlip>,
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("label", &self.label)
            .field("odds", &self.odds)
            .field("max_stake", &self.max_stake)
            .finish_non_exhaustive()
    }
}

/// A real-world match and its current outcomes on one bookie.
#[derive(Debug, Clone)]
pub struct Event {
    pub title: String,
    pub outcomes: Vec<Outcome>,
}

impl Event {
    pub fn new(title: impl Into<String>, outcomes: Vec<Outcome>) -> Self {
        Self {
            title: title.into(),
            outcomes,
        }
    }
}

/// Everything one bookie reported in one polling cycle.
#[derive(Debug, Clone)]
pub struct BookieEvents {
    pub bookie: String,
    pub events: Vec<Event>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Identifies one leg across cycles: the bookie and the outcome label.
///
/// Also the unit of the ban registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegId {
    pub bookie: String,
    pub label: String,
}

impl LegId {
    pub fn new(bookie: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            bookie: bookie.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bookie, self.label)
    }
}

/// An entry of the ban registry.
pub type BannedEntry = LegId;

/// One outcome on one bookie, as placed inside a matched group.
#[derive(Debug, Clone)]
pub struct BookieBet {
    pub bookie: String,
    pub outcome: Outcome,
}

impl BookieBet {
    pub fn id(&self) -> LegId {
        LegId::new(&self.bookie, &self.outcome.label)
    }
}

/// N outcomes of the same real-world event, one per bookie, in bookie order.
#[derive(Debug, Clone)]
pub struct MatchedGroup {
    pub event: String,
    pub legs: Vec<BookieBet>,
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Ordered (bookie, label) tuple identifying a candidate across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub Vec<LegId>);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|l| l.to_string()).collect();
        write!(f, "[{}]", parts.join(" | "))
    }
}

/// One bet inside an arbitrage candidate.
#[derive(Clone)]
pub struct CandidateLeg {
    pub bookie: String,
    pub label: String,
    pub odds: Decimal,
    pub stake: Decimal,
    pub payout: Decimal,
    /// False when this leg's price looks implausibly sharp or its stake
    /// exceeds what the bookie advertises.
    pub viable: bool,
    pub slip: Arc<dyn BetSlip>,
}

impl CandidateLeg {
    pub fn id(&self) -> LegId {
        LegId::new(&self.bookie, &self.label)
    }
}

impl fmt::Debug for CandidateLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateLeg")
            .field("bookie", &self.bookie)
            .field("label", &self.label)
            .field("odds", &self.odds)
            .field("stake", &self.stake)
            .field("payout", &self.payout)
            .field("viable", &self.viable)
            .finish_non_exhaustive()
    }
}

/// A scored arbitrage opportunity derived from one matched group.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub event: String,
    pub legs: Vec<CandidateLeg>,
    pub total_stake: Decimal,
    /// Guaranteed payout (the smallest leg payout).
    pub total_payout: Decimal,
    pub profit: Decimal,
    /// Overall margin in percent.
    pub margin: Decimal,
    pub currency: String,
}

impl Candidate {
    pub fn signature(&self) -> Signature {
        Signature(self.legs.iter().map(CandidateLeg::id).collect())
    }

    /// Bookies involved, in leg order.
    pub fn bookies(&self) -> Vec<String> {
        self.legs.iter().map(|l| l.bookie.clone()).collect()
    }

    pub fn is_viable(&self) -> bool {
        self.legs.iter().all(|l| l.viable)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let legs: Vec<String> = self
            .legs
            .iter()
            .map(|l| format!("{}@{} {} x{}", l.label, l.bookie, l.stake, l.odds))
            .collect();
        write!(
            f,
            "{} | {} | stake={} payout={} profit={} {} ({:.2}%)",
            self.event,
            legs.join(", "),
            self.total_stake,
            self.total_payout,
            self.profit,
            self.currency,
            self.margin,
        )
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// A bookie's answer when a leg is re-confirmed right before placing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Postulation {
    pub valid: bool,
    pub odds: Decimal,
    pub max_stake: Decimal,
    pub reason: String,
}

impl Postulation {
    /// An invalid postulation carrying only a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            odds: Decimal::ZERO,
            max_stake: Decimal::ZERO,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Postulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.valid { "valid" } else { "invalid" };
        write!(
            f,
            "{verdict} odds={} max_stake={} ({})",
            self.odds, self.max_stake, self.reason
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SUREBET.
#[derive(Debug, thiserror::Error)]
pub enum ArbError {
    #[error("Fetch error ({bookie}): {message}")]
    Fetch { bookie: String, message: String },

    #[error("Matching error: {0}")]
    Matching(String),

    #[error("Candidate building error: {0}")]
    Building(String),

    #[error("Postulation error ({leg}): {message}")]
    Postulate { leg: LegId, message: String },

    #[error("Placement error ({leg}): {message}")]
    Place { leg: LegId, message: String },

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
