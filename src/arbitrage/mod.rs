//! Arbitrage candidate construction.
//!
//! Turns matched groups into scored `Candidate`s: stake split, guaranteed
//! payout, profit and per-leg viability. The pipeline only depends on
//! the `CandidateBuilder` trait; `SurebetBuilder` is the default.

pub mod surebet;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{Candidate, MatchedGroup, Money};

pub use surebet::SurebetBuilder;

/// Fixed scoring configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Stake rounding granularity (0 = round to cents).
    pub round_to: Decimal,
    /// Acceptable overall margin band, in percent.
    pub margin_min: Decimal,
    pub margin_max: Decimal,
    /// Per-leg margin ceiling, in percent. A leg paying much more than
    /// the rest usually means one bookie is showing a stale price.
    pub sharp_margin_max: Decimal,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            round_to: dec!(10),
            margin_min: dec!(1),
            margin_max: dec!(5),
            sharp_margin_max: dec!(5),
        }
    }
}

/// Scores matched groups. Must be a pure function of its input.
#[cfg_attr(test, mockall::automock)]
pub trait CandidateBuilder: Send + Sync {
    fn build(&self, groups: &[MatchedGroup], stake: &Money) -> Result<Vec<Candidate>>;
}
