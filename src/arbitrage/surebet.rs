//! Classic surebet scoring.
//!
//! For decimal odds o₁..oₙ the implied sum is S = Σ 1/oᵢ. When S < 1,
//! splitting the total stake proportionally to 1/oᵢ pays the same on
//! every outcome, and the margin is (1/S − 1) × 100 percent.
//! Stakes are rounded to the configured granularity (round bets look
//! less like arbitrage to the bookie), so the real profit is taken from
//! the smallest rounded payout.

use anyhow::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{debug, trace};

use super::{BuilderConfig, CandidateBuilder};
use crate::types::{Candidate, CandidateLeg, MatchedGroup, Money};

pub struct SurebetBuilder {
    config: BuilderConfig,
}

impl SurebetBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn round_stake(&self, raw: Decimal) -> Decimal {
        if self.config.round_to.is_zero() {
            return raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        }
        (raw / self.config.round_to)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            * self.config.round_to
    }

    /// Score one group. Returns `None` when the group is not an arbitrage
    /// inside the configured margin band.
    fn score(&self, group: &MatchedGroup, stake: &Money) -> Option<Candidate> {
        if group.legs.len() < 2 || group.legs.iter().any(|l| l.outcome.odds <= Decimal::ONE) {
            return None;
        }

        let implied: Vec<Decimal> = group
            .legs
            .iter()
            .map(|l| Decimal::ONE / l.outcome.odds)
            .collect();
        let implied_sum: Decimal = implied.iter().sum();
        let margin = (Decimal::ONE / implied_sum - Decimal::ONE) * dec!(100);

        if margin < self.config.margin_min || margin > self.config.margin_max {
            trace!(event = %group.event, margin = %margin.round_dp(2), "Margin outside band");
            return None;
        }

        let stakes: Vec<Decimal> = implied
            .iter()
            .map(|p| self.round_stake(stake.amount * p / implied_sum))
            .collect();
        if stakes.iter().any(|s| s.is_zero()) {
            return None;
        }

        let total_stake: Decimal = stakes.iter().sum();
        let payouts: Vec<Decimal> = group
            .legs
            .iter()
            .zip(&stakes)
            .map(|(l, s)| s * l.outcome.odds)
            .collect();
        let total_payout = payouts.iter().copied().min()?;
        let profit = total_payout - total_stake;
        if profit <= Decimal::ZERO {
            trace!(event = %group.event, profit = %profit, "Rounding ate the profit");
            return None;
        }

        let legs = group
            .legs
            .iter()
            .zip(stakes.iter().zip(&payouts))
            .map(|(bet, (&leg_stake, &payout))| {
                let leg_margin = (payout / total_stake - Decimal::ONE) * dec!(100);
                let within_max = bet.outcome.max_stake.map_or(true, |max| leg_stake <= max);
                CandidateLeg {
                    bookie: bet.bookie.clone(),
                    label: bet.outcome.label.clone(),
                    odds: bet.outcome.odds,
                    stake: leg_stake,
                    payout,
                    viable: leg_margin <= self.config.sharp_margin_max && within_max,
                    slip: bet.outcome.slip.clone(),
                }
            })
            .collect();

        Some(Candidate {
            event: group.event.clone(),
            legs,
            total_stake,
            total_payout,
            profit,
            margin: margin.round_dp(4),
            currency: stake.currency.clone(),
        })
    }
}

impl CandidateBuilder for SurebetBuilder {
    fn build(&self, groups: &[MatchedGroup], stake: &Money) -> Result<Vec<Candidate>> {
        let candidates: Vec<Candidate> = groups.iter().filter_map(|g| self.score(g, stake)).collect();
        debug!(
            groups = groups.len(),
            candidates = candidates.len(),
            "Candidates built"
        );
        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
