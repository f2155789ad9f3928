//! Execution controller.
//!
//! Drives one selected candidate through
//! `Idle → Selected → Verifying → {Committing | Aborting} → Idle`.
//!
//! Every leg is postulated in parallel. Only when *all* legs come back
//! valid is anything placed; a single invalid leg aborts and cleans every
//! slip, including the ones that verified. Once placement starts it runs
//! to completion, and a leg that fails to place is surfaced as a partial
//! execution rather than retried (a retry can double a stake).

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::{PipelineEvent, PipelineState, PipelineStatus};
use crate::types::{ArbError, Candidate, CandidateLeg, LegId, Postulation};

// ---------------------------------------------------------------------------
// States and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Idle,
    Selected,
    Verifying,
    Committing,
    Aborting,
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecState::Idle => write!(f, "idle"),
            ExecState::Selected => write!(f, "selected"),
            ExecState::Verifying => write!(f, "verifying"),
            ExecState::Committing => write!(f, "committing"),
            ExecState::Aborting => write!(f, "aborting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every leg placed.
    Committed,
    /// All legs verified but at least one failed to place. Open risk.
    PartiallyCommitted,
    /// At least one leg failed verification; nothing was placed.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct LegPostulation {
    pub leg: LegId,
    pub stake: Decimal,
    pub postulation: Postulation,
}

#[derive(Debug, Clone)]
pub struct LegPlacement {
    pub leg: LegId,
    pub stake: Decimal,
    pub odds: Decimal,
    pub placed: bool,
    pub error: Option<String>,
}

/// Everything that happened to one candidate.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub candidate: Candidate,
    pub outcome: ExecutionOutcome,
    pub postulations: Vec<LegPostulation>,
    /// Empty when aborted.
    pub placements: Vec<LegPlacement>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Legs whose postulation came back invalid.
    pub fn invalid_legs(&self) -> Vec<LegId> {
        self.postulations
            .iter()
            .filter(|p| !p.postulation.valid)
            .map(|p| p.leg.clone())
            .collect()
    }

    pub fn placed_count(&self) -> usize {
        self.placements.iter().filter(|p| p.placed).count()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The only writer of `blocked`, the window reset and the exec state.
pub struct ExecutionController {
    events: broadcast::Sender<PipelineEvent>,
    status: Arc<watch::Sender<PipelineStatus>>,
    ban_on_abort: bool,
}

impl ExecutionController {
    pub fn new(
        events: broadcast::Sender<PipelineEvent>,
        status: Arc<watch::Sender<PipelineStatus>>,
        ban_on_abort: bool,
    ) -> Self {
        Self {
            events,
            status,
            ban_on_abort,
        }
    }

    fn transition(&self, to: ExecState) {
        self.status.send_modify(|s| s.state = to);
        debug!(state = %to, "Execution state changed");
        // No subscribers is fine.
        let _ = self.events.send(PipelineEvent::StateChanged(to));
    }

    /// `Idle → Selected`: block polling, forget the window, announce.
    ///
    /// Runs on the coordinator before the execution task is spawned, so
    /// `blocked` is set before any other tick can be handled.
    pub fn begin(&self, state: &mut PipelineState, candidate: &Candidate) {
        state.blocked = true;
        state.accumulator.reset();
        self.status.send_modify(|s| {
            s.blocked = true;
            s.accumulated = 0;
        });
        self.transition(ExecState::Selected);

        info!(
            event = %candidate.event,
            legs = candidate.legs.len(),
            stake = %candidate.total_stake,
            profit = %candidate.profit,
            currency = %candidate.currency,
            margin = format!("{:.2}%", candidate.margin),
            viable = candidate.is_viable(),
            "Opportunity selected, verifying"
        );
        let _ = self.events.send(PipelineEvent::VerifyingStarted {
            bookies: candidate.bookies(),
            candidate: candidate.clone(),
        });
    }

    /// `Selected → Verifying → {Committing | Aborting}`. Never cancelled
    /// part-way: every call it starts is awaited.
    pub async fn execute(&self, candidate: Candidate) -> ExecutionReport {
        let started_at = Utc::now();

        self.transition(ExecState::Verifying);
        let postulations = join_all(candidate.legs.iter().map(|leg| Self::postulate_leg(leg))).await;
        for p in &postulations {
            info!(leg = %p.leg, stake = %p.stake, postulation = %p.postulation, "Leg postulated");
        }

        let (outcome, placements) = if postulations.iter().all(|p| p.postulation.valid) {
            self.transition(ExecState::Committing);
            let _ = self.events.send(PipelineEvent::CommittingStarted {
                bookies: candidate.bookies(),
            });

            let placements = join_all(candidate.legs.iter().map(|leg| Self::place_leg(leg))).await;
            let outcome = if placements.iter().all(|p| p.placed) {
                ExecutionOutcome::Committed
            } else {
                ExecutionOutcome::PartiallyCommitted
            };
            (outcome, placements)
        } else {
            self.transition(ExecState::Aborting);
            join_all(candidate.legs.iter().map(|leg| Self::clean_leg(leg))).await;
            (ExecutionOutcome::Aborted, Vec::new())
        };

        let report = ExecutionReport {
            candidate,
            outcome,
            postulations,
            placements,
            started_at,
            finished_at: Utc::now(),
        };
        log_report(&report);
        report
    }

    /// Back to `Idle`: unblock polling and publish the report.
    ///
    /// When `closing`, abort bans are skipped so the reported ban list is
    /// the one in force when close was requested.
    pub fn finish(&self, state: &mut PipelineState, report: ExecutionReport, closing: bool) {
        if report.outcome == ExecutionOutcome::Aborted && self.ban_on_abort && !closing {
            state.bans.ban(report.invalid_legs());
        }
        self.release(state);
        let _ = self.events.send(PipelineEvent::Executed(report));
    }

    /// Unblock without a report (the execution task itself died).
    pub fn release(&self, state: &mut PipelineState) {
        state.blocked = false;
        let accumulated = state.accumulator.len();
        let banned = state.bans.len();
        self.status.send_modify(|s| {
            s.blocked = false;
            s.accumulated = accumulated;
            s.banned = banned;
        });
        self.transition(ExecState::Idle);
    }

    // -- Leg helpers -------------------------------------------------------

    async fn postulate_leg(leg: &CandidateLeg) -> LegPostulation {
        let postulation = match leg.slip.postulate(leg.stake).await {
            Ok(p) => p,
            Err(e) => {
                let err = ArbError::Postulate {
                    leg: leg.id(),
                    message: format!("{e:#}"),
                };
                warn!(error = %err, "Postulation failed");
                Postulation::rejected(err.to_string())
            }
        };
        LegPostulation {
            leg: leg.id(),
            stake: leg.stake,
            postulation,
        }
    }

    async fn place_leg(leg: &CandidateLeg) -> LegPlacement {
        let failure = |message: String| ArbError::Place {
            leg: leg.id(),
            message,
        };
        let (placed, error) = match leg.slip.place().await {
            Ok(true) => (true, None),
            Ok(false) => (false, Some(failure("bookie refused the bet".to_string()))),
            Err(e) => (false, Some(failure(format!("{e:#}")))),
        };
        if let Some(err) = &error {
            warn!(error = %err, "Placement failed");
        }
        let error = error.map(|e| e.to_string());
        LegPlacement {
            leg: leg.id(),
            stake: leg.stake,
            odds: leg.odds,
            placed,
            error,
        }
    }

    async fn clean_leg(leg: &CandidateLeg) {
        if let Err(e) = leg.slip.clean().await {
            warn!(leg = %leg.id(), error = %format!("{e:#}"), "Cleanup failed");
        }
    }
}

fn log_report(report: &ExecutionReport) {
    let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
    match report.outcome {
        ExecutionOutcome::Committed => info!(
            event = %report.candidate.event,
            placed = report.placed_count(),
            stake = %report.candidate.total_stake,
            profit = %report.candidate.profit,
            elapsed_ms,
            "Arbitrage committed"
        ),
        ExecutionOutcome::PartiallyCommitted => {
            let failed: Vec<String> = report
                .placements
                .iter()
                .filter(|p| !p.placed)
                .map(|p| format!("{} ({})", p.leg, p.error.as_deref().unwrap_or("unknown")))
                .collect();
            error!(
                event = %report.candidate.event,
                placed = report.placed_count(),
                failed = ?failed,
                elapsed_ms,
                "PARTIAL EXECUTION: open position, manual action required"
            );
        }
        ExecutionOutcome::Aborted => {
            let invalid: Vec<String> = report.invalid_legs().iter().map(|l| l.to_string()).collect();
            info!(
                event = %report.candidate.event,
                invalid = ?invalid,
                elapsed_ms,
                "Verification failed, all slips cleaned"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
