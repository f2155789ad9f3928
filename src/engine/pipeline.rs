//! Pipeline coordinator.
//!
//! A single task owns `blocked`, the accumulation window and the ban
//! registry. Polls and executions run as spawned tasks (at most one of
//! each at a time) whose results come back to the coordinator, so all
//! state changes happen in one place and in order.
//!
//! ```text
//! tick ──► poll ──► match ──► drop banned ──► build ──► accumulate ──► select
//!   ▲                                                                    │
//!   └──────── Idle ◄── commit | abort ◄── verify ◄── Selected (blocked) ◄┘
//! ```

use anyhow::{anyhow, Result};
use futures::future::OptionFuture;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::accumulator::{Accumulator, DEFAULT_STREAK_THRESHOLD};
use super::bans::BanRegistry;
use super::executor::{ExecutionController, ExecutionReport};
use super::poller::Poller;
use super::{selector, PipelineEvent, PipelineState, PipelineStatus};
use crate::arbitrage::CandidateBuilder;
use crate::bookies::Bookie;
use crate::matching::Matcher;
use crate::types::{ArbError, BookieEvents, Candidate, LegId, Money, Signature};

const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub interval: Duration,
    pub streak_threshold: u32,
    pub fetch_timeout: Duration,
    /// Total stake split across the legs of every candidate.
    pub stake: Money,
    /// Ban the legs that failed verification after an abort.
    pub ban_on_abort: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            streak_threshold: DEFAULT_STREAK_THRESHOLD,
            fetch_timeout: Duration::from_secs(5),
            stake: Money::new(dec!(200), "USD"),
            ban_on_abort: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Ban(Vec<LegId>),
}

/// Control surface for a running pipeline. Cheap to clone.
#[derive(Clone)]
pub struct PipelineHandle {
    close: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<PipelineEvent>,
    status: watch::Receiver<PipelineStatus>,
}

impl PipelineHandle {
    /// Request close. Idempotent. `run` stops ticking, waits for any
    /// in-flight execution and returns the ban list.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Queue legs for banning. Applied on the coordinator's next iteration.
    pub fn ban(&self, legs: Vec<LegId>) -> Result<()> {
        self.commands
            .send(Command::Ban(legs))
            .map_err(|_| anyhow!("pipeline is no longer running"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.clone()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    poller: Arc<Poller>,
    matcher: Box<dyn Matcher>,
    builder: Box<dyn CandidateBuilder>,
    config: PipelineConfig,
    state: PipelineState,
    controller: Arc<ExecutionController>,
    /// Some bookie is not logged in: detect and report, never execute.
    watch_only: bool,
    last_reported: Option<Signature>,
    close: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<PipelineEvent>,
    status: Arc<watch::Sender<PipelineStatus>>,
}

impl Pipeline {
    pub fn new(
        bookies: Vec<Arc<dyn Bookie>>,
        matcher: Box<dyn Matcher>,
        builder: Box<dyn CandidateBuilder>,
        config: PipelineConfig,
        bans: impl IntoIterator<Item = LegId>,
    ) -> (Self, PipelineHandle) {
        let unauthenticated: Vec<&str> = bookies
            .iter()
            .filter(|b| !b.is_authenticated())
            .map(|b| b.name())
            .collect();
        let watch_only = !unauthenticated.is_empty();
        if watch_only {
            warn!(bookies = ?unauthenticated, "Not authenticated, running in watch-only mode");
        }

        let state = PipelineState {
            blocked: false,
            accumulator: Accumulator::new(config.streak_threshold),
            bans: BanRegistry::new(bans),
        };

        let (status_tx, status_rx) = watch::channel(PipelineStatus {
            banned: state.bans.len(),
            watch_only,
            ..PipelineStatus::default()
        });
        let status = Arc::new(status_tx);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let close = CancellationToken::new();

        let controller = Arc::new(ExecutionController::new(
            events.clone(),
            status.clone(),
            config.ban_on_abort,
        ));

        let handle = PipelineHandle {
            close: close.clone(),
            commands: command_tx,
            events: events.clone(),
            status: status_rx,
        };

        let pipeline = Self {
            poller: Arc::new(Poller::new(bookies, config.fetch_timeout)),
            matcher,
            builder,
            config,
            state,
            controller,
            watch_only,
            last_reported: None,
            close,
            commands: command_rx,
            events,
            status,
        };
        (pipeline, handle)
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn is_watch_only(&self) -> bool {
        self.watch_only
    }

    /// Drive the pipeline until closed. Returns the ban list in force when
    /// close was requested.
    pub async fn run(mut self) -> Vec<LegId> {
        info!(
            bookies = self.poller.bookies().len(),
            interval_ms = self.config.interval.as_millis() as u64,
            threshold = self.state.accumulator.threshold(),
            stake = %self.config.stake,
            banned = self.state.bans.len(),
            watch_only = self.watch_only,
            "Pipeline started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut polling: Option<JoinHandle<Vec<BookieEvents>>> = None;
        let mut executing: Option<JoinHandle<ExecutionReport>> = None;
        let close = self.close.clone();

        loop {
            tokio::select! {
                biased;

                _ = close.cancelled() => break,

                Some(joined) = OptionFuture::from(executing.as_mut()), if executing.is_some() => {
                    executing = None;
                    self.complete_execution(joined, false);
                }

                Some(joined) = OptionFuture::from(polling.as_mut()), if polling.is_some() => {
                    polling = None;
                    match joined {
                        Ok(snapshot) => {
                            if let Some(candidate) = self.process_snapshot(&snapshot) {
                                executing = Some(self.start_execution(candidate));
                            }
                        }
                        Err(e) => warn!(error = %e, "Poll task failed"),
                    }
                }

                Some(command) = self.commands.recv() => self.apply(command),

                _ = ticker.tick() => {
                    if self.state.blocked {
                        trace!("Blocked, tick skipped");
                    } else if polling.is_some() {
                        debug!("Previous cycle still running, tick dropped");
                    } else {
                        let poller = self.poller.clone();
                        polling = Some(tokio::spawn(async move { poller.poll().await }));
                    }
                }
            }
        }

        self.shutdown(polling, executing).await
    }

    /// Run one snapshot through matching, building, accumulation and
    /// selection. Returns the candidate to execute, if any.
    pub fn process_snapshot(&mut self, snapshot: &[BookieEvents]) -> Option<Candidate> {
        self.status.send_modify(|s| s.cycles += 1);
        if self.state.blocked {
            debug!("Blocked, snapshot dropped");
            return None;
        }

        let candidates = match self.candidates(snapshot) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Cycle failed, treated as empty");
                Vec::new()
            }
        };

        self.state.accumulator.accumulate(&candidates);
        let accumulated = self.state.accumulator.len();
        self.status.send_modify(|s| s.accumulated = accumulated);

        let selected = selector::select(&candidates, &self.state.accumulator)?.clone();

        if self.watch_only {
            let signature = selected.signature();
            if self.last_reported.as_ref() != Some(&signature) {
                info!(candidate = %selected, "Stable opportunity (watch-only, not executing)");
                self.last_reported = Some(signature);
            } else {
                trace!(signature = %signature, "Stable opportunity still open");
            }
            return None;
        }

        // Re-checked right before emitting the selection.
        if self.state.blocked {
            return None;
        }
        Some(selected)
    }

    fn candidates(&self, snapshot: &[BookieEvents]) -> Result<Vec<Candidate>> {
        let groups = self
            .matcher
            .match_events(snapshot)
            .map_err(|e| ArbError::Matching(format!("{e:#}")))?;
        let matched = groups.len();
        let groups: Vec<_> = groups
            .into_iter()
            .filter(|g| !self.state.bans.has_banned_leg(g))
            .collect();

        let candidates = self
            .builder
            .build(&groups, &self.config.stake)
            .map_err(|e| ArbError::Building(format!("{e:#}")))?;

        for c in candidates.iter().filter(|c| !c.is_viable()) {
            debug!(signature = %c.signature(), "Candidate has a non-viable leg");
        }
        debug!(
            matched,
            banned = matched - groups.len(),
            candidates = candidates.len(),
            "Cycle processed"
        );
        Ok(candidates)
    }

    fn start_execution(&mut self, candidate: Candidate) -> JoinHandle<ExecutionReport> {
        self.controller.begin(&mut self.state, &candidate);
        let controller = self.controller.clone();
        tokio::spawn(async move { controller.execute(candidate).await })
    }

    fn complete_execution(&mut self, joined: Result<ExecutionReport, JoinError>, closing: bool) {
        match joined {
            Ok(report) => self.controller.finish(&mut self.state, report, closing),
            Err(e) => {
                error!(error = %e, "Execution task failed, leg outcomes unknown");
                self.controller.release(&mut self.state);
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Ban(legs) => {
                let added = self.state.bans.ban(legs);
                let banned = self.state.bans.len();
                self.status.send_modify(|s| s.banned = banned);
                debug!(added, banned, "Operator bans applied");
            }
        }
    }

    async fn shutdown(
        mut self,
        polling: Option<JoinHandle<Vec<BookieEvents>>>,
        executing: Option<JoinHandle<ExecutionReport>>,
    ) -> Vec<LegId> {
        // Bans accepted before close belong in the reported list; later
        // ones are refused by the handle.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
        let banned = self.state.bans.entries().to_vec();
        info!("Close requested, polling stopped");

        if let Some(poll) = polling {
            poll.abort();
        }
        if let Some(execution) = executing {
            info!("Waiting for in-flight execution to finish");
            let joined = execution.await;
            self.complete_execution(joined, true);
        }

        self.status.send_modify(|s| s.closed = true);
        let listed: Vec<String> = banned.iter().map(|l| l.to_string()).collect();
        info!(banned = ?listed, "Pipeline closed");
        let _ = self.events.send(PipelineEvent::Closed {
            banned: banned.clone(),
        });
        banned
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
