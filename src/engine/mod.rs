//! Core engine: poll → accumulate → select → verify → commit/abort loop.
//!
//! `pipeline` owns the coordinator task. The other modules are the stages
//! it drives, each usable on its own.

pub mod accumulator;
pub mod bans;
pub mod executor;
pub mod pipeline;
pub mod poller;
pub mod selector;

use crate::types::{Candidate, LegId};
use accumulator::Accumulator;
use bans::BanRegistry;
use executor::{ExecState, ExecutionReport};

/// Mutable state owned by the coordinator.
#[derive(Debug)]
pub struct PipelineState {
    /// True from selection until the execution returns to idle. No fetch is
    /// issued while set.
    pub blocked: bool,
    pub accumulator: Accumulator,
    pub bans: BanRegistry,
}

/// Point-in-time view of a running pipeline, published on a `watch` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    pub state: ExecState,
    pub blocked: bool,
    /// Signatures currently in the accumulation window.
    pub accumulated: usize,
    /// Polling cycles processed.
    pub cycles: u64,
    pub banned: usize,
    pub watch_only: bool,
    pub closed: bool,
}

/// Outbound notifications. Fire-and-forget: nothing waits on subscribers.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged(ExecState),
    /// A candidate was selected and its legs are about to be verified.
    VerifyingStarted {
        bookies: Vec<String>,
        candidate: Candidate,
    },
    /// Every leg verified; placement starts.
    CommittingStarted { bookies: Vec<String> },
    Executed(ExecutionReport),
    /// Terminal. Carries the ban list in force when close was requested.
    Closed { banned: Vec<LegId> },
}
