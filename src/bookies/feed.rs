//! JSON odds feeds.
//!
//! A feed is any source that can return the whole odds board in one
//! shape:
//!
//! ```json
//! { "events": [ { "title": "Atlas vs Chivas",
//!                 "outcomes": [ { "label": "1", "odds": 2.9, "max_stake": 500 } ] } ] }
//! ```
//!
//! `FeedBookie` turns a feed into a `Bookie`; each outcome gets a
//! `FeedSlip` that re-reads the feed when postulated.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{BetSlip, Bookie};
use crate::types::{ArbError, Event, Outcome, Postulation};

// ---------------------------------------------------------------------------
// Feed shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSnapshot {
    #[serde(default)]
    pub events: Vec<FeedEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    pub title: String,
    #[serde(default)]
    pub outcomes: Vec<FeedOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedOutcome {
    pub label: String,
    pub odds: Decimal,
    #[serde(default)]
    pub max_stake: Option<Decimal>,
}

impl FeedSnapshot {
    /// Look up an outcome by event title and label.
    pub fn find(&self, event: &str, label: &str) -> Option<&FeedOutcome> {
        self.events
            .iter()
            .find(|e| e.title == event)
            .and_then(|e| e.outcomes.iter().find(|o| o.label == label))
    }
}

/// A bet sent to a feed that accepts placements.
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub reference: String,
    pub bookie: String,
    pub event: String,
    pub label: String,
    pub odds: Decimal,
    pub stake: Decimal,
}

/// Where a feed bookie reads its board from and, optionally, places bets.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    async fn load(&self) -> Result<FeedSnapshot>;

    /// Whether `submit` reaches a real placement endpoint.
    fn accepts_placements(&self) -> bool {
        false
    }

    async fn submit(&self, placement: &Placement) -> Result<bool> {
        Err(ArbError::Feed(format!(
            "feed does not accept placements ({} on {})",
            placement.label, placement.bookie
        ))
        .into())
    }
}

// ---------------------------------------------------------------------------
// Bookie
// ---------------------------------------------------------------------------

/// A bookie backed by an `OddsFeed`.
pub struct FeedBookie {
    name: String,
    feed: Arc<dyn OddsFeed>,
    dry_run: bool,
    authenticated: bool,
}

impl FeedBookie {
    pub fn new(name: impl Into<String>, feed: Arc<dyn OddsFeed>, dry_run: bool) -> Self {
        Self {
            name: name.into(),
            feed,
            dry_run,
            authenticated: true,
        }
    }

    /// Mark this bookie as (un)authenticated. An unauthenticated bookie
    /// puts the whole pipeline in watch-only mode.
    pub fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    fn to_event(&self, event: FeedEvent) -> Event {
        let outcomes = event
            .outcomes
            .into_iter()
            .map(|o| Outcome {
                slip: Arc::new(FeedSlip {
                    bookie: self.name.clone(),
                    event: event.title.clone(),
                    label: o.label.clone(),
                    quoted_odds: o.odds,
                    feed: Arc::clone(&self.feed),
                    dry_run: self.dry_run,
                    primed: Mutex::new(None),
                }),
                label: o.label,
                odds: o.odds,
                max_stake: o.max_stake,
            })
            .collect();
        Event::new(event.title, outcomes)
    }
}

#[async_trait]
impl Bookie for FeedBookie {
    async fn fetch_events(&self) -> Result<Vec<Event>> {
        let snapshot = self
            .feed
            .load()
            .await
            .with_context(|| format!("Failed to load odds feed for {}", self.name))?;

        let total = snapshot.events.len();
        let events: Vec<Event> = snapshot
            .events
            .into_iter()
            .filter(|e| e.outcomes.len() >= 2)
            .map(|e| self.to_event(e))
            .collect();

        debug!(
            bookie = %self.name,
            events = events.len(),
            skipped = total - events.len(),
            "Feed events loaded"
        );
        Ok(events)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

// ---------------------------------------------------------------------------
// Slip
// ---------------------------------------------------------------------------

/// Slip for one feed outcome. Holds the stake primed by `postulate`
/// until it is placed or cleaned.
pub struct FeedSlip {
    bookie: String,
    event: String,
    label: String,
    quoted_odds: Decimal,
    feed: Arc<dyn OddsFeed>,
    dry_run: bool,
    primed: Mutex<Option<Decimal>>,
}

impl FeedSlip {
    fn set_primed(&self, stake: Option<Decimal>) -> Result<Option<Decimal>> {
        let mut primed = self
            .primed
            .lock()
            .map_err(|_| anyhow!("slip state poisoned for {} on {}", self.label, self.bookie))?;
        Ok(std::mem::replace(&mut *primed, stake))
    }
}

#[async_trait]
impl BetSlip for FeedSlip {
    async fn postulate(&self, stake: Decimal) -> Result<Postulation> {
        let snapshot = self
            .feed
            .load()
            .await
            .with_context(|| format!("Failed to re-read feed for {}", self.bookie))?;

        let Some(current) = snapshot.find(&self.event, &self.label) else {
            return Ok(Postulation::rejected(format!(
                "{} is no longer offered on {}",
                self.label, self.event
            )));
        };

        let max_stake = current.max_stake.unwrap_or(stake);
        let (valid, reason) = if current.odds < self.quoted_odds {
            (
                false,
                format!("odds moved from {} to {}", self.quoted_odds, current.odds),
            )
        } else if stake > max_stake {
            (false, format!("stake {stake} exceeds max stake {max_stake}"))
        } else {
            (true, "confirmed".to_string())
        };

        if valid {
            self.set_primed(Some(stake))?;
        }

        Ok(Postulation {
            valid,
            odds: current.odds,
            max_stake,
            reason,
        })
    }

    async fn place(&self) -> Result<bool> {
        let stake = self
            .set_primed(None)?
            .ok_or_else(|| anyhow!("nothing primed for {} on {}", self.label, self.bookie))?;

        let simulated = self.dry_run || !self.feed.accepts_placements();
        let reference = if simulated {
            format!("dry-run-{}", uuid::Uuid::new_v4())
        } else {
            uuid::Uuid::new_v4().to_string()
        };
        let placement = Placement {
            reference,
            bookie: self.bookie.clone(),
            event: self.event.clone(),
            label: self.label.clone(),
            odds: self.quoted_odds,
            stake,
        };

        if simulated {
            info!(
                bookie = %placement.bookie,
                event = %placement.event,
                label = %placement.label,
                stake = %placement.stake,
                odds = %placement.odds,
                reference = %placement.reference,
                "[DRY RUN] Would place bet"
            );
            return Ok(true);
        }

        self.feed
            .submit(&placement)
            .await
            .with_context(|| format!("Placement failed on {}", self.bookie))
    }

    async fn clean(&self) -> Result<()> {
        if self.set_primed(None)?.is_some() {
            debug!(bookie = %self.bookie, label = %self.label, "Slip cleaned");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
