//! Mock bookie for integration testing.
//!
//! Provides a deterministic `Bookie` that always lists the same 1/X/2
//! event and whose slips record every postulate, place and clean call.
//! Behaviour (failing fetches, invalid legs, refused placements, slow
//! calls) is controllable from test code while the pipeline runs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use surebet::arbitrage::{BuilderConfig, SurebetBuilder};
use surebet::bookies::{BetSlip, Bookie};
use surebet::engine::pipeline::{Pipeline, PipelineConfig, PipelineHandle};
use surebet::engine::PipelineEvent;
use surebet::matching::TitleMatcher;
use surebet::types::{Event, LegId, Money, Outcome, Postulation};

pub const TITLE: &str = "Club America vs Cruz Azul";
pub const LABELS: [&str; 3] = ["1", "X", "2"];

/// Knobs read by the bookie and its slips on every call.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub fail_fetch: bool,
    pub fetch_delay: Option<Duration>,
    pub invalid: bool,
    pub postulate_delay: Option<Duration>,
    pub refuse_place: bool,
}

/// Every call made against one bookie, in order.
#[derive(Debug, Default)]
pub struct Ledger {
    pub fetches: AtomicUsize,
    /// Fetches currently running, and the most ever seen at once.
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub postulated: Mutex<Vec<String>>,
    pub placed: Mutex<Vec<String>>,
    pub cleaned: Mutex<Vec<String>>,
}

impl Ledger {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn postulated(&self) -> Vec<String> {
        self.postulated.lock().unwrap().clone()
    }

    pub fn placed(&self) -> Vec<String> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().unwrap().clone()
    }
}

pub struct MockBookie {
    name: String,
    odds: [Decimal; 3],
    authenticated: bool,
    behaviour: Arc<Mutex<Behaviour>>,
    ledger: Arc<Ledger>,
}

impl MockBookie {
    pub fn new(name: &str, odds: [Decimal; 3]) -> Self {
        Self {
            name: name.to_string(),
            odds,
            authenticated: true,
            behaviour: Arc::new(Mutex::new(Behaviour::default())),
            ledger: Arc::new(Ledger::default()),
        }
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// Change behaviour; applies to the next call.
    pub fn configure(&self, f: impl FnOnce(&mut Behaviour)) {
        f(&mut self.behaviour.lock().unwrap());
    }

    fn behaviour(&self) -> Behaviour {
        self.behaviour.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bookie for MockBookie {
    async fn fetch_events(&self) -> Result<Vec<Event>> {
        self.ledger.fetches.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.ledger);
        let behaviour = self.behaviour();
        if let Some(delay) = behaviour.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if behaviour.fail_fetch {
            return Err(anyhow!("{}: page did not load", self.name));
        }

        let outcomes = LABELS
            .iter()
            .zip(self.odds)
            .map(|(label, odds)| Outcome {
                label: label.to_string(),
                odds,
                max_stake: None,
                slip: Arc::new(MockSlip {
                    label: label.to_string(),
                    behaviour: self.behaviour.clone(),
                    ledger: self.ledger.clone(),
                }),
            })
            .collect();
        Ok(vec![Event::new(TITLE, outcomes)])
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Counts a fetch as running until dropped, including when the poller
/// cancels it on timeout.
struct InFlight<'a>(&'a Ledger);

impl<'a> InFlight<'a> {
    fn enter(ledger: &'a Ledger) -> Self {
        let now = ledger.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        ledger.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(ledger)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockSlip {
    label: String,
    behaviour: Arc<Mutex<Behaviour>>,
    ledger: Arc<Ledger>,
}

#[async_trait]
impl BetSlip for MockSlip {
    async fn postulate(&self, stake: Decimal) -> Result<Postulation> {
        self.ledger.postulated.lock().unwrap().push(self.label.clone());
        let behaviour = self.behaviour.lock().unwrap().clone();
        if let Some(delay) = behaviour.postulate_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Postulation {
            valid: !behaviour.invalid,
            odds: dec!(2),
            max_stake: stake,
            reason: if behaviour.invalid { "odds moved".into() } else { "ok".into() },
        })
    }

    async fn place(&self) -> Result<bool> {
        self.ledger.placed.lock().unwrap().push(self.label.clone());
        let refuse = self.behaviour.lock().unwrap().refuse_place;
        Ok(!refuse)
    }

    async fn clean(&self) -> Result<()> {
        self.ledger.cleaned.lock().unwrap().push(self.label.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Three bookies on the same match. Only alpha:1 / beta:X / gamma:2 is an
/// arbitrage (4.55%, 80/60/60 of a 200 stake, profit 4).
pub fn make_bookies() -> [Arc<MockBookie>; 3] {
    [
        Arc::new(MockBookie::new("alpha", [dec!(2.6), dec!(3.0), dec!(2.8)])),
        Arc::new(MockBookie::new("beta", [dec!(2.2), dec!(3.6), dec!(2.8)])),
        Arc::new(MockBookie::new("gamma", [dec!(2.2), dec!(3.0), dec!(3.4)])),
    ]
}

pub fn arb_legs() -> Vec<LegId> {
    vec![
        LegId::new("alpha", "1"),
        LegId::new("beta", "X"),
        LegId::new("gamma", "2"),
    ]
}

pub fn make_config() -> PipelineConfig {
    PipelineConfig {
        interval: Duration::from_millis(250),
        streak_threshold: 5,
        fetch_timeout: Duration::from_secs(1),
        stake: Money::new(dec!(200), "USD"),
        ban_on_abort: true,
    }
}

pub struct Harness {
    pub handle: PipelineHandle,
    pub events: broadcast::Receiver<PipelineEvent>,
    pub task: JoinHandle<Vec<LegId>>,
}

/// Spawn a pipeline over the given bookies. Subscribes before the first
/// tick so no event is missed.
pub fn start(bookies: &[Arc<MockBookie>], config: PipelineConfig, bans: Vec<LegId>) -> Harness {
    let dyn_bookies: Vec<Arc<dyn Bookie>> = bookies
        .iter()
        .map(|b| b.clone() as Arc<dyn Bookie>)
        .collect();
    let (pipeline, handle) = Pipeline::new(
        dyn_bookies,
        Box::new(TitleMatcher::new(bookies.len(), 0.6)),
        Box::new(SurebetBuilder::new(BuilderConfig::default())),
        config,
        bans,
    );
    let events = handle.subscribe();
    let task = tokio::spawn(pipeline.run());
    Harness { handle, events, task }
}

/// Next event matching `pred`. Panics after a minute of (virtual) time.
pub async fn wait_for(
    events: &mut broadcast::Receiver<PipelineEvent>,
    mut pred: impl FnMut(&PipelineEvent) -> bool,
) -> PipelineEvent {
    let next = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), next)
        .await
        .expect("timed out waiting for pipeline event")
}
