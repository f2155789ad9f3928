//! Bookie integrations.
//!
//! Defines the two capability traits the pipeline talks to:
//! - `Bookie`: fetches the current tradable events from one source
//! - `BetSlip`: verifies, places and cleans one leg on that source
//!
//! Site-specific scrapers live outside this crate. The feed-backed
//! bookies here read the same JSON odds shape from a file or an HTTP
//! endpoint and are enough to run the pipeline end to end.

pub mod feed;
pub mod file;
pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Event, Postulation};

/// A source of live odds.
#[async_trait]
pub trait Bookie: Send + Sync {
    /// Fetch the events currently offered by this bookie.
    async fn fetch_events(&self) -> Result<Vec<Event>>;

    /// Bookie name for logging, signatures and bans.
    fn name(&self) -> &str;

    /// Whether this bookie can verify and place bets. Unauthenticated
    /// bookies still provide odds.
    fn is_authenticated(&self) -> bool {
        true
    }
}

/// Bookie-side handle on one outcome.
///
/// `postulate` primes the slip with a stake and re-confirms the price;
/// `place` commits whatever was primed; `clean` clears it again.
#[async_trait]
pub trait BetSlip: Send + Sync {
    async fn postulate(&self, stake: Decimal) -> Result<Postulation>;

    async fn place(&self) -> Result<bool>;

    async fn clean(&self) -> Result<()>;
}
