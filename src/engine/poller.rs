//! Polling stage.
//!
//! Fetches every bookie concurrently and waits for all of them. A bookie
//! that errors, times out or panics contributes an empty event list for
//! the cycle; it never holds back or fails the others.

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::bookies::Bookie;
use crate::types::{ArbError, BookieEvents, Event};

pub struct Poller {
    bookies: Vec<Arc<dyn Bookie>>,
    fetch_timeout: Duration,
}

impl Poller {
    pub fn new(bookies: Vec<Arc<dyn Bookie>>, fetch_timeout: Duration) -> Self {
        Self {
            bookies,
            fetch_timeout,
        }
    }

    pub fn bookies(&self) -> &[Arc<dyn Bookie>] {
        &self.bookies
    }

    /// One cycle snapshot, in bookie order.
    pub async fn poll(&self) -> Vec<BookieEvents> {
        let fetches = self.bookies.iter().map(|bookie| async move {
            let name = bookie.name().to_string();
            let events = match self.fetch(bookie.as_ref()).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(bookie = %name, error = %e, "Fetch failed, continuing without");
                    Vec::new()
                }
            };
            BookieEvents {
                bookie: name,
                events,
            }
        });

        let snapshot = join_all(fetches).await;
        debug!(
            bookies = snapshot.len(),
            events = snapshot.iter().map(|b| b.events.len()).sum::<usize>(),
            "Poll complete"
        );
        snapshot
    }

    /// Fetch one bookie under the timeout. A panic inside the bookie is
    /// caught here so it only costs that bookie's contribution.
    async fn fetch(&self, bookie: &dyn Bookie) -> Result<Vec<Event>, ArbError> {
        let fetch_error = |message: String| ArbError::Fetch {
            bookie: bookie.name().to_string(),
            message,
        };

        let guarded = AssertUnwindSafe(tokio::time::timeout(self.fetch_timeout, bookie.fetch_events()));
        match guarded.catch_unwind().await {
            Ok(Ok(Ok(events))) => Ok(events),
            Ok(Ok(Err(e))) => Err(fetch_error(format!("{e:#}"))),
            Ok(Err(_)) => Err(fetch_error(format!(
                "timed out after {}ms",
                self.fetch_timeout.as_millis()
            ))),
            Err(_) => Err(fetch_error("panicked".to_string())),
        }
    }
}
