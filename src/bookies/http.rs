//! HTTP JSON feed.
//!
//! GETs the odds board from `url`. When a `place_url` is configured,
//! placements are POSTed there as JSON and the response is expected to
//! be `{ "placed": bool }`.
//! Auth: optional `Authorization: Bearer {key}` on every request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::feed::{FeedBookie, FeedSnapshot, OddsFeed, Placement};
use crate::types::ArbError;

/// Request timeout for both board reads and placements.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PlacementResponse {
    placed: bool,
    #[serde(default)]
    reference: Option<String>,
}

pub struct HttpFeed {
    http: Client,
    url: String,
    place_url: Option<String>,
    api_key: Option<SecretString>,
}

impl HttpFeed {
    pub fn new(url: String, place_url: Option<String>, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("SUREBET/0.1.0 (odds-pipeline)")
            .build()
            .context("Failed to build HTTP client for odds feed")?;

        Ok(Self {
            http,
            url,
            place_url,
            api_key: api_key.map(SecretString::new),
        })
    }

    /// Convenience constructor for a bookie backed by an HTTP feed.
    pub fn bookie(
        name: &str,
        url: String,
        place_url: Option<String>,
        api_key: Option<String>,
        dry_run: bool,
    ) -> Result<FeedBookie> {
        let feed = Self::new(url, place_url, api_key)?;
        Ok(FeedBookie::new(name, Arc::new(feed), dry_run))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl OddsFeed for HttpFeed {
    async fn load(&self) -> Result<FeedSnapshot> {
        debug!(url = %self.url, "Fetching odds board");

        let resp = self
            .authorize(self.http.get(&self.url))
            .send()
            .await
            .context("Odds feed request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ArbError::Feed(format!("odds board returned {status}: {body}")).into());
        }

        resp.json()
            .await
            .context("Failed to parse odds feed response")
    }

    fn accepts_placements(&self) -> bool {
        self.place_url.is_some()
    }

    async fn submit(&self, placement: &Placement) -> Result<bool> {
        let Some(place_url) = &self.place_url else {
            let message = format!("no placement endpoint configured for {}", placement.bookie);
            return Err(ArbError::Feed(message).into());
        };

        let resp = self
            .authorize(self.http.post(place_url))
            .json(placement)
            .send()
            .await
            .context("Placement request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ArbError::Feed(format!("placement returned {status}: {body}")).into());
        }

        let result: PlacementResponse = resp
            .json()
            .await
            .context("Failed to parse placement response")?;

        info!(
            bookie = %placement.bookie,
            label = %placement.label,
            stake = %placement.stake,
            placed = result.placed,
            reference = ?result.reference,
            "Placement submitted"
        );
        Ok(result.placed)
    }
}
