//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (feed API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::arbitrage::BuilderConfig;
use crate::bookies::feed::FeedBookie;
use crate::bookies::file::FileFeed;
use crate::bookies::http::HttpFeed;
use crate::bookies::Bookie;
use crate::engine::pipeline::PipelineConfig;
use crate::matching::DEFAULT_MATCH_THRESHOLD;
use crate::types::{ArbError, LegId, Money};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    pub stake: StakeConfig,
    #[serde(default)]
    pub builder: BuilderSection,
    pub bookies: Vec<BookieConfig>,
    /// Legs banned from the start of the run.
    #[serde(default)]
    pub bans: Vec<LegId>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineSection {
    pub interval_ms: u64,
    pub streak_threshold: u32,
    pub fetch_timeout_ms: u64,
    /// Outcomes per market (3 for 1/X/2). One bookie per outcome.
    pub ways: usize,
    pub ban_on_abort: bool,
    pub match_threshold: f64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            streak_threshold: 5,
            fetch_timeout_ms: 5000,
            ways: 3,
            ban_on_abort: true,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StakeConfig {
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BuilderSection {
    pub round_to: Decimal,
    pub margin_min: Decimal,
    pub margin_max: Decimal,
    pub sharp_margin_max: Decimal,
}

impl Default for BuilderSection {
    fn default() -> Self {
        let defaults = BuilderConfig::default();
        Self {
            round_to: defaults.round_to,
            margin_min: defaults.margin_min,
            margin_max: defaults.margin_max,
            sharp_margin_max: defaults.sharp_margin_max,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    File,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookieConfig {
    pub name: String,
    pub kind: FeedKind,
    /// `file` feeds.
    pub path: Option<String>,
    /// `http` feeds.
    pub url: Option<String>,
    pub place_url: Option<String>,
    /// Env var holding the feed API key. Set but missing means the bookie
    /// is not logged in.
    pub api_key_env: Option<String>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.ways < 2 {
            bail!(ArbError::Config(format!("ways must be at least 2, got {}", p.ways)));
        }
        if self.bookies.len() != p.ways {
            bail!(ArbError::Config(format!(
                "{} bookies configured for a {}-way market",
                self.bookies.len(),
                p.ways
            )));
        }
        if p.interval_ms == 0 {
            bail!(ArbError::Config("interval_ms must be positive".into()));
        }
        if p.fetch_timeout_ms == 0 {
            bail!(ArbError::Config("fetch_timeout_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&p.match_threshold) {
            bail!(ArbError::Config(format!(
                "match_threshold must be within 0..=1, got {}",
                p.match_threshold
            )));
        }
        if self.stake.amount <= Decimal::ZERO {
            bail!(ArbError::Config("stake amount must be positive".into()));
        }

        let b = &self.builder;
        if b.margin_min > b.margin_max {
            bail!(ArbError::Config(format!(
                "margin_min {} exceeds margin_max {}",
                b.margin_min, b.margin_max
            )));
        }
        if b.round_to < Decimal::ZERO {
            bail!(ArbError::Config("round_to cannot be negative".into()));
        }

        let mut names: Vec<&str> = Vec::new();
        for bookie in &self.bookies {
            if names.contains(&bookie.name.as_str()) {
                bail!(ArbError::Config(format!("duplicate bookie name: {}", bookie.name)));
            }
            names.push(&bookie.name);
            match bookie.kind {
                FeedKind::File if bookie.path.is_none() => {
                    bail!(ArbError::Config(format!("bookie {}: file feed needs `path`", bookie.name)))
                }
                FeedKind::Http if bookie.url.is_none() => {
                    bail!(ArbError::Config(format!("bookie {}: http feed needs `url`", bookie.name)))
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            round_to: self.builder.round_to,
            margin_min: self.builder.margin_min,
            margin_max: self.builder.margin_max,
            sharp_margin_max: self.builder.sharp_margin_max,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            interval: Duration::from_millis(self.pipeline.interval_ms),
            streak_threshold: self.pipeline.streak_threshold,
            fetch_timeout: Duration::from_millis(self.pipeline.fetch_timeout_ms),
            stake: Money::new(self.stake.amount, &self.stake.currency),
            ban_on_abort: self.pipeline.ban_on_abort,
        }
    }

    /// Instantiate every configured bookie, in config order.
    pub fn build_bookies(&self) -> Result<Vec<Arc<dyn Bookie>>> {
        self.bookies
            .iter()
            .map(|b| b.build().map(|bookie| Arc::new(bookie) as Arc<dyn Bookie>))
            .collect()
    }
}

impl BookieConfig {
    pub fn build(&self) -> Result<FeedBookie> {
        let api_key = match &self.api_key_env {
            Some(env) => match AppConfig::resolve_env(env) {
                Ok(key) => Some(key),
                Err(_) => {
                    warn!(bookie = %self.name, env = %env, "API key not set, bookie is not logged in");
                    None
                }
            },
            None => None,
        };
        let authenticated = self.api_key_env.is_none() || api_key.is_some();

        let bookie = match self.kind {
            FeedKind::File => {
                let path = self
                    .path
                    .as_deref()
                    .ok_or_else(|| ArbError::Config(format!("bookie {}: missing path", self.name)))?;
                FileFeed::bookie(&self.name, path, self.dry_run)
            }
            FeedKind::Http => {
                let url = self
                    .url
                    .clone()
                    .ok_or_else(|| ArbError::Config(format!("bookie {}: missing url", self.name)))?;
                HttpFeed::bookie(&self.name, url, self.place_url.clone(), api_key, self.dry_run)
                    .with_context(|| format!("Failed to build bookie {}", self.name))?
            }
        };
        Ok(bookie.with_authenticated(authenticated))
    }
}
