//! SUREBET — cross-bookie arbitrage detection and execution
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod bookies;
pub mod matching;
pub mod arbitrage;
pub mod engine;
