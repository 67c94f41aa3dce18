//! Tracks how time is spent across applications and enforces self-imposed limits.
//! Usage over the daily limit blocks the application for a while, and a background enforcer
//! terminates matching processes until the block expires. Everything runs in a lightweight daemon
//! controlled from a terminal.
//!

pub mod blocking;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod rules;
pub mod utils;
pub mod window_api;
