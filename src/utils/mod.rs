//! Shared utilities for the hub
//!
//! - Cooperative stop signal used by worker threads
//! - Wall-clock helpers (epoch milliseconds)

pub mod signal;
pub mod time;

pub use signal::StopSignal;
pub use time::now_millis;
