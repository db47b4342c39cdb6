//! smshub: multi-modem SMS hub
//!
//! This crate drives several cellular modems attached over serial links. It
//! speaks the modems' line-oriented JSON frame protocol, keeps one
//! self-healing connection per modem, tracks liveness through heartbeats and
//! routes outbound SMS across modems by a selection policy.
//!
//! Persistence and notification are collaborators behind the traits in
//! [`store`]; in-process implementations are provided for the daemon binary
//! and for tests. The CLI/config plumbing is kept in a separate, hidden
//! module.

#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod error;
pub mod protocol;
pub mod store;
#[doc(hidden)]
pub mod utils;

pub use crate::core::{DeviceRegistry, RegistryConfig, SendStrategy};
pub use error::{FrameError, HubError, HubResult, StoreError};
