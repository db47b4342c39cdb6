//! Outbound device selection.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::{Display, EnumString};

use crate::{
    error::{HubError, HubResult},
    store::{Device, DeviceStore},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SendStrategy {
    /// Same as `SignalBest`.
    #[default]
    Auto,
    RoundRobin,
    Random,
    SignalBest,
}

/// Picks a device for each outbound message. The round-robin cursor is
/// shared by every caller of one selector.
#[derive(Debug, Default)]
pub struct Selector {
    cursor: AtomicUsize,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, store: &dyn DeviceStore, strategy: SendStrategy) -> HubResult<Device> {
        let candidates = match strategy {
            // registration order straight from the store
            SendStrategy::RoundRobin => store
                .find_all()?
                .into_iter()
                .filter(Device::is_available)
                .collect(),
            _ => store.find_all_online()?,
        };
        self.pick(candidates, strategy)
    }

    /// Choose from an online set. Signal-based strategies expect it sorted
    /// strongest first.
    pub fn pick(&self, mut online: Vec<Device>, strategy: SendStrategy) -> HubResult<Device> {
        if online.is_empty() {
            return Err(HubError::NoDeviceAvailable);
        }
        let index = match strategy {
            SendStrategy::Auto | SendStrategy::SignalBest => 0,
            SendStrategy::RoundRobin => {
                online.sort_by_key(|d| d.created_at);
                self.cursor.fetch_add(1, Ordering::Relaxed) % online.len()
            }
            SendStrategy::Random => rand::rng().random_range(0..online.len()),
        };
        Ok(online.swap_remove(index))
    }

    /// Current round-robin cursor value.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}
