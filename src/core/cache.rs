use std::time::{Duration, Instant};

/// Single value with an expiry.
#[derive(Debug, Clone)]
pub struct TtlCell<T> {
    ttl: Duration,
    slot: Option<(T, Instant)>,
}

impl<T: Clone> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    pub fn set(&mut self, value: T) {
        self.slot = Some((value, Instant::now()));
    }

    /// The value if it was stored less than `ttl` ago.
    pub fn get(&self) -> Option<T> {
        match &self.slot {
            Some((value, at)) if at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}
