//! Heartbeat liveness sweep.
//!
//! Staleness is judged from the persisted `last_seen_at` only; a device can
//! hold an open serial link and still be reported offline here.

use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    store::{DevicePatch, DeviceStatus, DeviceStore},
    utils::{now_millis, StopSignal},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Silence after which a device is marked offline.
    pub heartbeat_timeout_secs: u64,
    pub check_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 60,
            check_interval_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

/// Mark every stale device in `ids` offline. Returns the ids that changed.
///
/// Devices already offline are left alone, so repeated sweeps have no
/// further side effects. A store error on one device is logged and the
/// sweep moves on to the next.
pub fn sweep(store: &dyn DeviceStore, ids: &[String], now: i64, timeout: Duration) -> Vec<String> {
    let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    let mut transitioned = Vec::new();
    for id in ids {
        let device = match store.find_by_id(id) {
            Ok(Some(device)) => device,
            Ok(None) => continue,
            Err(err) => {
                log::warn!("Health check could not load device {id}: {err}");
                continue;
            }
        };
        if device.status == DeviceStatus::Offline {
            continue;
        }
        let silent_for = now.saturating_sub(device.last_seen_at);
        if silent_for > timeout_ms {
            if let Err(err) = store.update_columns(id, &DevicePatch::offline()) {
                log::warn!("Health check could not mark device {id} offline: {err}");
                continue;
            }
            log::warn!(
                "Device {} ({}) silent for {}s, marking offline",
                device.name,
                device.serial_port,
                silent_for / 1000
            );
            transitioned.push(id.clone());
        }
    }
    transitioned
}

/// Background ticker running `sweep` until stopped.
pub struct HealthMonitor {
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// `ids` is called on every tick to snapshot the devices to check.
    pub fn spawn<F>(
        store: Arc<dyn DeviceStore>,
        config: HealthConfig,
        ids: F,
    ) -> std::io::Result<Self>
    where
        F: Fn() -> Vec<String> + Send + 'static,
    {
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("health-check".into())
            .spawn(move || {
                log::info!(
                    "Health check started (timeout {}s, every {}s)",
                    config.heartbeat_timeout_secs,
                    config.check_interval_secs
                );
                while !worker_stop.wait(config.interval()) {
                    let snapshot = ids();
                    sweep(store.as_ref(), &snapshot, now_millis(), config.timeout());
                }
                log::info!("Health check stopped");
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the ticker and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.trigger();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Health check worker panicked");
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StoreError,
        store::{Device, MemoryDeviceStore, StoreResult},
    };
    use std::collections::HashMap;

    /// Delegates to a memory store but fails loads or writes for one id.
    struct FlakyStore {
        inner: MemoryDeviceStore,
        failing_load: &'static str,
        failing_write: &'static str,
    }

    fn fail_for(id: &str, failing: &str) -> StoreResult<()> {
        if id == failing {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        Ok(())
    }

    impl DeviceStore for FlakyStore {
        fn create(&self, device: Device) -> StoreResult<()> {
            self.inner.create(device)
        }
        fn save(&self, device: &Device) -> StoreResult<()> {
            self.inner.save(device)
        }
        fn find_by_id(&self, id: &str) -> StoreResult<Option<Device>> {
            fail_for(id, self.failing_load)?;
            self.inner.find_by_id(id)
        }
        fn find_by_serial_port(&self, serial_port: &str) -> StoreResult<Option<Device>> {
            self.inner.find_by_serial_port(serial_port)
        }
        fn find_all(&self) -> StoreResult<Vec<Device>> {
            self.inner.find_all()
        }
        fn find_all_enabled(&self) -> StoreResult<Vec<Device>> {
            self.inner.find_all_enabled()
        }
        fn find_all_online(&self) -> StoreResult<Vec<Device>> {
            self.inner.find_all_online()
        }
        fn update_columns(&self, id: &str, patch: &DevicePatch) -> StoreResult<()> {
            fail_for(id, self.failing_write)?;
            self.inner.update_columns(id, patch)
        }
        fn delete(&self, id: &str) -> StoreResult<()> {
            self.inner.delete(id)
        }
        fn groups(&self) -> StoreResult<Vec<String>> {
            self.inner.groups()
        }
        fn count_by_status(&self) -> StoreResult<HashMap<DeviceStatus, usize>> {
            self.inner.count_by_status()
        }
    }

    fn device(id: &str, status: DeviceStatus, last_seen_at: i64) -> Device {
        Device {
            id: id.into(),
            serial_port: format!("/dev/{id}"),
            status,
            last_seen_at,
            signal_level: 25,
            operator: "China Mobile".into(),
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn stale_device_goes_offline_exactly_once() {
        let store = MemoryDeviceStore::with_devices(vec![
            device("stale", DeviceStatus::Online, 0),
            device("fresh", DeviceStatus::Online, 95_000),
        ]);
        let ids = vec!["stale".to_string(), "fresh".to_string()];
        let timeout = Duration::from_secs(60);

        let changed = sweep(&store, &ids, 100_000, timeout);
        assert_eq!(changed, vec!["stale"]);
        let stale = store.find_by_id("stale").unwrap().unwrap();
        assert_eq!(stale.status, DeviceStatus::Offline);
        assert_eq!(stale.signal_level, 0);
        assert_eq!(stale.operator, "");
        let updated_at = stale.updated_at;

        let changed = sweep(&store, &ids, 200_000, timeout);
        assert_eq!(changed, vec!["fresh"]);
        let again = sweep(&store, &ids, 300_000, timeout);
        assert!(again.is_empty());
        assert_eq!(
            store.find_by_id("stale").unwrap().unwrap().updated_at,
            updated_at
        );
    }

    #[test]
    fn error_status_also_times_out() {
        let store = MemoryDeviceStore::with_devices(vec![device("e", DeviceStatus::Error, 0)]);
        let changed = sweep(&store, &["e".to_string()], 61_001, Duration::from_secs(60));
        assert_eq!(changed, vec!["e"]);
    }

    #[test]
    fn exact_timeout_is_not_stale() {
        let store = MemoryDeviceStore::with_devices(vec![device("d", DeviceStatus::Online, 0)]);
        let changed = sweep(&store, &["d".to_string()], 60_000, Duration::from_secs(60));
        assert!(changed.is_empty());
    }

    #[test]
    fn store_failure_on_one_device_does_not_stop_the_sweep() {
        let store = FlakyStore {
            inner: MemoryDeviceStore::with_devices(vec![
                device("bad", DeviceStatus::Online, 0),
                device("good", DeviceStatus::Online, 0),
            ]),
            failing_load: "bad",
            failing_write: "",
        };
        let ids = vec!["bad".to_string(), "good".to_string()];
        let changed = sweep(&store, &ids, 100_000, Duration::from_secs(60));
        assert_eq!(changed, vec!["good"]);
        let good = store.find_by_id("good").unwrap().unwrap();
        assert_eq!(good.status, DeviceStatus::Offline);
    }

    #[test]
    fn failed_offline_write_is_skipped_and_not_reported() {
        let store = FlakyStore {
            inner: MemoryDeviceStore::with_devices(vec![
                device("x", DeviceStatus::Online, 0),
                device("y", DeviceStatus::Online, 0),
            ]),
            failing_load: "",
            failing_write: "x",
        };
        let ids = vec!["x".to_string(), "y".to_string()];
        let changed = sweep(&store, &ids, 100_000, Duration::from_secs(60));
        assert_eq!(changed, vec!["y"]);
        let x = store.find_by_id("x").unwrap().unwrap();
        assert_eq!(x.status, DeviceStatus::Online);
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let store = MemoryDeviceStore::new();
        let changed = sweep(&store, &["ghost".to_string()], 1, Duration::ZERO);
        assert!(changed.is_empty());
    }

    #[test]
    fn monitor_stops_promptly() {
        let store: Arc<dyn DeviceStore> = Arc::new(MemoryDeviceStore::new());
        let config = HealthConfig {
            heartbeat_timeout_secs: 60,
            check_interval_secs: 3600,
        };
        let mut monitor = HealthMonitor::spawn(store, config, Vec::new).unwrap();
        let started = std::time::Instant::now();
        monitor.stop();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
