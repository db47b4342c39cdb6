//! Scripted modem transport shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use smshub::{
    core::{
        ConnectionOptions, ConnectionState, DeviceRegistry, HealthConfig, NewDevice,
        RegistryConfig,
    },
    protocol::{frame::unwrap_command, PortOpener, SerialConfig, SplitPort},
    store::{DeviceStore, LogNotifier, MemoryDeviceStore, MemoryMessageStore},
};

/// One simulated modem. Bytes pushed here are read by the hub; bytes the hub
/// writes are captured.
#[derive(Default)]
pub struct FakeModem {
    inbound: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
    broken: AtomicBool,
    read_delay_ms: AtomicU64,
}

/// Largest slice a single `write` call accepts, so one frame takes several
/// calls and unserialized writers would interleave.
const WRITE_CHUNK: usize = 7;

impl FakeModem {
    pub fn push_raw(&self, line: &str) {
        let mut inbound = self.inbound.lock();
        inbound.extend(line.as_bytes());
        inbound.extend(b"\r\n");
    }

    pub fn push_frame(&self, json: Value) {
        self.push_raw(&format!("SMS_START:{json}:SMS_END"));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every idle read blocks this long before timing out.
    pub fn slow_reads(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Raw text of everything the hub has written.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }

    /// Make the next read fail with a non-timeout error.
    pub fn break_link(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Every command frame the hub has written, decoded.
    pub fn commands(&self) -> Vec<Value> {
        let written = self.written.lock();
        String::from_utf8_lossy(&written)
            .split('\n')
            .filter_map(unwrap_command)
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter_map(|c| c["action"].as_str().map(str::to_string))
            .collect()
    }
}

struct FakeReader {
    modem: Arc<FakeModem>,
}

struct FakeWriter {
    modem: Arc<FakeModem>,
}

impl Read for FakeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.modem.broken.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link lost"));
        }
        let mut inbound = self.modem.inbound.lock();
        if inbound.is_empty() {
            drop(inbound);
            let delay = self.modem.read_delay_ms.load(Ordering::SeqCst).max(5);
            thread::sleep(Duration::from_millis(delay));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.modem.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write refused"));
        }
        let n = buf.len().min(WRITE_CHUNK);
        self.modem.written.lock().extend_from_slice(&buf[..n]);
        thread::yield_now();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out fake port halves keyed by port path and counts opens.
#[derive(Default)]
pub struct FakeOpener {
    modems: Mutex<HashMap<String, Arc<FakeModem>>>,
    missing: Mutex<HashSet<String>>,
    opens: Mutex<HashMap<String, usize>>,
    total_opens: AtomicUsize,
}

impl FakeOpener {
    pub fn modem(&self, port: &str) -> Arc<FakeModem> {
        Arc::clone(self.modems.lock().entry(port.to_string()).or_default())
    }

    /// Opening `port` fails until `restore` is called.
    pub fn unplug(&self, port: &str) {
        self.missing.lock().insert(port.to_string());
    }

    pub fn restore(&self, port: &str) {
        self.missing.lock().remove(port);
    }

    pub fn opens(&self, port: &str) -> usize {
        self.opens.lock().get(port).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }
}

impl PortOpener for FakeOpener {
    fn open(&self, port: &str, _config: &SerialConfig) -> io::Result<SplitPort> {
        if self.missing.lock().contains(port) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such port"));
        }
        *self.opens.lock().entry(port.to_string()).or_insert(0) += 1;
        self.total_opens.fetch_add(1, Ordering::SeqCst);
        let modem = self.modem(port);
        Ok(SplitPort {
            reader: Box::new(FakeReader {
                modem: Arc::clone(&modem),
            }),
            writer: Box::new(FakeWriter { modem }),
        })
    }
}

pub struct Hub {
    pub registry: DeviceRegistry,
    pub store: Arc<MemoryDeviceStore>,
    pub messages: Arc<MemoryMessageStore>,
    pub opener: Arc<FakeOpener>,
}

pub fn test_config() -> RegistryConfig {
    RegistryConfig {
        connection: ConnectionOptions {
            serial: SerialConfig::default(),
            reconnect_backoff: Duration::from_millis(50),
            status_ttl: Duration::from_secs(60),
        },
        health: HealthConfig::default(),
    }
}

pub fn hub_with(config: RegistryConfig) -> Hub {
    let store = Arc::new(MemoryDeviceStore::new());
    let messages = Arc::new(MemoryMessageStore::new());
    let opener = Arc::new(FakeOpener::default());
    let registry = DeviceRegistry::new(
        store.clone(),
        messages.clone(),
        Arc::new(LogNotifier),
        opener.clone(),
        config,
    );
    Hub {
        registry,
        store,
        messages,
        opener,
    }
}

pub fn hub() -> Hub {
    hub_with(test_config())
}

pub fn new_device(name: &str, port: &str, enabled: bool) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        serial_port: port.to_string(),
        enabled,
        ..Default::default()
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub fn wait_connected(hub: &Hub, id: &str) -> bool {
    wait_until(Duration::from_secs(5), || {
        hub.registry
            .device_status(id)
            .map(|s| s.state == ConnectionState::Connected)
            .unwrap_or(false)
    })
}

pub fn device_of(hub: &Hub, id: &str) -> smshub::store::Device {
    hub.store.find_by_id(id).unwrap().unwrap()
}
