//! File-backed device store.
//!
//! Records are held in memory and the whole set is rewritten as pretty JSON
//! after every mutation. Writes go to a sibling temp file first and are then
//! renamed over the target.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::{Device, DevicePatch, DeviceStatus, DeviceStore, MemoryDeviceStore, StoreResult};

pub struct JsonFileDeviceStore {
    path: PathBuf,
    inner: MemoryDeviceStore,
    // serializes file writes so snapshots land in mutation order
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for JsonFileDeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileDeviceStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonFileDeviceStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let devices: Vec<Device> = if path.exists() {
            let json = fs::read_to_string(&path)?;
            if json.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&json)?
            }
        } else {
            log::debug!("No device file at {path:?}, starting empty");
            Vec::new()
        };
        log::info!("Loaded {} device(s) from {path:?}", devices.len());
        Ok(Self {
            path,
            inner: MemoryDeviceStore::with_devices(devices),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let json = serde_json::to_string_pretty(&self.inner.snapshot())?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        log::debug!("Saved devices to {:?}", self.path);
        Ok(())
    }
}

impl DeviceStore for JsonFileDeviceStore {
    fn create(&self, device: Device) -> StoreResult<()> {
        self.inner.create(device)?;
        self.flush()
    }

    fn save(&self, device: &Device) -> StoreResult<()> {
        self.inner.save(device)?;
        self.flush()
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<Device>> {
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
        self.inner.update_columns(id, patch)?;
        self.flush()
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner.delete(id)?;
        self.flush()
    }

    fn groups(&self) -> StoreResult<Vec<String>> {
        self.inner.groups()
    }

    fn count_by_status(&self) -> StoreResult<HashMap<DeviceStatus, usize>> {
        self.inner.count_by_status()
    }
}
