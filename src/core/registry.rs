//! Owner of every running modem connection.
//!
//! The device map is the only structure shared across workers. It is locked
//! just long enough to snapshot, insert or remove entries; device I/O and
//! store writes always happen after the guard is released.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

use super::{
    connection::{
        ConnectionContext, ConnectionOptions, ConnectionState, ModemConnection, StatusCallback,
        TaskStatusUpdater,
    },
    health::{HealthConfig, HealthMonitor},
    selection::{SendStrategy, Selector},
};
use crate::{
    error::{HubError, HubResult},
    protocol::{message::StatusSnapshot, runtime::PortOpener, tty},
    store::{Device, DevicePatch, DeviceStatus, DeviceStore, MessageStore, Notifier},
    utils::now_millis,
};

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub connection: ConnectionOptions,
    pub health: HealthConfig,
}

/// Fields accepted when registering a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewDevice {
    pub name: String,
    pub serial_port: String,
    pub enabled: bool,
    pub group_name: String,
    pub phone_number: String,
}

/// User-editable fields. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub serial_port: Option<String>,
    pub enabled: Option<bool>,
    pub group_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSendRequest {
    pub recipients: Vec<String>,
    pub content: String,
    /// Send every recipient through this device instead of selecting.
    pub device_id: Option<String>,
    pub strategy: SendStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSendResult {
    pub recipient: String,
    pub message_id: String,
    pub device_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
}

/// Live view of one managed device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRuntimeStatus {
    pub device_id: String,
    pub state: ConnectionState,
    pub flymode: bool,
    pub status: StatusSnapshot,
}

struct ManagedConnection {
    device: Device,
    connection: ModemConnection,
}

type DeviceMap = Arc<RwLock<HashMap<String, Arc<ManagedConnection>>>>;

pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    ctx: ConnectionContext,
    config: RegistryConfig,
    devices: DeviceMap,
    selector: Selector,
    health: Mutex<Option<HealthMonitor>>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("managed", &self.managed_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Persist every status callback from one connection onto its device record.
fn status_writer(store: Arc<dyn DeviceStore>, device_id: String) -> StatusCallback {
    Arc::new(move |status: Option<&StatusSnapshot>| {
        let patch = DevicePatch::from_status(status, now_millis());
        if let Err(err) = store.update_columns(&device_id, &patch) {
            log::warn!("Failed to record status for device {device_id}: {err}");
        }
    })
}

impl DeviceRegistry {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        messages: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
        opener: Arc<dyn PortOpener>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            ctx: ConnectionContext {
                messages,
                notifier,
                opener,
                task_updater: Arc::new(RwLock::new(None)),
            },
            config,
            devices: Arc::new(RwLock::new(HashMap::new())),
            selector: Selector::new(),
            health: Mutex::new(None),
        }
    }

    /// Start every enabled device that is not already running, then the
    /// health ticker. A device that fails to start is logged and skipped.
    pub fn start(&self) -> HubResult<()> {
        let devices = self.store.find_all_enabled()?;
        for device in &devices {
            if self.is_managed(&device.id) {
                continue;
            }
            if let Err(err) = self.start_device(device) {
                log::warn!(
                    "Failed to start device {} ({}): {err}",
                    device.name,
                    device.serial_port
                );
            }
        }

        let mut health = self.health.lock();
        if health.is_none() {
            let map = Arc::clone(&self.devices);
            *health = Some(HealthMonitor::spawn(
                Arc::clone(&self.store),
                self.config.health.clone(),
                move || map.read().keys().cloned().collect(),
            )?);
        }
        log::info!(
            "Device registry started, {} of {} enabled device(s) running",
            self.managed_count(),
            devices.len()
        );
        Ok(())
    }

    /// Stop the health ticker and wait for it, then tear down every
    /// connection. Safe to call more than once.
    pub fn stop(&self) {
        let monitor = self.health.lock().take();
        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
        let drained: Vec<_> = self.devices.write().drain().map(|(_, m)| m).collect();
        let count = drained.len();
        for managed in drained {
            managed.connection.stop();
        }
        if count > 0 {
            log::info!("Device registry stopped {count} connection(s)");
        }
    }

    fn start_device(&self, device: &Device) -> HubResult<()> {
        if device.serial_port.is_empty() {
            return Err(HubError::InvalidDevice(format!(
                "device {} has no serial port",
                device.id
            )));
        }
        {
            let map = self.devices.read();
            if map.contains_key(&device.id) {
                return Err(HubError::AlreadyRunning(device.id.clone()));
            }
            if map
                .values()
                .any(|m| m.device.serial_port == device.serial_port)
            {
                return Err(HubError::SerialPortInUse(device.serial_port.clone()));
            }
        }

        let connection = ModemConnection::start(
            device,
            self.config.connection.clone(),
            self.ctx.clone(),
            Some(status_writer(Arc::clone(&self.store), device.id.clone())),
        )?;

        let mut map = self.devices.write();
        if map.contains_key(&device.id) {
            drop(map);
            connection.stop();
            return Err(HubError::AlreadyRunning(device.id.clone()));
        }
        map.insert(
            device.id.clone(),
            Arc::new(ManagedConnection {
                device: device.clone(),
                connection,
            }),
        );
        drop(map);
        log::info!("Started device {} on {}", device.name, device.serial_port);
        Ok(())
    }

    /// Returns whether a connection was running.
    fn stop_device(&self, id: &str) -> bool {
        let removed = self.devices.write().remove(id);
        match removed {
            Some(managed) => {
                managed.connection.stop();
                log::info!("Stopped device {} ({})", managed.device.name, id);
                true
            }
            None => false,
        }
    }

    fn managed(&self, id: &str) -> HubResult<Arc<ManagedConnection>> {
        self.devices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::DeviceNotOnline(id.to_string()))
    }

    fn load(&self, id: &str) -> HubResult<Device> {
        self.store
            .find_by_id(id)?
            .ok_or_else(|| HubError::DeviceNotFound(id.to_string()))
    }

    pub fn create_device(&self, new: NewDevice) -> HubResult<Device> {
        let serial_port = new.serial_port.trim().to_string();
        if serial_port.is_empty() {
            return Err(HubError::InvalidDevice("serial port is required".into()));
        }
        if self.store.find_by_serial_port(&serial_port)?.is_some() {
            return Err(HubError::SerialPortInUse(serial_port));
        }

        let now = now_millis();
        let device = Device {
            id: uuid::Uuid::new_v4().to_string(),
            name: if new.name.is_empty() {
                serial_port.clone()
            } else {
                new.name
            },
            serial_port,
            status: DeviceStatus::Offline,
            phone_number: new.phone_number,
            enabled: new.enabled,
            group_name: new.group_name,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        self.store.create(device.clone())?;
        log::info!("Created device {} on {}", device.name, device.serial_port);

        if device.enabled {
            if let Err(err) = self.start_device(&device) {
                log::warn!("Device {} created but failed to start: {err}", device.id);
            }
        }
        Ok(device)
    }

    /// Apply user edits. The connection is restarted only when the serial
    /// port or the enabled flag actually changed.
    pub fn update_device(&self, id: &str, update: DeviceUpdate) -> HubResult<Device> {
        let existing = self.load(id)?;
        let mut device = existing.clone();
        if let Some(name) = update.name {
            device.name = name;
        }
        if let Some(port) = update.serial_port {
            let port = port.trim().to_string();
            if port.is_empty() {
                return Err(HubError::InvalidDevice("serial port is required".into()));
            }
            device.serial_port = port;
        }
        if let Some(enabled) = update.enabled {
            device.enabled = enabled;
        }
        if let Some(group) = update.group_name {
            device.group_name = group;
        }
        if let Some(phone) = update.phone_number {
            device.phone_number = phone;
        }
        device.updated_at = now_millis();

        if device.serial_port != existing.serial_port {
            if let Some(other) = self.store.find_by_serial_port(&device.serial_port)? {
                if other.id != device.id {
                    return Err(HubError::SerialPortInUse(device.serial_port));
                }
            }
        }
        self.store.save(&device)?;

        let restart =
            device.serial_port != existing.serial_port || device.enabled != existing.enabled;
        if restart {
            self.stop_device(id);
            if device.enabled {
                if let Err(err) = self.start_device(&device) {
                    log::warn!("Device {id} updated but failed to restart: {err}");
                }
            }
        }
        Ok(device)
    }

    pub fn delete_device(&self, id: &str) -> HubResult<()> {
        self.stop_device(id);
        self.store.delete(id)?;
        log::info!("Deleted device {id}");
        Ok(())
    }

    pub fn enable_device(&self, id: &str) -> HubResult<()> {
        let device = self.load(id)?;
        if device.enabled && self.devices.read().contains_key(id) {
            return Ok(());
        }
        let patch = DevicePatch {
            enabled: Some(true),
            ..Default::default()
        };
        self.store.update_columns(id, &patch)?;
        let device = self.load(id)?;
        self.start_device(&device)
    }

    /// Stop the connection if one is running, then persist the flag and
    /// offline status. No status callback can run after the stop returns.
    pub fn disable_device(&self, id: &str) -> HubResult<()> {
        self.load(id)?;
        self.stop_device(id);
        let patch = DevicePatch {
            enabled: Some(false),
            status: Some(DeviceStatus::Offline),
            ..Default::default()
        };
        self.store.update_columns(id, &patch)?;
        Ok(())
    }

    pub fn set_device_flymode(&self, id: &str, enabled: bool) -> HubResult<()> {
        self.managed(id)?.connection.set_flymode(enabled)
    }

    pub fn reboot_device(&self, id: &str) -> HubResult<()> {
        self.managed(id)?.connection.reboot_mcu()
    }

    /// Ask a device for a fresh status frame.
    pub fn refresh_device_status(&self, id: &str) -> HubResult<()> {
        self.managed(id)?.connection.query_status()
    }

    /// Cached status of a running device. Never touches the port.
    pub fn device_status(&self, id: &str) -> HubResult<DeviceRuntimeStatus> {
        let managed = self.managed(id)?;
        let conn = &managed.connection;
        Ok(DeviceRuntimeStatus {
            device_id: id.to_string(),
            state: conn.state(),
            flymode: conn.flymode(),
            status: conn.status(),
        })
    }

    pub fn all_devices(&self) -> HubResult<Vec<Device>> {
        Ok(self.store.find_all()?)
    }

    pub fn device(&self, id: &str) -> HubResult<Device> {
        self.load(id)
    }

    pub fn device_groups(&self) -> HubResult<Vec<String>> {
        Ok(self.store.groups()?)
    }

    pub fn device_stats(&self) -> HubResult<DeviceStats> {
        let counts = self.store.count_by_status()?;
        let get = |s: DeviceStatus| counts.get(&s).copied().unwrap_or(0);
        Ok(DeviceStats {
            total: counts.values().sum(),
            online: get(DeviceStatus::Online),
            offline: get(DeviceStatus::Offline),
            error: get(DeviceStatus::Error),
        })
    }

    /// Serial ports that look like attached modems.
    pub fn discover_serial_ports(&self) -> Vec<String> {
        tty::discover_modem_ports()
    }

    /// Number of devices with a running connection.
    pub fn managed_count(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_managed(&self, id: &str) -> bool {
        self.devices.read().contains_key(id)
    }

    /// Register the hook that receives `(msg_id, success)` for each SMS send
    /// result. Applies to running connections as well.
    pub fn set_task_status_updater(&self, updater: TaskStatusUpdater) {
        *self.ctx.task_updater.write() = Some(updater);
    }

    pub fn send_sms_by_device(&self, device_id: &str, to: &str, content: &str) -> HubResult<String> {
        self.managed(device_id)?.connection.send_sms(to, content)
    }

    /// Pick a device by `strategy` and send through it. Returns the message
    /// id and the chosen device id.
    pub fn send_sms(
        &self,
        to: &str,
        content: &str,
        strategy: SendStrategy,
    ) -> HubResult<(String, String)> {
        let device = self.selector.select(self.store.as_ref(), strategy)?;
        let msg_id = self.send_sms_by_device(&device.id, to, content)?;
        Ok((msg_id, device.id))
    }

    /// Send to every recipient in order. Each outcome is independent.
    pub fn batch_send(&self, request: &BatchSendRequest) -> Vec<BatchSendResult> {
        let explicit = request.device_id.as_deref().filter(|id| !id.is_empty());
        request
            .recipients
            .iter()
            .map(|recipient| {
                let outcome = match explicit {
                    Some(id) => self
                        .send_sms_by_device(id, recipient, &request.content)
                        .map(|msg_id| (msg_id, id.to_string())),
                    None => self.send_sms(recipient, &request.content, request.strategy),
                };
                match outcome {
                    Ok((message_id, device_id)) => BatchSendResult {
                        recipient: recipient.clone(),
                        message_id,
                        device_id,
                        success: true,
                        error: None,
                    },
                    Err(err) => {
                        log::warn!("Batch send to {recipient} failed: {err}");
                        BatchSendResult {
                            recipient: recipient.clone(),
                            message_id: String::new(),
                            device_id: String::new(),
                            success: false,
                            error: Some(err.to_string()),
                        }
                    }
                }
            })
            .collect()
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}
