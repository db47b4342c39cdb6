//! Persistence and notification collaborators
//!
//! The hub core only talks to these through narrow traits:
//! - `DeviceStore` for device records (unique serial port per device)
//! - `MessageStore` for inbound/outbound SMS records
//! - `Notifier` for inbound SMS/call fan-out
//!
//! In-process implementations live in the submodules; a deployment can plug
//! in its own backend by implementing the traits.

pub mod json_file;
pub mod memory;
pub mod notify;
pub mod patch;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

use crate::error::StoreError;

pub use json_file::JsonFileDeviceStore;
pub use memory::{MemoryDeviceStore, MemoryMessageStore};
pub use notify::LogNotifier;
pub use patch::DevicePatch;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceStatus {
    /// Heartbeats arriving within the liveness timeout
    Online,
    /// Heartbeat stale or never seen
    #[default]
    Offline,
    /// Serial port failure
    Error,
}

/// Persistent modem record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub serial_port: String,
    pub status: DeviceStatus,
    pub phone_number: String,
    pub imsi: String,
    pub iccid: String,
    /// Live network operator name
    pub operator: String,
    /// Operator the SIM belongs to, derived from the IMSI
    pub sim_operator: String,
    pub signal_level: i32,
    pub flymode: bool,
    pub enabled: bool,
    pub group_name: String,
    pub last_seen_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Device {
    pub fn is_available(&self) -> bool {
        self.enabled && self.status == DeviceStatus::Online
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    Received,
    Sending,
    Sent,
    Failed,
}

/// SMS record, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub status: MessageStatus,
    pub device_id: String,
    pub device_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Aggregate message counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total_count: usize,
    pub incoming_count: usize,
    pub outgoing_count: usize,
}

pub trait DeviceStore: Send + Sync {
    /// Insert a new record. Fails on a duplicate serial port.
    fn create(&self, device: Device) -> StoreResult<()>;
    /// Overwrite an existing record.
    fn save(&self, device: &Device) -> StoreResult<()>;
    fn find_by_id(&self, id: &str) -> StoreResult<Option<Device>>;
    fn find_by_serial_port(&self, serial_port: &str) -> StoreResult<Option<Device>>;
    /// All records, in registration order.
    fn find_all(&self) -> StoreResult<Vec<Device>>;
    fn find_all_enabled(&self) -> StoreResult<Vec<Device>>;
    /// Enabled and online records, strongest signal first. Ties keep
    /// registration order.
    fn find_all_online(&self) -> StoreResult<Vec<Device>>;
    /// Apply only the columns set in `patch`.
    fn update_columns(&self, id: &str, patch: &DevicePatch) -> StoreResult<()>;
    fn delete(&self, id: &str) -> StoreResult<()>;
    /// Distinct non-empty group labels, sorted.
    fn groups(&self) -> StoreResult<Vec<String>>;
    fn count_by_status(&self) -> StoreResult<HashMap<DeviceStatus, usize>>;
}

pub trait MessageStore: Send + Sync {
    fn save(&self, message: TextMessage) -> StoreResult<()>;
    fn update_status(&self, id: &str, status: MessageStatus) -> StoreResult<()>;
    fn find_by_id(&self, id: &str) -> StoreResult<Option<TextMessage>>;
    /// Newest first.
    fn list(&self) -> StoreResult<Vec<TextMessage>>;
    fn stats(&self) -> StoreResult<MessageStats>;
}

/// Event handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    IncomingSms {
        device_id: String,
        device_name: String,
        from: String,
        content: String,
        received_at: i64,
    },
    IncomingCall {
        device_id: String,
        device_name: String,
        from: String,
        received_at: i64,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotificationEvent);
}

pub(crate) fn sort_by_signal(devices: &mut [Device]) {
    devices.sort_by(|a, b| b.signal_level.cmp(&a.signal_level));
}
