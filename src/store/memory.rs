use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use super::{
    sort_by_signal, Device, DevicePatch, DeviceStatus, DeviceStore, MessageStats, MessageStatus,
    MessageStore, MessageType, StoreResult, TextMessage,
};
use crate::{error::StoreError, utils::now_millis};

/// Device records kept in registration order.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<Vec<Device>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Device> {
        self.devices.read().clone()
    }

    fn filtered(&self, keep: impl Fn(&Device) -> bool) -> Vec<Device> {
        self.devices
            .read()
            .iter()
            .filter(|d| keep(d))
            .cloned()
            .collect()
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn create(&self, device: Device) -> StoreResult<()> {
        let mut devices = self.devices.write();
        if devices.iter().any(|d| d.serial_port == device.serial_port) {
            return Err(StoreError::DuplicateSerialPort(device.serial_port));
        }
        devices.push(device);
        Ok(())
    }

    fn save(&self, device: &Device) -> StoreResult<()> {
        let mut devices = self.devices.write();
        if devices
            .iter()
            .any(|d| d.id != device.id && d.serial_port == device.serial_port)
        {
            return Err(StoreError::DuplicateSerialPort(device.serial_port.clone()));
        }
        let slot = devices
            .iter_mut()
            .find(|d| d.id == device.id)
            .ok_or_else(|| StoreError::NotFound(device.id.clone()))?;
        *slot = device.clone();
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<Device>> {
        Ok(self.devices.read().iter().find(|d| d.id == id).cloned())
    }

    fn find_by_serial_port(&self, serial_port: &str) -> StoreResult<Option<Device>> {
        Ok(self
            .devices
            .read()
            .iter()
            .find(|d| d.serial_port == serial_port)
            .cloned())
    }

    fn find_all(&self) -> StoreResult<Vec<Device>> {
        Ok(self.snapshot())
    }

    fn find_all_enabled(&self) -> StoreResult<Vec<Device>> {
        Ok(self.filtered(|d| d.enabled))
    }

    fn find_all_online(&self) -> StoreResult<Vec<Device>> {
        let mut online = self.filtered(Device::is_available);
        sort_by_signal(&mut online);
        Ok(online)
    }

    fn update_columns(&self, id: &str, patch: &DevicePatch) -> StoreResult<()> {
        let mut devices = self.devices.write();
        if let Some(port) = &patch.serial_port {
            if devices.iter().any(|d| d.id != id && &d.serial_port == port) {
                return Err(StoreError::DuplicateSerialPort(port.clone()));
            }
        }
        let device = devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(device);
        device.updated_at = now_millis();
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|d| d.id != id);
        if devices.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn groups(&self) -> StoreResult<Vec<String>> {
        let groups: BTreeSet<String> = self
            .devices
            .read()
            .iter()
            .filter(|d| !d.group_name.is_empty())
            .map(|d| d.group_name.clone())
            .collect();
        Ok(groups.into_iter().collect())
    }

    fn count_by_status(&self) -> StoreResult<HashMap<DeviceStatus, usize>> {
        let mut counts = HashMap::new();
        for d in self.devices.read().iter() {
            *counts.entry(d.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<TextMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn save(&self, message: TextMessage) -> StoreResult<()> {
        let mut messages = self.messages.write();
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => messages.push(message),
        }
        Ok(())
    }

    fn update_status(&self, id: &str, status: MessageStatus) -> StoreResult<()> {
        let mut messages = self.messages.write();
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        message.status = status;
        message.updated_at = now_millis();
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<TextMessage>> {
        Ok(self.messages.read().iter().find(|m| m.id == id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<TextMessage>> {
        let mut all = self.messages.read().clone();
        all.reverse();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    fn stats(&self) -> StoreResult<MessageStats> {
        let messages = self.messages.read();
        let incoming = messages
            .iter()
            .filter(|m| m.kind == MessageType::Incoming)
            .count();
        Ok(MessageStats {
            total_count: messages.len(),
            incoming_count: incoming,
            outgoing_count: messages.len() - incoming,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, port: &str, signal: i32, status: DeviceStatus) -> Device {
        Device {
            id: id.into(),
            serial_port: port.into(),
            signal_level: signal,
            status,
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_serial_port_is_rejected() {
        let store = MemoryDeviceStore::new();
        store
            .create(device("a", "/dev/ttyUSB0", 0, DeviceStatus::Offline))
            .unwrap();
        let err = store
            .create(device("b", "/dev/ttyUSB0", 0, DeviceStatus::Offline))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSerialPort(_)));
    }

    #[test]
    fn online_set_is_signal_sorted_and_skips_disabled() {
        let mut disabled = device("d", "/dev/ttyUSB3", 99, DeviceStatus::Online);
        disabled.enabled = false;
        let store = MemoryDeviceStore::with_devices(vec![
            device("a", "/dev/ttyUSB0", 10, DeviceStatus::Online),
            device("b", "/dev/ttyUSB1", 30, DeviceStatus::Online),
            device("c", "/dev/ttyUSB2", 20, DeviceStatus::Offline),
            disabled,
        ]);
        let ids: Vec<_> = store
            .find_all_online()
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn groups_are_distinct_and_sorted() {
        let mut a = device("a", "/dev/ttyUSB0", 0, DeviceStatus::Offline);
        a.group_name = "hk".into();
        let mut b = device("b", "/dev/ttyUSB1", 0, DeviceStatus::Offline);
        b.group_name = "cn".into();
        let mut c = device("c", "/dev/ttyUSB2", 0, DeviceStatus::Offline);
        c.group_name = "hk".into();
        let d = device("d", "/dev/ttyUSB3", 0, DeviceStatus::Offline);
        let store = MemoryDeviceStore::with_devices(vec![a, b, c, d]);
        assert_eq!(store.groups().unwrap(), vec!["cn", "hk"]);
    }

    #[test]
    fn count_by_status() {
        let store = MemoryDeviceStore::with_devices(vec![
            device("a", "/dev/ttyUSB0", 0, DeviceStatus::Online),
            device("b", "/dev/ttyUSB1", 0, DeviceStatus::Online),
            device("c", "/dev/ttyUSB2", 0, DeviceStatus::Error),
        ]);
        let counts = store.count_by_status().unwrap();
        assert_eq!(counts.get(&DeviceStatus::Online), Some(&2));
        assert_eq!(counts.get(&DeviceStatus::Error), Some(&1));
        assert_eq!(counts.get(&DeviceStatus::Offline), None);
    }

    #[test]
    fn update_missing_message_is_not_found() {
        let store = MemoryMessageStore::new();
        let err = store.update_status("nope", MessageStatus::Sent).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
