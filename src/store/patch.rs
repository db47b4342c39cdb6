//! Selective column updates for device records.
//!
//! `None` leaves the column untouched; `Some` overwrites it, including
//! with an empty string or zero.

use super::{Device, DeviceStatus};
use crate::protocol::message::StatusSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub serial_port: Option<String>,
    pub enabled: Option<bool>,
    pub group_name: Option<String>,
    pub status: Option<DeviceStatus>,
    pub phone_number: Option<String>,
    pub imsi: Option<String>,
    pub iccid: Option<String>,
    pub operator: Option<String>,
    pub sim_operator: Option<String>,
    pub signal_level: Option<i32>,
    pub flymode: Option<bool>,
    pub last_seen_at: Option<i64>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl DevicePatch {
    /// Patch produced by a connection's status callback.
    ///
    /// A heartbeat (`None`) only refreshes liveness. A full snapshot also
    /// refreshes signal and flight mode, and fills identity fields when the
    /// firmware reported them. Blank values never erase stored ones, so a
    /// manually entered phone number survives a SIM that does not report it.
    pub fn from_status(status: Option<&StatusSnapshot>, now: i64) -> Self {
        let mut patch = DevicePatch {
            status: Some(DeviceStatus::Online),
            last_seen_at: Some(now),
            ..Default::default()
        };
        let Some(s) = status else {
            return patch;
        };
        patch.phone_number = non_empty(&s.mobile.number);
        patch.imsi = non_empty(&s.mobile.imsi);
        patch.iccid = non_empty(&s.mobile.iccid);
        patch.operator = non_empty(&s.mobile.operator);
        patch.sim_operator = non_empty(&s.mobile.sim_operator);
        patch.signal_level = Some(s.mobile.signal_level);
        patch.flymode = Some(s.flymode);
        patch
    }

    /// Patch applied by the health sweep to a stale device.
    pub fn offline() -> Self {
        DevicePatch {
            status: Some(DeviceStatus::Offline),
            signal_level: Some(0),
            operator: Some(String::new()),
            ..Default::default()
        }
    }

    pub fn apply(&self, device: &mut Device) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = &self.$field {
                    device.$field = v.clone();
                })*
            };
        }
        set!(
            name,
            serial_port,
            enabled,
            group_name,
            status,
            phone_number,
            imsi,
            iccid,
            operator,
            sim_operator,
            signal_level,
            flymode,
            last_seen_at
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::MobileStatus;

    fn stored() -> Device {
        Device {
            id: "d1".into(),
            phone_number: "+8613800000000".into(),
            imsi: "460011234567890".into(),
            operator: "China Unicom".into(),
            signal_level: 17,
            ..Default::default()
        }
    }

    #[test]
    fn heartbeat_touches_only_liveness() {
        let mut device = stored();
        DevicePatch::from_status(None, 42).apply(&mut device);
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.last_seen_at, 42);
        assert_eq!(device.signal_level, 17);
        assert_eq!(device.operator, "China Unicom");
        assert_eq!(device.phone_number, "+8613800000000");
    }

    #[test]
    fn blank_identity_fields_do_not_overwrite() {
        let snapshot = StatusSnapshot {
            flymode: true,
            mobile: MobileStatus {
                signal_level: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut device = stored();
        DevicePatch::from_status(Some(&snapshot), 7).apply(&mut device);
        assert_eq!(device.phone_number, "+8613800000000");
        assert_eq!(device.imsi, "460011234567890");
        assert_eq!(device.operator, "China Unicom");
        assert_eq!(device.signal_level, 3);
        assert!(device.flymode);
    }

    #[test]
    fn zero_signal_is_still_applied() {
        let snapshot = StatusSnapshot::default();
        let patch = DevicePatch::from_status(Some(&snapshot), 1);
        assert_eq!(patch.signal_level, Some(0));
        assert_eq!(patch.flymode, Some(false));
    }

    #[test]
    fn offline_patch_clears_signal_and_operator() {
        let mut device = stored();
        DevicePatch::offline().apply(&mut device);
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(device.signal_level, 0);
        assert_eq!(device.operator, "");
        assert_eq!(device.imsi, "460011234567890");
    }
}
