//! Message types exchanged with the modem firmware.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Every `type` discriminator the firmware is known to send.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    #[strum(to_string = "status_response", serialize = "status")]
    Status,
    Heartbeat,
    SystemReady,
    CellularControlResponse,
    PhoneNumberResponse,
    CommandResponse,
    SimEvent,
    Warning,
    Error,
    IncomingSms,
    IncomingCall,
    SmsSendResult,
}

/// Commands written to the modem, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    GetStatus,
    SendSms {
        to: String,
        content: String,
        msg_id: String,
    },
    /// `enabled` carries the hardware value, which is the inverse of the
    /// flight-mode state the hub exposes.
    SetFlymode { enabled: bool },
    RebootMcu,
}

/// `mobile` block of a status frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileStatus {
    pub is_registered: bool,
    pub is_roaming: bool,
    pub iccid: String,
    pub signal_desc: String,
    pub signal_level: i32,
    pub sim_ready: bool,
    pub rssi: i32,
    /// 0..=31
    pub csq: i32,
    /// dBm, -44..=-140
    pub rsrp: i32,
    /// dB, -3..=-19.5
    pub rsrq: f64,
    pub imsi: String,
    pub number: String,
    /// Live network operator name
    pub operator: String,
    /// SIM home operator name
    pub sim_operator: String,
    /// Live network PLMN as reported by the firmware
    pub mnc: String,
    pub lac: i64,
    pub cid: i64,
    /// Module uptime in seconds
    pub uptime: i64,
    /// Raw hardware flag. Inverted relative to the hub's flight-mode state.
    pub flymode: bool,
}

/// Decoded status frame, cached per connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    /// Hub-side flight-mode state (already inverted from the hardware flag).
    pub flymode: bool,
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Firmware script version
    pub version: String,
    pub iccid: String,
    pub mobile: MobileStatus,
    pub timestamp: i64,
    pub mem_kb: i64,
    pub port_name: String,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct IncomingSms {
    #[serde(alias = "sender", alias = "phone")]
    pub from: String,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct IncomingCall {
    #[serde(alias = "number", alias = "caller")]
    pub from: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SmsSendResult {
    #[serde(alias = "msgId", alias = "id")]
    pub msg_id: String,
    pub success: bool,
    pub error: Option<String>,
}
