//! Per-message-type handlers for decoded frames.
//!
//! The table is keyed by `MessageKind` and built once. A discriminator that
//! does not parse into a known kind is logged and dropped.

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::HashMap, str::FromStr};

use super::connection::{ConnectionState, Shared};
use crate::{
    protocol::{
        frame::ParsedMessage,
        message::{IncomingCall, IncomingSms, MessageKind, SmsSendResult, StatusSnapshot},
        plmn,
    },
    store::{MessageStatus, MessageType, NotificationEvent, TextMessage},
    utils::now_millis,
};

type Handler = fn(&Shared, &ParsedMessage);

/// Content stored for an inbound call record.
pub const INCOMING_CALL_MARKER: &str = "[incoming call]";

static HANDLERS: Lazy<HashMap<MessageKind, Handler>> = Lazy::new(|| {
    let table: [(MessageKind, Handler); 12] = [
        (MessageKind::Status, on_status),
        (MessageKind::Heartbeat, on_heartbeat),
        (MessageKind::SystemReady, on_system_ready),
        (MessageKind::CellularControlResponse, on_cellular_control),
        (MessageKind::PhoneNumberResponse, on_phone_number),
        (MessageKind::CommandResponse, on_command_response),
        (MessageKind::SimEvent, on_sim_event),
        (MessageKind::Warning, on_warning),
        (MessageKind::Error, on_error),
        (MessageKind::IncomingSms, on_incoming_sms),
        (MessageKind::IncomingCall, on_incoming_call),
        (MessageKind::SmsSendResult, on_send_result),
    ];
    table.into_iter().collect()
});

pub(crate) fn dispatch(conn: &Shared, msg: &ParsedMessage) {
    let handler = MessageKind::from_str(&msg.msg_type)
        .ok()
        .and_then(|kind| HANDLERS.get(&kind));
    match handler {
        Some(handler) => handler(conn, msg),
        None => log::debug!(
            "[{}] unhandled message type {}: {}",
            conn.port_name,
            msg.msg_type,
            msg.json
        ),
    }
}

fn decode<T: DeserializeOwned>(conn: &Shared, msg: &ParsedMessage) -> Option<T> {
    match serde_json::from_value(Value::Object(msg.payload.clone())) {
        Ok(v) => Some(v),
        Err(err) => {
            log::warn!(
                "[{}] bad {} payload: {err} ({})",
                conn.port_name,
                msg.msg_type,
                msg.json
            );
            None
        }
    }
}

/// Turn a raw status frame into the hub's view of the device.
pub(crate) fn derive_status(mut snapshot: StatusSnapshot) -> StatusSnapshot {
    // Firmware contract: `mobile.flymode` is true while the radio is ON.
    // The hub's flight-mode flag is its inverse. Keep the negation.
    snapshot.flymode = !snapshot.mobile.flymode;
    snapshot.iccid = snapshot.mobile.iccid.clone();

    if let Some(sim) = plmn::sim_operator(&snapshot.mobile.imsi) {
        snapshot.mobile.sim_operator = sim;
    }
    snapshot.mobile.operator =
        plmn::network_operator(&snapshot.mobile.mnc, &snapshot.mobile.sim_operator);
    snapshot
}

fn on_status(conn: &Shared, msg: &ParsedMessage) {
    let Some(raw) = decode::<StatusSnapshot>(conn, msg) else {
        return;
    };
    let mut snapshot = derive_status(raw);
    snapshot.port_name = conn.port_name.clone();
    {
        let mut st = conn.state.lock();
        st.flymode = snapshot.flymode;
        snapshot.connected = st.phase == ConnectionState::Connected;
        st.cache.set(snapshot.clone());
    }
    log::debug!(
        "[{}] status: signal={} operator={} flymode={}",
        conn.port_name,
        snapshot.mobile.signal_level,
        snapshot.mobile.operator,
        snapshot.flymode
    );
    if let Some(callback) = &conn.on_status {
        callback(Some(&snapshot));
    }
}

fn on_heartbeat(conn: &Shared, msg: &ParsedMessage) {
    if let Some(callback) = &conn.on_status {
        callback(None);
    }
    log::debug!(
        "[{}] heartbeat ts={} mem={} buf={}",
        conn.port_name,
        msg.num_field("timestamp").unwrap_or_default() as i64,
        msg.num_field("memory_usage").unwrap_or_default(),
        msg.num_field("buffer_size").unwrap_or_default() as i64
    );
}

fn on_system_ready(conn: &Shared, msg: &ParsedMessage) {
    log::info!(
        "[{}] system ready: {}",
        conn.port_name,
        msg.str_field("message").unwrap_or_default()
    );
}

fn on_cellular_control(conn: &Shared, msg: &ParsedMessage) {
    log::debug!("[{}] cellular control response: {}", conn.port_name, msg.json);
}

fn on_phone_number(conn: &Shared, msg: &ParsedMessage) {
    log::debug!("[{}] phone number response: {}", conn.port_name, msg.json);
}

fn on_command_response(conn: &Shared, msg: &ParsedMessage) {
    if let Some(action) = msg.str_field("action") {
        log::info!(
            "[{}] command {action} -> {}",
            conn.port_name,
            msg.payload.get("result").unwrap_or(&Value::Null)
        );
    }
}

fn on_sim_event(conn: &Shared, msg: &ParsedMessage) {
    log::info!(
        "[{}] SIM event: {}",
        conn.port_name,
        msg.str_field("status").unwrap_or_default()
    );
}

fn on_warning(conn: &Shared, msg: &ParsedMessage) {
    if let Some(text) = msg.str_field("msg") {
        log::warn!("[{}] device warning: {text}", conn.port_name);
    }
}

fn on_error(conn: &Shared, msg: &ParsedMessage) {
    if let Some(text) = msg.str_field("msg") {
        log::error!("[{}] device error: {text}", conn.port_name);
    }
}

fn record_incoming(conn: &Shared, from: &str, content: &str, now: i64) {
    let record = TextMessage {
        id: uuid::Uuid::new_v4().to_string(),
        from: from.to_string(),
        to: String::new(),
        content: content.to_string(),
        kind: MessageType::Incoming,
        status: MessageStatus::Received,
        device_id: conn.device_id.clone(),
        device_name: conn.device_name.clone(),
        created_at: now,
        updated_at: now,
    };
    if let Err(err) = conn.ctx.messages.save(record) {
        log::warn!("[{}] failed to store incoming message: {err}", conn.port_name);
    }
}

fn on_incoming_sms(conn: &Shared, msg: &ParsedMessage) {
    let Some(sms) = decode::<IncomingSms>(conn, msg) else {
        return;
    };
    let now = now_millis();
    record_incoming(conn, &sms.from, &sms.content, now);
    conn.ctx.notifier.notify(&NotificationEvent::IncomingSms {
        device_id: conn.device_id.clone(),
        device_name: conn.device_name.clone(),
        from: sms.from,
        content: sms.content,
        received_at: now,
    });
}

fn on_incoming_call(conn: &Shared, msg: &ParsedMessage) {
    let Some(call) = decode::<IncomingCall>(conn, msg) else {
        return;
    };
    let now = now_millis();
    record_incoming(conn, &call.from, INCOMING_CALL_MARKER, now);
    conn.ctx.notifier.notify(&NotificationEvent::IncomingCall {
        device_id: conn.device_id.clone(),
        device_name: conn.device_name.clone(),
        from: call.from,
        received_at: now,
    });
}

fn on_send_result(conn: &Shared, msg: &ParsedMessage) {
    let Some(result) = decode::<SmsSendResult>(conn, msg) else {
        return;
    };
    if result.msg_id.is_empty() {
        log::warn!("[{}] send result without msg_id: {}", conn.port_name, msg.json);
        return;
    }
    let status = if result.success {
        MessageStatus::Sent
    } else {
        MessageStatus::Failed
    };
    match &result.error {
        Some(err) if !result.success => {
            log::warn!("[{}] SMS {} failed: {err}", conn.port_name, result.msg_id)
        }
        _ => log::info!("[{}] SMS {} -> {status}", conn.port_name, result.msg_id),
    }
    if let Err(err) = conn.ctx.messages.update_status(&result.msg_id, status) {
        log::warn!(
            "[{}] failed to update message {}: {err}",
            conn.port_name,
            result.msg_id
        );
    }
    let updater = conn.ctx.task_updater.read().clone();
    if let Some(updater) = updater {
        updater(&result.msg_id, result.success);
    }
}
