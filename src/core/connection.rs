//! One modem, one worker thread.
//!
//! The worker opens the serial port, keeps the read half to itself, reads
//! with a bounded timeout, splits the byte stream into lines and dispatches
//! decoded frames. Any transport failure drops the handles and the worker
//! retries after a backoff until it is told to stop.
//!
//! Commands are written from the caller's thread through the write half,
//! which has its own lock so frames never interleave. Phase, flight-mode
//! flag and status cache sit behind a separate lock that is never held
//! across port I/O.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    io::{Read, Write},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use strum::Display;

use super::{cache::TtlCell, handlers};
use crate::{
    error::{FrameError, HubError, HubResult},
    protocol::{
        frame::{build_command, is_valid_response, parse_frame},
        message::{Command, StatusSnapshot},
        runtime::{
            is_idle_error, LineAssembler, PortOpener, PortReader, PortWriter, SerialConfig,
            SplitPort,
        },
    },
    store::{Device, MessageStatus, MessageStore, MessageType, Notifier, TextMessage},
    utils::{now_millis, StopSignal},
};

/// Receives every decoded status frame, or `None` for a bare heartbeat.
pub type StatusCallback = Arc<dyn Fn(Option<&StatusSnapshot>) + Send + Sync>;

/// Receives `(msg_id, success)` for every SMS send result.
pub type TaskStatusUpdater = Arc<dyn Fn(&str, bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub serial: SerialConfig,
    pub reconnect_backoff: Duration,
    pub status_ttl: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            reconnect_backoff: Duration::from_secs(5),
            status_ttl: Duration::from_secs(300),
        }
    }
}

/// Collaborators every connection needs.
#[derive(Clone)]
pub struct ConnectionContext {
    pub messages: Arc<dyn MessageStore>,
    pub notifier: Arc<dyn Notifier>,
    pub opener: Arc<dyn PortOpener>,
    /// Shared with the registry so a hook registered later reaches running
    /// connections too.
    pub task_updater: Arc<RwLock<Option<TaskStatusUpdater>>>,
}

pub(crate) struct ConnState {
    pub phase: ConnectionState,
    pub flymode: bool,
    pub cache: TtlCell<StatusSnapshot>,
}

pub(crate) struct Shared {
    pub device_id: String,
    pub device_name: String,
    pub port_name: String,
    pub options: ConnectionOptions,
    pub ctx: ConnectionContext,
    pub on_status: Option<StatusCallback>,
    pub state: Mutex<ConnState>,
    /// Write half of the open port. Dropped on a failed write or on stop,
    /// which also tells the worker to reconnect or exit.
    pub writer: Mutex<Option<PortWriter>>,
    pub stop: StopSignal,
}

impl Shared {
    pub(crate) fn new(
        device: &Device,
        options: ConnectionOptions,
        ctx: ConnectionContext,
        on_status: Option<StatusCallback>,
    ) -> Self {
        let ttl = options.status_ttl;
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            port_name: device.serial_port.clone(),
            options,
            ctx,
            on_status,
            state: Mutex::new(ConnState {
                phase: ConnectionState::Disconnected,
                flymode: false,
                cache: TtlCell::new(ttl),
            }),
            writer: Mutex::new(None),
            stop: StopSignal::new(),
        }
    }

    fn set_phase(&self, phase: ConnectionState) {
        self.state.lock().phase = phase;
    }

    fn mark_disconnected(&self) {
        self.writer.lock().take();
        self.set_phase(ConnectionState::Disconnected);
    }

    /// Serialize and write one command frame.
    ///
    /// A failed write drops the handle so the worker reconnects.
    pub(crate) fn write_command(&self, command: &Command) -> HubResult<()> {
        let frame = build_command(command)?;
        let mut writer = self.writer.lock();
        let Some(port) = writer.as_mut() else {
            return Err(HubError::transport(&self.port_name, "not connected"));
        };
        let result = port.write_all(&frame.bytes).and_then(|_| port.flush());
        match result {
            Ok(()) => {
                log::debug!("[{}] -> {}", self.port_name, frame.json);
                Ok(())
            }
            Err(err) => {
                *writer = None;
                drop(writer);
                self.set_phase(ConnectionState::Disconnected);
                log::warn!("[{}] write failed: {err}", self.port_name);
                Err(HubError::transport(&self.port_name, err))
            }
        }
    }

    pub(crate) fn handle_line(&self, line: &str) {
        match parse_frame(line) {
            Ok(msg) => handlers::dispatch(self, &msg),
            Err(FrameError::NotAFrame) => {
                if is_valid_response(line) {
                    log::debug!("[{}] device output: {line}", self.port_name);
                } else {
                    log::trace!("[{}] noise: {line}", self.port_name);
                }
            }
            Err(err) => log::warn!("[{}] {err}: {line}", self.port_name),
        }
    }

    fn run(self: Arc<Self>) {
        let mut assembler = LineAssembler::new();
        while !self.stop.is_set() {
            self.set_phase(ConnectionState::Connecting);
            match self
                .ctx
                .opener
                .open(&self.port_name, &self.options.serial)
            {
                Ok(SplitPort { reader, writer }) => {
                    *self.writer.lock() = Some(writer);
                    self.set_phase(ConnectionState::Connected);
                    log::info!("[{}] connected ({})", self.port_name, self.device_name);
                    if let Err(err) = self.write_command(&Command::GetStatus) {
                        log::warn!("[{}] initial status query failed: {err}", self.port_name);
                    }
                    assembler.clear();
                    self.read_until_failure(reader, &mut assembler);
                }
                Err(err) => log::warn!("[{}] open failed: {err}", self.port_name),
            }
            self.mark_disconnected();
            if self.stop.wait(self.options.reconnect_backoff) {
                break;
            }
            log::debug!("[{}] reconnecting", self.port_name);
        }
        self.mark_disconnected();
        log::info!("[{}] connection worker stopped", self.port_name);
    }

    fn read_until_failure(&self, mut reader: PortReader, assembler: &mut LineAssembler) {
        let mut buf = [0u8; 1024];
        // the write half goes away on a failed write or on stop()
        while !self.stop.is_set() && self.writer.lock().is_some() {
            match reader.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    for line in assembler.push(&buf[..n]) {
                        self.handle_line(&line);
                    }
                }
                Err(err) if is_idle_error(&err) => {}
                Err(err) => {
                    log::warn!("[{}] read failed: {err}", self.port_name);
                    return;
                }
            }
        }
    }
}

/// Handle to a running modem connection. Dropping it stops the worker.
pub struct ModemConnection {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ModemConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemConnection")
            .field("device_id", &self.shared.device_id)
            .field("port", &self.shared.port_name)
            .field("state", &self.state())
            .finish()
    }
}

impl ModemConnection {
    /// Spawn the worker for `device`. Opening happens on the worker, so a
    /// missing port surfaces as reconnect attempts, not as an error here.
    pub fn start(
        device: &Device,
        options: ConnectionOptions,
        ctx: ConnectionContext,
        on_status: Option<StatusCallback>,
    ) -> HubResult<Self> {
        let shared = Arc::new(Shared::new(device, options, ctx, on_status));
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("modem-{}", device.id))
            .spawn(move || worker_shared.run())?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.shared.device_id
    }

    pub fn port_name(&self) -> &str {
        &self.shared.port_name
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Hub-side flight-mode flag as last reported by the device.
    pub fn flymode(&self) -> bool {
        self.shared.state.lock().flymode
    }

    /// Cached status, or a default snapshot once the cache has expired.
    /// `connected` and `port_name` always reflect the live transport.
    pub fn status(&self) -> StatusSnapshot {
        let st = self.shared.state.lock();
        let mut snapshot = st.cache.get().unwrap_or_default();
        snapshot.connected = st.phase == ConnectionState::Connected;
        snapshot.flymode = st.flymode;
        snapshot.port_name = self.shared.port_name.clone();
        snapshot
    }

    /// Record the outgoing message and hand it to the modem. The returned id
    /// is matched later by an `sms_send_result` frame.
    pub fn send_sms(&self, to: &str, content: &str) -> HubResult<String> {
        let msg_id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        self.shared.ctx.messages.save(TextMessage {
            id: msg_id.clone(),
            from: String::new(),
            to: to.to_string(),
            content: content.to_string(),
            kind: MessageType::Outgoing,
            status: MessageStatus::Sending,
            device_id: self.shared.device_id.clone(),
            device_name: self.shared.device_name.clone(),
            created_at: now,
            updated_at: now,
        })?;

        let command = Command::SendSms {
            to: to.to_string(),
            content: content.to_string(),
            msg_id: msg_id.clone(),
        };
        if let Err(err) = self.shared.write_command(&command) {
            if let Err(store_err) = self
                .shared
                .ctx
                .messages
                .update_status(&msg_id, MessageStatus::Failed)
            {
                log::warn!("Failed to mark message {msg_id} as failed: {store_err}");
            }
            return Err(err);
        }
        log::info!("[{}] SMS {msg_id} queued to {to}", self.shared.port_name);
        Ok(msg_id)
    }

    /// Request flight mode on or off. The local flag changes only when the
    /// next status frame confirms it.
    pub fn set_flymode(&self, enabled: bool) -> HubResult<()> {
        // Firmware contract: the hardware flag means "radio on", the inverse
        // of flight mode.
        self.shared
            .write_command(&Command::SetFlymode { enabled: !enabled })
    }

    /// Reboot the modem MCU. Flight mode is assumed off after a reboot.
    pub fn reboot_mcu(&self) -> HubResult<()> {
        self.shared.state.lock().flymode = false;
        self.shared.write_command(&Command::RebootMcu)
    }

    /// Ask the modem for a fresh status frame.
    pub fn query_status(&self) -> HubResult<()> {
        self.shared.write_command(&Command::GetStatus)
    }

    /// Stop the worker and close the port. Idempotent.
    pub fn stop(&self) {
        self.shared.stop.trigger();
        self.shared.writer.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                log::warn!("[{}] connection worker panicked", self.shared.port_name);
            }
        }
        self.shared.state.lock().phase = ConnectionState::Disconnected;
    }
}

impl Drop for ModemConnection {
    fn drop(&mut self) {
        self.stop();
    }
}
