// Platform-dispatched serial port discovery

#[cfg(unix)]
mod tty_unix;
#[cfg(unix)]
pub use tty_unix::{available_ports_sorted, is_modem_port};

#[cfg(not(unix))]
pub fn available_ports_sorted() -> Vec<serialport::SerialPortInfo> {
    serialport::available_ports().unwrap_or_default()
}

// Modems on other platforms enumerate as COM ports with no stable prefix.
#[cfg(not(unix))]
pub fn is_modem_port(_name: &str) -> bool {
    true
}

/// Port paths that look like attached modems.
pub fn discover_modem_ports() -> Vec<String> {
    available_ports_sorted()
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| is_modem_port(name))
        .collect()
}
