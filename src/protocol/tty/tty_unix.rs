use serialport::SerialPortInfo;
use std::collections::HashSet;

/// Return the list of available serial ports sorted/deduped for Unix.
pub fn available_ports_sorted() -> Vec<SerialPortInfo> {
    let raw_ports = serialport::available_ports().unwrap_or_else(|err| {
        log::warn!("Serial port enumeration failed: {err}");
        Vec::new()
    });
    sort_and_dedup_ports(raw_ports)
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// USB serial adapters and CDC-ACM modems, the only kinds a modem shows up as.
pub fn is_modem_port(name: &str) -> bool {
    let base = basename(name);
    base.starts_with("ttyUSB") || base.starts_with("ttyACM")
}

pub(crate) fn sort_and_dedup_ports(raw_ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports: Vec<SerialPortInfo> = raw_ports
        .into_iter()
        .filter(|p| seen.insert(p.port_name.clone()))
        .collect();

    // USB first, then ACM, then everything else
    fn priority(name: &str) -> i32 {
        let base = basename(name);
        if base.starts_with("ttyUSB") {
            0
        } else if base.starts_with("ttyACM") {
            1
        } else {
            10
        }
    }

    ports.sort_by(|a, b| {
        priority(&a.port_name)
            .cmp(&priority(&b.port_name))
            .then_with(|| a.port_name.cmp(&b.port_name))
    });
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::SerialPortType;

    fn make(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::Unknown,
        }
    }

    #[test]
    fn usb_and_acm_sort_first_and_duplicates_drop() {
        let input = vec![
            make("/dev/ttyS0"),
            make("/dev/ttyACM0"),
            make("/dev/ttyUSB1"),
            make("/dev/ttyUSB0"),
            make("/dev/ttyUSB0"),
        ];
        let names: Vec<_> = sort_and_dedup_ports(input)
            .into_iter()
            .map(|p| p.port_name)
            .collect();
        assert_eq!(
            names,
            vec!["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyS0"]
        );
    }

    #[test]
    fn modem_port_filter() {
        assert!(is_modem_port("/dev/ttyUSB0"));
        assert!(is_modem_port("/dev/ttyACM12"));
        assert!(is_modem_port("ttyUSB3"));
        assert!(!is_modem_port("/dev/ttyS0"));
        assert!(!is_modem_port("/dev/usbttyUSB"));
    }
}
