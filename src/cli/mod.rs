pub mod config;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::{path::PathBuf, sync::Arc};

use crate::{
    core::DeviceRegistry,
    protocol::{tty, SerialPortOpener},
    store::{
        DeviceStore, JsonFileDeviceStore, LogNotifier, MemoryDeviceStore, MemoryMessageStore,
    },
};
pub use config::HubConfig;

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    Command::new("smshub")
        .about("Multi-modem SMS hub")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path to the TOML configuration file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .short('l')
                .help("List serial ports that look like modems and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .help("Output one-shot results in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches()
}

pub fn load_config(matches: &ArgMatches) -> Result<HubConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => HubConfig::from_file(path),
        None => {
            log::info!("No --config given, using defaults");
            Ok(HubConfig::default())
        }
    }
}

/// Print discovered modem ports, one per line or as a JSON array.
pub fn list_ports(json: bool) -> Result<()> {
    let ports = tty::discover_modem_ports();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).context("Failed to serialize port list")?
        );
    } else if ports.is_empty() {
        println!("No modem ports found");
    } else {
        for port in ports {
            println!("{port}");
        }
    }
    Ok(())
}

/// Build a registry over real serial ports and register configured devices
/// that the store does not know yet.
pub fn build_registry(config: &HubConfig) -> Result<DeviceRegistry> {
    let store: Arc<dyn DeviceStore> = match &config.store.devices_file {
        Some(path) => Arc::new(
            JsonFileDeviceStore::open(path)
                .with_context(|| format!("Failed to open device store {path:?}"))?,
        ),
        None => Arc::new(MemoryDeviceStore::new()),
    };

    let seeds: Vec<_> = config
        .devices
        .iter()
        .filter(|seed| {
            matches!(store.find_by_serial_port(seed.serial_port.trim()), Ok(None))
        })
        .cloned()
        .collect();

    let registry = DeviceRegistry::new(
        store,
        Arc::new(MemoryMessageStore::new()),
        Arc::new(LogNotifier),
        Arc::new(SerialPortOpener),
        config.registry_config(),
    );
    for seed in seeds {
        let port = seed.serial_port.clone();
        registry
            .create_device(seed)
            .with_context(|| format!("Failed to register device on {port}"))?;
    }
    Ok(registry)
}
