use anyhow::{Context, Result};

use smshub::cli;

fn main() -> Result<()> {
    env_logger::init();
    let matches = cli::parse_args();

    if matches.get_flag("list-ports") {
        return cli::list_ports(matches.get_flag("json"));
    }

    let config = cli::load_config(&matches)?;
    let registry = cli::build_registry(&config)?;

    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    registry.start().context("Failed to start device registry")?;
    log::info!(
        "smshub running with {} managed device(s), press Ctrl-C to stop",
        registry.managed_count()
    );

    let _ = stop_rx.recv();
    log::info!("Shutting down");
    registry.stop();
    Ok(())
}
