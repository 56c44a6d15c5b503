use hidhub::{logger, DeviceFilter, HidManager, ManagerConfig};
use std::time::Duration;

/// Usage: `monitor [config.toml]`
#[tokio::main]
async fn main() {
    if let Err(e) = logger::init_logging("info") {
        eprintln!("{e}");
    }

    let config = match std::env::args().nth(1) {
        Some(path) => ManagerConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("{path}: {e}; using defaults");
            ManagerConfig::default()
        }),
        // Generic Desktop / Gamepad
        None => ManagerConfig::default().with_filters(vec![DeviceFilter::usage(0x01, 0x05)]),
    };

    let manager = HidManager::new(config.with_auto_request(true)).await;
    logger::log_connections(&manager);

    let Some(device) = manager.devices().into_iter().next() else {
        eprintln!("No matching device could be opened");
        return;
    };
    manager.on_input_report(&device, |data, report_id, dev, _| {
        println!("{}: id={:?} {:02x?}", dev.id(), report_id, data.as_bytes());
    });
    // Also traced at debug level under RUST_LOG=hidhub=debug.
    logger::log_input_reports(&manager, &device);

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
