//! Watches the network for cast receivers and prints each one once.
//!
//! Usage:
//!   cargo run --example discover

use std::time::Duration;

use castctl::{DeviceBrowser, ScannerEvent};

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "castctl=info".into()),
        )
        .init();

    let mut browser = DeviceBrowser::new();
    let events = browser.subscribe();
    browser.start()?;

    println!("Searching for cast devices (30s)...");
    while let Ok(event) = events.recv_timeout(Duration::from_secs(30)) {
        let ScannerEvent::DeviceFound(device) = event;
        let info = device.info();
        println!("  {} ({}) at {}", info.friendly_name, info.name, info.host);
    }

    browser.shutdown();
    Ok(())
}
