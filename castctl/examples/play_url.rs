//! Discovers the first cast receiver on the network and plays a URL on it.
//!
//! Usage:
//!   cargo run --example play_url -- <media_url>

use std::env;
use std::time::Duration;

use castctl::{DeviceBrowser, LoadOptions, ScannerEvent};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "castctl=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <media_url>", args[0]);
        std::process::exit(1);
    }
    let url = args[1].clone();

    let mut browser = DeviceBrowser::new();
    let events = browser.subscribe();
    browser.start()?;

    println!("Waiting for a cast device...");
    let event = events.recv_timeout(Duration::from_secs(30))?;
    let ScannerEvent::DeviceFound(device) = event;
    browser.shutdown();

    println!("Playing on {}", device.info().friendly_name);
    device.connect()?;
    device.play(url.as_str(), &LoadOptions::default())?;
    println!("Player state: {:?}", device.get_status()?.player_state);

    std::thread::sleep(Duration::from_secs(10));
    println!("Current position: {:?}", device.current_time()?);

    device.close()?;
    Ok(())
}
