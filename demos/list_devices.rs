//! List health devices known to the adapter and heard nearby
//!
//! Run with: cargo run --example list_devices

use healthmate_ble::{DeviceManager, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("healthmate_ble=info".parse().unwrap()),
        )
        .init();

    let manager = DeviceManager::new().await?;
    println!(
        "Name filter: {:?}\n",
        manager.config().device_name_filter.as_deref()
    );

    println!("Known devices:");
    for device in manager.known_devices().await? {
        println!(
            "  {} ({}) - advertises {}",
            device.display_name(),
            device.identifier,
            device.advertised_kind()
        );
    }

    let _handle = manager.on_device_discovered(|device| {
        println!(
            "Heard {} (RSSI: {:?} dBm)",
            device.display_name(),
            device.rssi
        );
    });

    manager.start_scanning().await?;
    println!("\nScanning for 10 seconds...\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
        }
    }

    println!("\n--- Scan Complete ---");
    for device in manager.discovered_devices() {
        println!(
            "  {} - {} (RSSI: {:?})",
            device.display_name(),
            device.advertised_kind(),
            device.rssi
        );
    }

    manager.shutdown().await?;
    Ok(())
}
