//! Connect to the nearest health device and print its readings
//!
//! Run with: cargo run --example measure

use healthmate_ble::{DeviceManager, Error, Result, SessionState, Unit};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let manager = DeviceManager::new().await?;
    manager.start_scanning().await?;

    println!("Looking for devices...\n");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let device = manager
        .known_devices()
        .await?
        .into_iter()
        .next()
        .or_else(|| manager.nearest_device())
        .ok_or(Error::UnknownDevice)?;
    manager.stop_scanning().await?;

    println!("Connecting to {}...", device.display_name());
    let session = manager.connect(&device).await?;
    let observer = session.observer();

    let _state_handle = observer.on_state_changed(|state| println!("State: {}", state));
    let _reading_handle = observer.on_reading(|reading| {
        println!("\n=== {} ===", reading.kind());
        for (label, value) in reading.iter() {
            println!("  {:<18} {}", label, value);
        }
        if let Some(celsius) = reading.temperature_in(Unit::Celsius) {
            println!("  {:<18} {:.1} °C", "Normalised", celsius);
        }
    });

    // Wait for classification before reading the generic characteristics
    let mut state = observer.watch_state();
    let ready = matches!(
        tokio::time::timeout(
            session.config().connect_timeout,
            state.wait_for(|s| s.is_ready()),
        )
        .await,
        Ok(Ok(_))
    );
    if !ready {
        println!("Device did not become ready");
        manager.shutdown().await?;
        return Ok(());
    }

    match session.read_device_information().await {
        Ok(info) => println!("Device: {}", info),
        Err(e) => println!("Device information unavailable: {}", e),
    }

    println!("Take a measurement. Press Ctrl+C to exit.\n");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Disconnected {
                    println!("Device disconnected");
                    break;
                }
            }
        }
    }

    manager.shutdown().await?;
    Ok(())
}
