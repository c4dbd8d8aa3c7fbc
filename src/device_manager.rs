//! Device manager for listing health devices and opening sessions to them.
//!
//! This module owns the host adapter: it lists devices that pass the
//! configured name filter and creates one [`GattSession`] per connected
//! device.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::ble::btleplug_transport::BtleplugTransport;
use crate::ble::permission::{AlwaysGranted, PermissionGate};
use crate::ble::scanner::{BleScanner, DiscoveredDevice};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::GattSession;
use crate::state::CallbackHandle;

/// Session type produced by the manager.
pub type BtleplugSession = GattSession<BtleplugTransport>;

/// Central manager for health devices on the host adapter.
pub struct DeviceManager {
    /// BLE scanner.
    scanner: Arc<BleScanner>,
    /// Configuration handed to every session.
    config: SessionConfig,
    /// Permission source handed to every session.
    permission: Arc<dyn PermissionGate>,
    /// Open sessions by device identifier.
    sessions: Arc<RwLock<HashMap<String, Arc<BtleplugSession>>>>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl DeviceManager {
    /// Create a manager with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default(), Arc::new(AlwaysGranted)).await
    }

    /// Create a manager with a configuration and permission source.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn with_config(
        config: SessionConfig,
        permission: Arc<dyn PermissionGate>,
    ) -> Result<Self> {
        let scanner = BleScanner::new(config.device_name_filter.clone()).await?;

        Ok(Self {
            scanner: Arc::new(scanner),
            config,
            permission,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // === Listing ===

    /// List devices the adapter already knows about.
    pub async fn known_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        self.scanner.known_devices().await
    }

    /// Start scanning for devices.
    pub async fn start_scanning(&self) -> Result<()> {
        self.scanner.start_scanning().await
    }

    /// Stop scanning for devices.
    pub async fn stop_scanning(&self) -> Result<()> {
        self.scanner.stop_scanning().await
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Get devices heard while scanning, strongest signal first.
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        let mut devices: Vec<_> = self.scanner.discovered_devices().into_values().collect();
        devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
        devices
    }

    /// Get the nearest device by signal strength.
    pub fn nearest_device(&self) -> Option<DiscoveredDevice> {
        self.discovered_devices().into_iter().next()
    }

    /// Subscribe to discovery events.
    pub fn subscribe_device_discovered(&self) -> broadcast::Receiver<DiscoveredDevice> {
        self.scanner.subscribe()
    }

    /// Register a callback for when devices are discovered or updated.
    pub fn on_device_discovered<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DiscoveredDevice) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.scanner.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(device) => callback(device),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    // === Sessions ===

    /// Get the session for a device, creating it if needed.
    pub fn session(&self, device: &DiscoveredDevice) -> Arc<BtleplugSession> {
        if let Some(session) = self.sessions.read().get(&device.identifier) {
            return session.clone();
        }

        let transport = BtleplugTransport::new(
            self.scanner.adapter().clone(),
            self.config.event_capacity,
        );
        let session = GattSession::new(transport, self.permission.clone(), self.config.clone());

        info!("Opened session for {}", device.display_name());

        self.sessions
            .write()
            .entry(device.identifier.clone())
            .or_insert(session)
            .clone()
    }

    /// Open a session to a device and start connecting.
    pub async fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<BtleplugSession>> {
        let session = self.session(device);
        session.connect(&device.peripheral).await?;
        Ok(session)
    }

    /// Get all open sessions.
    pub fn sessions(&self) -> HashMap<String, Arc<BtleplugSession>> {
        self.sessions.read().clone()
    }

    /// Clean shutdown of all sessions and scanning.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down device manager");

        self.stop_scanning().await?;

        let sessions: Vec<_> = self.sessions.write().drain().collect();
        for (identifier, session) in sessions {
            if let Err(e) = session.disconnect().await {
                warn!("Error disconnecting {}: {}", identifier, e);
            }
        }

        Ok(())
    }
}
