//! BLE scanning functionality.
//!
//! Lists health devices on the host adapter, both ones the adapter already
//! knows about and ones heard while scanning.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::config::name_matches;
use crate::data::DeviceKind;
use crate::error::{Error, Result};

/// A device seen on the adapter.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// The BLE peripheral identifier.
    pub identifier: String,
    /// The peripheral handle.
    pub peripheral: Peripheral,
    /// Advertised local name.
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
}

impl DiscoveredDevice {
    /// Classify from advertised services.
    ///
    /// Many devices advertise only a subset of their services, so a
    /// connection may still classify differently.
    pub fn advertised_kind(&self) -> DeviceKind {
        DeviceKind::classify(&self.services)
    }

    /// Name to show for the device.
    pub fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.identifier)
    }
}

/// BLE scanner for health devices.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Name fragment a device must contain, if any.
    name_filter: Option<String>,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Discovered devices.
    discovered: Arc<RwLock<HashMap<String, DiscoveredDevice>>>,
    /// Channel for discovery events.
    event_tx: broadcast::Sender<DiscoveredDevice>,
    /// Handle to the scanning task.
    scan_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl BleScanner {
    /// Create a scanner on the first adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(name_filter: Option<String>) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter, name_filter))
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter, name_filter: Option<String>) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            adapter,
            name_filter,
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// List devices the adapter already knows, filtered by name.
    ///
    /// Unlike [`start_scanning`](Self::start_scanning) this does not wait for
    /// advertisements; on BlueZ it includes bonded devices.
    pub async fn known_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        let mut devices = Vec::new();
        for peripheral in peripherals {
            if let Some(device) = Self::describe(peripheral, self.name_filter.as_deref()).await {
                devices.push(device);
            }
        }

        debug!("{} known devices match the filter", devices.len());
        Ok(devices)
    }

    /// Start scanning for devices.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan (filter: {:?})", self.name_filter);

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;

        let adapter = self.adapter.clone();
        let name_filter = self.name_filter.clone();
        let is_scanning = self.is_scanning.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while *is_scanning.read() {
                tokio::select! {
                    Some(event) = events.next() => {
                        if let Some(id) = Self::peripheral_of(event) {
                            Self::process_peripheral(
                                &adapter,
                                id,
                                name_filter.as_deref(),
                                &discovered,
                                &event_tx,
                            ).await;
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !*is_scanning.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop scanning.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let handle = self.scan_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Get all devices heard while scanning.
    pub fn discovered_devices(&self) -> HashMap<String, DiscoveredDevice> {
        self.discovered.read().clone()
    }

    /// Subscribe to discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveredDevice> {
        self.event_tx.subscribe()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Peripheral an adapter event refers to, if it can carry new device data.
    fn peripheral_of(event: CentralEvent) -> Option<PeripheralId> {
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
            CentralEvent::DeviceDisconnected(id) => {
                trace!("Device disconnected: {:?}", id);
                None
            }
            _ => None,
        }
    }

    /// Read a peripheral's properties and apply the name filter.
    async fn describe(peripheral: Peripheral, name_filter: Option<&str>) -> Option<DiscoveredDevice> {
        let properties = peripheral.properties().await.ok().flatten()?;

        if !name_matches(name_filter, properties.local_name.as_deref()) {
            return None;
        }

        Some(DiscoveredDevice {
            identifier: peripheral.id().to_string(),
            local_name: properties.local_name,
            rssi: properties.rssi,
            services: properties.services,
            peripheral,
        })
    }

    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        name_filter: Option<&str>,
        discovered: &Arc<RwLock<HashMap<String, DiscoveredDevice>>>,
        event_tx: &broadcast::Sender<DiscoveredDevice>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let Some(device) = Self::describe(peripheral, name_filter).await else {
            return;
        };

        trace!("Device seen: {} ({})", device.display_name(), device.identifier);

        discovered
            .write()
            .insert(device.identifier.clone(), device.clone());

        let _ = event_tx.send(device);
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
    }
}
