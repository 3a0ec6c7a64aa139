//! Bluetooth LE discovery of Powered UP hubs

use crate::hub::poweredup::{PoweredUpHub, HUB_SERVICE_UUID, LEGO_MANUFACTURER_ID};
use crate::hub::traits::{RigController, RigScanner};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, Device};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for hub discovery
#[derive(Debug, Clone, Default)]
pub struct HubScanConfig {
    /// Only accept this hub address, if set
    pub address: Option<Address>,
    /// Only accept hubs whose advertised name starts with this prefix, if set
    pub name_prefix: Option<String>,
}

/// Scans the default adapter for LEGO hubs
pub struct HubScanner {
    config: HubScanConfig,
}

impl HubScanner {
    pub fn new(config: HubScanConfig) -> Self {
        Self { config }
    }

    /// Get the default Bluetooth adapter, powered on
    pub async fn get_adapter() -> Result<Adapter> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(adapter)
    }

    /// Check if a device advertises itself as a compatible hub
    async fn is_compatible_hub(&self, device: &Device) -> bool {
        if let Some(address) = self.config.address {
            if device.address() != address {
                return false;
            }
        }

        if let Some(ref prefix) = self.config.name_prefix {
            match device.name().await {
                Ok(Some(name)) if name.starts_with(prefix) => {}
                _ => return false,
            }
        }

        if let Ok(Some(data)) = device.manufacturer_data().await {
            if data.contains_key(&LEGO_MANUFACTURER_ID) {
                return true;
            }
        }

        matches!(device.uuids().await, Ok(Some(uuids)) if uuids.contains(&HUB_SERVICE_UUID))
    }
}

#[async_trait]
impl RigScanner for HubScanner {
    async fn scan_first(&self) -> Result<Arc<dyn RigController>> {
        let adapter = Self::get_adapter().await?;
        info!("[HUB] Scanning for Powered UP hubs on {}", adapter.name());

        // Discovery runs for as long as the stream is alive
        let discover = adapter.discover_devices().await?;
        tokio::pin!(discover);

        while let Some(evt) = discover.next().await {
            let AdapterEvent::DeviceAdded(addr) = evt else {
                continue;
            };

            let device = match adapter.device(addr) {
                Ok(device) => device,
                Err(e) => {
                    debug!("[HUB] Ignoring {}: {}", addr, e);
                    continue;
                }
            };

            if !self.is_compatible_hub(&device).await {
                continue;
            }

            let name = device
                .name()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| addr.to_string());
            info!("[HUB] Discovered {} ({})", name, addr);

            // Dropping the stream on return stops the scan
            return Ok(Arc::new(PoweredUpHub::new(device, name)));
        }

        Err(anyhow!("Bluetooth discovery ended without finding a hub"))
    }
}
