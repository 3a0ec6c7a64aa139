//! Powered UP hub driver over Bluetooth LE GATT
//!
//! The hub exposes a single LWP3 characteristic. Writes carry port output
//! commands; notifications carry attached I/O events and output feedback,
//! which are fanned out to waiters through watch and broadcast channels.

use crate::hub::ramp::step_ramp;
use crate::hub::traits::{Indicator, Motor, RigController};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Device, Uuid};
use futures::StreamExt;
use signal_bridge_shared::codec::{
    self, io_type, AttachedIoEvent, FeedbackFlags, HubMessage, OutputCommand, POWER_BRAKE,
};
use signal_bridge_shared::HubPort;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// LEGO company identifier in BLE manufacturer data
pub const LEGO_MANUFACTURER_ID: u16 = 0x0397;

/// LWP3 hub service
pub const HUB_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001623_1212_efde_1623_785feabcd123);

/// LWP3 hub characteristic
pub const HUB_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00001624_1212_efde_1623_785feabcd123);

/// Poll interval while waiting for GATT services to resolve
const SERVICES_POLL: Duration = Duration::from_millis(100);

/// An open LWP3 link to a connected hub
struct HubLink {
    characteristic: Characteristic,
    /// Devices currently attached, by port
    attached: watch::Sender<HashMap<HubPort, u16>>,
    feedback: broadcast::Sender<(HubPort, FeedbackFlags)>,
    notify_task: JoinHandle<()>,
}

impl HubLink {
    /// Write an output command and wait for the hub to settle it
    async fn write_output(&self, port: HubPort, command: OutputCommand) -> Result<()> {
        // Subscribe before writing so the feedback cannot be missed
        let mut feedback = self.feedback.subscribe();

        let bytes = codec::encode_output(port, command);
        self.characteristic
            .write(&bytes)
            .await
            .with_context(|| format!("Output command {:?} on port {} failed", command, port))?;

        loop {
            match feedback.recv().await {
                Ok((p, flags)) if p == port && flags.is_settled() => {
                    if flags.is_discarded() {
                        debug!("[HUB] Port {} discarded {:?}", port, command);
                    }
                    return Ok(());
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("[HUB] Feedback receiver lagged by {}", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("Hub link closed while waiting for port {}", port));
                }
            }
        }
    }

    /// Wait until a device is attached at `port`, returning its I/O type
    async fn wait_for_device(&self, port: HubPort) -> Result<u16> {
        let mut rx = self.attached.subscribe();
        let attached = rx
            .wait_for(|devices| devices.contains_key(&port))
            .await
            .map_err(|_| anyhow!("Hub link closed while waiting for port {}", port))?;
        let io_type = attached.get(&port).copied();
        io_type.ok_or_else(|| anyhow!("Port {} detached while binding", port))
    }
}

impl Drop for HubLink {
    fn drop(&mut self) {
        self.notify_task.abort();
    }
}

/// Route decoded notifications to the link's channels
fn handle_notification(
    value: &[u8],
    attached: &watch::Sender<HashMap<HubPort, u16>>,
    feedback: &broadcast::Sender<(HubPort, FeedbackFlags)>,
) {
    let messages = match codec::decode_all(value) {
        Ok(messages) => messages,
        Err(e) => {
            warn!("[HUB] Undecodable notification {:02x?}: {}", value, e);
            return;
        }
    };

    for message in messages {
        match message {
            HubMessage::AttachedIo { port, event } => match event {
                AttachedIoEvent::Attached { io_type: kind }
                | AttachedIoEvent::AttachedVirtual { io_type: kind } => {
                    debug!("[HUB] Device 0x{:04x} attached at port {}", kind, port);
                    attached.send_modify(|devices| {
                        devices.insert(port, kind);
                    });
                }
                AttachedIoEvent::Detached => {
                    warn!("[HUB] Device detached from port {}", port);
                    attached.send_modify(|devices| {
                        devices.remove(&port);
                    });
                }
            },
            HubMessage::PortFeedback(entries) => {
                for entry in entries {
                    // No receivers just means nobody is waiting
                    let _ = feedback.send(entry);
                }
            }
            HubMessage::GenericError {
                command_type,
                error_code,
            } => {
                warn!(
                    "[HUB] Hub reported error 0x{:02x} for command 0x{:02x}",
                    error_code, command_type
                );
            }
            HubMessage::Other { message_type } => {
                debug!("[HUB] Ignoring message type 0x{:02x}", message_type);
            }
        }
    }
}

/// A Powered UP hub reachable over BLE
pub struct PoweredUpHub {
    device: Device,
    name: String,
    connecting: AtomicBool,
    link: RwLock<Option<Arc<HubLink>>>,
}

impl PoweredUpHub {
    pub fn new(device: Device, name: String) -> Self {
        Self {
            device,
            name,
            connecting: AtomicBool::new(false),
            link: RwLock::new(None),
        }
    }

    async fn link(&self) -> Result<Arc<HubLink>> {
        self.link
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("Hub {} is not connected", self.name))
    }

    /// Find the LWP3 characteristic once GATT services are resolved
    async fn find_characteristic(&self) -> Result<Characteristic> {
        while !self.device.is_services_resolved().await? {
            tokio::time::sleep(SERVICES_POLL).await;
        }

        for service in self.device.services().await? {
            if service.uuid().await? != HUB_SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == HUB_CHARACTERISTIC_UUID {
                    return Ok(characteristic);
                }
            }
        }

        Err(anyhow!("Hub {} has no LWP3 characteristic", self.name))
    }

    async fn open_link(&self) -> Result<HubLink> {
        self.device
            .connect()
            .await
            .with_context(|| format!("BLE connect to {} failed", self.name))?;

        let characteristic = self.find_characteristic().await?;
        let notifications = characteristic.notify().await?;

        let (attached, _) = watch::channel(HashMap::new());
        let (feedback, _) = broadcast::channel(64);

        let attached_tx = attached.clone();
        let feedback_tx = feedback.clone();
        let name = self.name.clone();
        let notify_task = tokio::spawn(async move {
            tokio::pin!(notifications);
            while let Some(value) = notifications.next().await {
                handle_notification(&value, &attached_tx, &feedback_tx);
            }
            info!("[HUB] Notification stream from {} ended", name);
        });

        Ok(HubLink {
            characteristic,
            attached,
            feedback,
            notify_task,
        })
    }
}

#[async_trait]
impl RigController for PoweredUpHub {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        self.connecting.store(true, Ordering::SeqCst);
        let result = self.open_link().await;
        self.connecting.store(false, Ordering::SeqCst);

        *self.link.write().await = Some(Arc::new(result?));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.link.write().await.take();
        self.device.disconnect().await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await.unwrap_or(false)
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    async fn wait_for_motor(&self, port: HubPort) -> Result<Arc<dyn Motor>> {
        let link = self.link().await?;
        let kind = link.wait_for_device(port).await?;
        if !io_type::is_motor(kind) {
            warn!("[HUB] Device 0x{:04x} at port {} is not a known motor", kind, port);
        }
        Ok(Arc::new(PortMotor { link, port }))
    }

    async fn wait_for_indicator(&self, port: HubPort) -> Result<Arc<dyn Indicator>> {
        let link = self.link().await?;
        let kind = link.wait_for_device(port).await?;
        if !io_type::is_light(kind) {
            warn!("[HUB] Device 0x{:04x} at port {} is not a known light", kind, port);
        }
        Ok(Arc::new(PortLight { link, port }))
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Motor on a hub port
struct PortMotor {
    link: Arc<HubLink>,
    port: HubPort,
}

#[async_trait]
impl Motor for PortMotor {
    async fn set_power(&self, power: i8) -> Result<()> {
        self.link
            .write_output(self.port, OutputCommand::StartPower(power.clamp(-100, 100)))
            .await
    }

    async fn ramp_power(&self, from: i8, to: i8, duration: Duration) -> Result<()> {
        step_ramp(self, from, to, duration).await
    }

    async fn brake(&self) -> Result<()> {
        self.link
            .write_output(self.port, OutputCommand::StartPower(POWER_BRAKE))
            .await
    }
}

/// Light on a hub port
struct PortLight {
    link: Arc<HubLink>,
    port: HubPort,
}

#[async_trait]
impl Indicator for PortLight {
    async fn set_brightness(&self, level: u8) -> Result<()> {
        self.link
            .write_output(self.port, OutputCommand::SetBrightness(level))
            .await
    }
}
