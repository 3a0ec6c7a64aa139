//! Hardware trait abstraction for the Powered UP rig

use anyhow::Result;
use async_trait::async_trait;
use signal_bridge_shared::HubPort;
use std::sync::Arc;
use std::time::Duration;

/// A motor bound to a hub port
#[async_trait]
pub trait Motor: Send + Sync {
    /// Set power in -100..=100; completes when the hub acknowledges it
    async fn set_power(&self, power: i8) -> Result<()>;

    /// Step power from `from` to `to` over `duration`
    async fn ramp_power(&self, from: i8, to: i8, duration: Duration) -> Result<()>;

    /// Bring the motor to a full stop
    async fn brake(&self) -> Result<()>;
}

/// An indicator light bound to a hub port
#[async_trait]
pub trait Indicator: Send + Sync {
    /// Set brightness in 0..=100
    async fn set_brightness(&self, level: u8) -> Result<()>;
}

/// A discovered hub (the controller of the rig)
#[async_trait]
pub trait RigController: Send + Sync {
    /// Advertised hub name
    fn name(&self) -> &str;

    /// Perform the connection handshake
    async fn connect(&self) -> Result<()>;

    /// Drop the connection
    async fn disconnect(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    /// True while `connect` is underway
    fn is_connecting(&self) -> bool;

    /// Wait until a device is attached at `port` and bind it as a motor
    async fn wait_for_motor(&self, port: HubPort) -> Result<Arc<dyn Motor>>;

    /// Wait until a device is attached at `port` and bind it as an indicator
    async fn wait_for_indicator(&self, port: HubPort) -> Result<Arc<dyn Indicator>>;

    /// Pause the calling routine
    async fn sleep(&self, duration: Duration);
}

/// Hub discovery
#[async_trait]
pub trait RigScanner: Send + Sync {
    /// Scan until the first compatible hub shows up, then stop scanning
    async fn scan_first(&self) -> Result<Arc<dyn RigController>>;
}
