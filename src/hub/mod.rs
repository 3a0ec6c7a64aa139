//! Powered UP hardware: discovery, the BLE hub driver and its trait seam

pub mod discovery;
#[cfg(test)]
pub mod mock;
pub mod poweredup;
pub mod ramp;
pub mod traits;

pub use discovery::{HubScanConfig, HubScanner};
pub use traits::{Indicator, Motor, RigController, RigScanner};
