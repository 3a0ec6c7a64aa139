//! Hub lifecycle: discovery, port binding, start-up and shutdown
//!
//! This module handles:
//! - Scanning for the first compatible hub and connecting to it
//! - Binding the motor and indicator ports
//! - The start-up acceleration that makes the dispatcher live
//! - Disconnecting transport and hub on shutdown

mod manager;
mod session;

pub use manager::{HubEvent, Lifecycle, LifecycleOutcome, StartupPlan};
pub use session::HardwareSession;
