//! Hardware session - the rig's controller, motor and indicator handles

use crate::command::RigHandles;
use crate::hub::{Indicator, Motor, RigController};
use std::sync::Arc;

/// The physical rig as far as the bridge knows it
///
/// Handles are filled in monotonically during start-up and only cleared on
/// shutdown. The session is ready when all three are present.
#[derive(Clone, Default)]
pub struct HardwareSession {
    controller: Option<Arc<dyn RigController>>,
    motor: Option<Arc<dyn Motor>>,
    indicator: Option<Arc<dyn Indicator>>,
}

impl HardwareSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.controller.is_some() && self.motor.is_some() && self.indicator.is_some()
    }

    /// Capability handles for a routine, once ready
    pub fn handles(&self) -> Option<RigHandles> {
        Some(RigHandles {
            motor: self.motor.clone()?,
            indicator: self.indicator.clone()?,
            controller: self.controller.clone()?,
        })
    }

    pub fn controller(&self) -> Option<&Arc<dyn RigController>> {
        self.controller.as_ref()
    }

    pub fn bind_controller(&mut self, controller: Arc<dyn RigController>) {
        self.controller = Some(controller);
    }

    pub fn bind_motor(&mut self, motor: Arc<dyn Motor>) {
        self.motor = Some(motor);
    }

    pub fn bind_indicator(&mut self, indicator: Arc<dyn Indicator>) {
        self.indicator = Some(indicator);
    }

    /// Drop every handle
    pub fn clear(&mut self) {
        self.controller = None;
        self.motor = None;
        self.indicator = None;
    }
}
