//! Pedestrian crossing routine

use crate::command::actions::{ActionRoutine, RigHandles};
use anyhow::Result;
use async_trait::async_trait;
use signal_bridge_shared::{timing, TrafficSign};
use std::time::Duration;

/// Slow down to a stop in front of the crossing
pub struct PedestrianCrossing {
    pub max_power: i8,
}

#[async_trait]
impl ActionRoutine for PedestrianCrossing {
    fn sign(&self) -> TrafficSign {
        TrafficSign::PedestrianCrossingAhead
    }

    async fn run(&self, rig: &RigHandles) -> Result<()> {
        rig.motor
            .ramp_power(
                self.max_power,
                0,
                Duration::from_millis(timing::PEDESTRIAN_RAMP_MS),
            )
            .await?;
        rig.motor.brake().await
    }
}
