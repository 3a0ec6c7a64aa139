//! Traffic light routines

use super::pull_away;
use crate::command::actions::{ActionRoutine, RigHandles};
use anyhow::Result;
use async_trait::async_trait;
use signal_bridge_shared::{timing, TrafficSign};
use std::time::Duration;

/// Stop immediately
pub struct RedLight;

#[async_trait]
impl ActionRoutine for RedLight {
    fn sign(&self) -> TrafficSign {
        TrafficSign::RedTrafficLight
    }

    async fn run(&self, rig: &RigHandles) -> Result<()> {
        rig.motor.brake().await
    }
}

/// Blink the indicator, then pull away
pub struct GreenLight {
    pub max_power: i8,
}

#[async_trait]
impl ActionRoutine for GreenLight {
    fn sign(&self) -> TrafficSign {
        TrafficSign::GreenTrafficLight
    }

    async fn run(&self, rig: &RigHandles) -> Result<()> {
        let interval = Duration::from_millis(timing::BLINK_INTERVAL_MS);
        for _ in 0..timing::BLINK_COUNT {
            rig.indicator.set_brightness(timing::BRIGHTNESS_FULL).await?;
            rig.controller.sleep(interval).await;
            rig.indicator.set_brightness(0).await?;
            rig.controller.sleep(interval).await;
        }
        pull_away(rig.motor.as_ref(), self.max_power).await
    }
}
