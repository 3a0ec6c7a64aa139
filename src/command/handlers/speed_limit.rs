//! Speed limit routines

use crate::command::actions::{ActionRoutine, RigHandles};
use anyhow::Result;
use async_trait::async_trait;
use signal_bridge_shared::TrafficSign;

/// Set the motor to a fixed power
pub struct SpeedLimit {
    sign: TrafficSign,
    power: i8,
}

impl SpeedLimit {
    /// 30 zone: half of the reference power
    pub fn limit_30(max_power: i8) -> Self {
        Self {
            sign: TrafficSign::SpeedLimit30,
            power: max_power / 2,
        }
    }

    /// 50 zone: the reference power
    pub fn limit_50(max_power: i8) -> Self {
        Self {
            sign: TrafficSign::SpeedLimit50,
            power: max_power,
        }
    }
}

#[async_trait]
impl ActionRoutine for SpeedLimit {
    fn sign(&self) -> TrafficSign {
        self.sign
    }

    async fn run(&self, rig: &RigHandles) -> Result<()> {
        rig.motor.set_power(self.power).await
    }
}
