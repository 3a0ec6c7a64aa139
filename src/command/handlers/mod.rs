//! Actuation routines for each traffic sign

mod pedestrian;
mod signals_ahead;
mod speed_limit;
mod traffic_light;

pub use pedestrian::PedestrianCrossing;
pub use signals_ahead::SignalsAhead;
pub use speed_limit::SpeedLimit;
pub use traffic_light::{GreenLight, RedLight};

use crate::hub::Motor;
use anyhow::Result;
use signal_bridge_shared::timing;
use std::time::Duration;

/// Pull away: ramp from a third of `max_power` to `max_power`
///
/// Shared by the green light and the start-up sequence.
pub async fn pull_away(motor: &dyn Motor, max_power: i8) -> Result<()> {
    motor
        .ramp_power(
            max_power / 3,
            max_power,
            Duration::from_millis(timing::ACCELERATION_RAMP_MS),
        )
        .await
}
