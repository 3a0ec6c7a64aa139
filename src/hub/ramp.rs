//! Stepped power ramps over any `Motor`

use crate::hub::traits::Motor;
use anyhow::Result;
use signal_bridge_shared::ramp::RampProfile;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Step `motor` from `from` to `to`, each write on a fixed deadline
///
/// Deadlines are measured from the start of the ramp, so write latency does
/// not accumulate. A write that overruns its slot is followed immediately by
/// the next one.
pub async fn step_ramp(motor: &dyn Motor, from: i8, to: i8, duration: Duration) -> Result<()> {
    let ramp = RampProfile::new(from, to, duration);
    debug!("[HUB] Ramping {} -> {} over {:?}", from, to, ramp.duration());

    let start = Instant::now();
    for (i, power) in ramp.steps.into_iter().enumerate() {
        sleep_until(start + ramp.step_delay * (i as u32 + 1)).await;
        motor.set_power(power).await?;
    }
    Ok(())
}
