//! Stepped motor power ramps
//!
//! Motors have no native ramp on the wire, so a ramp is a series of power
//! writes one unit apart, evenly spread over the requested duration.

use std::time::Duration;

/// A computed ramp: write each power in `steps`, waiting `step_delay` before each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampProfile {
    pub step_delay: Duration,
    pub steps: Vec<i8>,
}

impl RampProfile {
    /// Compute the ramp from `from` to `to` over `duration`
    ///
    /// The last step is always `to`. When `from == to` the profile is a single
    /// immediate write.
    pub fn new(from: i8, to: i8, duration: Duration) -> Self {
        let distance = (i16::from(to) - i16::from(from)).unsigned_abs();
        if distance == 0 {
            return Self {
                step_delay: Duration::ZERO,
                steps: vec![to],
            };
        }

        let increment: i16 = if to > from { 1 } else { -1 };
        let steps = (1..=distance as i16)
            .map(|i| (i16::from(from) + i * increment) as i8)
            .collect();

        Self {
            step_delay: duration / u32::from(distance),
            steps,
        }
    }

    /// Total time the ramp takes
    pub fn duration(&self) -> Duration {
        self.step_delay * self.steps.len() as u32
    }
}
