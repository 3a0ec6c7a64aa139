//! Traffic signals ahead routine

use crate::command::actions::{ActionRoutine, RigHandles};
use anyhow::Result;
use async_trait::async_trait;
use signal_bridge_shared::TrafficSign;

/// No physical effect; still occupies the dispatcher until it resolves
pub struct SignalsAhead;

#[async_trait]
impl ActionRoutine for SignalsAhead {
    fn sign(&self) -> TrafficSign {
        TrafficSign::TrafficSignalsAhead
    }

    async fn run(&self, _rig: &RigHandles) -> Result<()> {
        Ok(())
    }
}
