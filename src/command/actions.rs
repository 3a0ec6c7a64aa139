//! Action table - static mapping from command code to actuation routine

use super::handlers::{GreenLight, PedestrianCrossing, RedLight, SignalsAhead, SpeedLimit};
use crate::hub::{Indicator, Motor, RigController};
use anyhow::Result;
use async_trait::async_trait;
use signal_bridge_shared::{CommandCode, TrafficSign};
use std::collections::HashMap;
use std::sync::Arc;

/// Capabilities a routine may use: motor, indicator and the hub's timer
#[derive(Clone)]
pub struct RigHandles {
    pub motor: Arc<dyn Motor>,
    pub indicator: Arc<dyn Indicator>,
    pub controller: Arc<dyn RigController>,
}

/// A unit of physical behaviour bound to one command code
///
/// Completion means every actuation call has completed, in order.
#[async_trait]
pub trait ActionRoutine: Send + Sync {
    /// The sign this routine reacts to
    fn sign(&self) -> TrafficSign;

    async fn run(&self, rig: &RigHandles) -> Result<()>;
}

/// Read-only lookup table, built once at start-up
pub struct ActionTable {
    routines: HashMap<CommandCode, Arc<dyn ActionRoutine>>,
}

impl ActionTable {
    /// Build an empty table
    pub fn empty() -> Self {
        Self {
            routines: HashMap::new(),
        }
    }

    /// Build the table for every known traffic sign
    pub fn standard(max_power: i8) -> Self {
        let routines: [Arc<dyn ActionRoutine>; 6] = [
            Arc::new(SpeedLimit::limit_30(max_power)),
            Arc::new(SpeedLimit::limit_50(max_power)),
            Arc::new(SignalsAhead),
            Arc::new(PedestrianCrossing { max_power }),
            Arc::new(RedLight),
            Arc::new(GreenLight { max_power }),
        ];

        let mut table = Self::empty();
        for routine in routines {
            table.insert(routine);
        }
        table
    }

    /// Register a routine under its sign's code, replacing any previous one
    pub fn insert(&mut self, routine: Arc<dyn ActionRoutine>) {
        self.routines.insert(routine.sign().code(), routine);
    }

    /// Look up a routine; an unmapped code is not an error
    pub fn get(&self, code: CommandCode) -> Option<Arc<dyn ActionRoutine>> {
        self.routines.get(&code).cloned()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::mock::{MockRig, RigCall};

    fn handles(rig: &MockRig) -> RigHandles {
        RigHandles {
            motor: rig.motor(),
            indicator: rig.indicator(),
            controller: rig.controller(),
        }
    }

    async fn run_sign(sign: TrafficSign, max_power: i8) -> Vec<RigCall> {
        let rig = MockRig::new();
        let table = ActionTable::standard(max_power);
        let routine = table.get(sign.code()).expect("sign must be mapped");
        assert_eq!(routine.sign(), sign);
        routine.run(&handles(&rig)).await.expect("routine failed");
        rig.calls()
    }

    #[test]
    fn test_standard_table_covers_all_signs() {
        let table = ActionTable::standard(50);
        assert_eq!(table.len(), TrafficSign::ALL.len());
        for sign in TrafficSign::ALL {
            assert_eq!(table.get(sign.code()).map(|r| r.sign()), Some(sign));
        }
        assert!(table.get(CommandCode(99)).is_none());
    }

    #[tokio::test]
    async fn test_speed_limits() {
        assert_eq!(
            run_sign(TrafficSign::SpeedLimit30, 50).await,
            vec![RigCall::SetPower(25)]
        );
        assert_eq!(
            run_sign(TrafficSign::SpeedLimit50, 50).await,
            vec![RigCall::SetPower(50)]
        );
    }

    #[tokio::test]
    async fn test_signals_ahead_has_no_effect() {
        assert!(run_sign(TrafficSign::TrafficSignalsAhead, 50).await.is_empty());
    }

    #[tokio::test]
    async fn test_pedestrian_crossing_ramps_then_brakes() {
        assert_eq!(
            run_sign(TrafficSign::PedestrianCrossingAhead, 50).await,
            vec![
                RigCall::Ramp {
                    from: 50,
                    to: 0,
                    duration_ms: 2000
                },
                RigCall::Brake,
            ]
        );
    }

    #[tokio::test]
    async fn test_red_light_brakes() {
        assert_eq!(
            run_sign(TrafficSign::RedTrafficLight, 50).await,
            vec![RigCall::Brake]
        );
    }

    #[tokio::test]
    async fn test_green_light_blinks_twice_then_pulls_away() {
        let blink = [
            RigCall::Brightness(100),
            RigCall::Sleep(250),
            RigCall::Brightness(0),
            RigCall::Sleep(250),
        ];
        let mut expected: Vec<RigCall> = blink.iter().chain(blink.iter()).cloned().collect();
        expected.push(RigCall::Ramp {
            from: 16,
            to: 50,
            duration_ms: 5000,
        });

        assert_eq!(run_sign(TrafficSign::GreenTrafficLight, 50).await, expected);
    }

    #[tokio::test]
    async fn test_routine_failure_propagates() {
        let rig = MockRig::new();
        rig.fail_motor(true);
        let table = ActionTable::standard(50);
        let routine = table.get(TrafficSign::RedTrafficLight.code()).unwrap();
        assert!(routine.run(&handles(&rig)).await.is_err());
    }
}
