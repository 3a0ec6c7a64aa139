//! Dispatch and Hub Lifecycle State Machines
//!
//! `DispatchState` is the in-progress gate in front of the rig: at most one
//! actuation routine is in flight, late commands are dropped (never queued)
//! and the same command is never accepted twice in a row.
//!
//! `LifecycleMachine` tracks the hub from scanning to shutdown.

use crate::CommandCode;

/// Phase of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// Process start, until the hub is ready and the start-up ramp has run
    Starting,
    /// Ready to accept the next command
    Idle,
    /// A routine for this code is executing
    Busy(CommandCode),
}

/// Why a command was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not in the action table (or not a number at all)
    UnknownAction,
    /// The hub, motor and indicator are not all bound yet
    NotInitialized,
    /// Same code as the last accepted command
    Duplicate,
    /// A routine is still running; `ongoing` is `None` during start-up
    InProgress { ongoing: Option<CommandCode> },
}

/// Outcome of running a command through the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(CommandCode),
    Reject(Rejection),
}

/// Dispatcher state, owned by a single consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchState {
    last_accepted: Option<CommandCode>,
    phase: DispatchPhase,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchState {
    /// Create the state in `Starting`; nothing is accepted until start-up completes
    pub fn new() -> Self {
        Self {
            last_accepted: None,
            phase: DispatchPhase::Starting,
        }
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn last_accepted(&self) -> Option<CommandCode> {
        self.last_accepted
    }

    /// True while a routine (or the start-up sequence) is in flight
    pub fn in_progress(&self) -> bool {
        !matches!(self.phase, DispatchPhase::Idle)
    }

    /// Evaluate the guard without mutating anything
    ///
    /// `code` is `None` when the payload did not resolve to a routine in the
    /// action table. Gates are checked in order: unknown, not initialized,
    /// duplicate, in progress.
    pub fn evaluate(&self, code: Option<CommandCode>, hardware_ready: bool) -> Decision {
        let Some(code) = code else {
            return Decision::Reject(Rejection::UnknownAction);
        };

        if !hardware_ready {
            return Decision::Reject(Rejection::NotInitialized);
        }

        if self.last_accepted == Some(code) {
            return Decision::Reject(Rejection::Duplicate);
        }

        match self.phase {
            DispatchPhase::Idle => Decision::Accept(code),
            DispatchPhase::Starting => Decision::Reject(Rejection::InProgress { ongoing: None }),
            DispatchPhase::Busy(ongoing) => Decision::Reject(Rejection::InProgress {
                ongoing: Some(ongoing),
            }),
        }
    }

    /// Evaluate the guard and, on acceptance, mark the code as in flight
    pub fn try_accept(&mut self, code: Option<CommandCode>, hardware_ready: bool) -> Decision {
        let decision = self.evaluate(code, hardware_ready);
        if let Decision::Accept(code) = decision {
            self.last_accepted = Some(code);
            self.phase = DispatchPhase::Busy(code);
        }
        decision
    }

    /// Clear the in-progress gate after a routine settled, successfully or not
    ///
    /// Returns the code that was in flight.
    pub fn settle(&mut self) -> Option<CommandCode> {
        match self.phase {
            DispatchPhase::Busy(code) => {
                self.phase = DispatchPhase::Idle;
                Some(code)
            }
            _ => None,
        }
    }

    /// Open the gate once the start-up actuation has completed
    pub fn startup_complete(&mut self) -> bool {
        if self.phase == DispatchPhase::Starting {
            self.phase = DispatchPhase::Idle;
            true
        } else {
            false
        }
    }
}

/// Hub lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubLifecycle {
    /// Discovery is active, no hub known
    Scanning,
    /// A compatible hub was found and scanning stopped
    Discovered,
    /// The hub handshake completed; ports are being bound
    Connected,
    /// Motor and indicator are bound; the rig is ready
    PortsBound,
    /// Transport and hub are being disconnected
    ShuttingDown,
    /// Everything is released
    Disconnected,
}

/// Events that move the hub lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    HubDiscovered,
    HubConnected,
    MotorBound,
    IndicatorBound,
    ShutdownRequested,
    ShutdownComplete,
}

/// Result of a lifecycle transition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid; the machine is now in this state
    Success(HubLifecycle),
    /// Transition was invalid from current state
    Invalid {
        from: HubLifecycle,
        event: LifecycleEvent,
    },
}

/// The hub lifecycle state machine
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    state: HubLifecycle,
    motor_bound: bool,
    indicator_bound: bool,
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMachine {
    /// Create a new machine in `Scanning`
    pub fn new() -> Self {
        Self {
            state: HubLifecycle::Scanning,
            motor_bound: false,
            indicator_bound: false,
        }
    }

    pub fn state(&self) -> HubLifecycle {
        self.state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        use HubLifecycle::*;
        use LifecycleEvent::*;

        let next = match (self.state, event) {
            // Shutdown can start from anywhere except when already underway
            (ShuttingDown | Disconnected, ShutdownRequested) => None,
            (_, ShutdownRequested) => Some(ShuttingDown),
            (ShuttingDown, ShutdownComplete) => Some(Disconnected),

            (Scanning, HubDiscovered) => Some(Discovered),
            (Discovered, HubConnected) => Some(Connected),

            // Motor port is bound first, then the indicator port
            (Connected, MotorBound) if !self.motor_bound => {
                self.motor_bound = true;
                Some(Connected)
            }
            (Connected, IndicatorBound) if self.motor_bound && !self.indicator_bound => {
                self.indicator_bound = true;
                Some(PortsBound)
            }

            _ => None,
        };

        match next {
            Some(state) => {
                self.state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.state,
                event,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: CommandCode = CommandCode(4);
    const GREEN: CommandCode = CommandCode(5);

    fn idle_state() -> DispatchState {
        let mut state = DispatchState::new();
        assert!(state.startup_complete());
        state
    }

    #[test]
    fn test_initial_state_is_in_progress() {
        let state = DispatchState::new();
        assert_eq!(state.phase(), DispatchPhase::Starting);
        assert!(state.in_progress());
        assert_eq!(state.last_accepted(), None);
    }

    #[test]
    fn test_unknown_rejected_before_anything_else() {
        let mut state = DispatchState::new();
        let before = state.clone();
        assert_eq!(
            state.try_accept(None, false),
            Decision::Reject(Rejection::UnknownAction)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_not_initialized_rejected_without_mutation() {
        let mut state = idle_state();
        let before = state.clone();
        assert_eq!(
            state.try_accept(Some(RED), false),
            Decision::Reject(Rejection::NotInitialized)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_starting_rejects_as_in_progress() {
        let mut state = DispatchState::new();
        assert_eq!(
            state.try_accept(Some(RED), true),
            Decision::Reject(Rejection::InProgress { ongoing: None })
        );
        assert_eq!(state.last_accepted(), None);
    }

    #[test]
    fn test_accept_marks_busy() {
        let mut state = idle_state();
        assert_eq!(state.try_accept(Some(RED), true), Decision::Accept(RED));
        assert_eq!(state.phase(), DispatchPhase::Busy(RED));
        assert_eq!(state.last_accepted(), Some(RED));
    }

    #[test]
    fn test_busy_drops_other_commands() {
        let mut state = idle_state();
        state.try_accept(Some(RED), true);

        assert_eq!(
            state.try_accept(Some(GREEN), true),
            Decision::Reject(Rejection::InProgress { ongoing: Some(RED) })
        );
        assert_eq!(state.last_accepted(), Some(RED));

        assert_eq!(state.settle(), Some(RED));
        assert_eq!(state.try_accept(Some(GREEN), true), Decision::Accept(GREEN));
    }

    #[test]
    fn test_duplicate_suppressed_after_completion() {
        let mut state = idle_state();
        state.try_accept(Some(RED), true);
        state.settle();

        assert_eq!(
            state.try_accept(Some(RED), true),
            Decision::Reject(Rejection::Duplicate)
        );

        state.try_accept(Some(GREEN), true);
        state.settle();
        assert_eq!(state.try_accept(Some(RED), true), Decision::Accept(RED));
    }

    #[test]
    fn test_duplicate_checked_before_busy() {
        let mut state = idle_state();
        state.try_accept(Some(RED), true);
        assert_eq!(
            state.try_accept(Some(RED), true),
            Decision::Reject(Rejection::Duplicate)
        );
    }

    #[test]
    fn test_settle_and_startup_are_one_shot() {
        let mut state = DispatchState::new();
        assert_eq!(state.settle(), None);
        assert!(state.startup_complete());
        assert!(!state.startup_complete());
        assert_eq!(state.settle(), None);
        assert!(!state.in_progress());
    }

    #[test]
    fn test_normal_lifecycle_flow() {
        let mut fsm = LifecycleMachine::new();
        assert_eq!(fsm.state(), HubLifecycle::Scanning);

        let steps = [
            (LifecycleEvent::HubDiscovered, HubLifecycle::Discovered),
            (LifecycleEvent::HubConnected, HubLifecycle::Connected),
            (LifecycleEvent::MotorBound, HubLifecycle::Connected),
            (LifecycleEvent::IndicatorBound, HubLifecycle::PortsBound),
            (LifecycleEvent::ShutdownRequested, HubLifecycle::ShuttingDown),
            (LifecycleEvent::ShutdownComplete, HubLifecycle::Disconnected),
        ];
        for (event, expected) in steps {
            assert_eq!(fsm.process_event(event), TransitionResult::Success(expected));
        }
    }

    #[test]
    fn test_indicator_before_motor_is_invalid() {
        let mut fsm = LifecycleMachine::new();
        fsm.process_event(LifecycleEvent::HubDiscovered);
        fsm.process_event(LifecycleEvent::HubConnected);

        let result = fsm.process_event(LifecycleEvent::IndicatorBound);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), HubLifecycle::Connected);
    }

    #[test]
    fn test_shutdown_from_scanning_and_twice() {
        let mut fsm = LifecycleMachine::new();
        assert_eq!(
            fsm.process_event(LifecycleEvent::ShutdownRequested),
            TransitionResult::Success(HubLifecycle::ShuttingDown)
        );
        assert!(matches!(
            fsm.process_event(LifecycleEvent::ShutdownRequested),
            TransitionResult::Invalid { .. }
        ));
        // Late discovery after shutdown started is ignored
        assert!(matches!(
            fsm.process_event(LifecycleEvent::HubDiscovered),
            TransitionResult::Invalid { .. }
        ));
    }
}
