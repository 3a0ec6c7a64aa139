//! Command dispatcher - gates incoming codes and runs one routine at a time
//!
//! The dispatcher is owned by the bridge event loop, which is the only place
//! `DispatchState` changes. Accepted routines run on their own task and report
//! back through the bridge channel; commands arriving meanwhile are dropped.

use super::actions::{ActionRoutine, ActionTable, RigHandles};
use crate::bridge::BridgeEvent;
use crate::lifecycle::HardwareSession;
use signal_bridge_shared::state_machine::{Decision, DispatchState, Rejection};
use signal_bridge_shared::{parse_command_code, CommandCode};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A routine finished, successfully or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSettled {
    pub code: CommandCode,
    pub result: Result<(), String>,
}

/// Reports settlement when dropped, so a panicking routine still clears the gate
struct SettleGuard {
    code: CommandCode,
    events: mpsc::UnboundedSender<BridgeEvent>,
    result: Option<Result<(), String>>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err("routine aborted".into()));
        let _ = self.events.send(BridgeEvent::RoutineSettled(RoutineSettled {
            code: self.code,
            result,
        }));
    }
}

/// The command dispatch state machine
pub struct CommandDispatcher {
    table: ActionTable,
    state: DispatchState,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl CommandDispatcher {
    /// Create a dispatcher in the start-up phase
    pub fn new(table: ActionTable, events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        Self {
            table,
            state: DispatchState::new(),
            events,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Handle a raw payload from the command topic
    pub fn on_command_received(&mut self, payload: &[u8], session: &HardwareSession) -> Decision {
        let text = String::from_utf8_lossy(payload);
        let parsed = parse_command_code(&text);
        let routine = parsed.and_then(|code| self.table.get(code));
        let known = routine.as_ref().and(parsed);

        let decision = self.state.try_accept(known, session.is_ready());
        match decision {
            Decision::Reject(rejection) => log_rejection(rejection, &text, parsed, &self.state),
            Decision::Accept(code) => match (routine, session.handles()) {
                (Some(routine), Some(handles)) => self.spawn_routine(code, routine, handles),
                // Ready implies handles and acceptance implies a routine
                _ => {
                    error!("[DISPATCH] Accepted {} without a routine or rig", code);
                    self.state.settle();
                }
            },
        }
        decision
    }

    fn spawn_routine(&self, code: CommandCode, routine: Arc<dyn ActionRoutine>, rig: RigHandles) {
        let mut guard = SettleGuard {
            code,
            events: self.events.clone(),
            result: None,
        };
        tokio::spawn(async move {
            info!("[DISPATCH] Handling {}...", routine.sign());
            let result = routine.run(&rig).await.map_err(|e| format!("{:#}", e));
            guard.result = Some(result);
        });
    }

    /// Clear the in-progress gate after a routine settled
    pub fn on_routine_settled(&mut self, settled: RoutineSettled) {
        match &settled.result {
            Ok(()) => info!("[DISPATCH] Processed command {}!", settled.code),
            Err(e) => error!("[DISPATCH] Command {} failed: {}", settled.code, e),
        }
        if self.state.settle().is_none() {
            warn!("[DISPATCH] Settlement of {} with no routine in flight", settled.code);
        }
    }

    /// Open the gate once the start-up acceleration is done
    pub fn on_startup_complete(&mut self) {
        if self.state.startup_complete() {
            info!("[DISPATCH] Ready for commands");
        }
    }
}

fn log_rejection(
    rejection: Rejection,
    text: &str,
    parsed: Option<CommandCode>,
    state: &DispatchState,
) {
    match rejection {
        Rejection::UnknownAction => match parsed {
            Some(code) => info!("[DISPATCH] Unknown action {}/{}...", text, code),
            None => info!("[DISPATCH] Unknown action {}/NaN...", text),
        },
        Rejection::NotInitialized => info!(
            "[DISPATCH] Not acting on {} since the Lego Powered UP hub is not initialized yet!",
            text
        ),
        Rejection::Duplicate => info!("[DISPATCH] Ignoring duplicate command {}!", text),
        Rejection::InProgress { ongoing } => {
            let ongoing = ongoing
                .or(state.last_accepted())
                .map(|code| code.to_string())
                .unwrap_or_else(|| "start-up".into());
            info!(
                "[DISPATCH] Ignoring command {} since the last one ({}) is still ongoing...",
                text, ongoing
            );
        }
    }
}
