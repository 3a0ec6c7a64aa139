//! Lifecycle manager - drives the hub from scanning to ready, and back down

use super::session::HardwareSession;
use crate::bridge::BridgeEvent;
use crate::command::handlers::pull_away;
use crate::config::BridgeConfig;
use crate::hub::{Indicator, Motor, RigController, RigScanner};
use crate::transport::CommandTransport;
use anyhow::{anyhow, Context, Result};
use signal_bridge_shared::state_machine::{
    HubLifecycle, LifecycleEvent, LifecycleMachine, TransitionResult,
};
use signal_bridge_shared::HubPort;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Progress reported by the start-up task
#[derive(Clone)]
pub enum HubEvent {
    Discovered(Arc<dyn RigController>),
    Connected,
    MotorBound(Arc<dyn Motor>),
    IndicatorBound(Arc<dyn Indicator>),
    /// The start-up acceleration finished; commands may now be accepted
    StartupComplete,
    /// Discovery, connection, port binding or start-up failed
    Failed(String),
}

impl std::fmt::Debug for HubEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubEvent::Discovered(hub) => write!(f, "Discovered({})", hub.name()),
            HubEvent::Connected => f.write_str("Connected"),
            HubEvent::MotorBound(_) => f.write_str("MotorBound"),
            HubEvent::IndicatorBound(_) => f.write_str("IndicatorBound"),
            HubEvent::StartupComplete => f.write_str("StartupComplete"),
            HubEvent::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// What applying a hub event means for the rest of the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// State advanced, nothing else to do
    Progress,
    /// All handles are bound
    Ready,
    /// Start-up actuation completed
    StartupComplete,
    /// Start-up failed; unrecoverable
    Failed(String),
    /// Event arrived in a state where it no longer applies
    Ignored,
}

/// Ports and power used by the start-up sequence
#[derive(Debug, Clone, Copy)]
pub struct StartupPlan {
    pub motor_port: HubPort,
    pub indicator_port: HubPort,
    pub max_power: i8,
}

impl From<&BridgeConfig> for StartupPlan {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            motor_port: config.motor_port,
            indicator_port: config.indicator_port,
            max_power: config.max_power,
        }
    }
}

fn send(events: &mpsc::UnboundedSender<BridgeEvent>, event: HubEvent) -> Result<()> {
    events
        .send(BridgeEvent::Hub(event))
        .map_err(|_| anyhow!("Bridge stopped during hub start-up"))
}

async fn startup_sequence(
    scanner: Arc<dyn RigScanner>,
    plan: StartupPlan,
    events: &mpsc::UnboundedSender<BridgeEvent>,
) -> Result<()> {
    info!("[LIFECYCLE] Scanning for Lego Powered UP hubs...");
    let hub = scanner.scan_first().await.context("Hub discovery failed")?;
    send(events, HubEvent::Discovered(hub.clone()))?;

    hub.connect()
        .await
        .with_context(|| format!("Connecting to {} failed", hub.name()))?;
    info!("[LIFECYCLE] Connected to {}", hub.name());
    send(events, HubEvent::Connected)?;

    // Motor port first, then the indicator port
    let motor = hub
        .wait_for_motor(plan.motor_port)
        .await
        .with_context(|| format!("No motor at port {}", plan.motor_port))?;
    info!("[LIFECYCLE] Motor bound at port {}", plan.motor_port);
    send(events, HubEvent::MotorBound(motor.clone()))?;

    let indicator = hub
        .wait_for_indicator(plan.indicator_port)
        .await
        .with_context(|| format!("No LED at port {}", plan.indicator_port))?;
    info!("[LIFECYCLE] LED bound at port {}", plan.indicator_port);
    send(events, HubEvent::IndicatorBound(indicator))?;

    pull_away(motor.as_ref(), plan.max_power)
        .await
        .context("Start-up acceleration failed")?;
    send(events, HubEvent::StartupComplete)
}

/// Run discovery, connection, port binding and start-up, reporting each step
pub async fn run_startup(
    scanner: Arc<dyn RigScanner>,
    plan: StartupPlan,
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    if let Err(e) = startup_sequence(scanner, plan, &events).await {
        let _ = events.send(BridgeEvent::Hub(HubEvent::Failed(format!("{:#}", e))));
    }
}

/// Owns the hardware session and the hub lifecycle state
pub struct Lifecycle {
    machine: LifecycleMachine,
    session: HardwareSession,
    /// The hub, from discovery on (before the session owns it)
    discovered: Option<Arc<dyn RigController>>,
    startup_task: Option<JoinHandle<()>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a lifecycle in `Scanning` with no start-up task
    pub fn new() -> Self {
        Self {
            machine: LifecycleMachine::new(),
            session: HardwareSession::new(),
            discovered: None,
            startup_task: None,
        }
    }

    /// Create a lifecycle and spawn the start-up task
    pub fn start(
        scanner: Arc<dyn RigScanner>,
        plan: StartupPlan,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        let mut lifecycle = Self::new();
        lifecycle.startup_task = Some(tokio::spawn(run_startup(scanner, plan, events)));
        lifecycle
    }

    pub fn state(&self) -> HubLifecycle {
        self.machine.state()
    }

    pub fn session(&self) -> &HardwareSession {
        &self.session
    }

    fn advance(&mut self, event: LifecycleEvent) -> bool {
        match self.machine.process_event(event) {
            TransitionResult::Success(state) => {
                debug!("[LIFECYCLE] {:?} -> {:?}", event, state);
                true
            }
            TransitionResult::Invalid { from, event } => {
                debug!("[LIFECYCLE] Ignoring {:?} in {:?}", event, from);
                false
            }
        }
    }

    /// Apply progress from the start-up task
    pub fn apply(&mut self, event: HubEvent) -> LifecycleOutcome {
        match event {
            HubEvent::Discovered(hub) => {
                if !self.advance(LifecycleEvent::HubDiscovered) {
                    return LifecycleOutcome::Ignored;
                }
                info!("[LIFECYCLE] Discovered {}!", hub.name());
                self.discovered = Some(hub);
                LifecycleOutcome::Progress
            }
            HubEvent::Connected => {
                let Some(hub) = self.discovered.clone() else {
                    return LifecycleOutcome::Ignored;
                };
                if !self.advance(LifecycleEvent::HubConnected) {
                    return LifecycleOutcome::Ignored;
                }
                self.session.bind_controller(hub);
                LifecycleOutcome::Progress
            }
            HubEvent::MotorBound(motor) => {
                if !self.advance(LifecycleEvent::MotorBound) {
                    return LifecycleOutcome::Ignored;
                }
                self.session.bind_motor(motor);
                LifecycleOutcome::Progress
            }
            HubEvent::IndicatorBound(indicator) => {
                if !self.advance(LifecycleEvent::IndicatorBound) {
                    return LifecycleOutcome::Ignored;
                }
                self.session.bind_indicator(indicator);
                info!("[LIFECYCLE] All hardware pieces have been discovered!");
                LifecycleOutcome::Ready
            }
            HubEvent::StartupComplete => {
                if self.state() != HubLifecycle::PortsBound {
                    return LifecycleOutcome::Ignored;
                }
                LifecycleOutcome::StartupComplete
            }
            HubEvent::Failed(reason) => {
                if matches!(
                    self.state(),
                    HubLifecycle::ShuttingDown | HubLifecycle::Disconnected
                ) {
                    return LifecycleOutcome::Ignored;
                }
                error!("[LIFECYCLE] Hub start-up failed: {}", reason);
                LifecycleOutcome::Failed(reason)
            }
        }
    }

    /// Disconnect transport and hub, waiting for both
    ///
    /// Each side is only touched if it is connected (or, for the hub, still
    /// connecting). Calling this again is a no-op.
    pub async fn shutdown(&mut self, transport: &dyn CommandTransport) {
        if !self.advance(LifecycleEvent::ShutdownRequested) {
            return;
        }

        if let Some(task) = self.startup_task.take() {
            task.abort();
        }

        let hub = self
            .session
            .controller()
            .cloned()
            .or_else(|| self.discovered.clone());

        let transport_done = async {
            if transport.is_connected() {
                info!("[LIFECYCLE] Disconnecting from {} broker...", transport.name());
                if let Err(e) = transport.disconnect().await {
                    warn!("[LIFECYCLE] Transport disconnect failed: {:#}", e);
                }
            }
        };

        let hub_done = async move {
            let Some(hub) = hub else {
                return;
            };
            if hub.is_connected().await || hub.is_connecting() {
                info!("[LIFECYCLE] Disconnecting from {}...", hub.name());
                if let Err(e) = hub.disconnect().await {
                    warn!("[LIFECYCLE] Hub disconnect failed: {:#}", e);
                }
            }
        };

        tokio::join!(transport_done, hub_done);

        self.session.clear();
        self.discovered = None;
        self.advance(LifecycleEvent::ShutdownComplete);
        info!("[LIFECYCLE] Shutdown complete");
    }
}
