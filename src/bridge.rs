//! Bridge event loop
//!
//! Transport messages, hub start-up progress, routine completions and
//! shutdown requests all arrive on one channel and are handled here, in order,
//! by a single consumer.

use crate::command::{CommandDispatcher, RoutineSettled};
use crate::lifecycle::{HubEvent, Lifecycle, LifecycleOutcome};
use crate::transport::{CommandTransport, TransportEvent};
use anyhow::{anyhow, Result};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Everything the bridge reacts to
#[derive(Debug)]
pub enum BridgeEvent {
    Transport(TransportEvent),
    Hub(HubEvent),
    RoutineSettled(RoutineSettled),
    /// A termination signal was received
    ShutdownRequested { signal: &'static str },
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    StartupFailed(String),
    ChannelClosed,
}

pub struct Bridge {
    topic: String,
    transport: Arc<dyn CommandTransport>,
    lifecycle: Lifecycle,
    dispatcher: CommandDispatcher,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl Bridge {
    pub fn new(
        topic: String,
        transport: Arc<dyn CommandTransport>,
        lifecycle: Lifecycle,
        dispatcher: CommandDispatcher,
        events: mpsc::UnboundedReceiver<BridgeEvent>,
    ) -> Self {
        Self {
            topic,
            transport,
            lifecycle,
            dispatcher,
            events,
        }
    }

    /// Run until shutdown, then disconnect transport and hub
    ///
    /// Returns an error if the hub start-up failed.
    pub async fn run(mut self) -> Result<()> {
        let reason = loop {
            if let ControlFlow::Break(reason) = self.step().await {
                break reason;
            }
        };

        self.lifecycle.shutdown(self.transport.as_ref()).await;

        match reason {
            StopReason::StartupFailed(reason) => Err(anyhow!("Hub start-up failed: {}", reason)),
            StopReason::Shutdown | StopReason::ChannelClosed => Ok(()),
        }
    }

    /// Receive and handle one event
    pub async fn step(&mut self) -> ControlFlow<StopReason> {
        match self.events.recv().await {
            Some(event) => self.handle(event).await,
            None => {
                error!("[MAIN] Event channel closed");
                ControlFlow::Break(StopReason::ChannelClosed)
            }
        }
    }

    async fn handle(&mut self, event: BridgeEvent) -> ControlFlow<StopReason> {
        match event {
            BridgeEvent::Transport(TransportEvent::Connected) => {
                info!("[MQTT] Connected to {} broker", self.transport.name());
                match self.transport.subscribe(&self.topic).await {
                    Ok(()) => info!("[MQTT] Subscribed to topic {}!", self.topic),
                    Err(e) => error!("[MQTT] Subscribe to {} failed: {:#}", self.topic, e),
                }
            }
            BridgeEvent::Transport(TransportEvent::Message { topic, payload }) => {
                info!(
                    "[MQTT] Received message on topic {}: {}",
                    topic,
                    String::from_utf8_lossy(&payload)
                );
                self.dispatcher
                    .on_command_received(&payload, self.lifecycle.session());
            }
            BridgeEvent::Transport(TransportEvent::Closed { reason }) => {
                warn!("[MQTT] Disconnected from broker: {}", reason);
            }
            BridgeEvent::Hub(event) => match self.lifecycle.apply(event) {
                LifecycleOutcome::StartupComplete => self.dispatcher.on_startup_complete(),
                LifecycleOutcome::Failed(reason) => {
                    return ControlFlow::Break(StopReason::StartupFailed(reason));
                }
                LifecycleOutcome::Progress | LifecycleOutcome::Ready | LifecycleOutcome::Ignored => {}
            },
            BridgeEvent::RoutineSettled(settled) => self.dispatcher.on_routine_settled(settled),
            BridgeEvent::ShutdownRequested { signal } => {
                info!("[MAIN] {} received, shutting down", signal);
                return ControlFlow::Break(StopReason::Shutdown);
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ActionTable;
    use crate::hub::mock::{MockRig, MockScanner, RigCall};
    use crate::lifecycle::StartupPlan;
    use crate::transport::mock::MockTransport;
    use bytes::Bytes;
    use signal_bridge_shared::state_machine::HubLifecycle;
    use signal_bridge_shared::HubPort;

    struct Harness {
        bridge: Bridge,
        tx: mpsc::UnboundedSender<BridgeEvent>,
        rig: MockRig,
        transport: Arc<MockTransport>,
    }

    fn harness() -> Harness {
        let rig = MockRig::new();
        let transport = MockTransport::new(true);
        let (tx, rx) = mpsc::unbounded_channel();
        let plan = StartupPlan {
            motor_port: HubPort::A,
            indicator_port: HubPort::B,
            max_power: 50,
        };
        let lifecycle = Lifecycle::start(Arc::new(MockScanner { rig: rig.clone() }), plan, tx.clone());
        let dispatcher = CommandDispatcher::new(ActionTable::standard(50), tx.clone());
        let bridge = Bridge::new(
            "train-command".into(),
            transport.clone(),
            lifecycle,
            dispatcher,
            rx,
        );
        Harness {
            bridge,
            tx,
            rig,
            transport,
        }
    }

    fn message(payload: &'static str) -> BridgeEvent {
        BridgeEvent::Transport(TransportEvent::Message {
            topic: "train-command".into(),
            payload: Bytes::from_static(payload.as_bytes()),
        })
    }

    impl Harness {
        /// Step until the start-up sequence has opened the dispatcher
        async fn until_live(&mut self) {
            while self.bridge.dispatcher.state().in_progress() {
                assert!(self.bridge.step().await.is_continue());
            }
            self.rig.clear_calls();
        }

        /// Deliver one command and step until its routine settled
        async fn command(&mut self, payload: &'static str) {
            self.tx.send(message(payload)).unwrap();
            assert!(self.bridge.step().await.is_continue());
            while self.bridge.dispatcher.state().in_progress() {
                assert!(self.bridge.step().await.is_continue());
            }
        }
    }

    #[tokio::test]
    async fn test_subscribes_on_connect() {
        let mut h = harness();
        h.tx.send(BridgeEvent::Transport(TransportEvent::Connected)).unwrap();
        h.tx.send(BridgeEvent::Transport(TransportEvent::Connected)).unwrap();

        // Hub events may interleave; step until both connects were seen
        while h.transport.subscriptions.lock().unwrap().len() < 2 {
            assert!(h.bridge.step().await.is_continue());
        }
        assert_eq!(
            *h.transport.subscriptions.lock().unwrap(),
            vec!["train-command".to_string(), "train-command".to_string()]
        );
    }

    #[tokio::test]
    async fn test_command_before_ready_is_dropped() {
        let mut h = harness();
        // Queued ahead of every hub event
        h.tx.send(message("1")).unwrap();
        assert!(h.bridge.step().await.is_continue());
        assert_eq!(h.bridge.dispatcher.state().last_accepted(), None);

        h.until_live().await;
        assert_eq!(h.bridge.dispatcher.state().last_accepted(), None);
    }

    #[tokio::test]
    async fn test_end_to_end_scenarios() {
        let mut h = harness();
        h.until_live().await;

        h.command("1").await;
        assert_eq!(h.rig.calls(), vec![RigCall::SetPower(50)]);
        h.rig.clear_calls();

        h.command("0").await;
        assert_eq!(h.rig.calls(), vec![RigCall::SetPower(25)]);
        h.rig.clear_calls();

        h.command("3").await;
        assert_eq!(
            h.rig.calls(),
            vec![
                RigCall::Ramp {
                    from: 50,
                    to: 0,
                    duration_ms: 2000
                },
                RigCall::Brake,
            ]
        );
        h.rig.clear_calls();

        h.command("5").await;
        assert_eq!(
            h.rig.calls(),
            vec![
                RigCall::Brightness(100),
                RigCall::Sleep(250),
                RigCall::Brightness(0),
                RigCall::Sleep(250),
                RigCall::Brightness(100),
                RigCall::Sleep(250),
                RigCall::Brightness(0),
                RigCall::Sleep(250),
                RigCall::Ramp {
                    from: 16,
                    to: 50,
                    duration_ms: 5000
                },
            ]
        );
        h.rig.clear_calls();

        h.command("99").await;
        h.command("abc").await;
        assert!(h.rig.calls().is_empty());
        assert_eq!(
            h.bridge.dispatcher.state().last_accepted(),
            Some(signal_bridge_shared::CommandCode(5))
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_disconnects_and_exits_cleanly() {
        let mut h = harness();
        h.until_live().await;
        h.rig.set_connected(true);

        h.tx.send(BridgeEvent::ShutdownRequested { signal: "SIGTERM" })
            .unwrap();
        let rig = h.rig.clone();
        let transport = h.transport.clone();

        h.bridge.run().await.expect("clean shutdown");
        assert_eq!(transport.disconnect_count(), 1);
        assert_eq!(rig.calls(), vec![RigCall::Disconnect]);
    }

    #[tokio::test]
    async fn test_startup_failure_ends_run_with_error() {
        let mut h = harness();
        h.rig.fail_connect();
        // The start-up task has not been polled yet, so connect fails
        let result = h.bridge.run().await;
        let err = result.expect_err("start-up failure must be fatal");
        assert!(format!("{:#}", err).contains("connect refused"));
        assert_eq!(h.transport.disconnect_count(), 1);
        drop(h.tx);
    }

    #[tokio::test]
    async fn test_lifecycle_reaches_ports_bound() {
        let mut h = harness();
        h.until_live().await;
        assert_eq!(h.bridge.lifecycle.state(), HubLifecycle::PortsBound);
    }
}
