mod bridge;
mod command;
mod config;
mod hub;
mod lifecycle;
mod transport;

use anyhow::Result;
use bridge::{Bridge, BridgeEvent};
use command::{ActionTable, CommandDispatcher};
use config::BridgeConfig;
use hub::HubScanner;
use lifecycle::{Lifecycle, StartupPlan};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use transport::MqttTransport;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status when a repeated signal interrupts shutdown (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = BridgeConfig::from_env()?;

    info!("Signal bridge starting");
    info!("  Broker: {}:{}", config.mqtt.host, config.mqtt.port);
    info!("  Topic: {}", config.topic);
    info!("  Max motor power: {}", config.max_power);
    info!("  Motor port: {}, LED port: {}", config.motor_port, config.indicator_port);

    let (events_tx, events_rx) = mpsc::unbounded_channel::<BridgeEvent>();

    // Producers: transport pump, hub start-up, signal watcher
    let transport = Arc::new(MqttTransport::connect(&config.mqtt, events_tx.clone()));

    let scanner = Arc::new(HubScanner::new(config.scan.clone()));
    let lifecycle = Lifecycle::start(scanner, StartupPlan::from(&config), events_tx.clone());

    let signals_tx = events_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = watch_signals(signals_tx).await {
            error!("[MAIN] Signal handling failed: {:#}", e);
        }
    });

    let table = ActionTable::standard(config.max_power);
    info!("  Actions: {}", table.len());
    let dispatcher = CommandDispatcher::new(table, events_tx);

    Bridge::new(config.topic.clone(), transport, lifecycle, dispatcher, events_rx)
        .run()
        .await
}

/// What to do with a received termination signal
#[derive(Debug, PartialEq, Eq)]
enum SignalAction {
    /// Shutdown was requested on the bridge channel
    Forwarded,
    /// Shutdown is already underway; give up on it
    ForceExit,
}

/// Turns termination signals into one shutdown request
struct SignalLatch {
    events: mpsc::UnboundedSender<BridgeEvent>,
    requested: bool,
}

impl SignalLatch {
    fn new(events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        Self {
            events,
            requested: false,
        }
    }

    fn observe(&mut self, signal: &'static str) -> SignalAction {
        if self.requested {
            warn!("[MAIN] {} received again during shutdown, exiting now", signal);
            return SignalAction::ForceExit;
        }
        self.requested = true;
        let _ = self.events.send(BridgeEvent::ShutdownRequested { signal });
        SignalAction::Forwarded
    }
}

/// Forward SIGINT or SIGTERM as a shutdown request; a second one exits hard
async fn watch_signals(events: mpsc::UnboundedSender<BridgeEvent>) -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut latch = SignalLatch::new(events);

    loop {
        let received = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };

        if latch.observe(received) == SignalAction::ForceExit {
            std::process::exit(FORCED_EXIT_CODE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_signal_requests_shutdown_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut latch = SignalLatch::new(tx);

        assert_eq!(latch.observe("SIGTERM"), SignalAction::Forwarded);
        assert!(matches!(
            rx.try_recv(),
            Ok(BridgeEvent::ShutdownRequested { signal: "SIGTERM" })
        ));

        assert_eq!(latch.observe("SIGINT"), SignalAction::ForceExit);
        assert_eq!(latch.observe("SIGINT"), SignalAction::ForceExit);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_signal_after_bridge_exit_still_latches() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut latch = SignalLatch::new(tx);

        assert_eq!(latch.observe("SIGINT"), SignalAction::Forwarded);
        assert_eq!(latch.observe("SIGINT"), SignalAction::ForceExit);
    }
}
