//! MQTT transport built on rumqttc
//!
//! The rumqttc event loop is driven by a pump task that forwards broker
//! events into the bridge channel. Reconnection is left to rumqttc: polling
//! again after an error starts a new connection attempt.

use crate::bridge::BridgeEvent;
use crate::config::MqttConfig;
use crate::transport::traits::{CommandTransport, TransportEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the rumqttc request channel
const REQUEST_CAPACITY: usize = 10;

/// MQTT client delivering command payloads
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Create the client and start connecting in the background
    pub fn connect(config: &MqttConfig, events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);

        info!("[MQTT] Connecting to MQTT broker {}:{}...", config.host, config.port);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let pump = tokio::spawn(pump_loop(eventloop, connected.clone(), events));

        Self {
            client,
            connected,
            pump: Mutex::new(Some(pump)),
        }
    }
}

/// Forward broker events until the client disconnects or the bridge is gone
async fn pump_loop(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                TransportEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload,
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                let _ = events.send(BridgeEvent::Transport(TransportEvent::Closed {
                    reason: "client disconnected".into(),
                }));
                break;
            }
            Ok(other) => {
                debug!("[MQTT] {:?}", other);
                continue;
            }
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    let closed = TransportEvent::Closed {
                        reason: e.to_string(),
                    };
                    if events.send(BridgeEvent::Transport(closed)).is_err() {
                        break;
                    }
                } else {
                    warn!("[MQTT] Connection attempt failed: {}", e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if events.send(BridgeEvent::Transport(event)).is_err() {
            debug!("[MQTT] Bridge channel closed, stopping pump");
            break;
        }
    }
}

#[async_trait]
impl CommandTransport for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("Subscribe to {} failed", topic))?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .context("MQTT disconnect request failed")?;

        if let Some(pump) = self.pump.lock().await.take() {
            pump.await.context("MQTT pump task failed")?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "MQTT"
    }
}
