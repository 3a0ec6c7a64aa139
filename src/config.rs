//! Bridge configuration, read once from the environment

use crate::hub::HubScanConfig;
use anyhow::{anyhow, bail, Context, Result};
use signal_bridge_shared::HubPort;
use std::time::Duration;

/// Default MQTT port when the broker URL has none
pub const DEFAULT_MQTT_PORT: u16 = 1883;

pub const ENV_BROKER_URL: &str = "MQTT_BROKER_URL";
pub const ENV_TOPIC: &str = "MQTT_TOPIC";
pub const ENV_CLIENT_ID: &str = "MQTT_CLIENT_ID";
pub const ENV_MAX_POWER: &str = "LEGO_MOTOR_MAX_POWER";
pub const ENV_MOTOR_PORT: &str = "LEGO_MOTOR_PORT";
pub const ENV_LED_PORT: &str = "LEGO_LED_PORT";
pub const ENV_HUB_NAME: &str = "LEGO_HUB_NAME";
pub const ENV_HUB_ADDRESS: &str = "LEGO_HUB_ADDRESS";

/// MQTT connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_MQTT_PORT,
            client_id: format!("signal-bridge-{}", std::process::id()),
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    /// Topic carrying command codes
    pub topic: String,
    /// Motor power used as the 100% reference by every routine
    pub max_power: i8,
    pub motor_port: HubPort,
    pub indicator_port: HubPort,
    pub scan: HubScanConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            topic: "train-command".into(),
            max_power: 50,
            motor_port: HubPort::A,
            indicator_port: HubPort::B,
            scan: HubScanConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BROKER_URL) {
            let (host, port) = parse_broker_url(&url)?;
            config.mqtt.host = host;
            config.mqtt.port = port;
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            config.mqtt.client_id = client_id;
        }
        if let Some(topic) = lookup(ENV_TOPIC) {
            if topic.is_empty() {
                bail!("{} must not be empty", ENV_TOPIC);
            }
            config.topic = topic;
        }
        if let Some(power) = lookup(ENV_MAX_POWER) {
            config.max_power = parse_max_power(&power)?;
        }
        if let Some(port) = lookup(ENV_MOTOR_PORT) {
            config.motor_port = port.parse().context(ENV_MOTOR_PORT)?;
        }
        if let Some(port) = lookup(ENV_LED_PORT) {
            config.indicator_port = port.parse().context(ENV_LED_PORT)?;
        }
        if config.motor_port == config.indicator_port {
            bail!(
                "Motor and LED cannot share hub port {}",
                config.motor_port
            );
        }
        if let Some(name) = lookup(ENV_HUB_NAME) {
            config.scan.name_prefix = Some(name);
        }
        if let Some(address) = lookup(ENV_HUB_ADDRESS) {
            let address = address
                .parse()
                .map_err(|e| anyhow!("{}: invalid address {:?}: {}", ENV_HUB_ADDRESS, address, e))?;
            config.scan.address = Some(address);
        }

        Ok(config)
    }
}

/// Parse `mqtt://host[:port]` (or a bare `host[:port]`) into host and port
pub fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let rest = match url.split_once("://") {
        Some(("mqtt" | "tcp", rest)) => rest,
        Some((scheme, _)) => bail!("Unsupported broker URL scheme {:?} in {:?}", scheme, url),
        None => url,
    };
    let authority = rest.split('/').next().unwrap_or_default();

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid broker port in {:?}", url))?;
            (host, port)
        }
        None => (authority, DEFAULT_MQTT_PORT),
    };

    if host.is_empty() {
        bail!("Broker URL {:?} has no host", url);
    }
    Ok((host.to_string(), port))
}

/// Parse the maximum motor power, which must be within 0..=100
pub fn parse_max_power(value: &str) -> Result<i8> {
    let power: i8 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be an integer, got {:?}", ENV_MAX_POWER, value))?;
    if !(0..=100).contains(&power) {
        bail!("{} must be within 0..=100, got {}", ENV_MAX_POWER, power);
    }
    Ok(power)
}
