//! Signal Bridge Shared Types
//!
//! This crate provides the I/O-free pieces of the signal bridge: command codes
//! and the traffic-sign vocabulary, the dispatch guard state machine, the LEGO
//! Wireless Protocol 3 codec and motor ramp profiles.

pub mod codec;
pub mod ramp;
pub mod state_machine;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Timing parameters of the actuation routines
pub mod timing {
    /// Ramp duration of the pedestrian crossing slow-down
    pub const PEDESTRIAN_RAMP_MS: u64 = 2000;

    /// Ramp duration of the green light and start-up accelerations
    pub const ACCELERATION_RAMP_MS: u64 = 5000;

    /// On and off interval of the indicator blink
    pub const BLINK_INTERVAL_MS: u64 = 250;

    /// Number of indicator blinks on a green light
    pub const BLINK_COUNT: usize = 2;

    /// Full indicator brightness
    pub const BRIGHTNESS_FULL: u8 = 100;
}

/// Identifier of a real-world driving condition, as published on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandCode(pub u16);

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a bus payload into a command code
///
/// Parsing is lenient: leading whitespace is skipped, an optional sign is
/// accepted and only the leading run of decimal digits is read, so `"3abc"`
/// yields 3. Payloads without digits, negative values and values out of range
/// yield `None`, which callers treat as an unknown command.
pub fn parse_command_code(payload: &str) -> Option<CommandCode> {
    let trimmed = payload.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }

    let value: u64 = rest[..digits_len].parse().ok()?;
    if negative && value != 0 {
        return None;
    }

    u16::try_from(value).ok().map(CommandCode)
}

/// Traffic signs and signals recognised by the vision side of the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficSign {
    SpeedLimit30,
    SpeedLimit50,
    TrafficSignalsAhead,
    PedestrianCrossingAhead,
    RedTrafficLight,
    GreenTrafficLight,
}

impl TrafficSign {
    /// All signs, in command code order
    pub const ALL: [TrafficSign; 6] = [
        TrafficSign::SpeedLimit30,
        TrafficSign::SpeedLimit50,
        TrafficSign::TrafficSignalsAhead,
        TrafficSign::PedestrianCrossingAhead,
        TrafficSign::RedTrafficLight,
        TrafficSign::GreenTrafficLight,
    ];

    /// The command code published for this sign
    pub fn code(self) -> CommandCode {
        let raw = match self {
            TrafficSign::SpeedLimit30 => 0,
            TrafficSign::SpeedLimit50 => 1,
            TrafficSign::TrafficSignalsAhead => 2,
            TrafficSign::PedestrianCrossingAhead => 3,
            TrafficSign::RedTrafficLight => 4,
            TrafficSign::GreenTrafficLight => 5,
        };
        CommandCode(raw)
    }

    pub fn name(self) -> &'static str {
        match self {
            TrafficSign::SpeedLimit30 => "SpeedLimit_30",
            TrafficSign::SpeedLimit50 => "SpeedLimit_50",
            TrafficSign::TrafficSignalsAhead => "TrafficSignalsAhead",
            TrafficSign::PedestrianCrossingAhead => "PedestrianCrossingAhead",
            TrafficSign::RedTrafficLight => "RedTrafficLight",
            TrafficSign::GreenTrafficLight => "GreenTrafficLight",
        }
    }
}

impl fmt::Display for TrafficSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors parsing a hub port name
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PortError {
    #[error("Unknown hub port: {0:?} (expected A-D)")]
    Unknown(String),
}

/// An external port of a Powered UP hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HubPort(u8);

impl HubPort {
    pub const A: HubPort = HubPort(0x00);
    pub const B: HubPort = HubPort(0x01);
    pub const C: HubPort = HubPort(0x02);
    pub const D: HubPort = HubPort(0x03);

    /// Build a port from its LWP3 port id
    pub fn from_id(id: u8) -> Self {
        HubPort(id)
    }

    /// LWP3 port id
    pub fn id(self) -> u8 {
        self.0
    }
}

impl FromStr for HubPort {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(HubPort::A),
            "B" => Ok(HubPort::B),
            "C" => Ok(HubPort::C),
            "D" => Ok(HubPort::D),
            _ => Err(PortError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for HubPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x00..=0x03 => write!(f, "{}", (b'A' + self.0) as char),
            id => write!(f, "0x{:02x}", id),
        }
    }
}
