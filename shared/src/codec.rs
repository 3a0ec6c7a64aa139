//! LEGO Wireless Protocol 3 codec
//!
//! Every message on the hub characteristic starts with a common header:
//! ```text
//! [ length (1 or 2 bytes) ][ hub id (0x00) ][ message type ][ payload... ]
//! ```
//!
//! Lengths above 127 use two bytes, low 7 bits first with bit 7 set on the
//! first byte. Only the messages the bridge needs are decoded; everything
//! else surfaces as `HubMessage::Other`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::HubPort;

/// Message type of "Hub Attached I/O"
pub const MSG_HUB_ATTACHED_IO: u8 = 0x04;
/// Message type of "Generic Error Messages"
pub const MSG_GENERIC_ERROR: u8 = 0x05;
/// Message type of "Port Output Command"
pub const MSG_PORT_OUTPUT_COMMAND: u8 = 0x81;
/// Message type of "Port Output Command Feedback"
pub const MSG_PORT_OUTPUT_FEEDBACK: u8 = 0x82;

/// Output sub-command "WriteDirectModeData"
pub const SUB_WRITE_DIRECT_MODE_DATA: u8 = 0x51;
/// Start-up and completion byte: execute immediately, request feedback
pub const STARTUP_IMMEDIATE_WITH_FEEDBACK: u8 = 0x11;

/// Special power value that brakes the motor
pub const POWER_BRAKE: i8 = 127;

/// Errors that can occur while decoding hub messages
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty message")]
    Empty,

    #[error("Declared length {declared} does not fit {available} available bytes")]
    InvalidLength { declared: usize, available: usize },

    #[error("Message type 0x{message_type:02x} truncated: need {needed} bytes, have {available}")]
    Truncated {
        message_type: u8,
        needed: usize,
        available: usize,
    },

    #[error("Unknown attached I/O event: {0}")]
    UnknownIoEvent(u8),
}

/// Event carried by a "Hub Attached I/O" message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachedIoEvent {
    Detached,
    Attached { io_type: u16 },
    AttachedVirtual { io_type: u16 },
}

/// Port output feedback bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackFlags(pub u8);

impl FeedbackFlags {
    pub const COMPLETED: u8 = 0x02;
    pub const DISCARDED: u8 = 0x04;
    pub const IDLE: u8 = 0x08;

    /// The last command on the port finished (or will never run)
    pub fn is_settled(self) -> bool {
        self.0 & (Self::COMPLETED | Self::DISCARDED | Self::IDLE) != 0
    }

    pub fn is_discarded(self) -> bool {
        self.0 & Self::DISCARDED != 0
    }
}

/// A decoded upstream (hub to host) message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    AttachedIo {
        port: HubPort,
        event: AttachedIoEvent,
    },
    PortFeedback(Vec<(HubPort, FeedbackFlags)>),
    GenericError {
        command_type: u8,
        error_code: u8,
    },
    Other {
        message_type: u8,
    },
}

/// A downstream port output command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCommand {
    /// Motor power in -100..=100, or one of the special brake/float values
    StartPower(i8),
    /// Light brightness in 0..=100
    SetBrightness(u8),
}

/// Well-known attached I/O type ids
pub mod io_type {
    pub const SIMPLE_MEDIUM_LINEAR_MOTOR: u16 = 0x0001;
    pub const TRAIN_MOTOR: u16 = 0x0002;
    pub const LIGHT: u16 = 0x0008;
    pub const MEDIUM_LINEAR_MOTOR: u16 = 0x0026;
    pub const MOVE_HUB_MEDIUM_LINEAR_MOTOR: u16 = 0x0027;
    pub const TECHNIC_LARGE_LINEAR_MOTOR: u16 = 0x002e;
    pub const TECHNIC_XLARGE_LINEAR_MOTOR: u16 = 0x002f;
    pub const TECHNIC_MEDIUM_ANGULAR_MOTOR: u16 = 0x0030;
    pub const TECHNIC_LARGE_ANGULAR_MOTOR: u16 = 0x0031;

    /// Whether a device of this type accepts motor power commands
    pub fn is_motor(io_type: u16) -> bool {
        matches!(
            io_type,
            SIMPLE_MEDIUM_LINEAR_MOTOR
                | TRAIN_MOTOR
                | MEDIUM_LINEAR_MOTOR
                | MOVE_HUB_MEDIUM_LINEAR_MOTOR
                | TECHNIC_LARGE_LINEAR_MOTOR
                | TECHNIC_XLARGE_LINEAR_MOTOR
                | TECHNIC_MEDIUM_ANGULAR_MOTOR
                | TECHNIC_LARGE_ANGULAR_MOTOR
        )
    }

    pub fn is_light(io_type: u16) -> bool {
        io_type == LIGHT
    }
}

/// Wrap a message body (type + payload) with the common header
fn frame(message_type: u8, payload: &[u8]) -> Bytes {
    // Header is length + hub id + type; bodies here are always short
    let total = 3 + payload.len();
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u8(total as u8);
    buf.put_u8(0x00);
    buf.put_u8(message_type);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a port output command for `port`
pub fn encode_output(port: HubPort, command: OutputCommand) -> Bytes {
    let value = match command {
        OutputCommand::StartPower(power) => power as u8,
        OutputCommand::SetBrightness(level) => level.min(100),
    };
    frame(
        MSG_PORT_OUTPUT_COMMAND,
        &[
            port.id(),
            STARTUP_IMMEDIATE_WITH_FEEDBACK,
            SUB_WRITE_DIRECT_MODE_DATA,
            0x00, // mode 0: power / brightness
            value,
        ],
    )
}

/// Read the length prefix, returning (message length, header bytes consumed)
fn read_length(buf: &[u8]) -> Result<(usize, usize), CodecError> {
    let first = *buf.first().ok_or(CodecError::Empty)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let second = *buf.get(1).ok_or(CodecError::InvalidLength {
        declared: 0,
        available: buf.len(),
    })?;
    Ok((((first & 0x7f) as usize) | ((second as usize) << 7), 2))
}

/// Decode a single message occupying the whole of `buf`
pub fn decode(buf: &[u8]) -> Result<HubMessage, CodecError> {
    let (declared, len_bytes) = read_length(buf)?;
    if declared != buf.len() || declared < len_bytes + 2 {
        return Err(CodecError::InvalidLength {
            declared,
            available: buf.len(),
        });
    }

    let mut body = &buf[len_bytes + 1..];
    let message_type = body.get_u8();

    match message_type {
        MSG_HUB_ATTACHED_IO => decode_attached_io(body),
        MSG_PORT_OUTPUT_FEEDBACK => decode_feedback(body),
        MSG_GENERIC_ERROR => {
            require(message_type, body, 2)?;
            Ok(HubMessage::GenericError {
                command_type: body.get_u8(),
                error_code: body.get_u8(),
            })
        }
        _ => Ok(HubMessage::Other { message_type }),
    }
}

/// Decode every message packed into one notification
pub fn decode_all(mut buf: &[u8]) -> Result<Vec<HubMessage>, CodecError> {
    let mut messages = Vec::new();
    while !buf.is_empty() {
        let (declared, _) = read_length(buf)?;
        if declared == 0 || declared > buf.len() {
            return Err(CodecError::InvalidLength {
                declared,
                available: buf.len(),
            });
        }
        messages.push(decode(&buf[..declared])?);
        buf.advance(declared);
    }
    Ok(messages)
}

fn require(message_type: u8, body: &[u8], needed: usize) -> Result<(), CodecError> {
    if body.len() < needed {
        return Err(CodecError::Truncated {
            message_type,
            needed,
            available: body.len(),
        });
    }
    Ok(())
}

fn decode_attached_io(mut body: &[u8]) -> Result<HubMessage, CodecError> {
    require(MSG_HUB_ATTACHED_IO, body, 2)?;
    let port = HubPort::from_id(body.get_u8());
    let event = match body.get_u8() {
        0x00 => AttachedIoEvent::Detached,
        code @ (0x01 | 0x02) => {
            require(MSG_HUB_ATTACHED_IO, body, 2)?;
            let io_type = body.get_u16_le();
            if code == 0x01 {
                AttachedIoEvent::Attached { io_type }
            } else {
                AttachedIoEvent::AttachedVirtual { io_type }
            }
        }
        other => return Err(CodecError::UnknownIoEvent(other)),
    };
    Ok(HubMessage::AttachedIo { port, event })
}

fn decode_feedback(mut body: &[u8]) -> Result<HubMessage, CodecError> {
    require(MSG_PORT_OUTPUT_FEEDBACK, body, 2)?;
    let mut entries = Vec::with_capacity(body.len() / 2);
    while body.len() >= 2 {
        let port = HubPort::from_id(body.get_u8());
        entries.push((port, FeedbackFlags(body.get_u8())));
    }
    Ok(HubMessage::PortFeedback(entries))
}
