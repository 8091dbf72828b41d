//! Messages exchanged with the microcontroller and their frame layout.
//!
//! Every frame is `[command code][payload length][payload]`, one byte each for the
//! code and the length.

use std::fmt::Display;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Bytes preceding the payload in a frame.
pub const HEADER_LEN: usize = 2;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde_repr::Serialize_repr,
    serde_repr::Deserialize_repr,
)]
#[repr(u8)]
pub enum CommandKind {
    Password = 0x01,
    ComputerStatus = 0x02,
    Uid = 0x03,
}

impl CommandKind {
    /// Order in which the dispatcher services the kinds each cycle.
    pub const ALL: [CommandKind; 3] = [
        CommandKind::Password,
        CommandKind::ComputerStatus,
        CommandKind::Uid,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(CommandKind::Password),
            0x02 => Ok(CommandKind::ComputerStatus),
            0x03 => Ok(CommandKind::Uid),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

impl Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandKind::Password => "password",
            CommandKind::ComputerStatus => "computer status",
            CommandKind::Uid => "uid",
        };
        write!(f, "{}", s)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr,
)]
#[repr(u8)]
pub enum ComputerStatus {
    Unlocked = 0x00,
    Locked = 0x01,
}

impl ComputerStatus {
    pub fn from_locked(locked: bool) -> Self {
        if locked {
            ComputerStatus::Locked
        } else {
            ComputerStatus::Unlocked
        }
    }
}

impl Display for ComputerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComputerStatus::Unlocked => "Unlocked",
            ComputerStatus::Locked => "Locked",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command code {0:#04x}")]
    UnknownCommand(u8),
    #[error("payload of {0} bytes exceeds the 255 byte frame limit")]
    PayloadTooLarge(usize),
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// One unit of protocol traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: CommandKind,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: CommandKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    pub fn password(password: &str) -> Self {
        Self::new(CommandKind::Password, password.as_bytes().to_vec())
    }

    pub fn status(status: ComputerStatus) -> Self {
        Self::new(CommandKind::ComputerStatus, vec![status as u8])
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let len = u8::try_from(self.payload.len())
            .map_err(|_| FrameError::PayloadTooLarge(self.payload.len()))?;
        let mut frame = Vec::with_capacity(HEADER_LEN + self.payload.len());
        frame.push(self.kind.code());
        frame.push(len);
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }

    /// Decodes exactly one frame. Trailing bytes are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN,
                actual: frame.len(),
            });
        }
        let kind = CommandKind::try_from(frame[0])?;
        let expected = HEADER_LEN + frame[1] as usize;
        if frame.len() < expected {
            return Err(FrameError::Truncated {
                expected,
                actual: frame.len(),
            });
        }
        Ok(Self::new(kind, frame[HEADER_LEN..expected].to_vec()))
    }
}
