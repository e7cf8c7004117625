//! Error types for the RCON channel.

use std::io;

/// Errors that can occur while talking to the remote console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconError {
    Io(String),
    AuthFailed,
    MalformedPacket { reason: String },
    BodyTooLarge { len: usize },
    UnexpectedPacketType { expected: i32, found: i32 },
}

impl From<io::Error> for RconError {
    fn from(error: io::Error) -> Self {
        RconError::Io(error.to_string())
    }
}
