//! RCON client and the command channel seam.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RconError;
use crate::protocol::{
    read_packet, write_packet, Packet, AUTH_FAILED_ID, PACKET_TYPE_AUTH, PACKET_TYPE_AUTH_RESPONSE,
    PACKET_TYPE_EXEC_COMMAND,
};

pub const DEFAULT_RCON_ADDR: &str = "127.0.0.1";
pub const DEFAULT_RCON_PORT: u16 = 25575;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;

const AUTH_REQUEST_ID: i32 = 1;
const EXEC_REQUEST_ID: i32 = 2;

/// Abstract remote command channel: one command in, success or failure out.
///
/// The shop core only ever sees this trait; transports and test doubles
/// implement it.
pub trait CommandChannel: Send + Sync {
    fn send(&self, command: &str) -> Result<String, RconError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RCON_ADDR.to_string(),
            port: DEFAULT_RCON_PORT,
            password: "changeme".to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

/// Connects, authenticates, executes one command and closes per send.
///
/// Keeping no live connection means a dead game server costs one failed
/// dial per command instead of a wedged session.
#[derive(Debug, Clone)]
pub struct RconClient {
    config: RconConfig,
}

impl RconClient {
    pub fn new(config: RconConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RconConfig {
        &self.config
    }

    fn connect(&self) -> Result<TcpStream, RconError> {
        let addr_spec = format!("{}:{}", self.config.host, self.config.port);
        let mut addrs = addr_spec.to_socket_addrs()?;
        let addr = addrs.next().ok_or_else(|| RconError::Io(format!(
            "no socket address for {addr_spec}"
        )))?;
        let stream =
            TcpStream::connect_timeout(&addr, Duration::from_millis(self.config.connect_timeout_ms))?;
        let io_timeout = Duration::from_millis(self.config.io_timeout_ms);
        stream.set_read_timeout(Some(io_timeout))?;
        stream.set_write_timeout(Some(io_timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn authenticate(&self, stream: &mut TcpStream) -> Result<(), RconError> {
        let auth = Packet::new(AUTH_REQUEST_ID, PACKET_TYPE_AUTH, self.config.password.clone());
        write_packet(stream, &auth)?;
        // Some servers preface the auth response with an empty response
        // value packet; skip anything that is not the auth response.
        loop {
            let packet = read_packet(stream)?;
            if packet.packet_type != PACKET_TYPE_AUTH_RESPONSE {
                continue;
            }
            if packet.id == AUTH_FAILED_ID {
                return Err(RconError::AuthFailed);
            }
            if packet.id != AUTH_REQUEST_ID {
                return Err(RconError::MalformedPacket {
                    reason: format!("auth response for unknown request id {}", packet.id),
                });
            }
            return Ok(());
        }
    }
}

impl CommandChannel for RconClient {
    fn send(&self, command: &str) -> Result<String, RconError> {
        let mut stream = self.connect()?;
        self.authenticate(&mut stream)?;
        let exec = Packet::new(EXEC_REQUEST_ID, PACKET_TYPE_EXEC_COMMAND, command);
        write_packet(&mut stream, &exec)?;
        let response = read_packet(&mut stream)?;
        if response.id != EXEC_REQUEST_ID {
            return Err(RconError::MalformedPacket {
                reason: format!("response for unknown request id {}", response.id),
            });
        }
        Ok(response.body)
    }
}
