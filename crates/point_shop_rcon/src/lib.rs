//! Remote command channel for the point shop.
//!
//! The game server is reached over the Source RCON protocol: a framed,
//! authenticated, line-of-command transport. This crate provides:
//! - the packet codec (`protocol`),
//! - the [`CommandChannel`] seam the shop core delivers through,
//! - [`RconClient`], a connect-auth-exec-close client implementation.

mod client;
mod error;
mod protocol;

pub use client::{CommandChannel, RconClient, RconConfig, DEFAULT_RCON_ADDR, DEFAULT_RCON_PORT};
pub use error::RconError;
pub use protocol::{
    read_packet, write_packet, Packet, MAX_PACKET_BODY_LEN, PACKET_TYPE_AUTH,
    PACKET_TYPE_AUTH_RESPONSE, PACKET_TYPE_EXEC_COMMAND, PACKET_TYPE_RESPONSE_VALUE,
};
