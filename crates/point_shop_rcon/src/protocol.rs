//! Source RCON packet codec.
//!
//! Wire layout, all integers little-endian i32:
//! `[length][id][type][body bytes][0x00][0x00]` where `length` counts
//! everything after itself (id + type + body + two trailing NULs).

use std::io::{Read, Write};

use crate::error::RconError;

pub const PACKET_TYPE_AUTH: i32 = 3;
pub const PACKET_TYPE_AUTH_RESPONSE: i32 = 2;
pub const PACKET_TYPE_EXEC_COMMAND: i32 = 2;
pub const PACKET_TYPE_RESPONSE_VALUE: i32 = 0;

/// Servers answer a failed authentication with this request id.
pub const AUTH_FAILED_ID: i32 = -1;

/// Upper bound on a single command or response body.
pub const MAX_PACKET_BODY_LEN: usize = 4096;

// id + type + two trailing NULs
const PACKET_OVERHEAD: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub packet_type: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, packet_type: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            packet_type,
            body: body.into(),
        }
    }
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, RconError> {
    let body = packet.body.as_bytes();
    if body.len() > MAX_PACKET_BODY_LEN {
        return Err(RconError::BodyTooLarge { len: body.len() });
    }
    let length = (body.len() + PACKET_OVERHEAD) as i32;
    let mut bytes = Vec::with_capacity(body.len() + PACKET_OVERHEAD + 4);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.extend_from_slice(&packet.id.to_le_bytes());
    bytes.extend_from_slice(&packet.packet_type.to_le_bytes());
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(&[0, 0]);
    Ok(bytes)
}

pub fn write_packet(writer: &mut impl Write, packet: &Packet) -> Result<(), RconError> {
    let bytes = encode_packet(packet)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

pub fn read_packet(reader: &mut impl Read) -> Result<Packet, RconError> {
    let length = read_le_i32(reader)?;
    if (length as usize) < PACKET_OVERHEAD || length as usize > MAX_PACKET_BODY_LEN + PACKET_OVERHEAD
    {
        return Err(RconError::MalformedPacket {
            reason: format!("packet length {length} out of range"),
        });
    }
    let id = read_le_i32(reader)?;
    let packet_type = read_le_i32(reader)?;
    let body_len = length as usize - PACKET_OVERHEAD;
    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body)?;
    let mut tail = [0u8; 2];
    reader.read_exact(&mut tail)?;
    if tail != [0, 0] {
        return Err(RconError::MalformedPacket {
            reason: "missing packet terminator".to_string(),
        });
    }
    let body = String::from_utf8(body).map_err(|_| RconError::MalformedPacket {
        reason: "packet body is not valid utf-8".to_string(),
    })?;
    Ok(Packet {
        id,
        packet_type,
        body,
    })
}

fn read_le_i32(reader: &mut impl Read) -> Result<i32, RconError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}
