// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Fixed-layout wire types: the message header, the request/reply payloads,
//! and the raw notification frame. Pure encode/decode, no I/O.

use crate::error::ProtocolError;

/// Width of an object identifier, in bytes.
pub const ID_LEN: usize = 20;

/// An opaque, client-chosen content identifier.
pub type ObjectId = [u8; ID_LEN];

/// Size in bytes of a notification frame (just the raw identifier).
pub const NOTIFICATION_FRAME_LEN: usize = ID_LEN;

/// Size in bytes of the `(type, length)` message header.
const HEADER_LEN: usize = 16;

/// Request type codes. Numeric values are significant: they match an
/// existing wire format, so do not renumber them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum MessageType {
    Create = 128,
    Get = 129,
    Contains = 130,
    Seal = 131,
    Delete = 132,
    /// Unused by the core; reserved for wire compatibility.
    Transfer = 133,
    /// Unused by the core; reserved for wire compatibility.
    Data = 134,
    Subscribe = 135,
    Disconnect = 136,
}

impl TryFrom<i64> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            128 => Self::Create,
            129 => Self::Get,
            130 => Self::Contains,
            131 => Self::Seal,
            132 => Self::Delete,
            133 => Self::Transfer,
            134 => Self::Data,
            135 => Self::Subscribe,
            136 => Self::Disconnect,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// The message header: `(type, payload length)`, both big-endian i64.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub message_type: i64,
    pub length: i64,
}

impl Header {
    pub fn encode(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..8].copy_from_slice(&self.message_type.to_be_bytes());
        buf[8..].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        let message_type = i64::from_be_bytes(buf[..8].try_into().unwrap());
        let length = i64::from_be_bytes(buf[8..].try_into().unwrap());
        Self {
            message_type,
            length,
        }
    }

    pub const LEN: usize = HEADER_LEN;
}

/// Request payload: `{ id: 20 bytes, data_size: i64, metadata_size: i64, addr: 4 bytes, port: i32 }`.
///
/// `addr`/`port` are carried on the wire for compatibility with existing
/// clients but are unused by the core (spec'd as such).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestPayload {
    pub id: ObjectId,
    pub data_size: i64,
    pub metadata_size: i64,
    pub addr: [u8; 4],
    pub port: i32,
}

impl RequestPayload {
    pub const LEN: usize = ID_LEN + 8 + 8 + 4 + 4;

    pub fn serialize_alloc(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.extend_from_slice(&self.id);
        buf.extend_from_slice(&self.data_size.to_be_bytes());
        buf.extend_from_slice(&self.metadata_size.to_be_bytes());
        buf.extend_from_slice(&self.addr);
        buf.extend_from_slice(&self.port.to_be_bytes());
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::LEN {
            return Err(ProtocolError::Truncated);
        }

        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&buf[..ID_LEN]);
        let mut off = ID_LEN;

        let data_size = i64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let metadata_size = i64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;

        let mut addr = [0u8; 4];
        addr.copy_from_slice(&buf[off..off + 4]);
        off += 4;

        let port = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());

        Ok(Self {
            id,
            data_size,
            metadata_size,
            addr,
            port,
        })
    }
}

/// Reply payload: fixed-size regardless of which request type it answers.
/// Whether a passed fd accompanies the reply is decided by the dispatcher
/// at each call site (CREATE/GET/SEAL pass one, CONTAINS does not), not by
/// this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplyPayload {
    pub data_offset: i64,
    pub metadata_offset: i64,
    pub map_size: i64,
    pub data_size: i64,
    pub metadata_size: i64,
    pub has_object: i32,
    pub store_fd_val: i32,
}

impl ReplyPayload {
    pub const LEN: usize = 8 * 5 + 4 + 4;

    pub fn serialize_alloc(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.extend_from_slice(&self.data_offset.to_be_bytes());
        buf.extend_from_slice(&self.metadata_offset.to_be_bytes());
        buf.extend_from_slice(&self.map_size.to_be_bytes());
        buf.extend_from_slice(&self.data_size.to_be_bytes());
        buf.extend_from_slice(&self.metadata_size.to_be_bytes());
        buf.extend_from_slice(&self.has_object.to_be_bytes());
        buf.extend_from_slice(&self.store_fd_val.to_be_bytes());
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::LEN {
            return Err(ProtocolError::Truncated);
        }

        let mut off = 0;
        let mut next_i64 = || {
            let v = i64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
            off += 8;
            v
        };

        let data_offset = next_i64();
        let metadata_offset = next_i64();
        let map_size = next_i64();
        let data_size = next_i64();
        let metadata_size = next_i64();

        let has_object = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let store_fd_val = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());

        Ok(Self {
            data_offset,
            metadata_offset,
            map_size,
            data_size,
            metadata_size,
            has_object,
            store_fd_val,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_payload_round_trips() {
        let req = RequestPayload {
            id: [7u8; ID_LEN],
            data_size: 8,
            metadata_size: 0,
            addr: [0, 0, 0, 0],
            port: 0,
        };

        let bytes = req.serialize_alloc();
        assert_eq!(bytes.len(), RequestPayload::LEN);

        let back = RequestPayload::deserialize(&bytes).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn reply_payload_round_trips() {
        let reply = ReplyPayload {
            data_offset: 0,
            metadata_offset: 8,
            map_size: 8,
            data_size: 8,
            metadata_size: 0,
            has_object: 1,
            store_fd_val: 0,
        };

        let bytes = reply.serialize_alloc();
        let back = ReplyPayload::deserialize(&bytes).unwrap();
        assert_eq!(reply, back);
    }

    #[test]
    fn header_round_trips() {
        let header = Header {
            message_type: MessageType::Create as i64,
            length: RequestPayload::LEN as i64,
        };

        let bytes = header.encode();
        let back = Header::decode(&bytes);
        assert_eq!(header.message_type, back.message_type);
        assert_eq!(header.length, back.length);
    }

    #[test]
    fn message_type_codes_match_protocol_numbering() {
        assert_eq!(MessageType::try_from(128).unwrap(), MessageType::Create);
        assert_eq!(MessageType::try_from(136).unwrap(), MessageType::Disconnect);
        assert!(MessageType::try_from(1).is_err());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        assert!(matches!(
            RequestPayload::deserialize(&[0u8; 4]),
            Err(ProtocolError::Truncated)
        ));
    }
}
