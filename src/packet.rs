//! Wire format and packet codec.
//!
//! Every datagram carries one packet: a fixed 12-byte Big-Endian header
//! followed by up to 1024 payload bytes.
//!
//! ```text
//! [0]       type (u8)
//! [1..5]    sequence number (u32 BE)
//! [5..9]    session id (u32 BE)
//! [9..11]   payload length (u16 BE)
//! [11]      checksum: XOR of the 11 preceding bytes and the payload
//! [12..]    payload (up to 1024 bytes)
//! ```
//!
//! The same codec serves both directions. At parse time the payload is
//! truncated to `min(stated length, trailing bytes, 1024)` before the
//! checksum is recomputed, which bounds memory against a hostile length
//! field.

use crate::error::TransferError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum payload bytes per packet.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 12;

/// Maximum datagram size (header + payload).
pub const MAX_DATAGRAM_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Message types carried in the packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Session open request; payload is `"<OP>|<filename>"`.
    Syn = 0,
    /// Session open confirmation; payload is `"OK"`.
    SynAck = 1,
    /// File chunk.
    Data = 2,
    /// Acknowledgment of the packet with the same sequence number.
    Ack = 3,
    /// End of transfer from the sending side.
    Fin = 4,
    /// Reserved acknowledgment variant. Never emitted; accepted as an
    /// alias for [`PacketType::Ack`] for compatibility with older peers.
    FinAck = 5,
    /// Fatal session error; payload is a human-readable message.
    Error = 6,
}

impl PacketType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketType::Syn),
            1 => Some(PacketType::SynAck),
            2 => Some(PacketType::Data),
            3 => Some(PacketType::Ack),
            4 => Some(PacketType::Fin),
            5 => Some(PacketType::FinAck),
            6 => Some(PacketType::Error),
            _ => None,
        }
    }

    /// True for the two acknowledgment types.
    pub fn is_ack(self) -> bool {
        matches!(self, PacketType::Ack | PacketType::FinAck)
    }
}

/// A single protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub seq: u32,
    pub session: u32,
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet with a payload.
    ///
    /// # Panics
    /// Panics if the payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn new(
        packet_type: PacketType,
        seq: u32,
        session: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        let payload = payload.into();
        assert!(payload.len() <= MAX_PAYLOAD_SIZE);
        Packet {
            packet_type,
            seq,
            session,
            payload,
        }
    }

    /// Create a packet with an empty payload (ACK, FIN).
    pub fn control(packet_type: PacketType, seq: u32, session: u32) -> Self {
        Packet {
            packet_type,
            seq,
            session,
            payload: Bytes::new(),
        }
    }

    /// Serialize the packet for transmission.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.packet_type as u8);
        buf.put_u32(self.seq);
        buf.put_u32(self.session);
        buf.put_u16(self.payload.len() as u16);
        buf.put_u8(xor_checksum(
            self.packet_type as u8,
            self.seq,
            self.session,
            &self.payload,
        ));
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a datagram back into a packet.
    ///
    /// The payload is truncated to the stated length (capped at
    /// [`MAX_PAYLOAD_SIZE`]) before the checksum is recomputed over the
    /// reconstructed packet and compared against the received byte.
    pub fn decode(data: &[u8]) -> Result<Self, TransferError> {
        if data.len() < HEADER_SIZE {
            return Err(TransferError::ShortDatagram {
                len: data.len(),
                min: HEADER_SIZE,
            });
        }

        let mut header = &data[..HEADER_SIZE];
        let type_byte = header.get_u8();
        let seq = header.get_u32();
        let session = header.get_u32();
        let stated_len = header.get_u16() as usize;
        let received = header.get_u8();

        let trailing = &data[HEADER_SIZE..];
        let take = stated_len.min(trailing.len()).min(MAX_PAYLOAD_SIZE);
        let payload = &trailing[..take];

        let computed = xor_checksum(type_byte, seq, session, payload);
        if computed != received {
            return Err(TransferError::ChecksumMismatch { computed, received });
        }

        let packet_type = PacketType::from_u8(type_byte)
            .ok_or(TransferError::UnknownPacketType(type_byte))?;

        Ok(Packet {
            packet_type,
            seq,
            session,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// XOR of the 11 header bytes (with the payload length re-derived from
/// `payload`) folded with every payload byte.
fn xor_checksum(type_byte: u8, seq: u32, session: u32, payload: &[u8]) -> u8 {
    let mut sum = type_byte;
    for b in seq.to_be_bytes() {
        sum ^= b;
    }
    for b in session.to_be_bytes() {
        sum ^= b;
    }
    for b in (payload.len() as u16).to_be_bytes() {
        sum ^= b;
    }
    for &b in payload {
        sum ^= b;
    }
    sum
}
