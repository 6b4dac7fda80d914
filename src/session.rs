//! Per-session transfer state.
//!
//! A [`Session`] is the server-side record for one client exchange. The
//! role split matters: the sending side of a session (serving a download)
//! owns the file reader, its own sequence counter and the single
//! outstanding packet; the receiving side (accepting an upload) owns the
//! file writer and the next expected sequence. Modeling the two as a sum
//! type keeps each role's fields from leaking into the other.

use crate::error::TransferError;
use crate::packet::Packet;
use crate::storage::{ChunkReader, ChunkWriter};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Instant;

/// Direction of a transfer, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Upload,
    Download,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Upload => "UPLOAD",
            Op::Download => "DOWNLOAD",
        })
    }
}

impl FromStr for Op {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOAD" => Ok(Op::Upload),
            "DOWNLOAD" => Ok(Op::Download),
            other => Err(TransferError::Protocol(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

/// Lifecycle state of a server-side session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Data packets are flowing.
    Transferring,
    /// The sender has emitted FIN and waits for its acknowledgment.
    FinWait,
}

/// Role-specific transfer state.
pub enum TransferRole {
    /// This endpoint sends file chunks (server side of a download).
    Sender {
        reader: ChunkReader,
        /// Sequence number of the most recently emitted packet.
        seq_num: u32,
        /// The one packet awaiting acknowledgment. Never more than one.
        unacked: Option<Packet>,
    },
    /// This endpoint receives file chunks (server side of an upload).
    Receiver {
        writer: ChunkWriter,
        /// The sequence number the next accepted DATA must carry.
        expected_seq: u32,
    },
}

impl fmt::Debug for TransferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferRole::Sender { seq_num, unacked, .. } => f
                .debug_struct("Sender")
                .field("seq_num", seq_num)
                .field("unacked", &unacked.is_some())
                .finish(),
            TransferRole::Receiver { expected_seq, .. } => f
                .debug_struct("Receiver")
                .field("expected_seq", expected_seq)
                .finish(),
        }
    }
}

/// One live client exchange, owned by the server's session map.
#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub peer: SocketAddr,
    pub state: SessionState,
    pub role: TransferRole,
    /// When this session last transmitted anything; drives both the
    /// retransmission timer and the stale-session reaper.
    pub last_send_time: Instant,
}

impl Session {
    /// Session serving a download: the server is the sender and numbers its
    /// packets starting right after the SYN-ACK.
    pub fn download(
        id: u32,
        peer: SocketAddr,
        reader: ChunkReader,
        syn_seq: u32,
        now: Instant,
    ) -> Self {
        Session {
            id,
            peer,
            state: SessionState::Transferring,
            role: TransferRole::Sender {
                reader,
                seq_num: syn_seq.wrapping_add(1),
                unacked: None,
            },
            last_send_time: now,
        }
    }

    /// Session accepting an upload: the server is the receiver and expects
    /// the client's first DATA right after its SYN.
    pub fn upload(
        id: u32,
        peer: SocketAddr,
        writer: ChunkWriter,
        syn_seq: u32,
        now: Instant,
    ) -> Self {
        Session {
            id,
            peer,
            state: SessionState::Transferring,
            role: TransferRole::Receiver {
                writer,
                expected_seq: syn_seq.wrapping_add(1),
            },
            last_send_time: now,
        }
    }

    /// The transfer direction, from the client's point of view.
    pub fn op(&self) -> Op {
        match self.role {
            TransferRole::Sender { .. } => Op::Download,
            TransferRole::Receiver { .. } => Op::Upload,
        }
    }
}
