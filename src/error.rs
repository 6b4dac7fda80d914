//! Error types for the RDT-UDP transfer system.
//!
//! This module defines the error types used throughout the transfer system.
//! Errors are designed to provide context about what went wrong and where.
//! Decode failures (`ShortDatagram`, `ChecksumMismatch`, `UnknownPacketType`)
//! are recovered locally by discarding the datagram; the peer's
//! retransmission restores progress.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during file transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// An I/O error occurred during file or network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize data to TOML format.
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Failed to deserialize data from TOML format.
    #[error("TOML deserialization error: {0}")]
    TomlDeserialization(#[from] toml::de::Error),

    /// A datagram was shorter than the fixed packet header.
    #[error("datagram too short: {len} bytes, need at least {min}")]
    ShortDatagram { len: usize, min: usize },

    /// The XOR integrity byte did not match the packet contents.
    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },

    /// The packet carried a type byte outside the known message types.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// A protocol-level error occurred (invalid message, bad handshake, etc.).
    #[error("transfer protocol error: {0}")]
    Protocol(String),

    /// The remote peer reported an error.
    #[error("received error from remote: {0}")]
    Remote(String),

    /// No response was received from the remote peer within the retry budget.
    #[error("no response from remote")]
    NoResponse,

    /// The requested file was not found.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
}
