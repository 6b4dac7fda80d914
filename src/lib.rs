//! RDT-UDP - Reliable file transfer over UDP.
//!
//! RDT-UDP layers a stop-and-wait ARQ discipline on top of plain UDP
//! datagrams. A single server process serves many concurrent sessions over
//! one socket; each client invocation performs one upload or one download.
//!
//! # Features
//!
//! - **Reliable**: per-packet XOR integrity check, retransmission on timeout,
//!   duplicate suppression
//! - **Multiplexed**: one server socket, many independent sessions keyed by
//!   session id, no per-session threads
//! - **Testable**: both engines are generic over the datagram transport and
//!   the clock, so loss, duplication and staleness paths run in unit tests
//! - **Configurable**: TOML configuration for both endpoints
//!
//! # Example
//!
//! ```no_run
//! use rdt_udp::{Client, TransferError};
//!
//! fn main() -> Result<(), TransferError> {
//!     let mut client = Client::connect("127.0.0.1:8080".parse().unwrap())?;
//!     client.download("report.pdf")?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod packet;
pub mod progress;
pub mod server;
pub mod session;
pub mod sim;
pub mod storage;
pub mod transport;

pub use client::Client;
pub use config::Config;
pub use error::TransferError;
pub use packet::{Packet, PacketType};
pub use server::Server;
pub use sim::DropSimulator;

// Re-export commonly used types for convenience
pub use bytes;
