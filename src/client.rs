//! Client-side transfer engine.
//!
//! A client drives exactly one session: it picks a random session id and
//! initial sequence number, performs the SYN handshake, then either streams
//! the file up (stop-and-wait, one DATA outstanding) or receives it down
//! (acknowledging each in-order chunk). Every wait is bounded by the
//! retransmission timeout; a timeout retransmits whatever this side is
//! responsible for.

use crate::config::{
    ClientConfig, INITIAL_SEQ_RANGE, MAX_FIN_ATTEMPTS, RETRANSMIT_TIMEOUT, SESSION_ID_RANGE,
    DOWNLOAD_PREFIX,
};
use crate::error::TransferError;
use crate::packet::{Packet, PacketType, MAX_DATAGRAM_SIZE};
use crate::progress::TransferProgress;
use crate::session::Op;
use crate::sim::DropSimulator;
use crate::storage::{sanitize_filename, ChunkReader, ChunkWriter};
use crate::transport::{Transport, UdpTransport};
use rand::Rng;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Client-side protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No handshake attempted yet.
    Closed,
    /// SYN emitted, waiting for SYN-ACK.
    SynSent,
    /// Data phase.
    Transferring,
    /// FIN emitted (upload only), waiting for its acknowledgment.
    FinSent,
    /// Terminal state, reached on success and on failure.
    Done,
}

/// A single-session transfer client.
pub struct Client<T: Transport> {
    transport: T,
    server: SocketAddr,
    session_id: u32,
    seq_num: u32,
    state: ClientState,
    drop_sim: DropSimulator,
    download_directory: PathBuf,
    progress_enabled: bool,
}

impl Client<UdpTransport> {
    /// Bind an ephemeral UDP socket and pick random session parameters.
    pub fn connect(server: SocketAddr) -> Result<Self, TransferError> {
        let mut rng = rand::thread_rng();
        let session_id = rng.gen_range(SESSION_ID_RANGE);
        let seq_num = rng.gen_range(INITIAL_SEQ_RANGE);
        Ok(Self::with_transport(
            UdpTransport::ephemeral()?,
            server,
            session_id,
            seq_num,
        ))
    }

    /// Apply client configuration to an already connected client.
    pub fn configure(&mut self, config: &ClientConfig) {
        self.download_directory = PathBuf::from(&config.download_directory);
        self.progress_enabled = config.progress_bar_enabled;
    }
}

impl<T: Transport> Client<T> {
    /// Build a client on an explicit transport with explicit session
    /// parameters. This is the seam the deterministic tests drive.
    pub fn with_transport(
        transport: T,
        server: SocketAddr,
        session_id: u32,
        seq_num: u32,
    ) -> Self {
        Client {
            transport,
            server,
            session_id,
            seq_num,
            state: ClientState::Closed,
            drop_sim: DropSimulator::disabled(),
            download_directory: PathBuf::from("."),
            progress_enabled: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn set_download_directory(&mut self, dir: impl Into<PathBuf>) {
        self.download_directory = dir.into();
    }

    pub fn set_progress_enabled(&mut self, enabled: bool) {
        self.progress_enabled = enabled;
    }

    /// Install an ingress drop simulator, for loss testing.
    pub fn set_drop_simulator(&mut self, sim: DropSimulator) {
        self.drop_sim = sim;
    }

    /// Download `filename` from the server into the download directory as
    /// `downloaded_<basename>`.
    pub fn download(&mut self, filename: &str) -> Result<(), TransferError> {
        let name = sanitize_filename(filename).to_owned();
        let syn_ack_seq = self.handshake(Op::Download, &name)?;

        // The server numbers its packets independently; its first DATA
        // follows directly on its SYN-ACK.
        let mut expected_seq = syn_ack_seq.wrapping_add(1);

        let out_path = self
            .download_directory
            .join(format!("{DOWNLOAD_PREFIX}{name}"));
        let mut writer = ChunkWriter::create(&out_path)?;
        let progress = self.progress(None);
        let mut received: u64 = 0;

        loop {
            let Some(packet) = self.recv()? else {
                debug!("waiting for data from server");
                continue;
            };

            match packet.packet_type {
                PacketType::Data => {
                    if packet.seq == expected_seq {
                        writer.write_chunk(&packet.payload)?;
                        received += packet.payload.len() as u64;
                        progress.update(packet.payload.len() as u64);
                        expected_seq = expected_seq.wrapping_add(1);
                        self.send(&Packet::control(
                            PacketType::Ack,
                            packet.seq,
                            self.session_id,
                        ))?;
                    } else if packet.seq < expected_seq {
                        // Our ACK got lost; acknowledge again without
                        // writing the chunk a second time.
                        debug!(seq = packet.seq, "duplicate DATA, resending ACK");
                        self.send(&Packet::control(
                            PacketType::Ack,
                            packet.seq,
                            self.session_id,
                        ))?;
                    } else {
                        debug!(
                            seq = packet.seq,
                            expected_seq, "DATA from the future, discarding"
                        );
                    }
                }
                PacketType::Fin => {
                    self.send(&Packet::control(
                        PacketType::Ack,
                        packet.seq,
                        self.session_id,
                    ))?;
                    writer.finish()?;
                    progress.finish();
                    self.state = ClientState::Done;
                    info!(bytes = received, path = %out_path.display(), "download complete");
                    return Ok(());
                }
                PacketType::Error => {
                    progress.finish();
                    self.state = ClientState::Done;
                    let message = String::from_utf8_lossy(&packet.payload).into_owned();
                    warn!(message = %message, "server reported error");
                    return Err(TransferError::Remote(message));
                }
                _ => {}
            }
        }
    }

    /// Upload the local file at `path` under its base name.
    pub fn upload(&mut self, path: &Path) -> Result<(), TransferError> {
        if !path.is_file() {
            return Err(TransferError::FileNotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::Protocol("filename is not valid UTF-8".into()))?
            .to_owned();

        let mut reader = ChunkReader::open(path)?;
        let total = reader.len()?;
        self.handshake(Op::Upload, &name)?;

        // Our first DATA follows directly on the SYN.
        self.seq_num = self.seq_num.wrapping_add(1);
        let progress = self.progress(Some(total));

        loop {
            let chunk = reader.read_chunk()?;
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len() as u64;
            let data = Packet::new(PacketType::Data, self.seq_num, self.session_id, chunk);
            self.send_until_acked(&data, None)?;
            progress.update(len);
            self.seq_num = self.seq_num.wrapping_add(1);
        }

        self.state = ClientState::FinSent;
        let fin = Packet::control(PacketType::Fin, self.seq_num, self.session_id);
        self.send_until_acked(&fin, Some(MAX_FIN_ATTEMPTS))?;

        progress.finish();
        self.state = ClientState::Done;
        info!(bytes = total, "upload complete");
        Ok(())
    }

    /// Emit SYN until the server answers. Returns the SYN-ACK sequence
    /// number on success.
    fn handshake(&mut self, op: Op, filename: &str) -> Result<u32, TransferError> {
        let syn = Packet::new(
            PacketType::Syn,
            self.seq_num,
            self.session_id,
            format!("{op}|{filename}").into_bytes(),
        );
        info!(session_id = self.session_id, %op, filename, "starting handshake");
        self.state = ClientState::SynSent;

        loop {
            self.send(&syn)?;
            let Some(packet) = self.recv()? else {
                warn!("handshake timeout, retransmitting SYN");
                continue;
            };

            match packet.packet_type {
                PacketType::SynAck if packet.seq == self.seq_num.wrapping_add(1) => {
                    debug!(seq = packet.seq, "received SYN-ACK");
                    self.state = ClientState::Transferring;
                    return Ok(packet.seq);
                }
                PacketType::Error => {
                    self.state = ClientState::Done;
                    let message = String::from_utf8_lossy(&packet.payload).into_owned();
                    warn!(message = %message, "server rejected handshake");
                    return Err(TransferError::Remote(message));
                }
                _ => {
                    debug!(packet_type = ?packet.packet_type, "unexpected packet during handshake");
                }
            }
        }
    }

    /// Stop-and-wait send: transmit `packet` and wait for its
    /// acknowledgment, retransmitting on every timeout. `max_attempts`
    /// bounds the transmissions when the peer may legitimately be gone.
    fn send_until_acked(
        &mut self,
        packet: &Packet,
        max_attempts: Option<u32>,
    ) -> Result<(), TransferError> {
        let mut attempts = 0u32;

        while max_attempts.map_or(true, |max| attempts < max) {
            self.send(packet)?;
            attempts += 1;

            match self.recv()? {
                Some(reply) if reply.packet_type.is_ack() && reply.seq == packet.seq => {
                    return Ok(());
                }
                Some(reply) if reply.packet_type == PacketType::Error => {
                    self.state = ClientState::Done;
                    let message = String::from_utf8_lossy(&reply.payload).into_owned();
                    warn!(message = %message, "server reported error");
                    return Err(TransferError::Remote(message));
                }
                Some(reply) => {
                    debug!(packet_type = ?reply.packet_type, seq = reply.seq, "ignoring stray packet");
                }
                None => {
                    warn!(seq = packet.seq, attempts, "timeout waiting for ACK, retransmitting");
                }
            }
        }

        self.state = ClientState::Done;
        Err(TransferError::NoResponse)
    }

    fn send(&mut self, packet: &Packet) -> Result<(), TransferError> {
        self.transport.send_to(&packet.encode(), self.server)?;
        Ok(())
    }

    /// Receive one packet of this session, or `None` on timeout. Simulated
    /// drops, undecodable datagrams and foreign sessions all read as
    /// timeouts to the callers.
    fn recv(&mut self) -> Result<Option<Packet>, TransferError> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let Some((len, peer)) = self.transport.recv_from(&mut buf, RETRANSMIT_TIMEOUT)? else {
            return Ok(None);
        };
        if self.drop_sim.should_drop() {
            debug!(%peer, "simulating ingress drop");
            return Ok(None);
        }
        match Packet::decode(&buf[..len]) {
            Ok(packet) if packet.session == self.session_id => Ok(Some(packet)),
            Ok(packet) => {
                debug!(session_id = packet.session, "packet for another session");
                Ok(None)
            }
            Err(e) => {
                warn!(%peer, error = %e, "discarding undecodable datagram");
                Ok(None)
            }
        }
    }

    fn progress(&self, total: Option<u64>) -> TransferProgress {
        if self.progress_enabled {
            TransferProgress::new(total)
        } else {
            TransferProgress::hidden()
        }
    }
}
