//! Server-side transfer engine.
//!
//! One datagram socket serves every client. The server runs a single
//! receive loop: each incoming datagram is decoded and dispatched to the
//! session it names, and each receive timeout triggers a sweep that
//! retransmits unacknowledged packets and reaps sessions that have gone
//! silent. Sessions never run on their own threads, so no locking is
//! involved; dispatch order is datagram arrival order.

use crate::clock::{Clock, MonotonicClock};
use crate::config::{
    ServerConfig, FIN_GRACE_PERIOD, RETRANSMIT_TIMEOUT, STALE_SESSION_TIMEOUT,
};
use crate::error::TransferError;
use crate::packet::{Packet, PacketType, MAX_DATAGRAM_SIZE};
use crate::session::{Op, Session, SessionState, TransferRole};
use crate::sim::DropSimulator;
use crate::storage::Storage;
use crate::transport::{Transport, UdpTransport};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Upload session that completed recently. Kept around so a retransmitted
/// FIN (whose ACK was lost) still gets acknowledged instead of being
/// discarded as an unknown session, which would leave the client
/// retransmitting until its retry budget runs out.
struct CompletedUpload {
    peer: SocketAddr,
    fin_seq: u32,
    closed_at: Instant,
}

/// The multi-session transfer server.
pub struct Server<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    storage: Storage,
    drop_sim: DropSimulator,
    sessions: HashMap<u32, Session>,
    completed_uploads: HashMap<u32, CompletedUpload>,
}

impl Server<UdpTransport, MonotonicClock> {
    /// Bind a UDP server socket according to `config`.
    pub fn bind(config: &ServerConfig) -> Result<Self, TransferError> {
        let transport = UdpTransport::bind((config.address.as_str(), config.port))?;
        let storage = Storage::new(&config.storage_directory)?;
        let drop_sim = DropSimulator::new(f64::from(config.drop_rate_percent) / 100.0);
        Ok(Self::new(transport, MonotonicClock, storage, drop_sim))
    }
}

impl<T: Transport, C: Clock> Server<T, C> {
    /// Assemble a server from its collaborators.
    pub fn new(transport: T, clock: C, storage: Storage, drop_sim: DropSimulator) -> Self {
        Server {
            transport,
            clock,
            storage,
            drop_sim,
            sessions: HashMap::new(),
            completed_uploads: HashMap::new(),
        }
    }

    /// The address the server socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransferError> {
        Ok(self.transport.local_addr()?)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run the receive loop forever.
    ///
    /// Returns only if the transport fails fatally; per-packet decode and
    /// storage errors are handled inside the loop.
    pub fn run(&mut self) -> Result<(), TransferError> {
        info!(
            address = %self.transport.local_addr()?,
            drop_rate = self.drop_sim.rate(),
            "server listening"
        );
        loop {
            self.poll_once()?;
        }
    }

    /// One receive cycle: wait up to the retransmission timeout for a
    /// datagram and dispatch it, or run the sweep if the wait timed out.
    pub fn poll_once(&mut self) -> Result<(), TransferError> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        match self.transport.recv_from(&mut buf, RETRANSMIT_TIMEOUT)? {
            Some((len, peer)) => {
                if self.drop_sim.should_drop() {
                    debug!(%peer, "simulating ingress drop");
                    return Ok(());
                }
                self.handle_datagram(&buf[..len], peer);
            }
            None => self.sweep(),
        }
        Ok(())
    }

    /// Decode one datagram and dispatch it to its session.
    fn handle_datagram(&mut self, data: &[u8], peer: SocketAddr) {
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(%peer, error = %e, "discarding undecodable datagram");
                return;
            }
        };

        debug!(
            packet_type = ?packet.packet_type,
            seq = packet.seq,
            session_id = packet.session,
            %peer,
            "received packet"
        );

        match packet.packet_type {
            PacketType::Syn => self.handle_syn(&packet, peer),
            _ if self.sessions.contains_key(&packet.session) => match packet.packet_type {
                PacketType::Data => self.handle_data(&packet),
                PacketType::Ack | PacketType::FinAck => self.handle_ack(&packet),
                PacketType::Fin => self.handle_fin(&packet),
                packet_type => {
                    debug!(session_id = packet.session, ?packet_type, "ignoring packet type");
                }
            },
            PacketType::Fin => self.reack_completed_fin(&packet),
            _ => {
                debug!(session_id = packet.session, "packet for unknown session");
            }
        }
    }

    /// Accept a SYN: parse `"<OP>|<filename>"`, open the file and create
    /// the session, answering SYN-ACK (or ERROR when the request cannot be
    /// served).
    fn handle_syn(&mut self, packet: &Packet, peer: SocketAddr) {
        let payload = match std::str::from_utf8(&packet.payload) {
            Ok(payload) => payload,
            Err(_) => {
                warn!(session_id = packet.session, %peer, "SYN payload is not UTF-8");
                return;
            }
        };
        let Some((op_token, filename)) = payload.split_once('|') else {
            self.send_error(
                packet.session,
                peer,
                packet.seq.wrapping_add(1),
                "Invalid SYN payload format",
            );
            return;
        };
        let op = match op_token.parse::<Op>() {
            Ok(op) => op,
            Err(_) => {
                warn!(session_id = packet.session, op = op_token, "unknown SYN operation");
                return;
            }
        };

        if let Some(old) = self.sessions.remove(&packet.session) {
            // A client restart can reuse a live id; the fresh SYN wins and
            // the old file handle is released.
            warn!(
                session_id = packet.session,
                old_op = %old.op(),
                "replacing existing session"
            );
        }

        let now = self.clock.now();
        let syn_ack_seq = packet.seq.wrapping_add(1);

        match op {
            Op::Download => {
                let reader = match self.storage.open_source(filename) {
                    Ok(reader) => reader,
                    Err(e) => {
                        debug!(session_id = packet.session, filename, error = %e, "download rejected");
                        self.send_error(packet.session, peer, syn_ack_seq, "File not found");
                        return;
                    }
                };

                info!(session_id = packet.session, filename, "starting download");
                let session = Session::download(packet.session, peer, reader, packet.seq, now);
                let syn_ack =
                    Packet::new(PacketType::SynAck, syn_ack_seq, packet.session, &b"OK"[..]);
                self.send(&syn_ack, peer);
                self.sessions.insert(packet.session, session);

                // The first chunk goes out right behind the SYN-ACK.
                self.send_next_data(packet.session);
            }
            Op::Upload => {
                let writer = match self.storage.create_target(filename) {
                    Ok(writer) => writer,
                    Err(e) => {
                        error!(session_id = packet.session, filename, error = %e, "cannot create upload target");
                        self.send_error(packet.session, peer, syn_ack_seq, "Storage error");
                        return;
                    }
                };

                info!(session_id = packet.session, filename, "starting upload");
                let session = Session::upload(packet.session, peer, writer, packet.seq, now);
                let syn_ack =
                    Packet::new(PacketType::SynAck, syn_ack_seq, packet.session, &b"OK"[..]);
                self.send(&syn_ack, peer);
                self.sessions.insert(packet.session, session);
            }
        }
    }

    /// Emit the next DATA chunk (or FIN at end of file) for a sending
    /// session. No-op while a packet is still outstanding.
    fn send_next_data(&mut self, session_id: u32) {
        let now = self.clock.now();
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        let peer = session.peer;
        let TransferRole::Sender {
            reader,
            seq_num,
            unacked,
        } = &mut session.role
        else {
            return;
        };
        if session.state != SessionState::Transferring || unacked.is_some() {
            return;
        }

        let chunk = match reader.read_chunk() {
            Ok(chunk) => chunk,
            Err(e) => {
                error!(session_id, error = %e, "read failed, dropping session");
                let err_seq = seq_num.wrapping_add(1);
                self.sessions.remove(&session_id);
                self.send_error(session_id, peer, err_seq, "Storage error");
                return;
            }
        };

        *seq_num = seq_num.wrapping_add(1);
        let packet = if chunk.is_empty() {
            info!(session_id, "end of file, sending FIN");
            session.state = SessionState::FinWait;
            Packet::control(PacketType::Fin, *seq_num, session_id)
        } else {
            Packet::new(PacketType::Data, *seq_num, session_id, chunk)
        };

        self.transport
            .send_to(&packet.encode(), peer)
            .unwrap_or_else(|e| warn!(session_id, error = %e, "send failed"));
        *unacked = Some(packet);
        session.last_send_time = now;
    }

    /// Acknowledge the outstanding packet of a sending session, advancing
    /// the transfer or closing it out after the FIN.
    fn handle_ack(&mut self, packet: &Packet) {
        let Some(session) = self.sessions.get_mut(&packet.session) else {
            return;
        };
        let TransferRole::Sender { unacked, .. } = &mut session.role else {
            debug!(session_id = packet.session, "ACK on a receiving session, ignoring");
            return;
        };
        match unacked.take() {
            Some(outstanding) if outstanding.seq == packet.seq => {}
            other => {
                *unacked = other;
                debug!(session_id = packet.session, seq = packet.seq, "stray ACK");
                return;
            }
        }

        match session.state {
            SessionState::FinWait => {
                info!(session_id = packet.session, "download complete, closing session");
                self.sessions.remove(&packet.session);
            }
            SessionState::Transferring => self.send_next_data(packet.session),
        }
    }

    /// Accept one DATA chunk of an upload, enforcing in-order delivery and
    /// write-once semantics.
    fn handle_data(&mut self, packet: &Packet) {
        let now = self.clock.now();
        let Some(session) = self.sessions.get_mut(&packet.session) else {
            return;
        };
        let peer = session.peer;
        let TransferRole::Receiver {
            writer,
            expected_seq,
        } = &mut session.role
        else {
            debug!(session_id = packet.session, "DATA on a sending session, ignoring");
            return;
        };
        if session.state != SessionState::Transferring {
            return;
        }

        if packet.seq == *expected_seq {
            if let Err(e) = writer.write_chunk(&packet.payload) {
                error!(session_id = packet.session, error = %e, "write failed, dropping session");
                self.sessions.remove(&packet.session);
                self.send_error(packet.session, peer, packet.seq, "Storage error");
                return;
            }
            *expected_seq = expected_seq.wrapping_add(1);
            session.last_send_time = now;
            let ack = Packet::control(PacketType::Ack, packet.seq, packet.session);
            self.send(&ack, peer);
        } else if packet.seq < *expected_seq {
            // Our previous ACK was lost; re-acknowledge so the client can
            // move on, but do not write the chunk twice.
            debug!(
                session_id = packet.session,
                seq = packet.seq,
                "duplicate DATA, resending ACK"
            );
            session.last_send_time = now;
            let ack = Packet::control(PacketType::Ack, packet.seq, packet.session);
            self.send(&ack, peer);
        } else {
            warn!(
                session_id = packet.session,
                seq = packet.seq,
                expected_seq = *expected_seq,
                "out-of-order DATA discarded"
            );
        }
    }

    /// Close out an upload: acknowledge the FIN, flush the file and drop
    /// the session, remembering it briefly for FIN re-acknowledgment.
    fn handle_fin(&mut self, packet: &Packet) {
        let now = self.clock.now();
        match self.sessions.get(&packet.session) {
            Some(session) if matches!(session.role, TransferRole::Receiver { .. }) => {}
            Some(_) => {
                debug!(session_id = packet.session, "FIN on a sending session, ignoring");
                return;
            }
            None => return,
        }

        let Some(session) = self.sessions.remove(&packet.session) else {
            return;
        };
        let peer = session.peer;
        let ack = Packet::control(PacketType::Ack, packet.seq, packet.session);
        self.send(&ack, peer);

        info!(session_id = packet.session, "upload complete, closing session");
        if let TransferRole::Receiver { writer, .. } = session.role {
            if let Err(e) = writer.finish() {
                error!(session_id = packet.session, error = %e, "flush failed");
            }
        }
        self.completed_uploads.insert(
            packet.session,
            CompletedUpload {
                peer,
                fin_seq: packet.seq,
                closed_at: now,
            },
        );
    }

    /// Re-acknowledge a FIN belonging to an upload that already completed.
    fn reack_completed_fin(&mut self, packet: &Packet) {
        let Some(done) = self.completed_uploads.get(&packet.session) else {
            debug!(session_id = packet.session, "packet for unknown session");
            return;
        };
        if done.fin_seq != packet.seq {
            debug!(session_id = packet.session, seq = packet.seq, "stale FIN ignored");
            return;
        }
        debug!(session_id = packet.session, "re-acknowledging FIN of completed upload");
        let peer = done.peer;
        let ack = Packet::control(PacketType::Ack, packet.seq, packet.session);
        self.send(&ack, peer);
    }

    /// Retransmit overdue outstanding packets and reap sessions that have
    /// been silent for the stale timeout. Runs on every receive timeout.
    fn sweep(&mut self) {
        let now = self.clock.now();
        let mut stale = Vec::new();

        for (&session_id, session) in self.sessions.iter_mut() {
            // Staleness is judged on the idle time before any
            // retransmission this tick performs.
            let idle = now.duration_since(session.last_send_time);

            if let TransferRole::Sender {
                unacked: Some(outstanding),
                ..
            } = &session.role
            {
                if idle > RETRANSMIT_TIMEOUT {
                    warn!(session_id, seq = outstanding.seq, "timeout, retransmitting");
                    self.transport
                        .send_to(&outstanding.encode(), session.peer)
                        .unwrap_or_else(|e| warn!(session_id, error = %e, "retransmit failed"));
                    session.last_send_time = now;
                }
            }

            if idle > STALE_SESSION_TIMEOUT {
                stale.push(session_id);
            }
        }

        for session_id in stale {
            warn!(session_id, "reaping stale session");
            // Dropping the session closes its file handle. A partly
            // written upload stays on disk.
            self.sessions.remove(&session_id);
        }

        self.completed_uploads
            .retain(|_, done| now.duration_since(done.closed_at) <= FIN_GRACE_PERIOD);
    }

    fn send(&mut self, packet: &Packet, peer: SocketAddr) {
        self.transport
            .send_to(&packet.encode(), peer)
            .unwrap_or_else(|e| {
                warn!(session_id = packet.session, error = %e, "send failed")
            });
    }

    fn send_error(&mut self, session_id: u32, peer: SocketAddr, seq: u32, message: &str) {
        warn!(session_id, %peer, message, "sending ERROR");
        let packet = Packet::new(
            PacketType::Error,
            seq,
            session_id,
            message.as_bytes().to_vec(),
        );
        self.send(&packet, peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::transport::testing::MockTransport;
    use bytes::Bytes;
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const PEER: &str = "127.0.0.1:4000";

    fn peer() -> SocketAddr {
        PEER.parse().unwrap()
    }

    struct Fixture {
        server: Server<MockTransport, ManualClock>,
        clock: ManualClock,
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let clock = ManualClock::new();
            let server = Server::new(
                MockTransport::new(),
                clock.clone(),
                Storage::new(dir.path()).unwrap(),
                DropSimulator::disabled(),
            );
            Fixture { server, clock, dir }
        }

        fn store_file(&self, name: &str, data: &[u8]) {
            fs::write(self.dir.path().join(name), data).unwrap();
        }

        fn stored(&self, name: &str) -> Vec<u8> {
            fs::read(self.dir.path().join(name)).unwrap()
        }

        /// Feed one packet through a full receive cycle.
        fn deliver(&mut self, packet: &Packet) {
            self.server
                .transport
                .push_datagram(packet.encode().to_vec(), peer());
            self.server.poll_once().unwrap();
        }

        /// Run one empty receive cycle, which triggers the sweep.
        fn tick(&mut self) {
            self.server.poll_once().unwrap();
        }

        /// Drain and decode everything the server sent so far.
        fn sent(&mut self) -> Vec<Packet> {
            self.server
                .transport
                .sent
                .drain(..)
                .map(|(data, _)| Packet::decode(&data).unwrap())
                .collect()
        }
    }

    fn syn(session: u32, seq: u32, op: &str, filename: &str) -> Packet {
        Packet::new(
            PacketType::Syn,
            seq,
            session,
            format!("{op}|{filename}").into_bytes(),
        )
    }

    fn ack(session: u32, seq: u32) -> Packet {
        Packet::control(PacketType::Ack, seq, session)
    }

    #[test]
    fn test_download_full_exchange() {
        let mut fx = Fixture::new();
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        fx.store_file("a.bin", &data);

        fx.deliver(&syn(42, 10, "DOWNLOAD", "a.bin"));

        let sent = fx.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].packet_type, PacketType::SynAck);
        assert_eq!(sent[0].seq, 11);
        assert_eq!(sent[0].payload.as_ref(), b"OK");
        assert_eq!(sent[1].packet_type, PacketType::Data);
        assert_eq!(sent[1].seq, 12);
        assert_eq!(sent[1].payload, data[..1024]);

        fx.deliver(&ack(42, 12));
        let sent = fx.sent();
        assert_eq!(sent[0].seq, 13);
        assert_eq!(sent[0].payload, data[1024..2048]);

        fx.deliver(&ack(42, 13));
        let sent = fx.sent();
        assert_eq!(sent[0].seq, 14);
        assert_eq!(sent[0].payload, data[2048..]);
        assert_eq!(sent[0].payload.len(), 452);

        fx.deliver(&ack(42, 14));
        let sent = fx.sent();
        assert_eq!(sent[0].packet_type, PacketType::Fin);
        assert_eq!(sent[0].seq, 15);

        fx.deliver(&ack(42, 15));
        assert!(fx.sent().is_empty());
        assert_eq!(fx.server.session_count(), 0);
    }

    #[test]
    fn test_download_missing_file() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(5, 30, "DOWNLOAD", "missing.bin"));

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet_type, PacketType::Error);
        assert_eq!(sent[0].seq, 31);
        assert_eq!(sent[0].payload.as_ref(), b"File not found");
        assert_eq!(fx.server.session_count(), 0);
    }

    #[test]
    fn test_invalid_syn_payload() {
        let mut fx = Fixture::new();
        fx.deliver(&Packet::new(PacketType::Syn, 3, 9, &b"oops"[..]));

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet_type, PacketType::Error);
        assert_eq!(sent[0].seq, 4);
        assert_eq!(sent[0].payload.as_ref(), b"Invalid SYN payload format");
        assert_eq!(fx.server.session_count(), 0);
    }

    #[test]
    fn test_unknown_op_discarded_silently() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(9, 3, "SIDELOAD", "x.bin"));
        assert!(fx.sent().is_empty());
        assert_eq!(fx.server.session_count(), 0);
    }

    #[test]
    fn test_upload_full_exchange() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(7, 3, "UPLOAD", "b.bin"));

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet_type, PacketType::SynAck);
        assert_eq!(sent[0].seq, 4);

        let payload = vec![0xFFu8; 1024];
        fx.deliver(&Packet::new(PacketType::Data, 4, 7, payload.clone()));
        assert_eq!(fx.sent()[0], ack(7, 4));

        fx.deliver(&Packet::new(PacketType::Data, 5, 7, vec![0xFFu8; 1]));
        assert_eq!(fx.sent()[0], ack(7, 5));

        fx.deliver(&Packet::control(PacketType::Fin, 6, 7));
        assert_eq!(fx.sent()[0], ack(7, 6));
        assert_eq!(fx.server.session_count(), 0);
        assert_eq!(fx.stored("b.bin"), vec![0xFF; 1025]);
    }

    #[test]
    fn test_upload_duplicate_data_not_rewritten() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(7, 3, "UPLOAD", "dup.bin"));
        fx.sent();

        let chunk = Packet::new(PacketType::Data, 4, 7, &b"chunk"[..]);
        fx.deliver(&chunk);
        assert_eq!(fx.sent()[0], ack(7, 4));

        // Same chunk again, as after a lost ACK: re-acknowledged, not
        // re-written.
        fx.deliver(&chunk);
        assert_eq!(fx.sent()[0], ack(7, 4));

        fx.deliver(&Packet::control(PacketType::Fin, 5, 7));
        fx.sent();
        assert_eq!(fx.stored("dup.bin"), b"chunk");
    }

    #[test]
    fn test_upload_out_of_order_data_gets_no_ack() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(7, 3, "UPLOAD", "ooo.bin"));
        fx.sent();

        fx.deliver(&Packet::new(PacketType::Data, 9, 7, &b"future"[..]));
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_retransmit_after_timeout() {
        let mut fx = Fixture::new();
        fx.store_file("r.bin", b"tiny");
        fx.deliver(&syn(11, 20, "DOWNLOAD", "r.bin"));
        let first = fx.sent();
        let data = first[1].clone();

        // Not yet due.
        fx.clock.advance(Duration::from_millis(1500));
        fx.tick();
        assert!(fx.sent().is_empty());

        fx.clock.advance(Duration::from_millis(600));
        fx.tick();
        let resent = fx.sent();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0], data);

        // Duplicate ACKs after the retransmission do not advance twice.
        fx.deliver(&ack(11, data.seq));
        let fin = fx.sent();
        assert_eq!(fin[0].packet_type, PacketType::Fin);
        fx.deliver(&ack(11, data.seq));
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_stale_session_reaped() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(2, 50, "UPLOAD", "ghost.bin"));
        fx.sent();
        assert_eq!(fx.server.session_count(), 1);

        fx.clock.advance(Duration::from_millis(9_900));
        fx.tick();
        assert_eq!(fx.server.session_count(), 1);

        fx.clock.advance(Duration::from_millis(200));
        fx.tick();
        assert_eq!(fx.server.session_count(), 0);
        // The partial file stays on disk.
        assert!(fx.dir.path().join("ghost.bin").exists());
    }

    #[test]
    fn test_fin_reacked_after_session_close() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(7, 3, "UPLOAD", "g.bin"));
        fx.sent();
        fx.deliver(&Packet::new(PacketType::Data, 4, 7, &b"x"[..]));
        fx.sent();
        fx.deliver(&Packet::control(PacketType::Fin, 5, 7));
        assert_eq!(fx.sent()[0], ack(7, 5));
        assert_eq!(fx.server.session_count(), 0);

        // The ACK was lost; the retransmitted FIN must still be answered.
        fx.deliver(&Packet::control(PacketType::Fin, 5, 7));
        assert_eq!(fx.sent()[0], ack(7, 5));

        // But not after the grace period.
        fx.clock.advance(Duration::from_millis(10_100));
        fx.tick();
        fx.deliver(&Packet::control(PacketType::Fin, 5, 7));
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_corrupt_datagram_discarded() {
        let mut fx = Fixture::new();
        fx.store_file("c.bin", b"data");

        let mut raw = syn(3, 8, "DOWNLOAD", "c.bin").encode().to_vec();
        raw[6] ^= 0x10;
        fx.server.transport.push_datagram(raw, peer());
        fx.server.poll_once().unwrap();

        assert!(fx.sent().is_empty());
        assert_eq!(fx.server.session_count(), 0);
    }

    #[test]
    fn test_unknown_session_discarded() {
        let mut fx = Fixture::new();
        fx.deliver(&ack(999, 5));
        fx.deliver(&Packet::new(PacketType::Data, 5, 999, &b"zzz"[..]));
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_duplicate_syn_replaces_session() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(6, 10, "UPLOAD", "one.bin"));
        fx.sent();

        fx.deliver(&syn(6, 70, "UPLOAD", "two.bin"));
        let sent = fx.sent();
        assert_eq!(sent[0].packet_type, PacketType::SynAck);
        assert_eq!(sent[0].seq, 71);
        assert_eq!(fx.server.session_count(), 1);

        // The new record expects sequences from the new SYN.
        fx.deliver(&Packet::new(PacketType::Data, 71, 6, &b"abc"[..]));
        assert_eq!(fx.sent()[0], ack(6, 71));
        fx.deliver(&Packet::control(PacketType::Fin, 72, 6));
        fx.sent();
        assert_eq!(fx.stored("two.bin"), b"abc");
    }

    #[test]
    fn test_empty_file_download_is_fin_only() {
        let mut fx = Fixture::new();
        fx.store_file("empty.bin", b"");
        fx.deliver(&syn(4, 10, "DOWNLOAD", "empty.bin"));

        let sent = fx.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].packet_type, PacketType::SynAck);
        assert_eq!(sent[1].packet_type, PacketType::Fin);
        assert_eq!(sent[1].seq, 12);

        fx.deliver(&ack(4, 12));
        assert_eq!(fx.server.session_count(), 0);
    }

    #[test]
    fn test_ingress_drop_discards_before_dispatch() {
        let dir = tempdir().unwrap();
        let mut server = Server::new(
            MockTransport::new(),
            ManualClock::new(),
            Storage::new(dir.path()).unwrap(),
            DropSimulator::seeded(1.0, 1),
        );
        server
            .transport
            .push_datagram(syn(1, 1, "UPLOAD", "x").encode().to_vec(), peer());
        server.poll_once().unwrap();

        assert!(server.transport.sent.is_empty());
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn test_traversal_confined_to_storage_root() {
        let mut fx = Fixture::new();
        fx.deliver(&syn(8, 1, "UPLOAD", "../../escape.bin"));
        fx.sent();
        fx.deliver(&Packet::new(PacketType::Data, 2, 8, &b"jail"[..]));
        fx.sent();
        fx.deliver(&Packet::control(PacketType::Fin, 3, 8));
        fx.sent();

        assert_eq!(fx.stored("escape.bin"), b"jail");
        assert!(!fx.dir.path().parent().unwrap().join("escape.bin").exists());
    }

    #[test]
    fn test_scenario_chunk_bytes_match_source() {
        // Byte-exact reassembly across the chunk boundary.
        let mut fx = Fixture::new();
        let data = Bytes::from_iter((0..1500u32).map(|i| (i * 7 % 256) as u8));
        fx.store_file("exact.bin", &data);

        fx.deliver(&syn(21, 1, "DOWNLOAD", "exact.bin"));
        let sent = fx.sent();
        let mut received = sent[1].payload.to_vec();
        fx.deliver(&ack(21, sent[1].seq));
        let sent = fx.sent();
        received.extend_from_slice(&sent[0].payload);
        assert_eq!(received, data);
    }
}
