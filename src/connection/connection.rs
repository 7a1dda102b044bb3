//! The per-connection state machine (§3, §4.7): owns the crypto context, handshake
//! driver, per-space packet-number bookkeeping, and loss detection for one QUIC
//! connection, and turns datagrams into frame-level events and vice versa. Transport I/O
//! and task scheduling live in [`crate::runtime`]; this type is deliberately synchronous
//! so the runtime tasks can drive it from behind a single lock per the concurrency
//! invariants in §5.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::codec;
use crate::connection::cid::{MyCids, PeerCids};
use crate::connection::flow::FlowControl;
use crate::connection::space::PacketNumberSpace;
use crate::connection::streams::{RecvStreamState, SendStreamState};
use crate::connection::types::ConnectionState;
use crate::config::EndpointConfig;
use crate::crypto::context::CryptoContext;
use crate::error::{transport_error, QuicheError, QuicheResult, TransportErrorCode};
use crate::handshake::driver::HandshakeDriver;
use crate::handshake::tls::TlsEngine;
use crate::packet::frame::{Frame, FrameType};
use crate::packet::header::Header;
use crate::packet::types::{ConnectionId, EncryptionLevel, PacketNumberSpaceId};
use crate::primitives::rand;
use crate::recovery::loss::SentPacket;
use crate::recovery::RecoveryManager;

pub enum Role {
    Client,
    Server,
}

pub struct Connection {
    role: Role,
    pub state: ConnectionState,
    config: EndpointConfig,

    crypto: CryptoContext,
    driver: HandshakeDriver,
    recovery: RecoveryManager,

    initial_space: PacketNumberSpace,
    handshake_space: PacketNumberSpace,
    application_space: PacketNumberSpace,

    my_cids: MyCids,
    peer_cids: PeerCids,
    flow: FlowControl,

    send_streams: HashMap<u64, SendStreamState>,
    recv_streams: HashMap<u64, RecvStreamState>,
    /// Bytes offered via [`Connection::stream_send`] but not yet drained into a frame by
    /// [`Connection::poll_transmit`], alongside whether the caller asked for FIN.
    stream_send_buffer: HashMap<u64, (Vec<u8>, bool)>,
    /// Contiguous bytes a peer's STREAM frames have reassembled, waiting to be read via
    /// [`Connection::stream_recv`].
    stream_rx_ready: HashMap<u64, Vec<u8>>,
    max_streams_bidi_remote: u64,
    max_streams_uni_remote: u64,

    pending_crypto: HashMap<EncryptionLevel, Vec<u8>>,
    retransmit_queue: HashMap<EncryptionLevel, Vec<Frame>>,
    close_requested: Option<(u64, String)>,

    /// Set once a validated Retry supplies a token; echoed in every Initial header after
    /// that (RFC9000 §8.1.2).
    retry_token: Option<Vec<u8>>,
    /// A client's first Initial-level CRYPTO bytes, kept around so a Retry can re-queue
    /// them without re-running the TLS handshake step (§4.8, RFC9001 §5.2: Initial secrets
    /// are not re-derived after a Retry).
    initial_crypto_flight: Option<Vec<u8>>,
}

impl Connection {
    fn new(
        role: Role,
        config: EndpointConfig,
        local_cid: ConnectionId,
        peer_cid: ConnectionId,
        tls: Box<dyn TlsEngine>,
    ) -> QuicheResult<Self> {
        let mut crypto = CryptoContext::new();
        crypto.install_initial(&peer_cid.cid, matches!(role, Role::Client))?;

        let reset_token = {
            let mut token = [0u8; 16];
            rand::fill_random(&mut token);
            token
        };

        Ok(Self {
            role,
            state: ConnectionState::Handshaking,
            recovery: RecoveryManager::new(
                config.initial_congestion_window,
                config.max_datagram_size as u64,
                config.transport_parameters.max_ack_delay,
            ),
            flow: FlowControl::new(
                config.transport_parameters.initial_max_data.to_inner(),
                config.transport_parameters.initial_max_data.to_inner(),
            ),
            config,
            crypto,
            driver: HandshakeDriver::new(tls),
            initial_space: PacketNumberSpace::new(),
            handshake_space: PacketNumberSpace::new(),
            application_space: PacketNumberSpace::new(),
            my_cids: MyCids::new(local_cid, reset_token),
            peer_cids: PeerCids::new(peer_cid),
            send_streams: HashMap::new(),
            recv_streams: HashMap::new(),
            stream_send_buffer: HashMap::new(),
            stream_rx_ready: HashMap::new(),
            max_streams_bidi_remote: 0,
            max_streams_uni_remote: 0,
            pending_crypto: HashMap::new(),
            retransmit_queue: HashMap::new(),
            close_requested: None,
            retry_token: None,
            initial_crypto_flight: None,
        })
    }

    pub fn new_client(
        config: EndpointConfig,
        transport_params: Vec<u8>,
        local_cid: ConnectionId,
        initial_peer_cid: ConnectionId,
    ) -> QuicheResult<Self> {
        let tls = config.tls_factory.new_client(transport_params);
        let mut conn = Self::new(Role::Client, config, local_cid, initial_peer_cid, tls)?;
        let output = conn.driver.start(&mut conn.crypto)?;
        for (level, bytes) in output.outgoing {
            if level == EncryptionLevel::Initial {
                conn.initial_crypto_flight.get_or_insert_with(Vec::new).extend_from_slice(&bytes);
            }
            conn.queue_crypto(level, &bytes);
        }
        Ok(conn)
    }

    pub fn new_server(
        config: EndpointConfig,
        transport_params: Vec<u8>,
        local_cid: ConnectionId,
        peer_cid: ConnectionId,
    ) -> QuicheResult<Self> {
        let tls = config.tls_factory.new_server(transport_params);
        Self::new(Role::Server, config, local_cid, peer_cid, tls)
    }

    fn queue_crypto(&mut self, level: EncryptionLevel, bytes: &[u8]) {
        self.pending_crypto.entry(level).or_default().extend_from_slice(bytes);
    }

    fn space_mut(&mut self, id: PacketNumberSpaceId) -> &mut PacketNumberSpace {
        match id {
            PacketNumberSpaceId::Initial => &mut self.initial_space,
            PacketNumberSpaceId::Handshake => &mut self.handshake_space,
            PacketNumberSpaceId::Application => &mut self.application_space,
        }
    }

    /// Processes one UDP datagram, which may contain several coalesced long-header
    /// packets (§4.1 "Coalescing") followed by at most one short-header packet.
    pub fn on_datagram_received(&mut self, datagram: &[u8], now: Instant) -> QuicheResult<()> {
        let mut offset = 0;
        while offset < datagram.len() {
            let remaining = &datagram[offset..];
            if Header::peek_is_long(remaining[0]) {
                let long_packet_type = (remaining[0] >> 4) & 0b11;
                if self.is_version_negotiation_or_retry(remaining) {
                    // Version negotiation and Retry terminate datagram processing: neither
                    // coalesces with anything else.
                    self.handle_unprotected_long_packet(remaining, long_packet_type)?;
                    return Ok(());
                }
            }

            let level = self.packet_level(remaining[0]);
            let dst_cid_len = self.my_cids_len();
            let keys = self
                .rx_keys(level)
                .cloned()
                .ok_or_else(|| QuicheError::Malformed("no keys installed for packet level".to_string()))?;
            let largest_pn = self.space_mut(level.packet_number_space()).received.largest_received;
            let decoded = codec::decode_packet(remaining, dst_cid_len, largest_pn.map(|pn| pn as i64).unwrap_or(-1), &keys)?;

            self.on_packet_decoded(level, &decoded, now)?;

            if decoded.consumed == 0 {
                break;
            }
            offset += decoded.consumed;
        }
        Ok(())
    }

    fn is_version_negotiation_or_retry(&self, bytes: &[u8]) -> bool {
        if bytes.len() < 5 {
            return false;
        }
        let version = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        version == 0 || (bytes[0] >> 4) & 0b11 == 0b11
    }

    fn handle_unprotected_long_packet(&mut self, bytes: &[u8], _long_packet_type: u8) -> QuicheResult<()> {
        match Header::decode_long(&mut &bytes[..], &self.config.supported_versions)? {
            Header::VersionNegotiation { supported_versions, .. } => {
                match supported_versions.iter().find(|v| self.config.supported_versions.contains(v)) {
                    Some(&version) => Err(QuicheError::NextVersion(version)),
                    None => Err(QuicheError::VersionNegotiationFailed),
                }
            }
            Header::Retry { src_cid, retry_token, .. } => self.handle_retry(bytes, src_cid, retry_token),
            _ => Ok(()),
        }
    }

    /// Validates and applies a Retry packet (§6, RFC9000 §17.2.5). The wire bytes' trailing
    /// 16 bytes are always the RFC9001 §5.8 integrity tag; everything before that is the
    /// pseudo-packet input the tag was computed over.
    fn handle_retry(&mut self, bytes: &[u8], src_cid: ConnectionId, retry_token: Vec<u8>) -> QuicheResult<()> {
        if !matches!(self.role, Role::Client) {
            // A server never receives a Retry; ignore rather than fail the connection.
            return Ok(());
        }
        if bytes.len() < 16 || retry_token.len() < 16 {
            return Err(transport_error(TransportErrorCode::ProtocolViolation, 0, "truncated retry"));
        }

        let (header_and_token, tag) = bytes.split_at(bytes.len() - 16);
        let original_dcid = self.peer_cids.current().cloned().ok_or_else(|| {
            QuicheError::BadThingHappen("retry received with no prior destination connection id".to_string())
        })?;
        if !codec::verify_retry_integrity_tag(&original_dcid, header_and_token, tag) {
            return Err(transport_error(TransportErrorCode::ProtocolViolation, 0, "invalid retry integrity tag"));
        }

        // `Header::decode_long`'s Retry branch reads every remaining byte into `retry_token`,
        // which includes the trailing tag already split off above; strip it back out.
        let token = retry_token[..retry_token.len() - 16].to_vec();

        self.peer_cids.set_from_retry(src_cid);
        self.retry_token = Some(token);
        self.initial_space = PacketNumberSpace::new();
        // Initial secrets are keyed to the client's very first Initial dcid and are not
        // re-derived after a Retry (RFC9001 §5.2); only the connection id, token, and
        // packet-number space reset.
        if let Some(flight) = self.initial_crypto_flight.clone() {
            self.pending_crypto.insert(EncryptionLevel::Initial, flight);
        }
        Ok(())
    }

    fn packet_level(&self, first_byte: u8) -> EncryptionLevel {
        if !Header::peek_is_long(first_byte) {
            return EncryptionLevel::OneRtt;
        }
        match (first_byte >> 4) & 0b11 {
            0b00 => EncryptionLevel::Initial,
            0b01 => EncryptionLevel::ZeroRtt,
            _ => EncryptionLevel::Handshake,
        }
    }

    fn my_cids_len(&self) -> usize {
        // Every CID this endpoint hands out shares one fixed length (§3).
        8
    }

    fn rx_keys(&self, level: EncryptionLevel) -> Option<&crate::crypto::context::LevelKeys> {
        self.crypto.get(level).map(|lc| &lc.rx)
    }

    fn tx_keys(&self, level: EncryptionLevel) -> Option<&crate::crypto::context::LevelKeys> {
        self.crypto.get(level).map(|lc| &lc.tx)
    }

    fn on_packet_decoded(&mut self, level: EncryptionLevel, decoded: &codec::DecodedPacket, now: Instant) -> QuicheResult<()> {
        let space_id = level.packet_number_space();
        let ack_eliciting = decoded.frames.iter().any(Frame::is_ack_eliciting);
        self.space_mut(space_id)
            .received
            .on_packet_received(decoded.packet_number, now, ack_eliciting);

        for frame in &decoded.frames {
            self.handle_frame(level, frame, now)?;
        }

        if level == EncryptionLevel::Handshake {
            self.crypto.discard_initial();
            self.initial_space.keys_discarded = true;
        }

        Ok(())
    }

    fn handle_frame(&mut self, level: EncryptionLevel, frame: &Frame, now: Instant) -> QuicheResult<()> {
        match frame {
            Frame::Padding | Frame::Ping => {}
            Frame::Crypto { offset, data } => {
                let space_id = level.packet_number_space();
                let ready = self.space_mut(space_id).crypto_recv.insert(*offset, data);
                if !ready.is_empty() {
                    let output = self.driver.receive_crypto(&mut self.crypto, level, &ready)?;
                    for (out_level, bytes) in output.outgoing {
                        self.queue_crypto(out_level, &bytes);
                    }
                    if output.just_established {
                        self.state = ConnectionState::Established;
                        self.crypto.discard_handshake();
                        self.handshake_space.keys_discarded = true;
                    } else {
                        self.state = ConnectionState::from_handshake_progress(self.driver.progress());
                    }
                }
            }
            Frame::Ack {
                largest_acknowledged,
                ack_delay,
                ranges,
                ..
            } => {
                let space_id = level.packet_number_space();
                let handshake_confirmed = self.state == ConnectionState::Established;
                let delay = Duration::from_micros(*ack_delay << self.config.transport_parameters.ack_delay_exponent);
                self.recovery.on_ack_received(space_id, ranges, delay, now, handshake_confirmed);
                let space = self.space_mut(space_id);
                space.largest_acked_by_peer = Some(match space.largest_acked_by_peer {
                    Some(prev) => prev.max(*largest_acknowledged),
                    None => *largest_acknowledged,
                });
            }
            Frame::NewConnectionId {
                sequence_number,
                retire_prior_to,
                connection_id,
                stateless_reset_token,
            } => {
                let issued = crate::connection::cid::IssuedCid {
                    sequence_number: *sequence_number,
                    cid: connection_id.clone(),
                    stateless_reset_token: *stateless_reset_token,
                };
                self.peer_cids.on_new_connection_id(issued, *retire_prior_to);
            }
            Frame::RetireConnectionId { sequence_number } => {
                self.my_cids.retire(*sequence_number);
            }
            Frame::ConnectionCloseTransport { .. } | Frame::ConnectionCloseApplication { .. } => {
                self.state = ConnectionState::Draining;
            }
            Frame::HandshakeDone => {
                self.state = ConnectionState::Established;
                self.crypto.discard_handshake();
                self.handshake_space.keys_discarded = true;
            }
            Frame::Stream { stream_id, offset, fin, data } => {
                let end = *offset + data.len() as u64;
                if !self.flow.on_bytes_received(end) {
                    return Err(transport_error(TransportErrorCode::FlowControlError, FrameType::STREAM, "connection receive window exceeded"));
                }
                let initial_credit = self.config.transport_parameters.initial_max_stream_data_bidi_local.to_inner();
                let over_window = {
                    let state = self.recv_streams.entry(*stream_id).or_insert_with(|| RecvStreamState::new(initial_credit));
                    end > state.max_stream_data
                };
                if over_window {
                    return Err(transport_error(
                        TransportErrorCode::FlowControlError,
                        FrameType::STREAM,
                        format!("stream {stream_id} receive window exceeded"),
                    ));
                }
                let state = self.recv_streams.get_mut(stream_id).expect("just inserted above");
                if *fin {
                    state.fin_received = true;
                }
                let ready = state.reassembly.insert(*offset, data);
                if !ready.is_empty() {
                    self.stream_rx_ready.entry(*stream_id).or_default().extend_from_slice(&ready);
                }
            }
            Frame::MaxData(max) => {
                self.flow.on_max_data(*max);
            }
            Frame::MaxStreamData { stream_id, max_stream_data } => {
                let initial_credit = self.config.transport_parameters.initial_max_stream_data_bidi_remote.to_inner();
                let state = self.send_streams.entry(*stream_id).or_insert_with(|| SendStreamState::new(initial_credit));
                if *max_stream_data > state.max_stream_data {
                    state.max_stream_data = *max_stream_data;
                }
            }
            Frame::MaxStreamsBidi(n) => {
                self.max_streams_bidi_remote = self.max_streams_bidi_remote.max(*n);
            }
            Frame::MaxStreamsUni(n) => {
                self.max_streams_uni_remote = self.max_streams_uni_remote.max(*n);
            }
            Frame::ResetStream { stream_id, .. } => {
                self.recv_streams.remove(stream_id);
                self.stream_rx_ready.remove(stream_id);
            }
            Frame::StopSending { stream_id, .. } => {
                self.send_streams.remove(stream_id);
                self.stream_send_buffer.remove(stream_id);
            }
            Frame::DataBlocked(_)
            | Frame::StreamDataBlocked { .. }
            | Frame::StreamsBlockedBidi(_)
            | Frame::StreamsBlockedUni(_)
            | Frame::NewToken { .. }
            | Frame::PathChallenge(_)
            | Frame::PathResponse(_) => {
                // Sender-side signaling and migration path-validation: accepted, no action
                // beyond this hook (Non-goal: path-validation beyond the state-machine hook).
            }
        }
        Ok(())
    }

    /// Builds the next packet to send for `level`, if there's anything worth sending:
    /// outstanding CRYPTO bytes, a due ACK, or (for Application) queued stream data.
    pub fn poll_transmit(&mut self, level: EncryptionLevel, now: Instant) -> QuicheResult<Option<Vec<u8>>> {
        let Some(tx_keys) = self.tx_keys(level).cloned() else {
            return Ok(None);
        };

        let space_id = level.packet_number_space();
        let mut frames = Vec::new();

        if let Some(retransmit) = self.retransmit_queue.get_mut(&level) {
            frames.append(retransmit);
        }

        if let Some(pending) = self.pending_crypto.get_mut(&level) {
            if !pending.is_empty() {
                let chunk = std::mem::take(pending);
                let space = self.space_mut(space_id);
                let offset = space.crypto_send_offset;
                space.crypto_send_offset += chunk.len() as u64;
                frames.push(Frame::Crypto { offset, data: chunk });
            }
        }

        if self.space_mut(space_id).received.has_unacked() {
            let tracker = &self.space_mut(space_id).received;
            if let Some(largest) = tracker.largest_received {
                let ranges = tracker.ack_ranges();
                frames.push(Frame::Ack {
                    largest_acknowledged: largest,
                    ack_delay: 0,
                    ranges,
                    ecn_counts: None,
                });
                self.space_mut(space_id).received.on_ack_sent();
            }
        }

        if matches!(level, EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt) {
            let initial_credit = self.config.transport_parameters.initial_max_stream_data_bidi_remote.to_inner();
            let stream_ids: Vec<u64> = self
                .stream_send_buffer
                .iter()
                .filter(|(_, (data, fin))| !data.is_empty() || *fin)
                .map(|(&id, _)| id)
                .collect();
            for stream_id in stream_ids {
                let (chunk, fin) = self.stream_send_buffer.remove(&stream_id).unwrap();
                let send_state = self.send_streams.entry(stream_id).or_insert_with(|| SendStreamState::new(initial_credit));
                let offset = send_state.bytes_sent;
                send_state.bytes_sent += chunk.len() as u64;
                if fin {
                    send_state.fin_sent = true;
                }
                frames.push(Frame::Stream {
                    stream_id,
                    offset,
                    fin,
                    data: chunk,
                });
            }
        }

        let closing = if let Some((error_code, reason)) = self.close_requested.take() {
            frames.push(Frame::ConnectionCloseTransport {
                error_code,
                frame_type: 0,
                reason,
            });
            true
        } else {
            false
        };

        if frames.is_empty() {
            return Ok(None);
        }

        let pn = self.space_mut(space_id).allocate_pn();
        let header = self.build_header(level, pn)?;

        if level == EncryptionLevel::Initial && matches!(self.role, Role::Client) && pn == 0 {
            // RFC9000 §14.1: a client's first Initial datagram, and any datagram carrying
            // a PTO probe for it, must be padded to at least 1200 bytes. PADDING frames are
            // added inside the AEAD-protected payload, one byte each, rather than trailing
            // the datagram, so they survive header protection untouched.
            let probe = codec::encode_packet(&header, pn, &frames, &tx_keys)?;
            if probe.len() < codec::MIN_INITIAL_DATAGRAM_SIZE {
                let deficit = codec::MIN_INITIAL_DATAGRAM_SIZE - probe.len();
                frames.extend(std::iter::repeat(Frame::Padding).take(deficit));
            }
        }

        let ack_eliciting = frames.iter().any(Frame::is_ack_eliciting);
        let retransmittable_frames: Vec<Frame> = frames.iter().filter(|f| f.is_retransmittable()).cloned().collect();

        let packet = codec::encode_packet(&header, pn, &frames, &tx_keys)?;

        self.recovery.on_packet_sent(
            space_id,
            SentPacket {
                packet_number: pn,
                time_sent: now,
                ack_eliciting,
                in_flight: true,
                size: packet.len() as u64,
                retransmittable_frames,
            },
            now,
        );

        if closing {
            self.state = ConnectionState::Draining;
        }

        Ok(Some(packet))
    }

    /// Runs loss detection for every still-active space and re-queues any declared-lost
    /// packet's retransmittable frames for the next [`Connection::poll_transmit`] call
    /// (RFC9002 §6.1). Returns the earliest time the retransmit task should next wake.
    pub fn on_loss_timeout(&mut self, now: Instant) -> Option<Instant> {
        for space_id in PacketNumberSpaceId::ALL {
            let lost = self.recovery.detect_lost(space_id, now);
            for packet in lost {
                self.retransmit_queue
                    .entry(space_id_to_level(space_id))
                    .or_default()
                    .extend(packet.retransmittable_frames);
            }
        }
        let active_spaces: Vec<PacketNumberSpaceId> = PacketNumberSpaceId::ALL
            .into_iter()
            .filter(|&s| !self.space_keys_discarded(s))
            .collect();
        let handshake_confirmed = self.state == ConnectionState::Established;
        self.recovery.next_timeout(&active_spaces, handshake_confirmed)
    }

    /// Called when the retransmit task's PTO timer fires with nothing declared lost yet:
    /// per RFC9002 §6.2.4, probe by sending new or previously-sent ack-eliciting data.
    pub fn on_pto_expired(&mut self) {
        self.recovery.on_pto_expired();
        if let Some(level) = self.earliest_probe_level() {
            self.retransmit_queue.entry(level).or_default().push(Frame::Ping);
        }
    }

    /// The earliest packet-number space that still has keys installed, in send order
    /// (RFC9002 §6.2.4: "the earliest level with outstanding crypto data"). A PING queued
    /// here guarantees the next [`Connection::poll_transmit`] call produces an ack-eliciting
    /// probe even when nothing was detected lost.
    fn earliest_probe_level(&self) -> Option<EncryptionLevel> {
        const PROBE_ORDER: [PacketNumberSpaceId; 3] = [
            PacketNumberSpaceId::Initial,
            PacketNumberSpaceId::Handshake,
            PacketNumberSpaceId::Application,
        ];
        PROBE_ORDER
            .into_iter()
            .find(|&space_id| !self.space_keys_discarded(space_id) && self.tx_keys(space_id_to_level(space_id)).is_some())
            .map(space_id_to_level)
    }

    fn space_keys_discarded(&self, space_id: PacketNumberSpaceId) -> bool {
        match space_id {
            PacketNumberSpaceId::Initial => self.initial_space.keys_discarded,
            PacketNumberSpaceId::Handshake => self.handshake_space.keys_discarded,
            PacketNumberSpaceId::Application => self.application_space.keys_discarded,
        }
    }

    fn build_header(&self, level: EncryptionLevel, packet_number: u64) -> QuicheResult<Header> {
        let dst_cid = self.peer_cids.current().cloned().unwrap_or_else(|| ConnectionId::new(0, vec![]));
        let src_cid = ConnectionId::new(0, vec![]); // filled by runtime from `self.my_cids` on first flight
        let space_id = level.packet_number_space();
        let largest_acked = match space_id {
            PacketNumberSpaceId::Initial => self.initial_space.largest_acked_by_peer,
            PacketNumberSpaceId::Handshake => self.handshake_space.largest_acked_by_peer,
            PacketNumberSpaceId::Application => self.application_space.largest_acked_by_peer,
        };
        let pn_len = crate::packet::pn::encode_packet_number_length(packet_number, largest_acked) as u8;

        Ok(match level {
            EncryptionLevel::Initial => Header::Initial {
                version: self.config.supported_versions[0],
                dst_cid,
                src_cid,
                token: self.retry_token.clone().unwrap_or_default(),
                reserved_bits: 0,
                packet_number_length: pn_len,
            },
            EncryptionLevel::ZeroRtt => Header::ZeroRtt {
                version: self.config.supported_versions[0],
                dst_cid,
                src_cid,
                reserved_bits: 0,
                packet_number_length: pn_len,
            },
            EncryptionLevel::Handshake => Header::Handshake {
                version: self.config.supported_versions[0],
                dst_cid,
                src_cid,
                reserved_bits: 0,
                packet_number_length: pn_len,
            },
            EncryptionLevel::OneRtt => Header::Short {
                dst_cid,
                spin_bit: false,
                reserved_bits: 0,
                key_phase: self.crypto.one_rtt.as_ref().map(|l| l.key_phase).unwrap_or(false),
                packet_number_length: pn_len,
            },
        })
    }

    /// Offers application bytes on `stream_id` for transmission (§3 "Stream"). Checked
    /// against both the connection-level and per-stream send windows before it's accepted
    /// into the queue `poll_transmit` drains; offsets are assigned lazily at drain time, the
    /// same pattern [`Connection::queue_crypto`] uses for CRYPTO data.
    pub fn stream_send(&mut self, stream_id: u64, data: &[u8], fin: bool) -> QuicheResult<()> {
        if !data.is_empty() && !self.flow.reserve_send(data.len() as u64) {
            return Err(transport_error(TransportErrorCode::FlowControlError, FrameType::STREAM, "connection send window exhausted"));
        }
        let initial_credit = self.config.transport_parameters.initial_max_stream_data_bidi_remote.to_inner();
        let queued_already = self.stream_send_buffer.get(&stream_id).map(|(buf, _)| buf.len() as u64).unwrap_or(0);
        let over_window = {
            let send_state = self.send_streams.entry(stream_id).or_insert_with(|| SendStreamState::new(initial_credit));
            (queued_already + data.len() as u64) > send_state.available_credit()
        };
        if over_window {
            return Err(transport_error(TransportErrorCode::FlowControlError, FrameType::STREAM, "stream send window exhausted"));
        }
        let entry = self.stream_send_buffer.entry(stream_id).or_default();
        entry.0.extend_from_slice(data);
        if fin {
            entry.1 = true;
        }
        Ok(())
    }

    /// Takes whatever contiguous, in-order bytes have arrived for `stream_id` so far,
    /// leaving the stream's reassembly state (and anything still out of order) untouched.
    pub fn stream_recv(&mut self, stream_id: u64) -> Vec<u8> {
        self.stream_rx_ready.remove(&stream_id).unwrap_or_default()
    }

    pub fn close(&mut self, error_code: u64, reason: impl Into<String>) {
        self.close_requested = Some((error_code, reason.into()));
        self.state = ConnectionState::Closing;
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// The RFC9000 §10.2 draining period: three times the current PTO, so a peer's
    /// in-flight retransmissions are given a chance to arrive before state is discarded.
    pub fn draining_duration(&self) -> std::time::Duration {
        self.recovery.rtt.base_pto(self.config.transport_parameters.max_ack_delay) * 3
    }

    pub fn transport_error(&self, code: TransportErrorCode, frame_type: u64, reason: impl Into<String>) -> QuicheError {
        transport_error(code, frame_type, reason)
    }
}

/// Retransmissions for the Application space always go out at 1-RTT: 0-RTT data that
/// survives to a retransmit either already has 1-RTT keys available or is no longer
/// worth resending at all (RFC9001 §4.9.3 discards 0-RTT keys before the 1-RTT flight).
fn space_id_to_level(space_id: PacketNumberSpaceId) -> EncryptionLevel {
    match space_id {
        PacketNumberSpaceId::Initial => EncryptionLevel::Initial,
        PacketNumberSpaceId::Handshake => EncryptionLevel::Handshake,
        PacketNumberSpaceId::Application => EncryptionLevel::OneRtt,
    }
}
