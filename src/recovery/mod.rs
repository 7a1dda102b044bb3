//! Loss detection and congestion control (§4.6), tying the per-space [`loss::LossDetector`]
//! instances to one connection-wide [`rtt::RttEstimator`] and
//! [`congestion::NewRenoCongestionController`], per RFC9002.

pub mod congestion;
pub mod loss;
pub mod rtt;

use std::time::{Duration, Instant};

use crate::config::K_GRANULARITY;
use crate::packet::types::PacketNumberSpaceId;
use congestion::NewRenoCongestionController;
use loss::{LossDetector, SentPacket};
use rtt::RttEstimator;

pub struct RecoveryManager {
    pub rtt: RttEstimator,
    pub congestion: NewRenoCongestionController,
    initial: LossDetector,
    handshake: LossDetector,
    application: LossDetector,
    pub pto_count: u32,
    max_ack_delay: Duration,
}

impl RecoveryManager {
    pub fn new(initial_window: u64, max_datagram_size: u64, max_ack_delay: Duration) -> Self {
        Self {
            rtt: RttEstimator::new(),
            congestion: NewRenoCongestionController::new(initial_window, max_datagram_size),
            initial: LossDetector::new(),
            handshake: LossDetector::new(),
            application: LossDetector::new(),
            pto_count: 0,
            max_ack_delay,
        }
    }

    fn space_mut(&mut self, space: PacketNumberSpaceId) -> &mut LossDetector {
        match space {
            PacketNumberSpaceId::Initial => &mut self.initial,
            PacketNumberSpaceId::Handshake => &mut self.handshake,
            PacketNumberSpaceId::Application => &mut self.application,
        }
    }

    fn space(&self, space: PacketNumberSpaceId) -> &LossDetector {
        match space {
            PacketNumberSpaceId::Initial => &self.initial,
            PacketNumberSpaceId::Handshake => &self.handshake,
            PacketNumberSpaceId::Application => &self.application,
        }
    }

    /// Drops every in-flight record for a space once its keys are discarded (§4.7,
    /// RFC9002 §6.4 "OnPacketNumberSpaceDiscarded").
    pub fn discard_space(&mut self, space: PacketNumberSpaceId) {
        *self.space_mut(space) = LossDetector::new();
    }

    pub fn on_packet_sent(&mut self, space: PacketNumberSpaceId, packet: SentPacket, now: Instant) {
        let size = packet.size;
        let in_flight = packet.in_flight;
        self.space_mut(space).on_packet_sent(packet, now);
        if in_flight {
            self.congestion.on_packet_sent(size);
        }
    }

    pub fn on_ack_received(
        &mut self,
        space: PacketNumberSpaceId,
        ranges: &[(u64, u64)],
        ack_delay: Duration,
        now: Instant,
        handshake_confirmed: bool,
    ) -> Vec<SentPacket> {
        let detector = match space {
            PacketNumberSpaceId::Initial => &mut self.initial,
            PacketNumberSpaceId::Handshake => &mut self.handshake,
            PacketNumberSpaceId::Application => &mut self.application,
        };
        let acked = detector.on_ack_received(
            ranges,
            ack_delay,
            now,
            &mut self.rtt,
            self.max_ack_delay,
            handshake_confirmed,
        );
        self.congestion.on_packets_acked(&acked);
        self.pto_count = 0;

        let detector = match space {
            PacketNumberSpaceId::Initial => &mut self.initial,
            PacketNumberSpaceId::Handshake => &mut self.handshake,
            PacketNumberSpaceId::Application => &mut self.application,
        };
        let lost = detector.detect_and_remove_lost_packets(now, &self.rtt);
        self.congestion.on_lost_packets(&lost, now);

        acked
    }

    /// Packets a caller should resend verbatim after declaring them lost, alongside the
    /// acknowledged ones, so callers get one call site for both outcomes of an ACK.
    pub fn detect_lost(&mut self, space: PacketNumberSpaceId, now: Instant) -> Vec<SentPacket> {
        let detector = match space {
            PacketNumberSpaceId::Initial => &mut self.initial,
            PacketNumberSpaceId::Handshake => &mut self.handshake,
            PacketNumberSpaceId::Application => &mut self.application,
        };
        let lost = detector.detect_and_remove_lost_packets(now, &self.rtt);
        self.congestion.on_lost_packets(&lost, now);
        lost
    }

    pub fn in_flight_bytes(&self) -> u64 {
        self.initial.in_flight_bytes() + self.handshake.in_flight_bytes() + self.application.in_flight_bytes()
    }

    pub fn is_congestion_window_exhausted(&self) -> bool {
        self.in_flight_bytes() >= self.congestion.congestion_window
    }

    /// Earliest time a loss-detection or PTO timer should next fire across all spaces
    /// that still have keys installed and unacknowledged packets outstanding (RFC9002
    /// Appendix A "SetLossDetectionTimer").
    pub fn next_timeout(&self, active_spaces: &[PacketNumberSpaceId], handshake_confirmed: bool) -> Option<Instant> {
        let earliest_loss_time = active_spaces
            .iter()
            .filter_map(|&space| self.space(space).loss_time)
            .min();
        if earliest_loss_time.is_some() {
            return earliest_loss_time;
        }

        if active_spaces.iter().all(|&space| !self.space(space).has_in_flight()) {
            return None;
        }

        let pto_space = active_spaces
            .iter()
            .filter(|&&space| self.space(space).has_in_flight())
            .min_by_key(|&&space| self.space(space).time_of_last_ack_eliciting_packet)
            .copied()?;

        let sent_time = self.space(pto_space).time_of_last_ack_eliciting_packet?;
        let max_ack_delay = if pto_space == PacketNumberSpaceId::Application && handshake_confirmed {
            self.max_ack_delay
        } else {
            Duration::ZERO
        };
        let timeout = self.rtt.base_pto(max_ack_delay) * 2u32.pow(self.pto_count.min(16));
        Some(sent_time + timeout.max(K_GRANULARITY))
    }

    pub fn on_pto_expired(&mut self) {
        self.pto_count += 1;
    }
}
