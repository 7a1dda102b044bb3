//! Per-packet-number-space sent-packet tracking and loss detection (RFC9002 §6).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::{K_GRANULARITY, K_PACKET_THRESHOLD, K_TIME_THRESHOLD_DENOMINATOR, K_TIME_THRESHOLD_NUMERATOR};
use crate::packet::frame::Frame;
use crate::recovery::rtt::RttEstimator;

#[derive(Debug, Clone)]
pub struct SentPacket {
    pub packet_number: u64,
    pub time_sent: Instant,
    pub ack_eliciting: bool,
    pub in_flight: bool,
    pub size: u64,
    /// The subset of frames worth resending verbatim if this packet is declared lost
    /// (§4.6 step 3: ACK frames are never retransmitted, so they never appear here).
    pub retransmittable_frames: Vec<Frame>,
}

/// Per-space sent-packet history plus the state loss detection needs to track across
/// calls (RFC9002 §6, appendix A "sent_packets"/"loss_time"/"time_of_last_ack_eliciting_packet").
#[derive(Default)]
pub struct LossDetector {
    sent_packets: BTreeMap<u64, SentPacket>,
    pub largest_acked_packet: Option<u64>,
    pub loss_time: Option<Instant>,
    pub time_of_last_ack_eliciting_packet: Option<Instant>,
}

impl LossDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_packet_sent(&mut self, packet: SentPacket, now: Instant) {
        if packet.ack_eliciting {
            self.time_of_last_ack_eliciting_packet = Some(now);
        }
        self.sent_packets.insert(packet.packet_number, packet);
    }

    pub fn in_flight_bytes(&self) -> u64 {
        self.sent_packets.values().filter(|p| p.in_flight).map(|p| p.size).sum()
    }

    pub fn has_in_flight(&self) -> bool {
        self.sent_packets.values().any(|p| p.in_flight)
    }

    /// Applies one ACK frame's ranges, updating RTT from the largest newly-acked
    /// ack-eliciting packet and returning every packet it newly acknowledged, largest
    /// packet number first (RFC9002 §6).
    pub fn on_ack_received(
        &mut self,
        ranges: &[(u64, u64)],
        ack_delay: Duration,
        now: Instant,
        rtt: &mut RttEstimator,
        max_ack_delay: Duration,
        handshake_confirmed: bool,
    ) -> Vec<SentPacket> {
        let mut newly_acked = Vec::new();
        let largest_in_ranges = ranges.iter().map(|(_, hi)| *hi).max();
        if let Some(largest) = largest_in_ranges {
            self.largest_acked_packet = Some(match self.largest_acked_packet {
                Some(prev) => prev.max(largest),
                None => largest,
            });
        }

        for &(lo, hi) in ranges {
            for pn in lo..=hi {
                if let Some(sent) = self.sent_packets.remove(&pn) {
                    newly_acked.push(sent);
                }
            }
        }
        newly_acked.sort_by(|a, b| b.packet_number.cmp(&a.packet_number));

        if let Some(largest) = newly_acked.first() {
            if largest.packet_number == self.largest_acked_packet.unwrap_or(0) && largest.ack_eliciting {
                let sample = now.saturating_duration_since(largest.time_sent);
                rtt.update(ack_delay, sample, max_ack_delay, handshake_confirmed);
            }
        }

        newly_acked
    }

    /// RFC9002 §6.1: detects packets lost either by packet-number or time threshold,
    /// removing and returning them, and sets `loss_time` for any not-yet-lost packet that
    /// still needs a timer to fire for later.
    pub fn detect_and_remove_lost_packets(&mut self, now: Instant, rtt: &RttEstimator) -> Vec<SentPacket> {
        let Some(largest_acked) = self.largest_acked_packet else {
            return Vec::new();
        };

        let loss_delay = (rtt.latest_rtt.max(rtt.smoothed_rtt) * K_TIME_THRESHOLD_NUMERATOR
            / K_TIME_THRESHOLD_DENOMINATOR)
            .max(K_GRANULARITY);

        let mut lost = Vec::new();
        let mut next_loss_time = None;

        let lost_pns: Vec<u64> = self
            .sent_packets
            .iter()
            .filter(|(&pn, packet)| {
                packet.in_flight && pn <= largest_acked && {
                    let pn_threshold_lost = largest_acked >= pn + K_PACKET_THRESHOLD;
                    let time_threshold_lost = now.saturating_duration_since(packet.time_sent) >= loss_delay;
                    if !pn_threshold_lost && !time_threshold_lost {
                        let candidate = packet.time_sent + loss_delay;
                        next_loss_time = Some(match next_loss_time {
                            Some(t) if t < candidate => t,
                            _ => candidate,
                        });
                    }
                    pn_threshold_lost || time_threshold_lost
                }
            })
            .map(|(&pn, _)| pn)
            .collect();

        for pn in lost_pns {
            if let Some(packet) = self.sent_packets.remove(&pn) {
                lost.push(packet);
            }
        }

        self.loss_time = next_loss_time;
        lost
    }

    pub fn oldest_in_flight_ack_eliciting_sent_time(&self) -> Option<Instant> {
        self.sent_packets
            .values()
            .filter(|p| p.ack_eliciting && p.in_flight)
            .map(|p| p.time_sent)
            .min()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn packet(pn: u64, time_sent: Instant) -> SentPacket {
        SentPacket {
            packet_number: pn,
            time_sent,
            ack_eliciting: true,
            in_flight: true,
            size: 100,
            retransmittable_frames: vec![],
        }
    }

    #[test]
    fn test_packet_threshold_loss() {
        let now = Instant::now();
        let mut detector = LossDetector::new();
        for pn in 0..=5 {
            detector.on_packet_sent(packet(pn, now), now);
        }
        let mut rtt = RttEstimator::new();
        detector.on_ack_received(&[(5, 5)], Duration::ZERO, now, &mut rtt, Duration::from_millis(25), true);

        let lost = detector.detect_and_remove_lost_packets(now, &rtt);
        let lost_pns: Vec<u64> = lost.iter().map(|p| p.packet_number).collect();
        assert!(lost_pns.contains(&0));
        assert!(lost_pns.contains(&1));
        assert!(!lost_pns.contains(&4));
    }

    #[test]
    fn test_ack_removes_acked_packets_and_updates_rtt() {
        let now = Instant::now();
        let mut detector = LossDetector::new();
        detector.on_packet_sent(packet(0, now), now);
        let mut rtt = RttEstimator::new();
        let later = now + Duration::from_millis(50);
        let acked = detector.on_ack_received(&[(0, 0)], Duration::ZERO, later, &mut rtt, Duration::from_millis(25), true);
        assert_eq!(acked.len(), 1);
        assert_eq!(rtt.smoothed_rtt, Duration::from_millis(50));
        assert!(!detector.has_in_flight());
    }
}
