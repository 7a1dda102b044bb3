//! NewReno congestion control (RFC9002 §7).

use std::time::Instant;

use crate::config::MINIMUM_WINDOW_PACKETS;
use crate::recovery::loss::SentPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionPhase {
    SlowStart,
    Recovery,
    CongestionAvoidance,
}

pub struct NewRenoCongestionController {
    pub congestion_window: u64,
    pub bytes_in_flight: u64,
    pub ssthresh: u64,
    pub congestion_recovery_start_time: Option<Instant>,
    max_datagram_size: u64,
    phase: CongestionPhase,
}

impl NewRenoCongestionController {
    pub fn new(initial_window: u64, max_datagram_size: u64) -> Self {
        Self {
            congestion_window: initial_window,
            bytes_in_flight: 0,
            ssthresh: u64::MAX,
            congestion_recovery_start_time: None,
            max_datagram_size,
            phase: CongestionPhase::SlowStart,
        }
    }

    pub fn phase(&self) -> CongestionPhase {
        self.phase
    }

    pub fn is_congestion_window_exhausted(&self) -> bool {
        self.bytes_in_flight >= self.congestion_window
    }

    pub fn on_packet_sent(&mut self, size: u64) {
        self.bytes_in_flight += size;
    }

    fn in_congestion_recovery(&self, sent_time: Instant) -> bool {
        matches!(self.congestion_recovery_start_time, Some(start) if sent_time <= start)
    }

    /// Grows the window for every newly-acknowledged packet not sent before the start of
    /// the current recovery period (RFC9002 §7.3.1/§7.3.2).
    pub fn on_packets_acked(&mut self, acked: &[SentPacket]) {
        for packet in acked {
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(packet.size);
            if self.in_congestion_recovery(packet.time_sent) {
                continue;
            }
            if self.congestion_window < self.ssthresh {
                self.phase = CongestionPhase::SlowStart;
                self.congestion_window += packet.size;
            } else {
                self.phase = CongestionPhase::CongestionAvoidance;
                self.congestion_window += self.max_datagram_size * packet.size / self.congestion_window;
            }
        }
    }

    /// Enters a new recovery period and halves the window (RFC9002 §7.3.2).
    pub fn on_congestion_event(&mut self, now: Instant, sent_time: Instant) {
        if self.in_congestion_recovery(sent_time) {
            return;
        }
        self.congestion_recovery_start_time = Some(now);
        self.congestion_window = (self.congestion_window / 2).max(MINIMUM_WINDOW_PACKETS * self.max_datagram_size);
        self.ssthresh = self.congestion_window;
        self.phase = CongestionPhase::Recovery;
    }

    pub fn on_lost_packets(&mut self, lost: &[SentPacket], now: Instant) {
        for packet in lost {
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(packet.size);
        }
        if let Some(most_recent) = lost.iter().map(|p| p.time_sent).max() {
            self.on_congestion_event(now, most_recent);
        }
    }

    /// Persistent congestion (RFC9002 §7.6) collapses the window to the minimum and
    /// resets slow start, distinct from an ordinary congestion event.
    pub fn on_persistent_congestion(&mut self) {
        self.congestion_window = MINIMUM_WINDOW_PACKETS * self.max_datagram_size;
        self.congestion_recovery_start_time = None;
        self.phase = CongestionPhase::SlowStart;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn packet(size: u64, time_sent: Instant) -> SentPacket {
        SentPacket {
            packet_number: 0,
            time_sent,
            ack_eliciting: true,
            in_flight: true,
            size,
            retransmittable_frames: vec![],
        }
    }

    #[test]
    fn test_slow_start_grows_window_by_acked_bytes() {
        let mut cc = NewRenoCongestionController::new(12000, 1200);
        cc.on_packet_sent(1200);
        let now = Instant::now();
        cc.on_packets_acked(&[packet(1200, now)]);
        assert_eq!(cc.congestion_window, 13200);
        assert_eq!(cc.phase(), CongestionPhase::SlowStart);
    }

    #[test]
    fn test_congestion_event_halves_window_and_enters_recovery() {
        let mut cc = NewRenoCongestionController::new(12000, 1200);
        let now = Instant::now();
        cc.on_congestion_event(now, now);
        assert_eq!(cc.congestion_window, 6000);
        assert_eq!(cc.phase(), CongestionPhase::Recovery);
    }

    #[test]
    fn test_second_loss_in_same_recovery_period_is_ignored() {
        let mut cc = NewRenoCongestionController::new(12000, 1200);
        let now = Instant::now();
        cc.on_congestion_event(now, now);
        let window_after_first = cc.congestion_window;
        cc.on_congestion_event(now, now);
        assert_eq!(cc.congestion_window, window_after_first);
    }
}
