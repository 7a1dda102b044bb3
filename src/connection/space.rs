//! Per-packet-number-space outgoing/incoming bookkeeping: the next packet number to send,
//! which received packet numbers still need acknowledging, and that space's CRYPTO stream
//! reassembly (§4.4, §4.5, RFC9000 §12.3).

use std::time::Instant;

use crate::connection::streams::OrderedReassembly;

/// Tracks received packet numbers well enough to emit RFC9000 §19.3 ACK ranges without
/// retaining the full history forever; collapses into contiguous ranges eagerly.
#[derive(Default)]
pub struct ReceivedTracker {
    // Ranges stored largest-first as (low, high) inclusive, non-overlapping, non-adjacent.
    ranges: Vec<(u64, u64)>,
    pub largest_received: Option<u64>,
    pub largest_received_time: Option<Instant>,
    pub ack_eliciting_since_last_ack: bool,
}

impl ReceivedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_packet_received(&mut self, pn: u64, now: Instant, ack_eliciting: bool) {
        let is_new_largest = match self.largest_received {
            Some(largest) => pn > largest,
            None => true,
        };
        if is_new_largest {
            self.largest_received = Some(pn);
            self.largest_received_time = Some(now);
        }
        if ack_eliciting {
            self.ack_eliciting_since_last_ack = true;
        }

        let mut merged = (pn, pn);
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;
        for &(lo, hi) in &self.ranges {
            if merged.1 + 1 < lo {
                if !inserted {
                    out.push(merged);
                    inserted = true;
                }
                out.push((lo, hi));
            } else if hi + 1 < merged.0 {
                out.push((lo, hi));
            } else {
                merged = (merged.0.min(lo), merged.1.max(hi));
            }
        }
        if !inserted {
            out.push(merged);
        }
        out.sort_by(|a, b| b.0.cmp(&a.0));
        self.ranges = out;
    }

    /// Ranges in the form [`crate::packet::frame::Frame::Ack`] expects: largest-first.
    pub fn ack_ranges(&self) -> Vec<(u64, u64)> {
        self.ranges.clone()
    }

    pub fn has_unacked(&self) -> bool {
        self.ack_eliciting_since_last_ack
    }

    pub fn on_ack_sent(&mut self) {
        self.ack_eliciting_since_last_ack = false;
    }
}

pub struct PacketNumberSpace {
    pub next_pn: u64,
    pub received: ReceivedTracker,
    pub crypto_send_offset: u64,
    pub crypto_recv: OrderedReassembly,
    pub keys_discarded: bool,
    /// Largest packet number of ours the peer has acknowledged, used to pick the
    /// shortest safe truncated packet-number encoding (RFC9000 Appendix A).
    pub largest_acked_by_peer: Option<u64>,
}

impl PacketNumberSpace {
    pub fn new() -> Self {
        Self {
            next_pn: 0,
            received: ReceivedTracker::new(),
            crypto_send_offset: 0,
            crypto_recv: OrderedReassembly::new(),
            keys_discarded: false,
            largest_acked_by_peer: None,
        }
    }

    pub fn allocate_pn(&mut self) -> u64 {
        let pn = self.next_pn;
        self.next_pn += 1;
        pn
    }
}

impl Default for PacketNumberSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_received_tracker_merges_contiguous_ranges() {
        let mut tracker = ReceivedTracker::new();
        let now = Instant::now();
        tracker.on_packet_received(0, now, true);
        tracker.on_packet_received(1, now, true);
        tracker.on_packet_received(2, now, true);
        assert_eq!(tracker.ack_ranges(), vec![(0, 2)]);
    }

    #[test]
    fn test_received_tracker_keeps_gapped_ranges_separate() {
        let mut tracker = ReceivedTracker::new();
        let now = Instant::now();
        tracker.on_packet_received(0, now, true);
        tracker.on_packet_received(1, now, true);
        tracker.on_packet_received(5, now, true);
        let ranges = tracker.ack_ranges();
        assert_eq!(ranges, vec![(5, 5), (0, 1)]);
    }
}
