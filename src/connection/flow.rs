//! Connection-level flow control counters (§3 "Flow control", RFC9000 §4).

#[derive(Debug, Clone)]
pub struct FlowControl {
    pub max_data_local: u64,
    pub max_data_remote: u64,
    pub data_sent: u64,
    pub data_received: u64,
}

impl FlowControl {
    pub fn new(max_data_local: u64, max_data_remote: u64) -> Self {
        Self {
            max_data_local,
            max_data_remote,
            data_sent: 0,
            data_received: 0,
        }
    }

    pub fn send_credit(&self) -> u64 {
        self.max_data_remote.saturating_sub(self.data_sent)
    }

    pub fn reserve_send(&mut self, len: u64) -> bool {
        if len > self.send_credit() {
            return false;
        }
        self.data_sent += len;
        true
    }

    pub fn on_bytes_received(&mut self, total_offset_seen: u64) -> bool {
        if total_offset_seen > self.data_received {
            self.data_received = total_offset_seen;
        }
        self.data_received <= self.max_data_local
    }

    /// Applies a peer MAX_DATA frame, raising our send window (RFC9000 §19.9). A peer
    /// re-advertising a smaller or equal value is a no-op, not a regression.
    pub fn on_max_data(&mut self, new_max: u64) {
        if new_max > self.max_data_remote {
            self.max_data_remote = new_max;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_send_credit_tracks_remote_limit() {
        let mut fc = FlowControl::new(1000, 100);
        assert!(fc.reserve_send(60));
        assert_eq!(fc.send_credit(), 40);
        assert!(!fc.reserve_send(41));
    }

    #[test]
    fn test_received_beyond_local_limit_is_a_violation() {
        let mut fc = FlowControl::new(100, 1000);
        assert!(fc.on_bytes_received(50));
        assert!(!fc.on_bytes_received(150));
    }

    #[test]
    fn test_on_max_data_only_raises_the_window() {
        let mut fc = FlowControl::new(1000, 100);
        fc.on_max_data(50);
        assert_eq!(fc.send_credit(), 100);
        fc.on_max_data(200);
        assert_eq!(fc.send_credit(), 200);
    }
}
