//! Round-trip time estimation (RFC9002 §5).

use std::time::Duration;

use crate::config::K_INITIAL_RTT;

#[derive(Debug, Clone)]
pub struct RttEstimator {
    pub latest_rtt: Duration,
    pub min_rtt: Duration,
    pub smoothed_rtt: Duration,
    pub rttvar: Duration,
    first_sample_taken: bool,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            latest_rtt: Duration::ZERO,
            min_rtt: Duration::MAX,
            smoothed_rtt: K_INITIAL_RTT,
            rttvar: K_INITIAL_RTT / 2,
            first_sample_taken: false,
        }
    }

    /// Folds one RTT sample into the estimator (RFC9002 §5.3).
    pub fn update(&mut self, ack_delay: Duration, rtt_sample: Duration, max_ack_delay: Duration, handshake_confirmed: bool) {
        self.latest_rtt = rtt_sample;

        if !self.first_sample_taken {
            self.first_sample_taken = true;
            self.min_rtt = rtt_sample;
            self.smoothed_rtt = rtt_sample;
            self.rttvar = rtt_sample / 2;
            return;
        }

        self.min_rtt = self.min_rtt.min(rtt_sample);

        let capped_ack_delay = if handshake_confirmed {
            ack_delay.min(max_ack_delay)
        } else {
            ack_delay
        };

        let adjusted_rtt = if rtt_sample >= self.min_rtt + capped_ack_delay {
            rtt_sample - capped_ack_delay
        } else {
            rtt_sample
        };

        let rttvar_sample = abs_diff(self.smoothed_rtt, adjusted_rtt);
        self.rttvar = (self.rttvar * 3 + rttvar_sample) / 4;
        self.smoothed_rtt = (self.smoothed_rtt * 7 + adjusted_rtt) / 8;
    }

    /// Probe timeout duration (RFC9002 §6.2.1), excluding the exponential backoff term.
    pub fn base_pto(&self, max_ack_delay: Duration) -> Duration {
        self.smoothed_rtt + (self.rttvar * 4).max(crate::config::K_GRANULARITY) + max_ack_delay
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_sample_seeds_all_fields() {
        let mut rtt = RttEstimator::new();
        rtt.update(Duration::ZERO, Duration::from_millis(100), Duration::from_millis(25), false);
        assert_eq!(rtt.smoothed_rtt, Duration::from_millis(100));
        assert_eq!(rtt.min_rtt, Duration::from_millis(100));
        assert_eq!(rtt.rttvar, Duration::from_millis(50));
    }

    #[test]
    fn test_subsequent_sample_adjusts_smoothed_rtt() {
        let mut rtt = RttEstimator::new();
        rtt.update(Duration::ZERO, Duration::from_millis(100), Duration::from_millis(25), false);
        rtt.update(Duration::from_millis(5), Duration::from_millis(120), Duration::from_millis(25), true);
        assert!(rtt.smoothed_rtt > Duration::from_millis(100));
        assert!(rtt.smoothed_rtt < Duration::from_millis(120));
    }
}
