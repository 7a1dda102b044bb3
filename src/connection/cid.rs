//! Connection ID lifecycle management (§3 "Connection Identifier", RFC9000 §5.1).

use std::collections::VecDeque;

use crate::packet::types::ConnectionId;

#[derive(Debug, Clone)]
pub struct IssuedCid {
    pub sequence_number: u64,
    pub cid: ConnectionId,
    pub stateless_reset_token: [u8; 16],
}

/// Connection IDs this endpoint has issued to the peer (NEW_CONNECTION_ID frames we sent),
/// and which of them remain active.
#[derive(Default)]
pub struct MyCids {
    issued: VecDeque<IssuedCid>,
    next_sequence_number: u64,
    retire_prior_to: u64,
}

impl MyCids {
    pub fn new(first: ConnectionId, first_reset_token: [u8; 16]) -> Self {
        let mut cids = VecDeque::new();
        cids.push_back(IssuedCid {
            sequence_number: 0,
            cid: first,
            stateless_reset_token: first_reset_token,
        });
        Self {
            issued: cids,
            next_sequence_number: 1,
            retire_prior_to: 0,
        }
    }

    /// Mints the next connection ID to offer via NEW_CONNECTION_ID.
    pub fn issue(&mut self, len: u8, reset_token: [u8; 16]) -> IssuedCid {
        let issued = IssuedCid {
            sequence_number: self.next_sequence_number,
            cid: ConnectionId::random(len),
            stateless_reset_token: reset_token,
        };
        self.next_sequence_number += 1;
        self.issued.push_back(issued.clone());
        issued
    }

    /// Handles a peer RETIRE_CONNECTION_ID: drops the matching sequence number.
    pub fn retire(&mut self, sequence_number: u64) {
        self.issued.retain(|c| c.sequence_number != sequence_number);
    }

    pub fn active_count(&self) -> usize {
        self.issued.len()
    }
}

/// Connection IDs the peer has issued to us (via NEW_CONNECTION_ID), one of which is our
/// current destination connection ID.
#[derive(Default)]
pub struct PeerCids {
    available: VecDeque<IssuedCid>,
    current: Option<IssuedCid>,
    retired_below: u64,
}

impl PeerCids {
    pub fn new(initial_dcid: ConnectionId) -> Self {
        Self {
            available: VecDeque::new(),
            current: Some(IssuedCid {
                sequence_number: 0,
                cid: initial_dcid,
                stateless_reset_token: [0; 16],
            }),
            retired_below: 0,
        }
    }

    pub fn current(&self) -> Option<&ConnectionId> {
        self.current.as_ref().map(|c| &c.cid)
    }

    /// Replaces the destination connection id after a validated Retry (RFC9000 §7.3): the
    /// client must address every subsequent packet, including the re-issued Initial, to the
    /// connection id the server's Retry packet carried as its source, discarding whatever
    /// NEW_CONNECTION_ID bookkeeping predates it.
    pub fn set_from_retry(&mut self, cid: ConnectionId) {
        self.available.clear();
        self.current = Some(IssuedCid {
            sequence_number: 0,
            cid,
            stateless_reset_token: [0; 16],
        });
        self.retired_below = 0;
    }

    /// Records a NEW_CONNECTION_ID frame from the peer. If `retire_prior_to` advances past
    /// sequence numbers we're still using, returns the ones that now must be retired.
    pub fn on_new_connection_id(&mut self, cid: IssuedCid, retire_prior_to: u64) -> Vec<u64> {
        self.available.push_back(cid);
        let mut to_retire = Vec::new();
        if retire_prior_to > self.retired_below {
            if let Some(current) = &self.current {
                if current.sequence_number < retire_prior_to {
                    to_retire.push(current.sequence_number);
                }
            }
            self.available.retain(|c| {
                if c.sequence_number < retire_prior_to {
                    to_retire.push(c.sequence_number);
                    false
                } else {
                    true
                }
            });
            self.retired_below = retire_prior_to;
            if to_retire.contains(&self.current.as_ref().map(|c| c.sequence_number).unwrap_or(u64::MAX)) {
                self.current = self.available.pop_front();
            }
        }
        to_retire
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_my_cids_issue_and_retire() {
        let mut cids = MyCids::new(ConnectionId::new(8, vec![0; 8]), [0; 16]);
        let issued = cids.issue(8, [1; 16]);
        assert_eq!(issued.sequence_number, 1);
        assert_eq!(cids.active_count(), 2);
        cids.retire(0);
        assert_eq!(cids.active_count(), 1);
    }

    #[test]
    fn test_peer_cids_retire_prior_to_rotates_current() {
        let mut cids = PeerCids::new(ConnectionId::new(8, vec![0; 8]));
        let next = IssuedCid {
            sequence_number: 1,
            cid: ConnectionId::new(8, vec![1; 8]),
            stateless_reset_token: [0; 16],
        };
        let retired = cids.on_new_connection_id(next.clone(), 1);
        assert_eq!(retired, vec![0]);
        assert_eq!(cids.current(), Some(&next.cid));
    }

    #[test]
    fn test_set_from_retry_replaces_current_and_drops_available() {
        let mut cids = PeerCids::new(ConnectionId::new(8, vec![0; 8]));
        cids.on_new_connection_id(
            IssuedCid {
                sequence_number: 1,
                cid: ConnectionId::new(8, vec![1; 8]),
                stateless_reset_token: [0; 16],
            },
            0,
        );
        let retry_cid = ConnectionId::new(8, vec![9; 8]);
        cids.set_from_retry(retry_cid.clone());
        assert_eq!(cids.current(), Some(&retry_cid));
    }
}
