//! The connection's observable lifecycle (§3 "Connection state", §4.7).

/// Mirrors [`crate::handshake::HandshakeProgress`] up through `Established`, then extends
/// it with the shutdown states a handshake driver never sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    ReadyFor0Rtt,
    ReadyFor1Rtt,
    Established,
    /// This endpoint has sent or received a CONNECTION_CLOSE and is waiting out the
    /// draining period before fully discarding state (RFC9000 §10.2).
    Closing,
    Draining,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn is_closing_or_draining(self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Draining)
    }

    pub fn from_handshake_progress(progress: crate::handshake::HandshakeProgress) -> Self {
        match progress {
            crate::handshake::HandshakeProgress::Handshaking => ConnectionState::Handshaking,
            crate::handshake::HandshakeProgress::ReadyFor0Rtt => ConnectionState::ReadyFor0Rtt,
            crate::handshake::HandshakeProgress::ReadyFor1Rtt => ConnectionState::ReadyFor1Rtt,
            crate::handshake::HandshakeProgress::Established => ConnectionState::Established,
        }
    }
}
