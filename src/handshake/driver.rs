//! Drives a [`TlsEngine`] to completion against a connection's CRYPTO streams (§4.3).
//! Owns no transport state itself — it only decides what CRYPTO bytes to emit and which
//! keys to install, leaving packetization to the runtime layer.

use crate::crypto::context::CryptoContext;
use crate::error::QuicheResult;
use crate::handshake::tls::TlsEngine;
use crate::packet::types::EncryptionLevel;

/// Where a handshake driver currently sits in the observable connection lifecycle (§3,
/// §4.7). `Handshaking` covers everything up to the peer's Finished; the two "ReadyFor"
/// states mark completed send-key installs that the runtime layer can act on immediately
/// even before the handshake itself is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    Handshaking,
    ReadyFor0Rtt,
    ReadyFor1Rtt,
    Established,
}

pub struct HandshakeDriver {
    engine: Box<dyn TlsEngine>,
    progress: HandshakeProgress,
}

/// One step's worth of work for the runtime layer to act on: CRYPTO bytes to frame and
/// send, and whether the handshake has now reached Established.
pub struct DriverOutput {
    pub outgoing: Vec<(EncryptionLevel, Vec<u8>)>,
    pub just_established: bool,
}

impl HandshakeDriver {
    pub fn new(engine: Box<dyn TlsEngine>) -> Self {
        Self {
            engine,
            progress: HandshakeProgress::Handshaking,
        }
    }

    pub fn progress(&self) -> HandshakeProgress {
        self.progress
    }

    /// Kicks off the handshake (client: emits ClientHello; server: no-op until a peer
    /// ClientHello arrives via [`HandshakeDriver::receive_crypto`]).
    pub fn start(&mut self, crypto: &mut CryptoContext) -> QuicheResult<DriverOutput> {
        let output = self.engine.start()?;
        self.apply(crypto, output)
    }

    /// Feeds CRYPTO-stream bytes received at `level` to the collaborator and applies any
    /// resulting key installs.
    pub fn receive_crypto(
        &mut self,
        crypto: &mut CryptoContext,
        level: EncryptionLevel,
        bytes: &[u8],
    ) -> QuicheResult<DriverOutput> {
        let output = self.engine.step(level, bytes)?;
        self.apply(crypto, output)
    }

    fn apply(
        &mut self,
        crypto: &mut CryptoContext,
        output: crate::handshake::tls::TlsOutput,
    ) -> QuicheResult<DriverOutput> {
        let mut just_established = false;

        if let Some(new_keys) = output.new_keys {
            crypto.install(new_keys.level, new_keys.suite, new_keys.tx_secret, new_keys.rx_secret)?;
            self.progress = match new_keys.level {
                EncryptionLevel::ZeroRtt => HandshakeProgress::ReadyFor0Rtt,
                EncryptionLevel::OneRtt => HandshakeProgress::ReadyFor1Rtt,
                _ => self.progress,
            };
        }

        if output.handshake_done && self.engine.is_handshake_complete() {
            self.progress = HandshakeProgress::Established;
            just_established = true;
        }

        Ok(DriverOutput {
            outgoing: output.outgoing,
            just_established,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handshake::tls::{MockClientTls, MockServerTls};

    #[test]
    fn test_driver_reaches_established_on_both_ends() {
        let mut client_crypto = CryptoContext::new();
        let mut client = HandshakeDriver::new(Box::new(MockClientTls::new(b"c".to_vec())));
        let mut server_crypto = CryptoContext::new();
        let mut server = HandshakeDriver::new(Box::new(MockServerTls::new(b"s".to_vec())));

        let ch = client.start(&mut client_crypto).unwrap();
        let (level, bytes) = ch.outgoing[0].clone();

        let server_out = server.receive_crypto(&mut server_crypto, level, &bytes).unwrap();
        assert!(server_crypto.handshake.is_some());

        let mut last_client_out = None;
        for (level, bytes) in server_out.outgoing {
            last_client_out = Some(client.receive_crypto(&mut client_crypto, level, &bytes).unwrap());
        }
        let client_out = last_client_out.unwrap();
        assert!(client_out.just_established);
        assert_eq!(client.progress(), HandshakeProgress::Established);

        let (level, bytes) = client_out.outgoing[0].clone();
        let server_fin = server.receive_crypto(&mut server_crypto, level, &bytes).unwrap();
        assert!(server_fin.just_established);
        assert_eq!(server.progress(), HandshakeProgress::Established);

        assert!(client_crypto.one_rtt.is_some());
        assert!(server_crypto.one_rtt.is_some());
    }
}
