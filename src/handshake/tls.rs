//! The TLS collaborator interface (§4.3, §6): a step function the handshake driver feeds
//! CRYPTO-stream bytes into and receives key installs, outgoing CRYPTO bytes, and
//! completion signals from. A production binding would wrap `rustls`; this crate ships a
//! deterministic in-process mock (no certificate fixture required) since TLS interop is
//! explicitly out of scope (§1 Non-goals).

use sha2::{Digest, Sha256};

use crate::crypto::aead::CipherSuite;
use crate::error::QuicheResult;
use crate::packet::types::EncryptionLevel;

/// Key material the TLS collaborator hands back once it has derived a new traffic secret
/// pair for a level (§4.2 "install").
pub struct NewKeys {
    pub level: EncryptionLevel,
    pub suite: CipherSuite,
    pub tx_secret: Vec<u8>,
    pub rx_secret: Vec<u8>,
}

/// Everything that can happen as a result of feeding the collaborator one batch of
/// incoming CRYPTO bytes (or kicking it off with none).
#[derive(Default)]
pub struct TlsOutput {
    pub outgoing: Vec<(EncryptionLevel, Vec<u8>)>,
    pub new_keys: Option<NewKeys>,
    pub transport_params_peer: Option<Vec<u8>>,
    pub handshake_done: bool,
    pub alert: Option<u8>,
}

/// The step-function interface the handshake driver (§4.3) drives. One instance per
/// connection, one direction of travel (client or server).
pub trait TlsEngine: Send {
    /// Kicks off the handshake. Clients emit ClientHello here; servers produce nothing
    /// until they see a ClientHello via [`TlsEngine::step`].
    fn start(&mut self) -> QuicheResult<TlsOutput>;

    /// Feeds CRYPTO-stream bytes received at `level` into the collaborator.
    fn step(&mut self, level: EncryptionLevel, incoming: &[u8]) -> QuicheResult<TlsOutput>;

    fn is_handshake_complete(&self) -> bool;
}

pub trait TlsEngineFactory: Send + Sync {
    fn new_client(&self, transport_params: Vec<u8>) -> Box<dyn TlsEngine>;
    fn new_server(&self, transport_params: Vec<u8>) -> Box<dyn TlsEngine>;
}

fn label_secret(label: &str) -> Vec<u8> {
    Sha256::digest(label.as_bytes()).to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Start,
    SentClientHello,
    InstalledOneRtt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Start,
    InstalledHandshake,
    InstalledOneRtt,
}

/// Deterministic mock client collaborator: no real ClientHello/ServerHello content, just
/// opaque markers framed as CRYPTO bytes, with symmetric fixed-label secrets so a loopback
/// client/server pair using the mock factory can actually decrypt each other's packets.
pub struct MockClientTls {
    state: ClientState,
    transport_params: Vec<u8>,
}

impl MockClientTls {
    pub fn new(transport_params: Vec<u8>) -> Self {
        Self {
            state: ClientState::Start,
            transport_params,
        }
    }
}

impl TlsEngine for MockClientTls {
    fn start(&mut self) -> QuicheResult<TlsOutput> {
        self.state = ClientState::SentClientHello;
        let mut msg = b"CH|".to_vec();
        msg.extend_from_slice(&self.transport_params);
        Ok(TlsOutput {
            outgoing: vec![(EncryptionLevel::Initial, msg)],
            ..Default::default()
        })
    }

    fn step(&mut self, level: EncryptionLevel, incoming: &[u8]) -> QuicheResult<TlsOutput> {
        match (self.state, level) {
            (ClientState::SentClientHello, EncryptionLevel::Initial) => {
                let peer_tp = incoming.strip_prefix(b"SH|").unwrap_or(incoming).to_vec();
                Ok(TlsOutput {
                    new_keys: Some(NewKeys {
                        level: EncryptionLevel::Handshake,
                        suite: CipherSuite::Aes128Gcm,
                        tx_secret: label_secret("hs-c2s"),
                        rx_secret: label_secret("hs-s2c"),
                    }),
                    transport_params_peer: Some(peer_tp),
                    ..Default::default()
                })
            }
            (ClientState::SentClientHello, EncryptionLevel::Handshake) if incoming == b"EE|CERT|CV|FIN" => {
                self.state = ClientState::InstalledOneRtt;
                Ok(TlsOutput {
                    outgoing: vec![(EncryptionLevel::Handshake, b"FIN".to_vec())],
                    new_keys: Some(NewKeys {
                        level: EncryptionLevel::OneRtt,
                        suite: CipherSuite::Aes128Gcm,
                        tx_secret: label_secret("app-c2s"),
                        rx_secret: label_secret("app-s2c"),
                    }),
                    handshake_done: true,
                    ..Default::default()
                })
            }
            _ => Ok(TlsOutput::default()),
        }
    }

    fn is_handshake_complete(&self) -> bool {
        self.state == ClientState::InstalledOneRtt
    }
}

/// Deterministic mock server collaborator, the mirror image of [`MockClientTls`].
pub struct MockServerTls {
    state: ServerState,
    transport_params: Vec<u8>,
}

impl MockServerTls {
    pub fn new(transport_params: Vec<u8>) -> Self {
        Self {
            state: ServerState::Start,
            transport_params,
        }
    }
}

impl TlsEngine for MockServerTls {
    fn start(&mut self) -> QuicheResult<TlsOutput> {
        // Servers are reactive: nothing to send before a ClientHello arrives.
        Ok(TlsOutput::default())
    }

    fn step(&mut self, level: EncryptionLevel, incoming: &[u8]) -> QuicheResult<TlsOutput> {
        match (self.state, level) {
            (ServerState::Start, EncryptionLevel::Initial) => {
                let peer_tp = incoming.strip_prefix(b"CH|").unwrap_or(incoming).to_vec();
                self.state = ServerState::InstalledHandshake;
                let mut sh = b"SH|".to_vec();
                sh.extend_from_slice(&self.transport_params);
                Ok(TlsOutput {
                    outgoing: vec![
                        (EncryptionLevel::Initial, sh),
                        (EncryptionLevel::Handshake, b"EE|CERT|CV|FIN".to_vec()),
                    ],
                    new_keys: Some(NewKeys {
                        level: EncryptionLevel::Handshake,
                        suite: CipherSuite::Aes128Gcm,
                        tx_secret: label_secret("hs-s2c"),
                        rx_secret: label_secret("hs-c2s"),
                    }),
                    transport_params_peer: Some(peer_tp),
                    ..Default::default()
                })
            }
            (ServerState::InstalledHandshake, EncryptionLevel::Handshake) if incoming == b"FIN" => {
                self.state = ServerState::InstalledOneRtt;
                Ok(TlsOutput {
                    new_keys: Some(NewKeys {
                        level: EncryptionLevel::OneRtt,
                        suite: CipherSuite::Aes128Gcm,
                        tx_secret: label_secret("app-s2c"),
                        rx_secret: label_secret("app-c2s"),
                    }),
                    handshake_done: true,
                    ..Default::default()
                })
            }
            _ => Ok(TlsOutput::default()),
        }
    }

    fn is_handshake_complete(&self) -> bool {
        self.state == ServerState::InstalledOneRtt
    }
}

pub struct MockTlsEngineFactory;

impl TlsEngineFactory for MockTlsEngineFactory {
    fn new_client(&self, transport_params: Vec<u8>) -> Box<dyn TlsEngine> {
        Box::new(MockClientTls::new(transport_params))
    }

    fn new_server(&self, transport_params: Vec<u8>) -> Box<dyn TlsEngine> {
        Box::new(MockServerTls::new(transport_params))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mock_handshake_reaches_one_rtt_on_both_sides() {
        let mut client = MockClientTls::new(b"client-tp".to_vec());
        let mut server = MockServerTls::new(b"server-tp".to_vec());

        let ch = client.start().unwrap();
        assert_eq!(ch.outgoing.len(), 1);

        let (level, bytes) = &ch.outgoing[0];
        let server_out = server.step(*level, bytes).unwrap();
        assert!(server_out.new_keys.is_some());
        assert_eq!(server_out.outgoing.len(), 2);

        let mut client_out = TlsOutput::default();
        for (level, bytes) in &server_out.outgoing {
            let out = client.step(*level, bytes).unwrap();
            if out.new_keys.is_some() || out.handshake_done {
                client_out = out;
            }
        }
        assert!(client.is_handshake_complete());
        assert!(client_out.handshake_done);

        let (level, bytes) = &client_out.outgoing[0];
        let server_fin_out = server.step(*level, bytes).unwrap();
        assert!(server.is_handshake_complete());
        assert!(server_fin_out.handshake_done);
    }
}
