//! Per-level key state and the key-update state machine (RFC9001 §6, §5.1). Supersedes
//! the teacher's unused `Coder` trait: the per-direction encrypt/decrypt/protect/unprotect
//! behavior is fixed once a suite is chosen, so a plain struct of derived keys plays the
//! role the teacher sketched as a function-pointer record.

use crate::crypto::aead::{self, CipherSuite};
use crate::crypto::hp::{self, SAMPLE_LEN};
use crate::crypto::secrets::{self, DerivedKeys};
use crate::error::QuicheResult;
use crate::packet::types::EncryptionLevel;

/// The three derived keys for one direction (tx or rx) at one encryption level.
#[derive(Clone)]
pub struct LevelKeys {
    pub suite: CipherSuite,
    pub key: Vec<u8>,
    pub iv: [u8; 12],
    pub hp: Vec<u8>,
}

impl LevelKeys {
    fn from_derived(suite: CipherSuite, derived: DerivedKeys) -> Self {
        Self {
            suite,
            key: derived.key,
            iv: derived.iv,
            hp: derived.hp,
        }
    }

    pub fn header_protection_mask(&self, sample: &[u8]) -> QuicheResult<[u8; 5]> {
        hp::header_protection_mask(self.suite, &self.hp, sample)
    }

    pub fn seal(&self, packet_number: u64, header: &[u8], plaintext: &[u8]) -> QuicheResult<Vec<u8>> {
        aead::seal(self.suite, &self.key, &self.iv, packet_number, header, plaintext)
    }

    pub fn open(&self, packet_number: u64, header: &[u8], ciphertext: &[u8]) -> QuicheResult<Vec<u8>> {
        aead::open(self.suite, &self.key, &self.iv, packet_number, header, ciphertext)
    }
}

/// The tx/rx key pair installed for a single encryption level. 1-RTT additionally tracks
/// the traffic secrets so a key update (RFC9001 §6) can derive the next generation.
pub struct LevelCrypto {
    pub tx: LevelKeys,
    pub rx: LevelKeys,
    tx_secret: Vec<u8>,
    rx_secret: Vec<u8>,
    pub key_phase: bool,
}

impl LevelCrypto {
    pub fn install(suite: CipherSuite, tx_secret: Vec<u8>, rx_secret: Vec<u8>) -> QuicheResult<Self> {
        let tx = LevelKeys::from_derived(suite, secrets::derive_keys(&tx_secret, suite.key_len())?);
        let rx = LevelKeys::from_derived(suite, secrets::derive_keys(&rx_secret, suite.key_len())?);
        Ok(Self {
            tx,
            rx,
            tx_secret,
            rx_secret,
            key_phase: false,
        })
    }

    /// Derives and installs the next key-phase generation in place, flipping the phase
    /// bit this endpoint will stamp on outgoing packets.
    pub fn update(&mut self) -> QuicheResult<()> {
        let suite = self.tx.suite;
        let next_tx_secret = secrets::derive_next_secret(&self.tx_secret)?;
        let next_rx_secret = secrets::derive_next_secret(&self.rx_secret)?;
        self.tx = LevelKeys::from_derived(suite, secrets::derive_keys(&next_tx_secret, suite.key_len())?);
        self.rx = LevelKeys::from_derived(suite, secrets::derive_keys(&next_rx_secret, suite.key_len())?);
        self.tx_secret = next_tx_secret;
        self.rx_secret = next_rx_secret;
        self.key_phase = !self.key_phase;
        Ok(())
    }
}

/// Owns every level's keys for the lifetime they remain installed, and discards them once
/// the corresponding packet-number space is retired (§4.7 "Established" transition:
/// Initial and Handshake key material is dropped once the handshake completes).
#[derive(Default)]
pub struct CryptoContext {
    pub initial: Option<LevelCrypto>,
    pub handshake: Option<LevelCrypto>,
    pub zero_rtt: Option<LevelCrypto>,
    pub one_rtt: Option<LevelCrypto>,
}

impl CryptoContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_initial(&mut self, dcid: &[u8], is_client: bool) -> QuicheResult<()> {
        let (client_secret, server_secret) = secrets::derive_initial_secrets(dcid);
        let (tx_secret, rx_secret) = if is_client {
            (client_secret.to_vec(), server_secret.to_vec())
        } else {
            (server_secret.to_vec(), client_secret.to_vec())
        };
        self.initial = Some(LevelCrypto::install(CipherSuite::Aes128Gcm, tx_secret, rx_secret)?);
        Ok(())
    }

    pub fn install(
        &mut self,
        level: EncryptionLevel,
        suite: CipherSuite,
        tx_secret: Vec<u8>,
        rx_secret: Vec<u8>,
    ) -> QuicheResult<()> {
        let installed = LevelCrypto::install(suite, tx_secret, rx_secret)?;
        match level {
            EncryptionLevel::Initial => self.initial = Some(installed),
            EncryptionLevel::Handshake => self.handshake = Some(installed),
            EncryptionLevel::ZeroRtt => self.zero_rtt = Some(installed),
            EncryptionLevel::OneRtt => self.one_rtt = Some(installed),
        }
        Ok(())
    }

    pub fn get(&self, level: EncryptionLevel) -> Option<&LevelCrypto> {
        match level {
            EncryptionLevel::Initial => self.initial.as_ref(),
            EncryptionLevel::Handshake => self.handshake.as_ref(),
            EncryptionLevel::ZeroRtt => self.zero_rtt.as_ref(),
            EncryptionLevel::OneRtt => self.one_rtt.as_ref(),
        }
    }

    pub fn get_mut(&mut self, level: EncryptionLevel) -> Option<&mut LevelCrypto> {
        match level {
            EncryptionLevel::Initial => self.initial.as_mut(),
            EncryptionLevel::Handshake => self.handshake.as_mut(),
            EncryptionLevel::ZeroRtt => self.zero_rtt.as_mut(),
            EncryptionLevel::OneRtt => self.one_rtt.as_mut(),
        }
    }

    /// Drops Initial key material: called once the first Handshake packet is sent or
    /// received (RFC9001 §4.9.1).
    pub fn discard_initial(&mut self) {
        self.initial = None;
    }

    /// Drops Handshake key material: called once the handshake is confirmed (§4.7
    /// Established transition, RFC9001 §4.9.2).
    pub fn discard_handshake(&mut self) {
        self.handshake = None;
    }
}

pub const HEADER_PROTECTION_SAMPLE_LEN: usize = SAMPLE_LEN;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_initial_install_is_symmetric_between_endpoints() {
        let dcid = hex_literal::hex!("8394c8f03e515708");
        let mut client = CryptoContext::new();
        client.install_initial(&dcid, true).unwrap();
        let mut server = CryptoContext::new();
        server.install_initial(&dcid, false).unwrap();

        let client_initial = client.initial.as_ref().unwrap();
        let server_initial = server.initial.as_ref().unwrap();

        let sealed = client_initial.tx.seal(1, b"hdr", b"ping").unwrap();
        let opened = server_initial.rx.open(1, b"hdr", &sealed).unwrap();
        assert_eq!(opened, b"ping");
    }

    #[test]
    fn test_key_update_changes_keys_and_flips_phase() {
        let dcid = hex_literal::hex!("8394c8f03e515708");
        let mut ctx = CryptoContext::new();
        ctx.install_initial(&dcid, true).unwrap();
        let before_key = ctx.initial.as_ref().unwrap().tx.key.clone();
        let level = ctx.initial.as_mut().unwrap();
        level.update().unwrap();
        assert_ne!(before_key, level.tx.key);
        assert!(level.key_phase);
    }
}
