//! AEAD sealing and opening for QUIC short/long header packet payloads (RFC9001 §5.3).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::{QuicheError, QuicheResult};

pub const AEAD_TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
}

impl CipherSuite {
    pub fn key_len(self) -> usize {
        match self {
            CipherSuite::Aes128Gcm => 16,
            CipherSuite::Aes256Gcm => 32,
            CipherSuite::Chacha20Poly1305 => 32,
        }
    }

    pub fn is_chacha(self) -> bool {
        matches!(self, CipherSuite::Chacha20Poly1305)
    }
}

/// Computes the per-packet nonce: the 12-byte IV with the packet number XORed into its
/// low-order bytes (RFC9001 §5.3).
pub fn packet_nonce(iv: &[u8; 12], packet_number: u64) -> [u8; 12] {
    let mut nonce = *iv;
    let pn_bytes = packet_number.to_be_bytes();
    for i in 0..8 {
        nonce[4 + i] ^= pn_bytes[i];
    }
    nonce
}

pub fn seal(
    suite: CipherSuite,
    key: &[u8],
    iv: &[u8; 12],
    packet_number: u64,
    header: &[u8],
    plaintext: &[u8],
) -> QuicheResult<Vec<u8>> {
    let nonce = packet_nonce(iv, packet_number);
    let payload = Payload {
        msg: plaintext,
        aad: header,
    };
    let out = match suite {
        CipherSuite::Aes128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|_| QuicheError::BadThingHappen("bad aead key length".to_string()))?;
            cipher.encrypt(&nonce.into(), payload)
        }
        CipherSuite::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|_| QuicheError::BadThingHappen("bad aead key length".to_string()))?;
            cipher.encrypt(&nonce.into(), payload)
        }
        CipherSuite::Chacha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| QuicheError::BadThingHappen("bad aead key length".to_string()))?;
            cipher.encrypt(&nonce.into(), payload)
        }
    };
    out.map_err(|_| QuicheError::BadThingHappen("aead seal failed".to_string()))
}

pub fn open(
    suite: CipherSuite,
    key: &[u8],
    iv: &[u8; 12],
    packet_number: u64,
    header: &[u8],
    ciphertext: &[u8],
) -> QuicheResult<Vec<u8>> {
    let nonce = packet_nonce(iv, packet_number);
    let payload = Payload {
        msg: ciphertext,
        aad: header,
    };
    let out = match suite {
        CipherSuite::Aes128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|_| QuicheError::BadThingHappen("bad aead key length".to_string()))?;
            cipher.decrypt(&nonce.into(), payload)
        }
        CipherSuite::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|_| QuicheError::BadThingHappen("bad aead key length".to_string()))?;
            cipher.decrypt(&nonce.into(), payload)
        }
        CipherSuite::Chacha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| QuicheError::BadThingHappen("bad aead key length".to_string()))?;
            cipher.decrypt(&nonce.into(), payload)
        }
    };
    // AEAD authentication failure must not distinguish itself from any other malformed
    // input to the caller (Invariant 1, §3): packets that fail to decrypt are dropped.
    out.map_err(|_| QuicheError::Malformed("aead authentication failed".to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::secrets::{derive_initial_secrets, derive_keys};

    #[test]
    fn test_seal_open_round_trip() {
        let dcid = hex_literal::hex!("8394c8f03e515708");
        let (client_secret, _) = derive_initial_secrets(&dcid);
        let keys = derive_keys(&client_secret, CipherSuite::Aes128Gcm.key_len()).unwrap();

        let header = b"fake-header-bytes";
        let plaintext = b"crypto frame payload";
        let sealed = seal(CipherSuite::Aes128Gcm, &keys.key, &keys.iv, 2, header, plaintext).unwrap();
        let opened = open(CipherSuite::Aes128Gcm, &keys.key, &keys.iv, 2, header, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_open_rejects_tampered_ciphertext() {
        let dcid = hex_literal::hex!("8394c8f03e515708");
        let (client_secret, _) = derive_initial_secrets(&dcid);
        let keys = derive_keys(&client_secret, CipherSuite::Aes128Gcm.key_len()).unwrap();

        let header = b"fake-header-bytes";
        let mut sealed = seal(CipherSuite::Aes128Gcm, &keys.key, &keys.iv, 2, header, b"hello").unwrap();
        *sealed.last_mut().unwrap() ^= 0xff;
        assert!(open(CipherSuite::Aes128Gcm, &keys.key, &keys.iv, 2, header, &sealed).is_err());
    }

    #[test]
    fn test_nonce_folds_packet_number_into_low_bytes() {
        let iv = [0u8; 12];
        let nonce = packet_nonce(&iv, 1);
        assert_eq!(nonce, [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    }
}
