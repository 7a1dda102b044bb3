//! Key derivation for the Initial level (RFC9001 §5.2) and the per-level
//! HKDF-Expand-Label schedule used to turn a traffic secret into an AEAD key, IV, and
//! header-protection key (RFC9001 §5.1, §5.4).

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{QuicheError, QuicheResult};

/// RFC9001 §5.2: the salt used to derive the Initial secret, pinned to the version this
/// crate targets (the RETRY integrity tag open question, SPEC_FULL.md §9, is resolved the
/// same way — one fixed pair for the negotiated draft rather than switching on version).
const INITIAL_SALT: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c,
    0xad, 0xcc, 0xbb, 0x7f, 0x0a,
];

pub const INITIAL_SECRET_LEN: usize = 32;

/// Derives the client and server Initial traffic secrets from the client's chosen
/// destination connection ID.
pub fn derive_initial_secrets(dcid: &[u8]) -> ([u8; INITIAL_SECRET_LEN], [u8; INITIAL_SECRET_LEN]) {
    let (initial_secret, _) = Hkdf::<Sha256>::extract(Some(&INITIAL_SALT), dcid);
    let hk = Hkdf::<Sha256>::from_prk(initial_secret.as_ref()).expect("prk length matches Sha256");

    let mut client_secret = [0u8; INITIAL_SECRET_LEN];
    hkdf_expand_label(&hk, b"client in", &mut client_secret);

    let mut server_secret = [0u8; INITIAL_SECRET_LEN];
    hkdf_expand_label(&hk, b"server in", &mut server_secret);

    (client_secret, server_secret)
}

/// TLS 1.3 HKDF-Expand-Label (RFC8446 §7.1), specialized to the empty context QUIC always
/// uses for its "quic key"/"quic iv"/"quic hp" and CRYPTO-stream secret expansions.
pub fn hkdf_expand_label_from_secret(secret: &[u8], label: &[u8], out: &mut [u8]) -> QuicheResult<()> {
    let hk = Hkdf::<Sha256>::from_prk(secret)
        .map_err(|_| QuicheError::BadThingHappen("invalid traffic secret length".to_string()))?;
    hkdf_expand_label(&hk, label, out);
    Ok(())
}

fn hkdf_expand_label(hk: &Hkdf<Sha256>, label: &[u8], out: &mut [u8]) {
    let mut info = Vec::with_capacity(2 + 1 + 6 + label.len() + 1);
    info.extend_from_slice(&(out.len() as u16).to_be_bytes());
    let full_label_len = 6 + label.len(); // "tls13 " prefix
    info.push(full_label_len as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(0); // empty context
    hk.expand(&info, out)
        .expect("hkdf output length within 255*hash_len");
}

/// The three keys derived from a single traffic secret for one encryption level and
/// direction, per RFC9001 §5.1.
pub struct DerivedKeys {
    pub key: Vec<u8>,
    pub iv: [u8; 12],
    pub hp: Vec<u8>,
}

pub fn derive_keys(secret: &[u8], key_len: usize) -> QuicheResult<DerivedKeys> {
    let mut key = vec![0u8; key_len];
    hkdf_expand_label_from_secret(secret, b"quic key", &mut key)?;

    let mut iv = [0u8; 12];
    hkdf_expand_label_from_secret(secret, b"quic iv", &mut iv)?;

    let mut hp = vec![0u8; key_len];
    hkdf_expand_label_from_secret(secret, b"quic hp", &mut hp)?;

    Ok(DerivedKeys { key, iv, hp })
}

/// Derives the next-generation secret for a key update (RFC9001 §6), `secret_N+1` from
/// `secret_N`.
pub fn derive_next_secret(secret: &[u8]) -> QuicheResult<Vec<u8>> {
    let mut next = vec![0u8; secret.len()];
    hkdf_expand_label_from_secret(secret, b"quic ku", &mut next)?;
    Ok(next)
}

#[cfg(test)]
mod test {
    use super::*;

    // RFC9001 Appendix A.1 worked example.
    #[test]
    fn test_initial_secrets_match_rfc9001_vector() {
        let dcid = hex_literal::hex!("8394c8f03e515708");
        let (client_secret, server_secret) = derive_initial_secrets(&dcid);

        let client_keys = derive_keys(&client_secret, 16).unwrap();
        assert_eq!(
            client_keys.key,
            hex_literal::hex!("1f369613dd76d5467730efcbe3b1a22d")
        );
        assert_eq!(client_keys.iv, hex_literal::hex!("fa044b2f42a3fd3b46fb255c"));
        assert_eq!(client_keys.hp, hex_literal::hex!("9f50449e04a0e810283a1e9933adedd2"));

        let server_keys = derive_keys(&server_secret, 16).unwrap();
        assert_eq!(
            server_keys.key,
            hex_literal::hex!("cf3a5331653c364c88f0f379b6067e37")
        );
        assert_eq!(server_keys.iv, hex_literal::hex!("0ac1493ca1905853b0bba03e"));
        assert_eq!(server_keys.hp, hex_literal::hex!("c206b8d9b9f0f37644430b490eeaa314"));
    }
}
