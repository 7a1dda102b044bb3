//! The wire codec (§4.1): combines the pure packet-format types in [`crate::packet`] with
//! the key material in [`crate::crypto`] to apply and remove header protection and AEAD
//! sealing. No frame is ever acted on before both checks pass (invariant 1, §3).

use bytes::Buf;

use crate::crypto::aead::{self, CipherSuite};
use crate::crypto::context::LevelKeys;
use crate::crypto::hp::SAMPLE_LEN;
use crate::error::{require, QuicheError, QuicheResult};
use crate::packet::frame::Frame;
use crate::packet::header::Header;
use crate::packet::pn;
use crate::packet::types::ConnectionId;

/// Minimum size of the first Initial datagram a client sends, padded if necessary
/// (§8 testable scenario 2, RFC9000 §14.1).
pub const MIN_INITIAL_DATAGRAM_SIZE: usize = 1200;

/// Seals `frames` under `header`/`packet_number` using `keys`, applying header protection
/// to the result. `header` must already carry the final `packet_number_length`; for long
/// headers the length field is appended here once the sealed length is known.
pub fn encode_packet(
    header: &Header,
    packet_number: u64,
    frames: &[Frame],
    keys: &LevelKeys,
) -> QuicheResult<Vec<u8>> {
    let pn_len = header
        .packet_number_length()
        .ok_or_else(|| QuicheError::BadThingHappen("header has no packet number".to_string()))?
        as usize;

    let mut plaintext = Vec::new();
    for frame in frames {
        frame.encode(&mut plaintext);
    }

    let mut header_bytes = header.encode()?;
    if header.is_long() {
        // Long headers carry a varint length covering [packet number][payload][aead tag].
        let length = pn_len + plaintext.len() + aead::AEAD_TAG_LEN;
        crate::primitives::varint::VarInt::new_u64(length as u64)?.encode(&mut header_bytes);
    }
    let pn_offset = header_bytes.len();
    header_bytes.extend_from_slice(&pn::encode_truncated(packet_number, pn_len));

    let ciphertext = keys.seal(packet_number, &header_bytes, &plaintext)?;

    let mut packet = header_bytes;
    packet.extend_from_slice(&ciphertext);

    apply_header_protection(&mut packet, pn_offset, pn_len, keys)?;
    Ok(packet)
}

fn apply_header_protection(
    packet: &mut [u8],
    pn_offset: usize,
    pn_len: usize,
    keys: &LevelKeys,
) -> QuicheResult<()> {
    let sample_offset = pn_offset + 4;
    require(packet.len() >= sample_offset + SAMPLE_LEN, "packet too short to sample")?;
    let mask = keys.header_protection_mask(&packet[sample_offset..sample_offset + SAMPLE_LEN])?;

    let is_long = packet[0] & 0x80 != 0;
    let first_byte_mask = if is_long { 0x0f } else { 0x1f };
    packet[0] ^= mask[0] & first_byte_mask;

    for i in 0..pn_len {
        packet[pn_offset + i] ^= mask[1 + i];
    }
    Ok(())
}

/// Decoded output of [`decode_packet`]: the un-protected, AEAD-verified packet plus any
/// trailing bytes from the same UDP datagram (long-header packets may be coalesced).
pub struct DecodedPacket {
    pub header: Header,
    pub packet_number: u64,
    pub frames: Vec<Frame>,
    pub consumed: usize,
}

/// Removes header protection and verifies the AEAD tag for a single packet at the front
/// of `datagram`, returning how many bytes it consumed so the caller can continue
/// decoding any coalesced packets that follow (§4.1 "Coalescing").
///
/// `datagram` must begin with an Initial, 0-RTT, Handshake, or Short-header packet — Retry
/// and Version Negotiation packets carry no packet number or AEAD protection and must be
/// recognized and handled by the caller before reaching this function.
pub fn decode_packet(
    datagram: &[u8],
    dst_cid_len: usize,
    largest_pn: i64,
    keys: &LevelKeys,
) -> QuicheResult<DecodedPacket> {
    require(!datagram.is_empty(), "empty datagram")?;
    let is_long = Header::peek_is_long(datagram[0]);
    let mut probe = datagram.to_vec();

    // First pass: decode the header with its pn field still protected (pn_length reads
    // as garbage from the masked low bits, corrected after protection is removed).
    let pn_offset = if is_long {
        long_header_pn_offset(&probe)?
    } else {
        1 + dst_cid_len
    };

    // Recover the real pn_length by unmasking just the flag byte and up to 4 pn bytes.
    let sample_offset = pn_offset + 4;
    require(probe.len() >= sample_offset + SAMPLE_LEN, "packet too short to sample")?;
    let mask = keys.header_protection_mask(&probe[sample_offset..sample_offset + SAMPLE_LEN])?;

    let first_byte_mask = if is_long { 0x0f } else { 0x1f };
    probe[0] ^= mask[0] & first_byte_mask;
    let pn_len = (probe[0] & 0x03) as usize + 1;

    for i in 0..pn_len {
        probe[pn_offset + i] ^= mask[1 + i];
    }

    let truncated_pn = {
        let mut val = 0u64;
        for i in 0..pn_len {
            val = (val << 8) | probe[pn_offset + i] as u64;
        }
        val
    };
    let packet_number = pn::decode_packet_number(largest_pn, truncated_pn, pn_len);

    let header_bytes_len = pn_offset + pn_len;
    let header_bytes = probe[..header_bytes_len].to_vec();

    let payload_len = if is_long {
        let header_prefix_len = peek_long_header_prefix_len(&probe)?;
        let mut cursor = &probe[header_prefix_len..];
        let length = crate::primitives::varint::VarInt::decode(&mut cursor)?.usize();
        require(length >= pn_len, "length shorter than packet number")?;
        length - pn_len
    } else {
        probe.len() - header_bytes_len
    };
    require(probe.len() >= header_bytes_len + payload_len, "truncated packet payload")?;

    let ciphertext = &probe[header_bytes_len..header_bytes_len + payload_len];
    let plaintext = keys.open(packet_number, &header_bytes, ciphertext)?;
    let frames = crate::packet::packet::PlainPacket::decode_frames(&plaintext)?;

    let header = if is_long {
        Header::decode_long(&mut header_bytes.as_slice(), &[])?
    } else {
        Header::decode_short(&mut header_bytes.as_slice(), dst_cid_len)?
    };

    Ok(DecodedPacket {
        header,
        packet_number,
        frames,
        consumed: header_bytes_len + payload_len,
    })
}

fn peek_long_header_prefix_len(bytes: &[u8]) -> QuicheResult<usize> {
    require(bytes.len() >= 6, "truncated long header")?;
    let dst_cid_len = bytes[5] as usize;
    let mut offset = 6 + dst_cid_len;
    require(bytes.len() > offset, "truncated long header src cid")?;
    let src_cid_len = bytes[offset] as usize;
    offset += 1 + src_cid_len;

    let long_packet_type = (bytes[0] >> 4) & 0b11;
    if long_packet_type == 0b00 {
        require(bytes.len() > offset, "truncated initial token length")?;
        let mut cursor = &bytes[offset..];
        let remaining_before = cursor.remaining();
        let token_len = crate::primitives::varint::VarInt::decode(&mut cursor)?.usize();
        offset += remaining_before - cursor.remaining();
        offset += token_len;
    }
    Ok(offset)
}

fn long_header_pn_offset(bytes: &[u8]) -> QuicheResult<usize> {
    let prefix_len = peek_long_header_prefix_len(bytes)?;
    require(bytes.len() > prefix_len, "truncated long header length")?;
    let mut cursor = &bytes[prefix_len..];
    let remaining_before = cursor.remaining();
    let _ = crate::primitives::varint::VarInt::decode(&mut cursor)?;
    Ok(prefix_len + (remaining_before - cursor.remaining()))
}

/// RFC9001 §5.8: the fixed AEAD key/nonce used to compute and verify a Retry packet's
/// integrity tag. Pinned to the single QUIC version this crate negotiates — the RETRY
/// open question (SPEC_FULL.md §9) is resolved by never switching this pair on version.
const RETRY_INTEGRITY_KEY: [u8; 16] = [
    0xbe, 0x0c, 0x69, 0x0b, 0x9f, 0x66, 0x57, 0x5a, 0x1d, 0x76, 0x6b, 0x54, 0xe3, 0x68, 0xc8, 0x4e,
];
const RETRY_INTEGRITY_NONCE: [u8; 12] = [
    0x46, 0x15, 0x99, 0xd3, 0x5d, 0x63, 0x2b, 0xf2, 0x23, 0x98, 0x25, 0xbb,
];

fn retry_pseudo_packet(original_dcid: &ConnectionId, retry_header_and_token: &[u8]) -> Vec<u8> {
    let mut pseudo = Vec::with_capacity(1 + original_dcid.cid.len() + retry_header_and_token.len());
    pseudo.push(original_dcid.cid_len);
    pseudo.extend_from_slice(&original_dcid.cid);
    pseudo.extend_from_slice(retry_header_and_token);
    pseudo
}

/// Computes the 16-byte Retry integrity tag to append to a Retry packet's wire bytes.
pub fn compute_retry_integrity_tag(original_dcid: &ConnectionId, retry_header_and_token: &[u8]) -> QuicheResult<[u8; 16]> {
    let pseudo = retry_pseudo_packet(original_dcid, retry_header_and_token);
    let sealed = aead::seal(
        CipherSuite::Aes128Gcm,
        &RETRY_INTEGRITY_KEY,
        &RETRY_INTEGRITY_NONCE,
        0,
        &pseudo,
        &[],
    )?;
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&sealed);
    Ok(tag)
}

pub fn verify_retry_integrity_tag(
    original_dcid: &ConnectionId,
    retry_header_and_token: &[u8],
    tag: &[u8],
) -> bool {
    match compute_retry_integrity_tag(original_dcid, retry_header_and_token) {
        Ok(expected) => expected.as_slice() == tag,
        Err(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::context::CryptoContext;
    use crate::packet::types::ConnectionId;

    fn keys_pair() -> (LevelKeys, LevelKeys) {
        let dcid = hex_literal::hex!("8394c8f03e515708");
        let mut client = CryptoContext::new();
        client.install_initial(&dcid, true).unwrap();
        let mut server = CryptoContext::new();
        server.install_initial(&dcid, false).unwrap();
        (
            client.initial.unwrap().tx,
            server.initial.unwrap().rx,
        )
    }

    #[test]
    fn test_encode_decode_packet_round_trip() {
        let (tx_keys, rx_keys) = keys_pair();
        let header = Header::Initial {
            version: 1,
            dst_cid: ConnectionId::new(8, vec![0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]),
            src_cid: ConnectionId::new(0, vec![]),
            token: vec![],
            reserved_bits: 0,
            packet_number_length: 2,
        };
        let frames = vec![Frame::Crypto { offset: 0, data: vec![1, 2, 3, 4] }];
        let mut packet = encode_packet(&header, 2, &frames, &tx_keys).unwrap();
        while packet.len() < MIN_INITIAL_DATAGRAM_SIZE {
            packet.push(0);
        }

        let decoded = decode_packet(&packet, 8, -1, &rx_keys).unwrap();
        assert_eq!(decoded.packet_number, 2);
        assert_eq!(decoded.frames, frames);
    }

    #[test]
    fn test_retry_integrity_tag_round_trips() {
        let odcid = ConnectionId::new(8, vec![0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]);
        let header_and_token = b"fake-retry-header-and-token";
        let tag = compute_retry_integrity_tag(&odcid, header_and_token).unwrap();
        assert!(verify_retry_integrity_tag(&odcid, header_and_token, &tag));
        assert!(!verify_retry_integrity_tag(&odcid, header_and_token, &[0u8; 16]));
    }
}
