use bytes::{Buf, BufMut};

use crate::bits::BitsExt;
use crate::error::{require, QuicheResult};
use crate::primitives::varint::VarInt;

use super::types::*;

// From QUIC spec
// Upon first receiving an Initial or Retry packet from the server, the client uses the Source Connection ID supplied by the server as the Destination Connection ID for subsequent packets, including any 0-RTT packets.
// This means that a client might have to change the connection ID it sets in the Destination Connection ID field twice during connection establishment:
// once in response to a Retry packet and once in response to an Initial packet from the server.
// Once a client has received a valid Initial packet from the server, it MUST discard any subsequent packet it receives on that connection with a different Source Connection ID.

/// An unprotected QUIC packet header, up to but not including the length field (for long
/// headers with a length) and the packet-number bytes, which the packet codec appends once it
/// knows the final payload size and the truncated packet number (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Initial {
        version: u32,
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        token: Vec<u8>,
        reserved_bits: u8,
        packet_number_length: u8,
    },
    ZeroRtt {
        version: u32,
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        reserved_bits: u8,
        packet_number_length: u8,
    },
    Handshake {
        version: u32,
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        reserved_bits: u8,
        packet_number_length: u8,
    },
    Retry {
        version: u32,
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        original_dst_cid: ConnectionId,
        retry_token: Vec<u8>,
    },
    VersionNegotiation {
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        supported_versions: Vec<u32>,
    },
    Short {
        dst_cid: ConnectionId,
        spin_bit: bool,
        reserved_bits: u8,
        key_phase: bool,
        packet_number_length: u8,
    },
}

impl Header {
    pub fn is_long(&self) -> bool {
        !matches!(self, Header::Short { .. })
    }

    pub fn packet_number_length(&self) -> Option<u8> {
        match self {
            Header::Initial {
                packet_number_length,
                ..
            }
            | Header::ZeroRtt {
                packet_number_length,
                ..
            }
            | Header::Handshake {
                packet_number_length,
                ..
            }
            | Header::Short {
                packet_number_length,
                ..
            } => Some(*packet_number_length),
            Header::Retry { .. } | Header::VersionNegotiation { .. } => None,
        }
    }

    pub fn dst_cid(&self) -> &ConnectionId {
        match self {
            Header::Initial { dst_cid, .. }
            | Header::ZeroRtt { dst_cid, .. }
            | Header::Handshake { dst_cid, .. }
            | Header::Retry { dst_cid, .. }
            | Header::VersionNegotiation { dst_cid, .. }
            | Header::Short { dst_cid, .. } => dst_cid,
        }
    }

    /// Encodes the flag byte through the last per-type field that precedes `length`/the
    /// packet number. Reserved bits are written as given (zero pre-protection); the caller
    /// (the AEAD/header-protection layer) masks them after sealing.
    pub fn encode(&self) -> QuicheResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Header::Initial {
                version,
                dst_cid,
                src_cid,
                token,
                reserved_bits,
                packet_number_length,
            } => {
                encode_long_flag_byte(
                    &mut buf,
                    LongPacketType::initial(),
                    *reserved_bits,
                    *packet_number_length,
                );
                encode_long_prefix(&mut buf, *version, dst_cid, src_cid);
                VarInt::new_u64(token.len() as u64)?.encode(&mut buf);
                buf.extend_from_slice(token);
            }
            Header::ZeroRtt {
                version,
                dst_cid,
                src_cid,
                reserved_bits,
                packet_number_length,
            } => {
                encode_long_flag_byte(
                    &mut buf,
                    LongPacketType::zero_rtt(),
                    *reserved_bits,
                    *packet_number_length,
                );
                encode_long_prefix(&mut buf, *version, dst_cid, src_cid);
            }
            Header::Handshake {
                version,
                dst_cid,
                src_cid,
                reserved_bits,
                packet_number_length,
            } => {
                encode_long_flag_byte(
                    &mut buf,
                    LongPacketType::handshake(),
                    *reserved_bits,
                    *packet_number_length,
                );
                encode_long_prefix(&mut buf, *version, dst_cid, src_cid);
            }
            Header::Retry {
                version,
                dst_cid,
                src_cid,
                original_dst_cid,
                retry_token,
            } => {
                encode_long_flag_byte(&mut buf, LongPacketType::retry(), 0, 1);
                encode_long_prefix(&mut buf, *version, dst_cid, src_cid);
                buf.push(original_dst_cid.cid_len);
                buf.extend_from_slice(&original_dst_cid.cid);
                buf.extend_from_slice(retry_token);
            }
            Header::VersionNegotiation {
                dst_cid,
                src_cid,
                supported_versions,
            } => {
                // the flag byte is unused for version negotiation except the header-form bit
                buf.push(0b1000_0000);
                buf.put_u32(0);
                buf.push(dst_cid.cid_len);
                buf.extend_from_slice(&dst_cid.cid);
                buf.push(src_cid.cid_len);
                buf.extend_from_slice(&src_cid.cid);
                for v in supported_versions {
                    buf.put_u32(*v);
                }
            }
            Header::Short {
                dst_cid,
                spin_bit,
                reserved_bits,
                key_phase,
                packet_number_length,
            } => {
                require(*packet_number_length >= 1 && *packet_number_length <= 4, "pn length")?;
                let mut first_byte = 0b0100_0000u8; // header form=0, fixed bit=1
                if *spin_bit {
                    first_byte |= 0b0010_0000;
                }
                first_byte |= (*reserved_bits & 0b11) << 3;
                if *key_phase {
                    first_byte |= 0b0000_0100;
                }
                first_byte |= packet_number_length - 1;
                buf.push(first_byte);
                buf.extend_from_slice(&dst_cid.cid);
            }
        }
        Ok(buf)
    }

    /// Peeks the first byte to tell long vs short header form without consuming input.
    pub fn peek_is_long(first_byte: u8) -> bool {
        first_byte & 0x80 != 0
    }

    pub fn decode_long(buf: &mut impl Buf, supported_versions: &[u32]) -> QuicheResult<Self> {
        require(buf.has_remaining(), "empty long header")?;
        let first_byte = buf.get_u8();
        require(first_byte & 0x80 != 0, "not a long header")?;

        let version = buf.get_u32();
        let dst_cid = decode_cid(buf)?;
        let src_cid = decode_cid(buf)?;

        if version == 0 {
            let mut supported = Vec::new();
            while buf.remaining() >= 4 {
                supported.push(buf.get_u32());
            }
            return Ok(Header::VersionNegotiation {
                dst_cid,
                src_cid,
                supported_versions: supported,
            });
        }

        // an endpoint still structurally decodes packets of unsupported versions so the
        // connection layer can react (NextVersion / VersionNegotiationFailed, §7); the
        // version list here only governs version-negotiation framing above.
        let _ = supported_versions;

        let long_packet_type = (first_byte >> 4) & 0b11;
        let reserved_bits = (first_byte >> 2) & 0b11;
        let packet_number_length = (first_byte & 0b11) + 1;

        match long_packet_type {
            0b00 => {
                let token_len = VarInt::decode(buf)?.usize();
                require(buf.remaining() >= token_len, "truncated token")?;
                let mut token = vec![0u8; token_len];
                buf.copy_to_slice(&mut token);
                Ok(Header::Initial {
                    version,
                    dst_cid,
                    src_cid,
                    token,
                    reserved_bits,
                    packet_number_length,
                })
            }
            0b01 => Ok(Header::ZeroRtt {
                version,
                dst_cid,
                src_cid,
                reserved_bits,
                packet_number_length,
            }),
            0b10 => Ok(Header::Handshake {
                version,
                dst_cid,
                src_cid,
                reserved_bits,
                packet_number_length,
            }),
            0b11 => {
                require(buf.has_remaining(), "truncated retry")?;
                let odcid_len = buf.get_u8();
                require(buf.remaining() >= odcid_len as usize, "truncated retry odcid")?;
                let mut odcid = vec![0u8; odcid_len as usize];
                buf.copy_to_slice(&mut odcid);
                let remaining = buf.remaining();
                let mut retry_token = vec![0u8; remaining];
                buf.copy_to_slice(&mut retry_token);
                Ok(Header::Retry {
                    version,
                    dst_cid,
                    src_cid,
                    original_dst_cid: ConnectionId::new(odcid_len, odcid),
                    retry_token,
                })
            }
            _ => unreachable!("2 bits"),
        }
    }

    pub fn decode_short(buf: &mut impl Buf, dst_cid_len: usize) -> QuicheResult<Self> {
        require(buf.has_remaining(), "empty short header")?;
        let first_byte = buf.get_u8();
        require(first_byte & 0x80 == 0, "not a short header")?;
        require(buf.remaining() >= dst_cid_len, "truncated dst cid")?;
        let mut dst_cid = vec![0u8; dst_cid_len];
        buf.copy_to_slice(&mut dst_cid);

        Ok(Header::Short {
            dst_cid: ConnectionId::new(dst_cid_len as u8, dst_cid),
            spin_bit: first_byte & 0b0010_0000 != 0,
            reserved_bits: (first_byte >> 3) & 0b11,
            key_phase: first_byte & 0b0000_0100 != 0,
            packet_number_length: (first_byte & 0b11) + 1,
        })
    }
}

fn encode_long_flag_byte(
    buf: &mut Vec<u8>,
    long_packet_type: LongPacketType,
    reserved_bits: u8,
    packet_number_length: u8,
) {
    let mut byte = 0b1100_0000u8; // header form=1, fixed bit=1
    byte |= long_packet_type.to_inner() << 4;
    byte |= (reserved_bits & 0b11) << 2;
    byte |= (packet_number_length - 1) & 0b11;
    buf.push(byte);
}

fn encode_long_prefix(buf: &mut Vec<u8>, version: u32, dst_cid: &ConnectionId, src_cid: &ConnectionId) {
    buf.put_u32(version);
    buf.push(dst_cid.cid_len);
    buf.extend_from_slice(&dst_cid.cid);
    buf.push(src_cid.cid_len);
    buf.extend_from_slice(&src_cid.cid);
}

fn decode_cid(buf: &mut impl Buf) -> QuicheResult<ConnectionId> {
    require(buf.has_remaining(), "missing cid length")?;
    let len = buf.get_u8();
    require(len <= 20, "connection id exceeds 20 bytes")?;
    require(buf.remaining() >= len as usize, "truncated connection id")?;
    let mut cid = vec![0u8; len as usize];
    buf.copy_to_slice(&mut cid);
    Ok(ConnectionId::new(len, cid))
}

#[cfg(test)]
mod test_header {
    use super::*;

    #[test]
    fn test_initial_header_round_trip() {
        let header = Header::Initial {
            version: 1,
            dst_cid: ConnectionId::new(8, vec![0; 8]),
            src_cid: ConnectionId::new(8, vec![1; 8]),
            token: vec![9, 9, 9],
            reserved_bits: 0,
            packet_number_length: 2,
        };
        let encoded = header.encode().unwrap();
        let decoded = Header::decode_long(&mut encoded.as_slice(), &[1]).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_handshake_header_round_trip() {
        let header = Header::Handshake {
            version: 1,
            dst_cid: ConnectionId::new(4, vec![0xaa; 4]),
            src_cid: ConnectionId::new(0, vec![]),
            reserved_bits: 0,
            packet_number_length: 4,
        };
        let encoded = header.encode().unwrap();
        let decoded = Header::decode_long(&mut encoded.as_slice(), &[1]).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_retry_header_round_trip() {
        let header = Header::Retry {
            version: 1,
            dst_cid: ConnectionId::new(8, vec![1; 8]),
            src_cid: ConnectionId::new(8, vec![2; 8]),
            original_dst_cid: ConnectionId::new(8, vec![3; 8]),
            retry_token: vec![4, 5, 6, 7],
        };
        let encoded = header.encode().unwrap();
        let decoded = Header::decode_long(&mut encoded.as_slice(), &[1]).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_version_negotiation_round_trip() {
        let header = Header::VersionNegotiation {
            dst_cid: ConnectionId::new(8, vec![1; 8]),
            src_cid: ConnectionId::new(8, vec![2; 8]),
            supported_versions: vec![0xff000017, 0x00000001],
        };
        let encoded = header.encode().unwrap();
        let decoded = Header::decode_long(&mut encoded.as_slice(), &[1]).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_short_header_round_trip() {
        let header = Header::Short {
            dst_cid: ConnectionId::new(8, vec![0xcc; 8]),
            spin_bit: true,
            reserved_bits: 0,
            key_phase: true,
            packet_number_length: 3,
        };
        let encoded = header.encode().unwrap();
        let decoded = Header::decode_short(&mut encoded.as_slice(), 8).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_rejects_oversized_connection_id() {
        let mut bytes: Vec<u8> = vec![0b1100_0000];
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.push(21); // invalid: > 20
        let err = Header::decode_long(&mut bytes.as_slice(), &[1]);
        assert!(err.is_err());
    }
}
