use crate::bits::{Bits, BitsExt};
use crate::bits_ext;

// unfortunately it's really annoying to implement a 160 bit integer
/// Opaque endpoint-chosen connection identifier, ≤20 bytes (§3 "Connection Identifier").
#[derive(PartialEq, Eq, Clone, Hash, Debug)]
pub struct ConnectionId {
    // this MUST NOT exceed 20 bytes
    // endpoints which receive a version 1 long header with a cid_len > 20 must drop the packet
    // to facilitate version negotiation packets, servers should be equipped to handle a cid_len > 20
    pub cid_len: u8,
    pub cid: Vec<u8>,
}

impl ConnectionId {
    pub fn new(cid_len: u8, cid: Vec<u8>) -> Self {
        Self { cid_len, cid }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            cid_len: bytes.len() as u8,
            cid: bytes.to_vec(),
        }
    }

    pub fn random(len: u8) -> Self {
        Self {
            cid_len: len,
            cid: crate::primitives::rand::random_bytes(len as usize),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cid
    }
}

bits_ext!(SingleBit, crate::bits::BitsExt, 1, u8);
bits_ext!(TwoBits, crate::bits::BitsExt, 2, u8);
bits_ext!(FourBits, crate::bits::BitsExt, 4, u8);
bits_ext!(SevenBits, crate::bits::BitsExt, 7, u8);
bits_ext!(LongPacketType, crate::bits::BitsExt, 2, u8);
bits_ext!(HeaderForm, crate::bits::BitsExt, 1, u8);

impl LongPacketType {
    pub fn initial() -> Self {
        Self::zero()
    }

    pub fn zero_rtt() -> Self {
        Self::one()
    }

    pub fn handshake() -> Self {
        Self(Bits::from(0b10))
    }

    pub fn retry() -> Self {
        Self(Bits::from(0b11))
    }
}

impl HeaderForm {
    pub fn short() -> Self {
        Self::zero()
    }

    pub fn long() -> Self {
        Self::one()
    }
}

/// One of the four encryption levels a packet can be sent or received under (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncryptionLevel {
    Initial,
    ZeroRtt,
    Handshake,
    OneRtt,
}

impl EncryptionLevel {
    pub const ALL: [EncryptionLevel; 4] = [
        EncryptionLevel::Initial,
        EncryptionLevel::ZeroRtt,
        EncryptionLevel::Handshake,
        EncryptionLevel::OneRtt,
    ];

    /// Whether this level has its own packet-number space (0-RTT shares the application
    /// space with 1-RTT per RFC9000 §12.3).
    pub fn packet_number_space(self) -> PacketNumberSpaceId {
        match self {
            EncryptionLevel::Initial => PacketNumberSpaceId::Initial,
            EncryptionLevel::Handshake => PacketNumberSpaceId::Handshake,
            EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => {
                PacketNumberSpaceId::Application
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketNumberSpaceId {
    Initial,
    Handshake,
    Application,
}

impl PacketNumberSpaceId {
    pub const ALL: [PacketNumberSpaceId; 3] = [
        PacketNumberSpaceId::Initial,
        PacketNumberSpaceId::Handshake,
        PacketNumberSpaceId::Application,
    ];
}
