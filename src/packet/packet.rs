use crate::error::QuicheResult;
use crate::packet::frame::Frame;
use crate::packet::header::Header;
use crate::packet::types::EncryptionLevel;

/// A fully decoded, decrypted packet: header plus the ordered list of frames it carried.
/// Produced by [`crate::codec::decode_packet`] after header-protection removal and AEAD
/// verification have both succeeded (invariant 1, §3).
#[derive(Debug, Clone, PartialEq)]
pub struct PlainPacket {
    pub header: Header,
    pub packet_number: u64,
    pub frames: Vec<Frame>,
}

impl PlainPacket {
    pub fn new(header: Header, packet_number: u64, frames: Vec<Frame>) -> Self {
        Self {
            header,
            packet_number,
            frames,
        }
    }

    pub fn level(&self) -> Option<EncryptionLevel> {
        match &self.header {
            Header::Initial { .. } => Some(EncryptionLevel::Initial),
            Header::ZeroRtt { .. } => Some(EncryptionLevel::ZeroRtt),
            Header::Handshake { .. } => Some(EncryptionLevel::Handshake),
            Header::Short { .. } => Some(EncryptionLevel::OneRtt),
            Header::Retry { .. } | Header::VersionNegotiation { .. } => None,
        }
    }

    pub fn is_ack_eliciting(&self) -> bool {
        self.frames.iter().any(Frame::is_ack_eliciting)
    }

    pub fn encode_frames(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for frame in &self.frames {
            frame.encode(&mut buf);
        }
        buf
    }

    pub fn decode_frames(mut bytes: &[u8]) -> QuicheResult<Vec<Frame>> {
        let mut frames = Vec::new();
        while !bytes.is_empty() {
            let frame = Frame::decode(&mut bytes)?;
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::types::ConnectionId;

    #[test]
    fn test_level_mapping() {
        let packet = PlainPacket::new(
            Header::Handshake {
                version: 1,
                dst_cid: ConnectionId::new(0, vec![]),
                src_cid: ConnectionId::new(0, vec![]),
                reserved_bits: 0,
                packet_number_length: 1,
            },
            0,
            vec![Frame::Ping],
        );
        assert_eq!(packet.level(), Some(EncryptionLevel::Handshake));
        assert!(packet.is_ack_eliciting());
    }

    #[test]
    fn test_encode_decode_frames_round_trip() {
        let frames = vec![Frame::Ping, Frame::Crypto { offset: 0, data: vec![1, 2, 3] }];
        let packet = PlainPacket::new(
            Header::Short {
                dst_cid: ConnectionId::new(8, vec![0; 8]),
                spin_bit: false,
                reserved_bits: 0,
                key_phase: false,
                packet_number_length: 1,
            },
            5,
            frames.clone(),
        );
        let encoded = packet.encode_frames();
        let decoded = PlainPacket::decode_frames(&encoded).unwrap();
        assert_eq!(decoded, frames);
    }
}
