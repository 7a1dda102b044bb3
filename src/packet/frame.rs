use bytes::{Buf, BufMut};

use crate::error::{transport_error, QuicheError, QuicheResult, TransportErrorCode};
use crate::frame;
use crate::packet::types::ConnectionId;
use crate::primitives::varint::VarInt;

frame! {
    // padding frames have no semantic value, they can be used to increase the size of a packet
    // i.e. increase an initial packet to the minimum required size or provide protection against traffic analysis
    // padding frames contain no content
    PADDING = 0x00,
    // ping frames contain no content
    // a ping frame should elicit an ack or ack ecn frame from the receiver
    PING = 0x01,
    // ack frames contain one or more "ack ranges", which identify acknowledged packets
    ACK = 0x02,
    // ack ecn frames also contain the cumulative count of quic packets with associated ecn marks received on the connection
    ACK_ECN = 0x03,
    // a reset stream frame is used to abruptly terminate the sending part of a stream
    RESET_STREAM = 0x04,
    // a stop sending frame requests that a peer cease transmission of data on a stream
    STOP_SENDING = 0x05,
    // a crypto frame is used to communicate cryptographic handshake messages
    CRYPTO = 0x06,
    // a new token frame is used to provide a client with a token to send in a future Initial header
    NEW_TOKEN = 0x07,
    // a stream frame carries application data; the low three bits select OFF/LEN/FIN
    STREAM = 0x08,
    // a max data frame informs the peer of the maximum amount of total data that can be sent on the connection
    MAX_DATA = 0x10,
    // a max stream data frame informs a peer of the maximum amount of data that can be sent on a stream
    MAX_STREAM_DATA = 0x11,
    // max streams frames inform peers of the cumulative number of streams of a given type it may open
    MAX_STREAMS_BIDI = 0x12,
    MAX_STREAMS_UNI = 0x13,
    // a sender emits a data blocked frame when it wishes to send data but cannot due to connection-level flow control
    DATA_BLOCKED = 0x14,
    // analogous to data blocked, but for a single stream
    STREAM_DATA_BLOCKED = 0x15,
    // a sender emits a streams blocked frame when it wishes to open a stream but is at its peer's stream limit
    STREAMS_BLOCKED_BIDI = 0x16,
    STREAMS_BLOCKED_UNI = 0x17,
    // informs the peer of alternative connection ids that can be used to break linkability when migrating
    NEW_CONNECTION_ID = 0x18,
    // indicates that an endpoint will no longer use a cid issued by its peer
    RETIRE_CONNECTION_ID = 0x19,
    // checks reachability to the peer and is used for path validation during connection migration
    PATH_CHALLENGE = 0x1a,
    // sent in response to a path challenge frame, echoing its data
    PATH_RESPONSE = 0x1b,
    // informs a peer that the connection is being closed, with a transport error code
    CONNECTION_CLOSE_TRANSPORT = 0x1c,
    // informs a peer that the connection is being closed, with an application error code
    CONNECTION_CLOSE_APPLICATION = 0x1d,
    // signals completion of the handshake to the client; server-only, no content
    HANDSHAKE_DONE = 0x1e,
}

const STREAM_FIN_BIT: u64 = 0x01;
const STREAM_LEN_BIT: u64 = 0x02;
const STREAM_OFF_BIT: u64 = 0x04;

/// A decoded frame, carrying typed fields rather than a raw byte blob.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Padding,
    Ping,
    Ack {
        largest_acknowledged: u64,
        ack_delay: u64,
        /// Inclusive (smallest, largest) ranges, descending by packet number, fully expanded
        /// (no "only the first range" shortcut — see SPEC_FULL.md §4.1 clarification).
        ranges: Vec<(u64, u64)>,
        ecn_counts: Option<(u64, u64, u64)>,
    },
    ResetStream {
        stream_id: u64,
        error_code: u64,
        final_size: u64,
    },
    StopSending {
        stream_id: u64,
        error_code: u64,
    },
    Crypto {
        offset: u64,
        data: Vec<u8>,
    },
    NewToken {
        token: Vec<u8>,
    },
    Stream {
        stream_id: u64,
        offset: u64,
        fin: bool,
        data: Vec<u8>,
    },
    MaxData(u64),
    MaxStreamData {
        stream_id: u64,
        max_stream_data: u64,
    },
    MaxStreamsBidi(u64),
    MaxStreamsUni(u64),
    DataBlocked(u64),
    StreamDataBlocked {
        stream_id: u64,
        limit: u64,
    },
    StreamsBlockedBidi(u64),
    StreamsBlockedUni(u64),
    NewConnectionId {
        sequence_number: u64,
        retire_prior_to: u64,
        connection_id: ConnectionId,
        stateless_reset_token: [u8; 16],
    },
    RetireConnectionId {
        sequence_number: u64,
    },
    PathChallenge([u8; 8]),
    PathResponse([u8; 8]),
    ConnectionCloseTransport {
        error_code: u64,
        frame_type: u64,
        reason: String,
    },
    ConnectionCloseApplication {
        error_code: u64,
        reason: String,
    },
    HandshakeDone,
}

impl Frame {
    /// Whether receipt of this frame must elicit an ACK (anything but ACK/PADDING/CLOSE).
    pub fn is_ack_eliciting(&self) -> bool {
        !matches!(
            self,
            Frame::Ack { .. }
                | Frame::Padding
                | Frame::ConnectionCloseTransport { .. }
                | Frame::ConnectionCloseApplication { .. }
        )
    }

    /// Whether a lost packet carrying this frame should be retransmitted (§4.6 step 3).
    pub fn is_retransmittable(&self) -> bool {
        matches!(
            self,
            Frame::Crypto { .. }
                | Frame::Stream { .. }
                | Frame::ResetStream { .. }
                | Frame::StopSending { .. }
                | Frame::NewToken { .. }
                | Frame::MaxData(_)
                | Frame::MaxStreamData { .. }
                | Frame::MaxStreamsBidi(_)
                | Frame::MaxStreamsUni(_)
                | Frame::DataBlocked(_)
                | Frame::StreamDataBlocked { .. }
                | Frame::StreamsBlockedBidi(_)
                | Frame::StreamsBlockedUni(_)
                | Frame::NewConnectionId { .. }
                | Frame::RetireConnectionId { .. }
                | Frame::HandshakeDone
                | Frame::PathResponse(_)
        )
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Padding => buf.push(FrameType::PADDING as u8),
            Frame::Ping => buf.push(FrameType::PING as u8),
            Frame::Ack {
                largest_acknowledged,
                ack_delay,
                ranges,
                ecn_counts,
            } => encode_ack(buf, *largest_acknowledged, *ack_delay, ranges, *ecn_counts),
            Frame::ResetStream {
                stream_id,
                error_code,
                final_size,
            } => {
                put_varint(buf, FrameType::RESET_STREAM);
                put_varint(buf, *stream_id);
                put_varint(buf, *error_code);
                put_varint(buf, *final_size);
            }
            Frame::StopSending {
                stream_id,
                error_code,
            } => {
                put_varint(buf, FrameType::STOP_SENDING);
                put_varint(buf, *stream_id);
                put_varint(buf, *error_code);
            }
            Frame::Crypto { offset, data } => {
                put_varint(buf, FrameType::CRYPTO);
                put_varint(buf, *offset);
                put_varint(buf, data.len() as u64);
                buf.extend_from_slice(data);
            }
            Frame::NewToken { token } => {
                put_varint(buf, FrameType::NEW_TOKEN);
                put_varint(buf, token.len() as u64);
                buf.extend_from_slice(token);
            }
            Frame::Stream {
                stream_id,
                offset,
                fin,
                data,
            } => {
                let mut ty = FrameType::STREAM | STREAM_LEN_BIT;
                if *offset != 0 {
                    ty |= STREAM_OFF_BIT;
                }
                if *fin {
                    ty |= STREAM_FIN_BIT;
                }
                put_varint(buf, ty);
                put_varint(buf, *stream_id);
                if *offset != 0 {
                    put_varint(buf, *offset);
                }
                put_varint(buf, data.len() as u64);
                buf.extend_from_slice(data);
            }
            Frame::MaxData(max) => {
                put_varint(buf, FrameType::MAX_DATA);
                put_varint(buf, *max);
            }
            Frame::MaxStreamData {
                stream_id,
                max_stream_data,
            } => {
                put_varint(buf, FrameType::MAX_STREAM_DATA);
                put_varint(buf, *stream_id);
                put_varint(buf, *max_stream_data);
            }
            Frame::MaxStreamsBidi(n) => {
                put_varint(buf, FrameType::MAX_STREAMS_BIDI);
                put_varint(buf, *n);
            }
            Frame::MaxStreamsUni(n) => {
                put_varint(buf, FrameType::MAX_STREAMS_UNI);
                put_varint(buf, *n);
            }
            Frame::DataBlocked(limit) => {
                put_varint(buf, FrameType::DATA_BLOCKED);
                put_varint(buf, *limit);
            }
            Frame::StreamDataBlocked { stream_id, limit } => {
                put_varint(buf, FrameType::STREAM_DATA_BLOCKED);
                put_varint(buf, *stream_id);
                put_varint(buf, *limit);
            }
            Frame::StreamsBlockedBidi(n) => {
                put_varint(buf, FrameType::STREAMS_BLOCKED_BIDI);
                put_varint(buf, *n);
            }
            Frame::StreamsBlockedUni(n) => {
                put_varint(buf, FrameType::STREAMS_BLOCKED_UNI);
                put_varint(buf, *n);
            }
            Frame::NewConnectionId {
                sequence_number,
                retire_prior_to,
                connection_id,
                stateless_reset_token,
            } => {
                put_varint(buf, FrameType::NEW_CONNECTION_ID);
                put_varint(buf, *sequence_number);
                put_varint(buf, *retire_prior_to);
                buf.push(connection_id.cid_len);
                buf.extend_from_slice(&connection_id.cid);
                buf.extend_from_slice(stateless_reset_token);
            }
            Frame::RetireConnectionId { sequence_number } => {
                put_varint(buf, FrameType::RETIRE_CONNECTION_ID);
                put_varint(buf, *sequence_number);
            }
            Frame::PathChallenge(data) => {
                put_varint(buf, FrameType::PATH_CHALLENGE);
                buf.extend_from_slice(data);
            }
            Frame::PathResponse(data) => {
                put_varint(buf, FrameType::PATH_RESPONSE);
                buf.extend_from_slice(data);
            }
            Frame::ConnectionCloseTransport {
                error_code,
                frame_type,
                reason,
            } => {
                put_varint(buf, FrameType::CONNECTION_CLOSE_TRANSPORT);
                put_varint(buf, *error_code);
                put_varint(buf, *frame_type);
                put_varint(buf, reason.len() as u64);
                buf.extend_from_slice(reason.as_bytes());
            }
            Frame::ConnectionCloseApplication { error_code, reason } => {
                put_varint(buf, FrameType::CONNECTION_CLOSE_APPLICATION);
                put_varint(buf, *error_code);
                put_varint(buf, reason.len() as u64);
                buf.extend_from_slice(reason.as_bytes());
            }
            Frame::HandshakeDone => buf.push(FrameType::HANDSHAKE_DONE as u8),
        }
    }

    pub fn decode(buf: &mut impl Buf) -> QuicheResult<Self> {
        let frame_type = get_varint(buf)?;
        match frame_type {
            FrameType::PADDING => Ok(Frame::Padding),
            FrameType::PING => Ok(Frame::Ping),
            FrameType::ACK | FrameType::ACK_ECN => decode_ack(buf, frame_type == FrameType::ACK_ECN),
            FrameType::RESET_STREAM => Ok(Frame::ResetStream {
                stream_id: get_varint(buf)?,
                error_code: get_varint(buf)?,
                final_size: get_varint(buf)?,
            }),
            FrameType::STOP_SENDING => Ok(Frame::StopSending {
                stream_id: get_varint(buf)?,
                error_code: get_varint(buf)?,
            }),
            FrameType::CRYPTO => {
                let offset = get_varint(buf)?;
                let len = get_varint(buf)? as usize;
                let data = get_bytes(buf, len)?;
                Ok(Frame::Crypto { offset, data })
            }
            FrameType::NEW_TOKEN => {
                let len = get_varint(buf)? as usize;
                let token = get_bytes(buf, len)?;
                if token.is_empty() {
                    return Err(frame_encoding_error(frame_type, "empty NEW_TOKEN"));
                }
                Ok(Frame::NewToken { token })
            }
            ty if ty & 0xf8 == FrameType::STREAM => {
                let stream_id = get_varint(buf)?;
                let offset = if ty & STREAM_OFF_BIT != 0 {
                    get_varint(buf)?
                } else {
                    0
                };
                let data = if ty & STREAM_LEN_BIT != 0 {
                    let len = get_varint(buf)? as usize;
                    get_bytes(buf, len)?
                } else {
                    let remaining = buf.remaining();
                    get_bytes(buf, remaining)?
                };
                let fin = ty & STREAM_FIN_BIT != 0;
                Ok(Frame::Stream {
                    stream_id,
                    offset,
                    fin,
                    data,
                })
            }
            FrameType::MAX_DATA => Ok(Frame::MaxData(get_varint(buf)?)),
            FrameType::MAX_STREAM_DATA => Ok(Frame::MaxStreamData {
                stream_id: get_varint(buf)?,
                max_stream_data: get_varint(buf)?,
            }),
            FrameType::MAX_STREAMS_BIDI => Ok(Frame::MaxStreamsBidi(get_varint(buf)?)),
            FrameType::MAX_STREAMS_UNI => Ok(Frame::MaxStreamsUni(get_varint(buf)?)),
            FrameType::DATA_BLOCKED => Ok(Frame::DataBlocked(get_varint(buf)?)),
            FrameType::STREAM_DATA_BLOCKED => Ok(Frame::StreamDataBlocked {
                stream_id: get_varint(buf)?,
                limit: get_varint(buf)?,
            }),
            FrameType::STREAMS_BLOCKED_BIDI => Ok(Frame::StreamsBlockedBidi(get_varint(buf)?)),
            FrameType::STREAMS_BLOCKED_UNI => Ok(Frame::StreamsBlockedUni(get_varint(buf)?)),
            FrameType::NEW_CONNECTION_ID => {
                let sequence_number = get_varint(buf)?;
                let retire_prior_to = get_varint(buf)?;
                if !buf.has_remaining() {
                    return Err(frame_encoding_error(frame_type, "truncated NEW_CONNECTION_ID"));
                }
                let cid_len = buf.get_u8();
                if cid_len == 0 || cid_len > 20 {
                    return Err(frame_encoding_error(frame_type, "invalid connection id length"));
                }
                let cid = get_bytes(buf, cid_len as usize)?;
                let token_vec = get_bytes(buf, 16)?;
                let mut stateless_reset_token = [0u8; 16];
                stateless_reset_token.copy_from_slice(&token_vec);
                Ok(Frame::NewConnectionId {
                    sequence_number,
                    retire_prior_to,
                    connection_id: ConnectionId::new(cid_len, cid),
                    stateless_reset_token,
                })
            }
            FrameType::RETIRE_CONNECTION_ID => Ok(Frame::RetireConnectionId {
                sequence_number: get_varint(buf)?,
            }),
            FrameType::PATH_CHALLENGE => {
                let data = get_bytes(buf, 8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&data);
                Ok(Frame::PathChallenge(arr))
            }
            FrameType::PATH_RESPONSE => {
                let data = get_bytes(buf, 8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&data);
                Ok(Frame::PathResponse(arr))
            }
            FrameType::CONNECTION_CLOSE_TRANSPORT => {
                let error_code = get_varint(buf)?;
                let triggering_frame_type = get_varint(buf)?;
                let len = get_varint(buf)? as usize;
                let reason = String::from_utf8_lossy(&get_bytes(buf, len)?).into_owned();
                Ok(Frame::ConnectionCloseTransport {
                    error_code,
                    frame_type: triggering_frame_type,
                    reason,
                })
            }
            FrameType::CONNECTION_CLOSE_APPLICATION => {
                let error_code = get_varint(buf)?;
                let len = get_varint(buf)? as usize;
                let reason = String::from_utf8_lossy(&get_bytes(buf, len)?).into_owned();
                Ok(Frame::ConnectionCloseApplication { error_code, reason })
            }
            FrameType::HANDSHAKE_DONE => Ok(Frame::HandshakeDone),
            unknown => Err(frame_encoding_error(unknown, "unknown frame type")),
        }
    }
}

fn frame_encoding_error(frame_type: u64, reason: &str) -> QuicheError {
    transport_error(TransportErrorCode::FrameEncodingError, frame_type, reason)
}

fn put_varint(buf: &mut Vec<u8>, value: u64) {
    // values here are always produced internally and fit VarInt::MAX by construction.
    VarInt::new_u64(value)
        .expect("internal frame field exceeds varint range")
        .encode(buf);
}

fn get_varint(buf: &mut impl Buf) -> QuicheResult<u64> {
    Ok(VarInt::decode(buf)?.to_inner())
}

fn get_bytes(buf: &mut impl Buf, len: usize) -> QuicheResult<Vec<u8>> {
    if buf.remaining() < len {
        return Err(QuicheError::Malformed(format!(
            "expected {} bytes, only {} remaining",
            len,
            buf.remaining()
        )));
    }
    let mut dst = vec![0u8; len];
    buf.copy_to_slice(&mut dst);
    Ok(dst)
}

fn encode_ack(
    buf: &mut Vec<u8>,
    largest_acknowledged: u64,
    ack_delay: u64,
    ranges: &[(u64, u64)],
    ecn_counts: Option<(u64, u64, u64)>,
) {
    put_varint(
        buf,
        if ecn_counts.is_some() {
            FrameType::ACK_ECN
        } else {
            FrameType::ACK
        },
    );
    put_varint(buf, largest_acknowledged);
    put_varint(buf, ack_delay);
    put_varint(buf, (ranges.len() - 1) as u64);
    let (first_smallest, first_largest) = ranges[0];
    put_varint(buf, first_largest - first_smallest);

    // subsequent ranges are encoded as (gap, length) pairs, full encoding per RFC9000 §19.3
    // rather than only the first range (the teacher left this as a stub, see DESIGN.md).
    let mut prev_smallest = first_smallest;
    for &(smallest, largest) in &ranges[1..] {
        let gap = prev_smallest - largest - 2;
        let len = largest - smallest;
        put_varint(buf, gap);
        put_varint(buf, len);
        prev_smallest = smallest;
    }

    if let Some((ect0, ect1, ce)) = ecn_counts {
        put_varint(buf, ect0);
        put_varint(buf, ect1);
        put_varint(buf, ce);
    }
}

fn decode_ack(buf: &mut impl Buf, ecn: bool) -> QuicheResult<Frame> {
    let largest_acknowledged = get_varint(buf)?;
    let ack_delay = get_varint(buf)?;
    let ack_range_count = get_varint(buf)?;
    let first_ack_range = get_varint(buf)?;

    if first_ack_range > largest_acknowledged {
        return Err(frame_encoding_error(FrameType::ACK, "first ack range underflows"));
    }
    let mut ranges = vec![(largest_acknowledged - first_ack_range, largest_acknowledged)];

    let mut smallest_so_far = largest_acknowledged - first_ack_range;
    for _ in 0..ack_range_count {
        let gap = get_varint(buf)?;
        let len = get_varint(buf)?;
        if smallest_so_far < gap + 2 {
            return Err(frame_encoding_error(FrameType::ACK, "ack range gap underflows"));
        }
        let range_largest = smallest_so_far - gap - 2;
        if len > range_largest {
            return Err(frame_encoding_error(FrameType::ACK, "ack range length underflows"));
        }
        let range_smallest = range_largest - len;
        ranges.push((range_smallest, range_largest));
        smallest_so_far = range_smallest;
    }

    let ecn_counts = if ecn {
        Some((get_varint(buf)?, get_varint(buf)?, get_varint(buf)?))
    } else {
        None
    };

    Ok(Frame::Ack {
        largest_acknowledged,
        ack_delay,
        ranges,
        ecn_counts,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(frame: &Frame) -> Frame {
        let mut buf = Vec::new();
        frame.encode(&mut buf);
        let mut slice = buf.as_slice();
        Frame::decode(&mut slice).unwrap()
    }

    #[test]
    fn test_padding_ping_handshake_done() {
        assert_eq!(round_trip(&Frame::Padding), Frame::Padding);
        assert_eq!(round_trip(&Frame::Ping), Frame::Ping);
        assert_eq!(round_trip(&Frame::HandshakeDone), Frame::HandshakeDone);
    }

    #[test]
    fn test_crypto_round_trip() {
        let frame = Frame::Crypto {
            offset: 42,
            data: vec![1, 2, 3, 4, 5],
        };
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_stream_round_trip_with_and_without_offset() {
        let a = Frame::Stream {
            stream_id: 4,
            offset: 0,
            fin: true,
            data: b"hello".to_vec(),
        };
        assert_eq!(round_trip(&a), a);

        let b = Frame::Stream {
            stream_id: 8,
            offset: 1000,
            fin: false,
            data: b"world".to_vec(),
        };
        assert_eq!(round_trip(&b), b);
    }

    #[test]
    fn test_ack_with_multiple_ranges_round_trips_fully() {
        // Regression test for the "only first range encoded" stub noted in DESIGN.md: acks
        // missing packets 10 and 11 among an otherwise contiguous run must preserve both
        // surviving ranges, not just the most recent one.
        let frame = Frame::Ack {
            largest_acknowledged: 20,
            ack_delay: 100,
            ranges: vec![(12, 20), (0, 9)],
            ecn_counts: None,
        };
        let decoded = round_trip(&frame);
        match decoded {
            Frame::Ack { ranges, .. } => {
                assert_eq!(ranges, vec![(12, 20), (0, 9)]);
            }
            _ => panic!("expected Ack"),
        }
    }

    #[test]
    fn test_ack_ecn_round_trip() {
        let frame = Frame::Ack {
            largest_acknowledged: 5,
            ack_delay: 3,
            ranges: vec![(0, 5)],
            ecn_counts: Some((1, 2, 3)),
        };
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_unknown_frame_type_is_frame_encoding_error() {
        let mut buf: &[u8] = &[0x3f];
        let err = Frame::decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            QuicheError::Transport {
                code: TransportErrorCode::FrameEncodingError,
                ..
            }
        ));
    }

    #[test]
    fn test_new_connection_id_round_trip() {
        let frame = Frame::NewConnectionId {
            sequence_number: 1,
            retire_prior_to: 0,
            connection_id: ConnectionId::new(8, vec![9; 8]),
            stateless_reset_token: [7; 16],
        };
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_ack_eliciting() {
        assert!(!Frame::Padding.is_ack_eliciting());
        assert!(!Frame::Ack {
            largest_acknowledged: 0,
            ack_delay: 0,
            ranges: vec![(0, 0)],
            ecn_counts: None
        }
        .is_ack_eliciting());
        assert!(Frame::Ping.is_ack_eliciting());
        assert!(Frame::HandshakeDone.is_ack_eliciting());
    }
}
