//! Packet-number encoding and decoding, RFC9000 Appendix A. Numbers are carried on the wire
//! truncated to the fewest bytes that remain unambiguous against the largest packet number
//! the peer has acknowledged.

/// Smallest width (1-4 bytes) that unambiguously encodes `pn` given `largest_acked`.
pub fn encode_packet_number_length(pn: u64, largest_acked: Option<u64>) -> usize {
    let num_unacked = match largest_acked {
        Some(largest) => pn.saturating_sub(largest),
        None => pn + 1,
    };
    // bits needed to represent twice the range between pn and largest_acked, plus one bit of
    // slack per RFC9000 Appendix A.2.
    let bits_needed = 64 - (num_unacked * 2 + 1).leading_zeros();
    match (bits_needed + 7) / 8 {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    }
}

pub fn encode_truncated(pn: u64, len: usize) -> Vec<u8> {
    let bytes = pn.to_be_bytes();
    bytes[8 - len..].to_vec()
}

/// Reconstructs the full packet number from its truncated wire representation, per RFC9000
/// Appendix A.3.
pub fn decode_packet_number(largest_pn: i64, truncated_pn: u64, pn_len: usize) -> u64 {
    let pn_nbits = pn_len as u32 * 8;
    let expected_pn = largest_pn + 1;
    let pn_win = 1i64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;

    let candidate = (expected_pn & !pn_mask) | (truncated_pn as i64);

    let candidate = if candidate <= expected_pn - pn_hwin && candidate < (1i64 << 62) - pn_win {
        candidate + pn_win
    } else if candidate > expected_pn + pn_hwin && candidate >= pn_win {
        candidate - pn_win
    } else {
        candidate
    };

    candidate.max(0) as u64
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() {
        for largest_acked in [None, Some(0), Some(1), Some(1000), Some(1 << 20)] {
            let base = largest_acked.unwrap_or(0);
            for delta in [1u64, 2, 5, 300, 70000, 20_000_000] {
                let pn = base + delta;
                let len = encode_packet_number_length(pn, largest_acked);
                let truncated_bytes = encode_truncated(pn, len);
                let mut truncated = 0u64;
                for b in &truncated_bytes {
                    truncated = (truncated << 8) | *b as u64;
                }
                let largest = largest_acked.map(|v| v as i64).unwrap_or(-1);
                let decoded = decode_packet_number(largest, truncated, len);
                assert_eq!(decoded, pn, "pn={} len={} largest_acked={:?}", pn, len, largest_acked);
            }
        }
    }

    #[test]
    fn test_appendix_a_example() {
        // RFC9000 Appendix A.3 worked example.
        let largest_pn = 0xa82f30ea;
        let pn = 0xa82f9b32u64;
        let len = encode_packet_number_length(pn, Some(largest_pn));
        assert_eq!(len, 2);
        let truncated = pn & 0xFFFF;
        let decoded = decode_packet_number(largest_pn as i64, truncated, len);
        assert_eq!(decoded, pn);
    }
}
