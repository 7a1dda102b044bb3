//! Ordered-offset reassembly, shared by the CRYPTO stream (one per packet-number space,
//! RFC9000 §7.5) and application STREAM frames (§3 "Stream").

use std::collections::BTreeMap;

/// Reassembles a byte stream delivered out of order as `(offset, data)` chunks, yielding
/// contiguous prefixes as they become available.
#[derive(Default)]
pub struct OrderedReassembly {
    next_offset: u64,
    pending: BTreeMap<u64, Vec<u8>>,
}

impl OrderedReassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one chunk and returns the longest contiguous run now available starting at
    /// the stream's current read offset, if any grew as a result of this insert.
    pub fn insert(&mut self, offset: u64, data: &[u8]) -> Vec<u8> {
        if !data.is_empty() && offset + (data.len() as u64) > self.next_offset {
            self.pending.entry(offset).or_insert_with(|| data.to_vec());
        }

        let mut ready = Vec::new();
        while let Some((&chunk_offset, chunk)) = self.pending.iter().next() {
            if chunk_offset > self.next_offset {
                break;
            }
            let chunk = chunk.clone();
            self.pending.remove(&chunk_offset);
            let overlap = self.next_offset.saturating_sub(chunk_offset) as usize;
            if overlap < chunk.len() {
                ready.extend_from_slice(&chunk[overlap..]);
                self.next_offset += (chunk.len() - overlap) as u64;
            }
        }
        ready
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }
}

/// Per-stream send-side state: the bytes offered so far and how much the peer has
/// permitted via MAX_STREAM_DATA (§3 "Flow control").
pub struct SendStreamState {
    pub bytes_sent: u64,
    pub max_stream_data: u64,
    pub fin_sent: bool,
}

impl SendStreamState {
    pub fn new(initial_max_stream_data: u64) -> Self {
        Self {
            bytes_sent: 0,
            max_stream_data: initial_max_stream_data,
            fin_sent: false,
        }
    }

    pub fn available_credit(&self) -> u64 {
        self.max_stream_data.saturating_sub(self.bytes_sent)
    }
}

/// Per-stream receive-side state: reassembly plus the window we've advertised.
pub struct RecvStreamState {
    pub reassembly: OrderedReassembly,
    pub max_stream_data: u64,
    pub fin_received: bool,
}

impl RecvStreamState {
    pub fn new(initial_max_stream_data: u64) -> Self {
        Self {
            reassembly: OrderedReassembly::new(),
            max_stream_data: initial_max_stream_data,
            fin_received: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_in_order_chunks_deliver_immediately() {
        let mut r = OrderedReassembly::new();
        assert_eq!(r.insert(0, b"hello"), b"hello");
        assert_eq!(r.insert(5, b" world"), b" world");
    }

    #[test]
    fn test_out_of_order_chunk_buffers_until_gap_fills() {
        let mut r = OrderedReassembly::new();
        assert!(r.insert(5, b"world").is_empty());
        assert_eq!(r.insert(0, b"hello"), b"helloworld");
    }

    #[test]
    fn test_overlapping_chunk_only_yields_new_bytes() {
        let mut r = OrderedReassembly::new();
        r.insert(0, b"hello");
        assert!(r.insert(0, b"hello").is_empty());
        assert_eq!(r.insert(3, b"lo world"), b" world");
    }
}
