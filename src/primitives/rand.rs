use rand::RngCore;

/// Fills `dst` with cryptographically random bytes, used for connection IDs, stateless-reset
/// tokens, and PATH_CHALLENGE payloads.
pub fn fill_random(dst: &mut [u8]) {
    rand::thread_rng().fill_bytes(dst);
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    fill_random(&mut buf);
    buf
}

pub fn random_u64() -> u64 {
    rand::thread_rng().next_u64()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_bytes_are_sized() {
        let buf = random_bytes(20);
        assert_eq!(buf.len(), 20);
    }
}
