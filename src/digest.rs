//! Hashing and hex helpers shared by result logging and trace previews.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex of the first `n` bytes of `data`.
pub fn head_hex(data: &[u8], n: usize) -> String {
    hex::encode(&data[..data.len().min(n)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"Hello World"),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256_hex(b"payload"), sha256_hex(b"payload"));
    }

    #[test]
    fn head_hex_truncates() {
        assert_eq!(head_hex(&[0x01, 0x02, 0x03], 10), "010203");
        assert_eq!(head_hex(&[0x01, 0x02, 0x03], 2), "0102");
    }

    #[test]
    fn head_hex_edge_cases() {
        assert_eq!(head_hex(&[], 16), "");
        assert_eq!(head_hex(&[0xff], 0), "");
    }
}
