//! Integrity codec shared by every packet format.
//!
//! The digest is the 16-bit ones' complement Internet checksum of the UTF-8
//! bytes, rendered as four lowercase hex characters so it can sit in the
//! fixed-width checksum field of a serialized packet.
//!
//! The sum is order-insensitive over aligned 16-bit words, so swapping two
//! of them goes unnoticed (`"abcd"` and `"cdab"` share a digest). Every
//! single-bit error is caught, which is why the channel's munge damages
//! exactly one character instead of rearranging bytes.

/// Width of a rendered digest in characters.
pub const DIGEST_WIDTH: usize = 4;

/// 16-bit Internet checksum (ones' complement) over `data`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);

    for chunk in &mut chunks {
        let value = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = sum.wrapping_add(value);
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add((byte as u32) << 8);
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Digest of `s` as exactly [`DIGEST_WIDTH`] hex characters.
pub fn gen_check(s: &str) -> String {
    format!("{:04x}", internet_checksum(s.as_bytes()))
}

/// True iff `digest` is the digest of `s`.
pub fn check_string(s: &str, digest: &str) -> bool {
    gen_check(s) == digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_four_hex_chars() {
        for s in ["", "A", "ACK", "0hello", "a much longer payload than usual"] {
            let digest = gen_check(s);
            assert_eq!(digest.len(), DIGEST_WIDTH, "{s:?}");
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()), "{digest}");
        }
    }

    #[test]
    fn swapped_words_collide() {
        assert_eq!(gen_check("abcd"), gen_check("cdab"));
        assert!(check_string("cdab", &gen_check("abcd")));
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let original = "1hello, world";
        let digest = gen_check(original);
        for index in 0..original.len() {
            for bit in 0..7 {
                let mut bytes = original.as_bytes().to_vec();
                bytes[index] ^= 1 << bit;
                let damaged = String::from_utf8(bytes).unwrap();
                assert!(!check_string(&damaged, &digest), "{damaged:?}");
            }
        }
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(gen_check("0payload"), gen_check("0payload"));
        assert!(check_string("1ACK", &gen_check("1ACK")));
    }

    #[test]
    fn single_character_change_is_detected() {
        let digest = gen_check("0Hello");
        assert!(!check_string("0Hellp", &digest));
        assert!(!check_string("1Hello", &digest));
    }

    #[test]
    fn ack_sequence_changes_digest() {
        assert_ne!(gen_check("0ACK"), gen_check("1ACK"));
        assert_ne!(gen_check(" ACK"), gen_check(" NAK"));
    }

    #[test]
    fn known_value() {
        // 0x4142 ("AB") complemented
        assert_eq!(internet_checksum(b"AB"), !0x4142);
        assert_eq!(gen_check("AB"), format!("{:04x}", !0x4142u16));
    }
}
