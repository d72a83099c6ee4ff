//! Short hex IDs.
//!
//! Every turn, loop run, and per-step record gets an 8-char lowercase hex
//! handle alongside its numeric ID. The hex is drawn from the OS RNG; the
//! store retries on the (unlikely) collision within an entity type.

use rand::RngCore;

/// Length of a short hex ID in characters.
pub const SHORT_HEX_LEN: usize = 8;

/// Generate a new 8-char lowercase hex ID.
pub fn new_short_hex() -> String {
    let mut bytes = [0u8; SHORT_HEX_LEN / 2];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(SHORT_HEX_LEN);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Whether `s` has the shape of a short hex ID.
pub fn is_short_hex(s: &str) -> bool {
    s.len() == SHORT_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::{is_short_hex, new_short_hex, SHORT_HEX_LEN};

    #[test]
    fn generated_hex_has_expected_shape() {
        for _ in 0..32 {
            let hex = new_short_hex();
            assert_eq!(hex.len(), SHORT_HEX_LEN);
            assert!(is_short_hex(&hex), "not short hex: {hex}");
        }
    }

    #[test]
    fn rejects_uppercase_and_wrong_length() {
        assert!(!is_short_hex("A3F2B1C9"));
        assert!(!is_short_hex("a3f2b1c"));
        assert!(!is_short_hex("a3f2b1c9d"));
        assert!(!is_short_hex("g3f2b1c9"));
        assert!(is_short_hex("a3f2b1c9"));
    }
}
