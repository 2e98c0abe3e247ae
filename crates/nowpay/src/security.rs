//! Constant-time comparison for signature checks.
//!
//! The IPN verifier compares the expected HMAC against an attacker-supplied
//! header value. The comparison must not reveal, through timing, how many
//! leading characters matched.

use subtle::ConstantTimeEq;

/// Constant-time byte comparison.
///
/// Walks the full length of the longer input, padding the shorter one with
/// zeros, and OR-accumulates the XOR of every byte pair. A length mismatch is
/// folded into a separate accumulator rather than returned early, so the
/// work done depends only on the longer length. The final zero test goes
/// through `subtle::ConstantTimeEq`.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff: u8 = 0;

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }

    let len_diff = (a.len() ^ b.len()) as u64;
    let bytes_equal = diff.ct_eq(&0);
    let lengths_equal = len_diff.ct_eq(&0);
    (bytes_equal & lengths_equal).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_match() {
        assert!(constant_time_eq(b"hello", b"hello"));
    }

    #[test]
    fn different_inputs_do_not_match() {
        assert!(!constant_time_eq(b"test123", b"test456"));
    }

    #[test]
    fn different_length_inputs_do_not_match() {
        assert!(!constant_time_eq(b"test", b"testing"));
    }

    #[test]
    fn zero_padded_prefix_does_not_match() {
        // Padding with zeros must not make "ab" equal "ab\0".
        assert!(!constant_time_eq(b"ab", b"ab\0"));
    }

    #[test]
    fn empty_inputs_match() {
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn empty_vs_nonempty_do_not_match() {
        assert!(!constant_time_eq(b"", b"notempty"));
    }

    #[test]
    fn difference_in_last_byte_detected() {
        let a = [7u8; 128];
        let mut b = a;
        b[127] = 8;
        assert!(!constant_time_eq(&a, &b));
        assert!(constant_time_eq(&a, &a));
    }
}
