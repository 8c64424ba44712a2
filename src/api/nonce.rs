//! Client nonce (`k`) generation.
//!
//! The server only ever checks that `k` is present and reasonably
//! unpredictable, so nothing here needs to match the original byte-for-byte.
//! It mimics the original generator's shape anyway (a timestamp-seeded
//! alphabet draw) so outgoing requests don't stand out against other BinB
//! clients.

use chrono::Local;
use rand::Rng;

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generate a fresh 32-character client nonce.
pub fn generate_k() -> String {
    let now = Local::now();
    let mut source = now.format("%Y%m%d%H%M%S").to_string();
    source.push_str(&(now.timestamp_subsec_millis()).to_string());
    source.push_str(ALPHABET);

    let chars: Vec<char> = source.chars().collect();
    let mut rng = rand::rng();
    (0..32)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_32_characters() {
        let k = generate_k();
        assert_eq!(k.chars().count(), 32);
    }

    #[test]
    fn only_uses_alphabet_and_digit_characters() {
        let k = generate_k();
        assert!(k.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn two_calls_are_very_likely_distinct() {
        let a = generate_k();
        let b = generate_k();
        assert_ne!(a, b);
    }
}
