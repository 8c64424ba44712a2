//! `KeyTableCodec` — the keyed stream cipher that decrypts a book's two
//! encrypted key-table strings.
//!
//! The cipher is a small custom LFSR, not a standard primitive, so it is
//! implemented bit-for-bit rather than delegated to a crypto crate: the exact
//! bit pattern is part of the wire contract with the BinB server.

use crate::{BinbError, BinbResult};

/// LFSR tap mask applied when the low bit of the running key is set.
const TAP_MASK: u32 = 0x4820_0004;

/// Seed fallback used when the accumulated seed happens to mask to zero.
const SEED_FALLBACK: u32 = 0x1234_5678;

/// Derive the 31-bit stream-cipher seed from `cid` and the client nonce `k`.
///
/// For each byte index `i` of `cid + ":" + k`, accumulates `byte << (i % 16)`
/// into a running `u32`, then masks to 31 bits. A masked result of zero is
/// replaced with a fixed fallback constant, matching the original JS/Python
/// behavior of never running the LFSR from an all-zero state.
fn generate_seed(cid: &str, k: &str) -> u32 {
    let s = format!("{cid}:{k}");
    let mut seed: u32 = 0;
    for (i, byte) in s.bytes().enumerate() {
        seed = seed.wrapping_add((byte as u32) << (i % 16));
    }
    seed &= 0x7FFF_FFFF;
    if seed == 0 {
        SEED_FALLBACK
    } else {
        seed
    }
}

/// Decrypt one ciphertext string (`ctbl` or `ptbl`) into its plaintext JSON
/// array of 8 slot strings.
///
/// `ciphertext` must be printable ASCII in `[0x20, 0x7E)`. Advances the LFSR
/// one step per character before using it to shift that character, so the
/// keystream never repeats across the two halves of a book even when `k`
/// and `cid` are identical.
pub fn decrypt(ciphertext: &str, cid: &str, k: &str) -> String {
    let mut key = generate_seed(cid, k);
    let mut out = String::with_capacity(ciphertext.len());
    for c in ciphertext.chars() {
        let low_bit_set = key & 1 != 0;
        key = (key >> 1) ^ if low_bit_set { TAP_MASK } else { 0 };
        let shifted = (c as u32).wrapping_sub(0x20);
        let n = (shifted.wrapping_add(key)) % 0x5E + 0x20;
        out.push(char::from_u32(n).unwrap_or(c));
    }
    out
}

/// Decrypt a key-table ciphertext and parse it as a JSON array of 8 slot
/// strings.
///
/// Returns [`BinbError::KeyDecode`] if the decrypted text is not valid JSON
/// or is not an array of exactly 8 strings.
pub fn decrypt_key_table(ciphertext: &str, cid: &str, k: &str) -> BinbResult<[String; 8]> {
    let plaintext = decrypt(ciphertext, cid, k);
    let value: Vec<String> = serde_json::from_str(&plaintext)
        .map_err(|e| BinbError::KeyDecode(format!("not valid JSON: {e}")))?;
    value.try_into().map_err(|v: Vec<String>| {
        BinbError::KeyDecode(format!("expected 8 slot strings, got {}", v.len()))
    })
}
