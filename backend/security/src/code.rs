//! Pairing code generation and comparison.

use rand::Rng;
use rand::rngs::OsRng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a code of `len` characters from A–Z0–9 using the OS CSPRNG.
pub fn generate_code(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Upper-cases and trims human input.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Length-aware comparison that does not short-circuit on the first differing byte.
pub fn codes_match(expected: &str, supplied: &str) -> bool {
    let (a, b) = (expected.as_bytes(), supplied.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
