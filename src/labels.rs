//! Probe label and payload generation
//!
//! Builds the randomized DNS names the protocol testers query. Labels are
//! cache-busters, not secrets: every probe query must miss the resolver's
//! cache and travel the full path to the authoritative nameserver.
//! Uses base32 encoding for payload labels (1.6x expansion vs 2x for hex)
//! Format: mfrggzdfmy.nb2wk3dp.tunnel.example.com

use data_encoding::BASE32_NOPAD;
use rand::Rng;

/// Alphabet for cache-busting labels (lowercase alphanumeric, 36 symbols)
const LABEL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a cache-busting label
const LABEL_LEN: usize = 8;

/// Maximum characters per payload segment
///
/// DNS caps a single label at 63 bytes (RFC 1035); 57 leaves headroom for
/// the separator dots while keeping the total QNAME under 253 bytes for
/// the payload sizes the Stream-Gate tester issues.
pub const MAX_SEGMENT_LEN: usize = 57;

/// Generate an 8-character lowercase alphanumeric cache-busting label
pub fn random_label() -> String {
    let mut rng = rand::thread_rng();
    (0..LABEL_LEN)
        .map(|_| LABEL_ALPHABET[rng.gen_range(0..LABEL_ALPHABET.len())] as char)
        .collect()
}

/// Build a dotted payload prefix from `byte_len` random bytes
///
/// The bytes are base32-encoded per RFC4648 with padding disabled, then
/// split into consecutive segments of at most [`MAX_SEGMENT_LEN`]
/// characters joined by `.`:
///
/// Input: 20 random bytes
/// Output: `MFRGGZDFMZTWQ2LKNNWG23TPOBYXE43UOV3HO6DZPI`
pub fn chunked_payload(byte_len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut payload = vec![0u8; byte_len];
    rng.fill(&mut payload[..]);

    let encoded = BASE32_NOPAD.encode(&payload);

    let segments: Vec<&str> = encoded
        .as_bytes()
        .chunks(MAX_SEGMENT_LEN)
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect();

    segments.join(".")
}
