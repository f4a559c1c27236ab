//! NIST SP 800-108 key derivation in counter mode with HMAC-SHA256 as the PRF.
//!
//! Each block is `HMAC(key, i || label || 0x00 || context || L)` where the
//! counter `i` (starting at 1) and the output length `L` in bits are 32-bit
//! little-endian integers.

use super::hash::hmac_sha256;

pub fn kdf(key: &[u8], label: &[u8], context: &[u8], out: &mut [u8]) {
    let length_bits = ((out.len() * 8) as u32).to_le_bytes();
    for (i, chunk) in out.chunks_mut(32).enumerate() {
        let counter = (i as u32 + 1).to_le_bytes();
        let block = hmac_sha256(key, &[&counter, label, &[0u8], context, &length_bits]);
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}
