use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384};
use subtle::ConstantTimeEq;

use super::hash::HashAlgorithm;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Verifies an ECDSA P-256 signature given as big-endian `r` and `s` over a precomputed digest.
pub fn verify_p256_prehash(key: &p256::PublicKey, digest: &[u8], r: &[u8], s: &[u8]) -> bool {
    let Ok(signature) = p256::ecdsa::Signature::from_slice(&[r, s].concat()) else {
        return false;
    };
    p256::ecdsa::VerifyingKey::from(key)
        .verify_prehash(digest, &signature)
        .is_ok()
}

/// Verifies an ECDSA P-384 signature given as big-endian `r` and `s` over a precomputed digest.
pub fn verify_p384_prehash(key: &p384::PublicKey, digest: &[u8], r: &[u8], s: &[u8]) -> bool {
    let Ok(signature) = p384::ecdsa::Signature::from_slice(&[r, s].concat()) else {
        return false;
    };
    p384::ecdsa::VerifyingKey::from(key)
        .verify_prehash(digest, &signature)
        .is_ok()
}

/// Splits a DER-encoded ECDSA signature into big-endian `r` and `s`.
pub fn ecdsa_der_scalars(der: &[u8], coordinate_len: usize) -> Option<(Vec<u8>, Vec<u8>)> {
    let bytes = match coordinate_len {
        32 => p256::ecdsa::Signature::from_der(der).ok()?.to_bytes().to_vec(),
        48 => p384::ecdsa::Signature::from_der(der).ok()?.to_bytes().to_vec(),
        _ => return None,
    };
    let (r, s) = bytes.split_at(coordinate_len);
    Some((r.to_vec(), s.to_vec()))
}

/// Signs `digest` with a P-384 key, returning big-endian `r` and `s`.
pub fn sign_p384_prehash(
    key: &p384::ecdsa::SigningKey,
    digest: &[u8],
) -> Result<([u8; 48], [u8; 48]), String> {
    let signature: p384::ecdsa::Signature = key.sign_prehash(digest).map_err(|e| e.to_string())?;
    let bytes = signature.to_bytes();
    let mut r = [0u8; 48];
    let mut s = [0u8; 48];
    r.copy_from_slice(&bytes[..48]);
    s.copy_from_slice(&bytes[48..]);
    Ok((r, s))
}

/// Verifies an RSASSA-PSS signature (big-endian) with the salt length equal to the digest size.
pub fn verify_rsa_pss(
    key: &RsaPublicKey,
    hash: HashAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(signature) = rsa::pss::Signature::try_from(signature) else {
        return false;
    };
    match hash {
        HashAlgorithm::Sha256 => rsa::pss::VerifyingKey::<Sha256>::new(key.clone())
            .verify(data, &signature)
            .is_ok(),
        HashAlgorithm::Sha384 => rsa::pss::VerifyingKey::<Sha384>::new(key.clone())
            .verify(data, &signature)
            .is_ok(),
    }
}

/// Constant-time equality. Slices of different length compare unequal.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// AES-128 in counter mode with a 128-bit big-endian counter block, applied in place.
pub fn aes128_ctr(key: &[u8; 16], iv: &[u8; 16], buf: &mut [u8]) {
    let mut cipher = Aes128Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(buf);
}
