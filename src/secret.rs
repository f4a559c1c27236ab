//! Packaging of guest secrets for `LAUNCH_SECRET`.
//!
//! The encoded secret table is encrypted with AES-128-CTR under the TEK. The
//! header MAC is `HMAC(tik, 0x01 | flags | iv | guest_len | trans_len | ciphertext | measurement)`,
//! which ties the package to one measured launch.

use rand_core::CryptoRngCore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::codec::{decode, encode};
use crate::constants::{CIPHER_BLOCK_LEN, MEASURE_LEN, SECRET_MAC_CTX};
use crate::error::SecretError;
use crate::launch::SessionKeys;
use crate::types::secret::{SecretHeader, SecretPackage, SecretTable};
use crate::utils::crypto::{aes128_ctr, ct_eq};
use crate::utils::hash::hmac_sha256;

fn package_mac(
    tik: &[u8],
    flags: u32,
    iv: &[u8; 16],
    ciphertext: &[u8],
    measurement: &[u8; MEASURE_LEN],
) -> Result<[u8; 32], SecretError> {
    let len = u32::try_from(ciphertext.len())
        .map_err(|_| SecretError::TooLarge)?
        .to_le_bytes();
    Ok(hmac_sha256(
        tik,
        &[&[SECRET_MAC_CTX], &flags.to_le_bytes(), iv, &len, &len, ciphertext, measurement],
    ))
}

/// Encrypt and authenticate `table` for injection into the guest measured as `measurement`.
pub fn package_secret(
    table: &SecretTable,
    keys: &SessionKeys,
    measurement: &[u8; MEASURE_LEN],
    rng: &mut impl CryptoRngCore,
) -> Result<SecretPackage, SecretError> {
    let mut ciphertext = encode(table);
    if u32::try_from(ciphertext.len()).is_err() {
        return Err(SecretError::TooLarge);
    }

    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);
    aes128_ctr(&keys.tek, &iv, &mut ciphertext);

    let flags = 0u32;
    let mac = package_mac(&keys.tik, flags, &iv, &ciphertext, measurement)?;
    debug!(entries = table.entries.len(), len = ciphertext.len(), "packaged secret");
    Ok(SecretPackage {
        header: SecretHeader { flags: flags.into(), iv, mac },
        ciphertext,
    })
}

/// Authenticate and decrypt a package. The MAC is checked before any decryption.
pub fn unpackage_secret(
    package: &SecretPackage,
    keys: &SessionKeys,
    measurement: &[u8; MEASURE_LEN],
) -> Result<SecretTable, SecretError> {
    let flags = package.header.flags.get();
    if flags != 0 {
        return Err(SecretError::UnsupportedFlags(flags));
    }
    if package.ciphertext.len() % CIPHER_BLOCK_LEN != 0 {
        return Err(SecretError::Unaligned(package.ciphertext.len()));
    }

    let mac = package_mac(&keys.tik, flags, &package.header.iv, &package.ciphertext, measurement)?;
    if !ct_eq(&mac, &package.header.mac) {
        warn!("secret package failed authentication");
        return Err(SecretError::AuthenticationFailed);
    }

    let mut plaintext = Zeroizing::new(package.ciphertext.clone());
    aes128_ctr(&keys.tek, &package.header.iv, &mut plaintext);
    Ok(decode(&plaintext)?)
}
