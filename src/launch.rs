//! Guest owner side of `LAUNCH_START`: key agreement with the platform's PDH
//! and the wrapped transport keys.
//!
//! Z is the x-coordinate of the P-384 ECDH point. From it, with the session
//! nonce as context, the SP 800-108 KDF derives a 48 byte master secret. The
//! master secret then yields the KEK and KIK, which wrap the transport keys,
//! and the TEK and TIK themselves.

use std::collections::HashSet;
use std::fmt;

use p384::ecdh::diffie_hellman;
use rand_core::CryptoRngCore;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::constants::{
    KDF_KEK_LABEL, KDF_KIK_LABEL, KDF_MASTER_SECRET_LABEL, KDF_TEK_LABEL, KDF_TIK_LABEL, KEY_LEN,
    NONCE_LEN,
};
use crate::error::LaunchError;
use crate::types::cert::{Algorithm, KeyFamily, PublicKey, SevCertificate, Usage};
use crate::types::launch::{LegacyGuestPolicy, SessionRecord};
use crate::utils::crypto::{aes128_ctr, ct_eq};
use crate::utils::hash::hmac_sha256;
use crate::utils::kdf::kdf;

/// Transport keys shared by the guest owner and the firmware for one launch.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub tek: [u8; KEY_LEN],
    pub tik: [u8; KEY_LEN],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct WrappingKeys {
    kek: [u8; KEY_LEN],
    kik: [u8; KEY_LEN],
}

/// The guest owner's ephemeral Diffie-Hellman key (GODH).
pub struct GuestOwnerKey {
    secret: p384::SecretKey,
}

impl GuestOwnerKey {
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        GuestOwnerKey { secret: p384::SecretKey::random(rng) }
    }

    pub fn from_secret(secret: p384::SecretKey) -> Self {
        GuestOwnerKey { secret }
    }

    pub fn public_key(&self) -> p384::PublicKey {
        self.secret.public_key()
    }

    /// Unsigned certificate carrying the public half, sent to the platform with the session.
    pub fn certificate(&self, api_major: u8, api_minor: u8) -> SevCertificate {
        SevCertificate::new_p384(
            Usage::PDH,
            Algorithm::EcdhSha256,
            api_major,
            api_minor,
            &self.public_key(),
        )
    }
}

impl fmt::Debug for GuestOwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestOwnerKey")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Nonces already used for launches. Reusing a nonce would repeat the session keys.
#[derive(Debug, Clone, Default)]
pub struct LaunchHistory {
    seen: HashSet<[u8; NONCE_LEN]>,
}

impl LaunchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nonce: &[u8; NONCE_LEN]) -> bool {
        self.seen.contains(nonce)
    }

    /// Returns `false` if the nonce was already recorded.
    pub fn record(&mut self, nonce: [u8; NONCE_LEN]) -> bool {
        self.seen.insert(nonce)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Everything the guest owner produces for one launch.
#[derive(Debug)]
pub struct LaunchTransaction {
    pub policy: LegacyGuestPolicy,
    pub session: SessionRecord,
    /// The guest owner's DH certificate.
    pub godh: SevCertificate,
    /// Kept by the guest owner to measure and package secrets later.
    pub keys: SessionKeys,
}

fn ecdh_p384(pdh: &SevCertificate, secret: &p384::SecretKey) -> Result<Zeroizing<Vec<u8>>, LaunchError> {
    let key = pdh
        .subject_key()
        .map_err(|e| LaunchError::KeyAgreement(e.to_string()))?;
    if key.family() != KeyFamily::Ecdh {
        return Err(LaunchError::KeyAgreement(format!(
            "{} key cannot be used for key agreement",
            key.family()
        )));
    }
    let PublicKey::P384(public) = key.key else {
        return Err(LaunchError::KeyAgreement("key agreement requires P-384".into()));
    };
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
}

fn master_secret(shared: &[u8], nonce: &[u8; NONCE_LEN]) -> Zeroizing<[u8; 48]> {
    let mut master = Zeroizing::new([0u8; 48]);
    kdf(shared, KDF_MASTER_SECRET_LABEL, nonce, &mut master[..]);
    master
}

fn derive_key(master: &[u8], label: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    kdf(master, label, &[], &mut key);
    key
}

fn derive_all(
    pdh: &SevCertificate,
    secret: &p384::SecretKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<(WrappingKeys, SessionKeys), LaunchError> {
    let shared = ecdh_p384(pdh, secret)?;
    let master = master_secret(&shared, nonce);
    let wrapping = WrappingKeys {
        kek: derive_key(&master[..], KDF_KEK_LABEL),
        kik: derive_key(&master[..], KDF_KIK_LABEL),
    };
    let session = SessionKeys {
        tek: derive_key(&master[..], KDF_TEK_LABEL),
        tik: derive_key(&master[..], KDF_TIK_LABEL),
    };
    Ok((wrapping, session))
}

/// Derive the TEK and TIK for a session from the platform's PDH, the guest
/// owner's key and the session nonce.
///
/// The result depends only on the inputs. A fresh nonce per launch keeps
/// sessions apart.
pub fn derive_session_keys(
    pdh: &SevCertificate,
    guest: &GuestOwnerKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<SessionKeys, LaunchError> {
    let (_, session) = derive_all(pdh, &guest.secret, nonce)?;
    Ok(session)
}

/// Generate the session parameters for `LAUNCH_START`.
///
/// Draws a fresh nonce from `rng`, refusing an all-zero nonce and, when
/// `history` is given, one that was used before.
pub fn generate_launch_blob(
    policy: LegacyGuestPolicy,
    pdh: &SevCertificate,
    history: Option<&mut LaunchHistory>,
    rng: &mut impl CryptoRngCore,
) -> Result<LaunchTransaction, LaunchError> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    if nonce == [0u8; NONCE_LEN] {
        return Err(LaunchError::ZeroNonce);
    }
    if history.as_deref().is_some_and(|h| h.contains(&nonce)) {
        return Err(LaunchError::NonceReused);
    }

    let guest = GuestOwnerKey::generate(rng);
    let (wrapping, keys) = derive_all(pdh, &guest.secret, &nonce)?;
    if let Some(history) = history {
        history.record(nonce);
    }

    let mut wrap_iv = [0u8; 16];
    rng.fill_bytes(&mut wrap_iv);

    let mut wrap_tk = [0u8; 2 * KEY_LEN];
    wrap_tk[..KEY_LEN].copy_from_slice(&keys.tek);
    wrap_tk[KEY_LEN..].copy_from_slice(&keys.tik);
    aes128_ctr(&wrapping.kek, &wrap_iv, &mut wrap_tk);

    let raw_policy = u32::from(policy);
    let session = SessionRecord {
        nonce,
        wrap_tk,
        wrap_iv,
        wrap_mac: hmac_sha256(&wrapping.kik, &[&wrap_tk]),
        policy_mac: hmac_sha256(&keys.tik, &[&raw_policy.to_le_bytes()]),
    };

    info!(policy = raw_policy, "generated launch blob");
    Ok(LaunchTransaction {
        policy,
        session,
        godh: guest.certificate(pdh.api_major, pdh.api_minor),
        keys,
    })
}

/// Platform side of `LAUNCH_START`: recover the transport keys from a session.
///
/// Both MACs are checked before the keys are used.
pub fn open_launch_blob(
    session: &SessionRecord,
    policy: LegacyGuestPolicy,
    pdh_secret: &p384::SecretKey,
    godh: &SevCertificate,
) -> Result<SessionKeys, LaunchError> {
    let shared = ecdh_p384(godh, pdh_secret)?;
    let master = master_secret(&shared, &session.nonce);
    let kek = Zeroizing::new(derive_key(&master[..], KDF_KEK_LABEL));
    let kik = Zeroizing::new(derive_key(&master[..], KDF_KIK_LABEL));

    if !ct_eq(&hmac_sha256(&kik[..], &[&session.wrap_tk]), &session.wrap_mac) {
        return Err(LaunchError::AuthenticationFailed);
    }

    let mut unwrapped = Zeroizing::new(session.wrap_tk);
    aes128_ctr(&kek, &session.wrap_iv, &mut unwrapped[..]);
    let mut keys = SessionKeys { tek: [0; KEY_LEN], tik: [0; KEY_LEN] };
    keys.tek.copy_from_slice(&unwrapped[..KEY_LEN]);
    keys.tik.copy_from_slice(&unwrapped[KEY_LEN..]);

    let policy_mac = hmac_sha256(&keys.tik, &[&u32::from(policy).to_le_bytes()]);
    if !ct_eq(&policy_mac, &session.policy_mac) {
        return Err(LaunchError::AuthenticationFailed);
    }

    debug!("opened launch session");
    Ok(keys)
}
