//! Signature links between certificates and whole-chain verification.

use rsa::traits::PublicKeyParts;
use tracing::{debug, info};

use crate::codec::Codec;
use crate::constants::ECC_PARAM_LEN;
use crate::error::{ChainError, FormatError};
use crate::trust_store::TrustAnchor;
use crate::types::cert::{
    AmdCertificate, Algorithm, Certificate, PublicKey, SevCertificate, SignatureSlot,
    SignatureValue, SignedData, SubjectKey, Usage, X509Certificate,
};
use crate::utils::crypto::{ecdsa_der_scalars, verify_p256_prehash, verify_p384_prehash, verify_rsa_pss};
use crate::utils::{le_to_be, zero_padded};

/// Verify that one of the signatures in `data` was made by `key`.
///
/// Only signatures naming exactly the key's declared algorithm are tried.
pub fn verify_signed(key: &SubjectKey, data: &SignedData) -> Result<(), ChainError> {
    if data.signatures.is_empty() {
        return Err(ChainError::Unsigned);
    }

    let mut rejected = None;
    for slot in data.signatures.iter().filter(|s| s.algorithm == key.algorithm) {
        if verify_slot(&key.key, &data.message, slot) {
            return Ok(());
        }
        rejected = Some(slot.signer.clone());
    }

    match rejected {
        Some(signer) => Err(ChainError::BadSignature { signer }),
        None => Err(ChainError::AlgorithmMismatch { expected: key.algorithm }),
    }
}

fn verify_slot(key: &PublicKey, message: &[u8], slot: &SignatureSlot) -> bool {
    let hash = slot.algorithm.hash();
    match (key, &slot.value) {
        (PublicKey::Rsa(key), SignatureValue::LittleEndian(field)) => {
            let len = key.size();
            if field.len() < len || !zero_padded(field, len) {
                return false;
            }
            verify_rsa_pss(key, hash, message, &le_to_be(field, len))
        }
        (PublicKey::Rsa(key), SignatureValue::BigEndian(signature)) => {
            verify_rsa_pss(key, hash, message, signature)
        }
        (PublicKey::Rsa(_), SignatureValue::Der(_)) => false,
        (ec, value) => {
            let coordinate = match ec {
                PublicKey::P256(_) => 32,
                _ => 48,
            };
            let scalars = match value {
                SignatureValue::LittleEndian(field) => ecdsa_le_scalars(field, coordinate),
                SignatureValue::Der(der) => ecdsa_der_scalars(der, coordinate),
                SignatureValue::BigEndian(_) => None,
            };
            let Some((r, s)) = scalars else {
                return false;
            };
            let digest = hash.digest(message);
            match ec {
                PublicKey::P256(key) => verify_p256_prehash(key, &digest, &r, &s),
                PublicKey::P384(key) => verify_p384_prehash(key, &digest, &r, &s),
                PublicKey::Rsa(_) => false,
            }
        }
    }
}

/// Split an `r[72] | s[72] | reserved` field into big-endian scalars.
///
/// Any non-zero byte outside the scalars makes the encoding non-canonical.
fn ecdsa_le_scalars(field: &[u8], coordinate: usize) -> Option<(Vec<u8>, Vec<u8>)> {
    if field.len() < 2 * ECC_PARAM_LEN {
        return None;
    }
    let (r, rest) = field.split_at(ECC_PARAM_LEN);
    let (s, reserved) = rest.split_at(ECC_PARAM_LEN);
    if !zero_padded(r, coordinate) || !zero_padded(s, coordinate) || !zero_padded(reserved, 0) {
        return None;
    }
    Some((le_to_be(r, coordinate), le_to_be(s, coordinate)))
}

/// Verify that `child` was signed by `parent`.
///
/// Usage tags are not trusted: the only thing that makes a link valid is a
/// signature that verifies under the parent's key.
pub fn verify_link(child: &Certificate, parent: &Certificate) -> Result<(), ChainError> {
    match (child, parent) {
        (Certificate::Amd(c), Certificate::Amd(p)) if c.certifying_id() != p.key_id() => {
            return Err(ChainError::IssuerMismatch);
        }
        (Certificate::X509(c), Certificate::X509(p)) if !c.issuer_matches(p) => {
            return Err(ChainError::IssuerMismatch);
        }
        _ => {}
    }

    let key = parent.subject_key()?;
    let data = child.signed_data()?;
    verify_signed(&key, &data)?;
    debug!(child = %child.label(), parent = %parent.label(), "verified certificate link");
    Ok(())
}

/// Verify a root-first chain against a pinned root.
///
/// The root must carry the pinned key and be self-signed, then every
/// certificate must be signed by its predecessor. The first broken link is
/// reported with the index of the certificate whose signature failed.
pub fn verify_chain(certs: &[Certificate], pinned_root: &TrustAnchor) -> Result<(), ChainError> {
    let root = certs.first().ok_or(ChainError::Empty)?;
    if !pinned_root.matches(root)? {
        return Err(ChainError::UntrustedRoot);
    }

    verify_link(root, root).map_err(|e| ChainError::LinkFailed {
        index: 0,
        source: Box::new(e),
    })?;

    for (index, pair) in certs.windows(2).enumerate() {
        verify_link(&pair[1], &pair[0]).map_err(|e| ChainError::LinkFailed {
            index: index + 1,
            source: Box::new(e),
        })?;
    }

    debug!(len = certs.len(), "verified certificate chain");
    Ok(())
}

/// Accept a certificate signed by an external owner.
///
/// `issuer` (the OCA) must be self-signed and must have signed `target`. The
/// returned certificate is meant to replace the platform's PEK.
pub fn import_signed_cert(
    target: &SevCertificate,
    issuer: &SevCertificate,
) -> Result<SevCertificate, ChainError> {
    let issuer_cert = Certificate::Sev(issuer.clone());
    verify_link(&issuer_cert, &issuer_cert)?;
    verify_link(&Certificate::Sev(target.clone()), &issuer_cert)?;

    info!(usage = %target.usage(), "imported externally signed certificate");
    Ok(target.clone())
}

/// Sign a PEK certificate signing request with the owner's OCA key.
pub fn sign_pek_csr(
    csr: &SevCertificate,
    oca_key: &p384::ecdsa::SigningKey,
) -> Result<SevCertificate, ChainError> {
    let mut pek = csr.clone();
    pek.clear_signatures();
    pek.sign_p384(0, Usage::OCA, Algorithm::EcdsaSha256, oca_key)?;
    Ok(pek)
}

/// Self-signed OCA certificate for taking ownership of a platform.
pub fn generate_oca(
    oca_key: &p384::ecdsa::SigningKey,
    api_major: u8,
    api_minor: u8,
) -> Result<SevCertificate, ChainError> {
    let public = p384::PublicKey::from(oca_key.verifying_key());
    let mut oca = SevCertificate::new_p384(Usage::OCA, Algorithm::EcdsaSha256, api_major, api_minor, &public);
    oca.sign_p384(0, Usage::OCA, Algorithm::EcdsaSha256, oca_key)?;
    Ok(oca)
}

/// The full legacy SEV certificate set of one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformChain {
    pub pdh: SevCertificate,
    pub pek: SevCertificate,
    pub oca: SevCertificate,
    pub cek: SevCertificate,
    pub ask: AmdCertificate,
    pub ark: AmdCertificate,
}

impl PlatformChain {
    /// ARK, ASK, CEK, PEK, PDH.
    pub fn vendor_path(&self) -> Vec<Certificate> {
        vec![
            self.ark.clone().into(),
            self.ask.clone().into(),
            self.cek.clone().into(),
            self.pek.clone().into(),
            self.pdh.clone().into(),
        ]
    }

    /// ARK, ASK, CEK, PEK: the path to the key signing legacy attestation reports.
    pub fn pek_path(&self) -> Vec<Certificate> {
        let mut path = self.vendor_path();
        path.truncate(4);
        path
    }

    /// Verify ARK to PDH through the CEK, then the owner's side: a
    /// self-signed OCA that also signed the PEK.
    pub fn verify(&self, pinned_root: &TrustAnchor) -> Result<(), ChainError> {
        verify_chain(&self.vendor_path(), pinned_root)?;

        let oca = Certificate::Sev(self.oca.clone());
        verify_link(&oca, &oca)?;
        verify_link(&Certificate::Sev(self.pek.clone()), &oca)?;

        info!("verified platform certificate chain");
        Ok(())
    }
}

impl Codec for PlatformChain {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        Ok(PlatformChain {
            pdh: SevCertificate::read(bytes)?,
            pek: SevCertificate::read(bytes)?,
            oca: SevCertificate::read(bytes)?,
            cek: SevCertificate::read(bytes)?,
            ask: AmdCertificate::read(bytes)?,
            ark: AmdCertificate::read(bytes)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        self.pdh.write(out);
        self.pek.write(out);
        self.oca.write(out);
        self.cek.write(out);
        self.ask.write(out);
        self.ark.write(out);
    }
}

/// The SEV-SNP chain, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcekChain {
    pub ark: X509Certificate,
    pub ask: X509Certificate,
    pub vcek: X509Certificate,
}

impl VcekChain {
    pub fn certificates(&self) -> Vec<Certificate> {
        vec![
            self.ark.clone().into(),
            self.ask.clone().into(),
            self.vcek.clone().into(),
        ]
    }

    pub fn verify(&self, pinned_root: &TrustAnchor) -> Result<(), ChainError> {
        verify_chain(&self.certificates(), pinned_root)?;
        info!("verified VCEK certificate chain");
        Ok(())
    }
}

impl Codec for VcekChain {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        Ok(VcekChain {
            ark: X509Certificate::read(bytes)?,
            ask: X509Certificate::read(bytes)?,
            vcek: X509Certificate::read(bytes)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        self.ark.write(out);
        self.ask.write(out);
        self.vcek.write(out);
    }
}
