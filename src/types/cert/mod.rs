mod amd;
mod sev;
mod x509;

use std::fmt;

use p384::pkcs8::EncodePublicKey as _;
use rsa::RsaPublicKey;

pub use amd::*;
pub use sev::*;
pub use x509::*;

use crate::codec::encode;
use crate::error::{ChainError, FormatError};
use crate::utils::hash::{sha256sum, HashAlgorithm};

/// Key usage tag carried by SEV and AMD certificates.
///
/// Usages only name a certificate in logs and errors. Trust always comes from
/// a verified signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Usage(pub u32);

impl Usage {
    pub const ARK: Usage = Usage(0x0000);
    pub const ASK: Usage = Usage(0x0013);
    pub const INVALID: Usage = Usage(0x1000);
    pub const OCA: Usage = Usage(0x1001);
    pub const PEK: Usage = Usage(0x1002);
    pub const PDH: Usage = Usage(0x1003);
    pub const CEK: Usage = Usage(0x1004);

    pub fn from_raw(raw: u32) -> Result<Self, FormatError> {
        match Usage(raw) {
            usage @ (Usage::ARK
            | Usage::ASK
            | Usage::INVALID
            | Usage::OCA
            | Usage::PEK
            | Usage::PDH
            | Usage::CEK) => Ok(usage),
            _ => Err(FormatError::UnknownUsage(raw)),
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Usage::ARK => "ARK",
            Usage::ASK => "ASK",
            Usage::INVALID => "INV",
            Usage::OCA => "OCA",
            Usage::PEK => "PEK",
            Usage::PDH => "PDH",
            Usage::CEK => "CEK",
            Usage(other) => return write!(f, "usage {other:#x}"),
        };
        f.write_str(name)
    }
}

/// Signature or key-agreement algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Algorithm {
    RsaSha256 = 0x0001,
    EcdsaSha256 = 0x0002,
    EcdhSha256 = 0x0100,
    RsaSha384 = 0x0101,
    EcdsaSha384 = 0x0102,
    EcdhSha384 = 0x0103,
}

impl Algorithm {
    pub fn from_raw(raw: u32) -> Result<Self, FormatError> {
        Ok(match raw {
            0x0001 => Algorithm::RsaSha256,
            0x0002 => Algorithm::EcdsaSha256,
            0x0100 => Algorithm::EcdhSha256,
            0x0101 => Algorithm::RsaSha384,
            0x0102 => Algorithm::EcdsaSha384,
            0x0103 => Algorithm::EcdhSha384,
            _ => return Err(FormatError::UnsupportedAlgorithm(raw)),
        })
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn family(self) -> KeyFamily {
        match self {
            Algorithm::RsaSha256 | Algorithm::RsaSha384 => KeyFamily::Rsa,
            Algorithm::EcdsaSha256 | Algorithm::EcdsaSha384 => KeyFamily::Ecdsa,
            Algorithm::EcdhSha256 | Algorithm::EcdhSha384 => KeyFamily::Ecdh,
        }
    }

    pub fn hash(self) -> HashAlgorithm {
        match self {
            Algorithm::RsaSha256 | Algorithm::EcdsaSha256 | Algorithm::EcdhSha256 => {
                HashAlgorithm::Sha256
            }
            Algorithm::RsaSha384 | Algorithm::EcdsaSha384 | Algorithm::EcdhSha384 => {
                HashAlgorithm::Sha384
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Rsa,
    Ecdsa,
    Ecdh,
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyFamily::Rsa => "RSA",
            KeyFamily::Ecdsa => "ECDSA",
            KeyFamily::Ecdh => "ECDH",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    P256(p256::PublicKey),
    P384(p384::PublicKey),
}

impl PublicKey {
    /// DER encoded SubjectPublicKeyInfo, the canonical form used for fingerprints.
    pub fn spki_der(&self) -> Result<Vec<u8>, ChainError> {
        let doc = match self {
            PublicKey::Rsa(key) => key.to_public_key_der(),
            PublicKey::P256(key) => key.to_public_key_der(),
            PublicKey::P384(key) => key.to_public_key_der(),
        }
        .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn fingerprint(&self) -> Result<[u8; 32], ChainError> {
        Ok(sha256sum(&self.spki_der()?))
    }
}

/// The public key of a certificate together with the algorithm it is declared for.
///
/// A signature made by this key is only accepted when it names exactly `algorithm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKey {
    pub algorithm: Algorithm,
    pub key: PublicKey,
}

impl SubjectKey {
    pub fn family(&self) -> KeyFamily {
        self.algorithm.family()
    }
}

/// Encoding of a signature value as it sits in its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureValue {
    /// Little-endian integers in zero padded fields (SEV, AMD and report layouts).
    LittleEndian(Vec<u8>),
    /// Big-endian RSA signature (X.509).
    BigEndian(Vec<u8>),
    /// DER `Ecdsa-Sig-Value` (X.509).
    Der(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSlot {
    /// Who claims to have signed. Only used in error messages.
    pub signer: String,
    pub algorithm: Algorithm,
    pub value: SignatureValue,
}

/// The signed bytes of a record and every populated signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData {
    pub message: Vec<u8>,
    pub signatures: Vec<SignatureSlot>,
}

/// Any certificate format that can appear in a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    Sev(SevCertificate),
    Amd(AmdCertificate),
    X509(X509Certificate),
}

impl Certificate {
    pub fn subject_key(&self) -> Result<SubjectKey, ChainError> {
        match self {
            Certificate::Sev(cert) => cert.subject_key(),
            Certificate::Amd(cert) => cert.subject_key(),
            Certificate::X509(cert) => cert.subject_key(),
        }
    }

    pub fn signed_data(&self) -> Result<SignedData, FormatError> {
        match self {
            Certificate::Sev(cert) => Ok(cert.signed_data()),
            Certificate::Amd(cert) => Ok(cert.signed_data()),
            Certificate::X509(cert) => cert.signed_data(),
        }
    }

    /// SHA-256 over the DER SubjectPublicKeyInfo of the certificate key.
    pub fn key_fingerprint(&self) -> Result<[u8; 32], ChainError> {
        self.subject_key()?.key.fingerprint()
    }

    /// Short name for logs: the usage tag, or "X.509" for DER certificates.
    pub fn label(&self) -> String {
        match self {
            Certificate::Sev(cert) => cert.usage().to_string(),
            Certificate::Amd(cert) => cert.usage().to_string(),
            Certificate::X509(_) => "X.509".to_string(),
        }
    }

    pub fn as_sev(&self) -> Option<&SevCertificate> {
        match self {
            Certificate::Sev(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn as_x509(&self) -> Option<&X509Certificate> {
        match self {
            Certificate::X509(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Certificate::Sev(cert) => encode(cert),
            Certificate::Amd(cert) => encode(cert),
            Certificate::X509(cert) => encode(cert),
        }
    }
}

impl From<SevCertificate> for Certificate {
    fn from(cert: SevCertificate) -> Self {
        Certificate::Sev(cert)
    }
}

impl From<AmdCertificate> for Certificate {
    fn from(cert: AmdCertificate) -> Self {
        Certificate::Amd(cert)
    }
}

impl From<X509Certificate> for Certificate {
    fn from(cert: X509Certificate) -> Self {
        Certificate::X509(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_families_and_hashes() {
        assert_eq!(Algorithm::from_raw(0x102).unwrap(), Algorithm::EcdsaSha384);
        assert_eq!(Algorithm::EcdsaSha384.family(), KeyFamily::Ecdsa);
        assert_eq!(Algorithm::EcdhSha256.family(), KeyFamily::Ecdh);
        assert_eq!(Algorithm::RsaSha384.hash(), HashAlgorithm::Sha384);
        assert_eq!(
            Algorithm::from_raw(0x7),
            Err(FormatError::UnsupportedAlgorithm(0x7))
        );
    }

    #[test]
    fn usages_round_trip_through_raw() {
        assert_eq!(Usage::from_raw(0x1002).unwrap(), Usage::PEK);
        assert_eq!(Usage::PEK.to_string(), "PEK");
        assert_eq!(Usage::from_raw(0x42), Err(FormatError::UnknownUsage(0x42)));
    }
}
