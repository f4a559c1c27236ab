use std::time::SystemTime;

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, Encode, ErrorKind, Reader, SliceReader};
use x509_cert::Certificate as X509Inner;

use super::{Algorithm, KeyFamily, PublicKey, SignatureSlot, SignatureValue, SignedData, SubjectKey};
use crate::codec::Codec;
use crate::constants::{
    OID_ECDSA_SHA256, OID_ECDSA_SHA384, OID_EC_PUBLIC_KEY, OID_RSASSA_PSS, OID_RSA_ENCRYPTION,
    OID_SECP256R1, OID_SECP384R1, OID_VCEK_BL_SPL, OID_VCEK_HW_ID, OID_VCEK_SNP_SPL,
    OID_VCEK_TEE_SPL, OID_VCEK_UCODE_SPL,
};
use crate::error::{ChainError, FormatError};
use crate::types::report::TcbVersion;
use crate::utils::Expireable;

/// A DER certificate of the SEV-SNP chain (ARK, ASK or VCEK).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Certificate {
    inner: X509Inner,
    der: Vec<u8>,
    signature_algorithm: Algorithm,
}

/// Platform values the AMD key distribution service embeds into a VCEK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcekExtensions {
    pub hw_id: Option<[u8; 64]>,
    pub bootloader: Option<u8>,
    pub tee: Option<u8>,
    pub snp: Option<u8>,
    pub microcode: Option<u8>,
}

impl VcekExtensions {
    /// The TCB the VCEK was derived for, when all four SPLs are present.
    pub fn tcb(&self) -> Option<TcbVersion> {
        Some(TcbVersion {
            bootloader: self.bootloader?,
            tee: self.tee?,
            snp: self.snp?,
            microcode: self.microcode?,
        })
    }
}

impl X509Certificate {
    pub fn inner(&self) -> &X509Inner {
        &self.inner
    }

    pub fn signature_algorithm(&self) -> Algorithm {
        self.signature_algorithm
    }

    pub fn issuer_matches(&self, parent: &X509Certificate) -> bool {
        self.inner.tbs_certificate.issuer == parent.inner.tbs_certificate.subject
    }

    pub fn valid_at(&self, timestamp: SystemTime) -> bool {
        self.inner.valid_at(timestamp)
    }

    pub fn subject_key(&self) -> Result<SubjectKey, ChainError> {
        let spki = &self.inner.tbs_certificate.subject_public_key_info;
        let raw = spki.subject_public_key.raw_bytes();
        let invalid = |e: String| ChainError::InvalidKey(e);

        match spki.algorithm.oid.to_string().as_str() {
            // AMD publishes its RSA keys under the RSASSA-PSS algorithm identifier.
            OID_RSA_ENCRYPTION | OID_RSASSA_PSS => {
                let key = RsaPublicKey::from_pkcs1_der(raw).map_err(|e| invalid(e.to_string()))?;
                Ok(SubjectKey { algorithm: Algorithm::RsaSha384, key: PublicKey::Rsa(key) })
            }
            OID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| invalid("EC key without a named curve".to_string()))?
                    .decode_as::<ObjectIdentifier>()
                    .map_err(|e| invalid(e.to_string()))?
                    .to_string();
                let (algorithm, key) = match curve.as_str() {
                    OID_SECP384R1 => (
                        Algorithm::EcdsaSha384,
                        p384::PublicKey::from_sec1_bytes(raw).map(PublicKey::P384),
                    ),
                    OID_SECP256R1 => (
                        Algorithm::EcdsaSha256,
                        p256::PublicKey::from_sec1_bytes(raw).map(PublicKey::P256),
                    ),
                    other => return Err(invalid(format!("unsupported curve {other}"))),
                };
                let key = key.map_err(|e| invalid(e.to_string()))?;
                Ok(SubjectKey { algorithm, key })
            }
            other => Err(invalid(format!("unsupported key algorithm {other}"))),
        }
    }

    pub fn signed_data(&self) -> Result<SignedData, FormatError> {
        let message = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| FormatError::Der(e.to_string()))?;
        let signature = self.inner.signature.raw_bytes().to_vec();
        let value = match self.signature_algorithm.family() {
            KeyFamily::Rsa => SignatureValue::BigEndian(signature),
            _ => SignatureValue::Der(signature),
        };
        Ok(SignedData {
            message,
            signatures: vec![SignatureSlot {
                signer: self.inner.tbs_certificate.issuer.to_string(),
                algorithm: self.signature_algorithm,
                value,
            }],
        })
    }

    pub fn vcek_extensions(&self) -> Result<VcekExtensions, FormatError> {
        let mut out = VcekExtensions::default();
        let Some(extensions) = &self.inner.tbs_certificate.extensions else {
            return Ok(out);
        };

        for ext in extensions {
            let value = ext.extn_value.as_bytes();
            match ext.extn_id.to_string().as_str() {
                OID_VCEK_BL_SPL => out.bootloader = Some(parse_spl(value)?),
                OID_VCEK_TEE_SPL => out.tee = Some(parse_spl(value)?),
                OID_VCEK_SNP_SPL => out.snp = Some(parse_spl(value)?),
                OID_VCEK_UCODE_SPL => out.microcode = Some(parse_spl(value)?),
                OID_VCEK_HW_ID => out.hw_id = Some(parse_hw_id(value)?),
                _ => {}
            }
        }
        Ok(out)
    }
}

fn parse_spl(value: &[u8]) -> Result<u8, FormatError> {
    let spl = asn1::parse_single::<u64>(value).map_err(|e| FormatError::Der(format!("{e:?}")))?;
    u8::try_from(spl).map_err(|_| FormatError::InvalidField {
        field: "SPL",
        reason: format!("{spl} does not fit a byte"),
    })
}

/// The hwID extension holds the 64-byte chip id, either raw or wrapped in an OCTET STRING.
fn parse_hw_id(value: &[u8]) -> Result<[u8; 64], FormatError> {
    let raw = if value.len() == 64 {
        value
    } else {
        asn1::parse_single::<&[u8]>(value).map_err(|e| FormatError::Der(format!("{e:?}")))?
    };
    raw.try_into().map_err(|_| FormatError::InvalidField {
        field: "hwID",
        reason: format!("expected 64 bytes, got {}", raw.len()),
    })
}

/// A short buffer is reported like any other short record.
fn der_error(e: x509_cert::der::Error) -> FormatError {
    match e.kind() {
        ErrorKind::Incomplete { expected_len, actual_len } => FormatError::Truncated {
            expected: usize::try_from(expected_len).unwrap_or(usize::MAX),
            actual: usize::try_from(actual_len).unwrap_or_default(),
        },
        _ => FormatError::Der(e.to_string()),
    }
}

impl Codec for X509Certificate {
    /// Reads exactly one DER certificate, so concatenated chains can be read in sequence.
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let mut reader = SliceReader::new(*bytes).map_err(der_error)?;
        let inner = X509Inner::decode(&mut reader).map_err(der_error)?;
        let consumed = usize::try_from(reader.position()).map_err(der_error)?;

        let signature_algorithm = match inner.signature_algorithm.oid.to_string().as_str() {
            // AMD signs with RSASSA-PSS over SHA-384.
            OID_RSASSA_PSS => Algorithm::RsaSha384,
            OID_ECDSA_SHA384 => Algorithm::EcdsaSha384,
            OID_ECDSA_SHA256 => Algorithm::EcdsaSha256,
            other => {
                return Err(FormatError::InvalidField {
                    field: "signatureAlgorithm",
                    reason: format!("unsupported algorithm {other}"),
                })
            }
        };

        let der = bytes[..consumed].to_vec();
        *bytes = &bytes[consumed..];
        Ok(X509Certificate { inner, der, signature_algorithm })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.der);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::testutil;

    #[test]
    fn garbage_is_a_der_error() {
        // OCTET STRING where the certificate SEQUENCE should be.
        assert!(matches!(
            decode::<X509Certificate>(&[0x04, 0x01, 0x00]),
            Err(FormatError::Der(_))
        ));
    }

    #[test]
    fn short_der_is_truncated() {
        assert_eq!(
            decode::<X509Certificate>(&[]),
            Err(FormatError::Truncated { expected: 1, actual: 0 })
        );

        let bytes = encode(&testutil::snp_platform().vcek);
        assert!(matches!(
            decode::<X509Certificate>(&bytes[..bytes.len() - 10]),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn reads_concatenated_chain() {
        let snp = testutil::snp_platform();
        let mut bytes = encode(&snp.ask);
        bytes.extend(encode(&snp.ark));

        let mut cursor = &bytes[..];
        let ask = X509Certificate::read(&mut cursor).unwrap();
        let ark = X509Certificate::read(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        assert_eq!(ask, snp.ask);
        assert!(ask.issuer_matches(&ark));
        assert_eq!(ark.signature_algorithm(), Algorithm::RsaSha384);
    }

    #[test]
    fn vcek_carries_chip_id_and_tcb() {
        let snp = testutil::snp_platform();
        let ext = snp.vcek.vcek_extensions().unwrap();
        assert_eq!(ext.hw_id, Some(testutil::CHIP_ID));
        assert_eq!(ext.tcb(), Some(testutil::snp_tcb()));

        let key = snp.vcek.subject_key().unwrap();
        assert_eq!(key.algorithm, Algorithm::EcdsaSha384);
        assert_eq!(key.family(), KeyFamily::Ecdsa);
        assert!(matches!(key.key, PublicKey::P384(_)));

        assert_eq!(snp.ark.vcek_extensions().unwrap(), VcekExtensions::default());
    }
}
