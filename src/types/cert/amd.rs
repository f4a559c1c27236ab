use rsa::{BigUint, RsaPublicKey};
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use super::{Algorithm, PublicKey, SignatureSlot, SignatureValue, SignedData, SubjectKey, Usage};
use crate::codec::Codec;
use crate::constants::{AMD_CERT_MODULUS_BITS, AMD_CERT_VERSION};
use crate::error::{ChainError, FormatError};
use crate::utils;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct AmdCertificateHeader {
    pub version: little_endian::U32,
    pub key_id: [u8; 16],
    pub certifying_id: [u8; 16],
    pub key_usage: little_endian::U32,
    pub reserved: [u8; 16],
    pub pub_exp_bits: little_endian::U32,
    pub modulus_bits: little_endian::U32,
}

/// AMD root (ARK) or signing (ASK) key in the legacy AMD layout.
///
/// The header is followed by the public exponent, the modulus and an RSA-PSS
/// signature, all little-endian. The signature covers everything before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmdCertificate {
    pub header: AmdCertificateHeader,
    pub pub_exp: Vec<u8>,
    pub modulus: Vec<u8>,
    pub signature: Vec<u8>,
}

impl AmdCertificate {
    pub fn usage(&self) -> Usage {
        Usage(self.header.key_usage.get())
    }

    pub fn key_id(&self) -> [u8; 16] {
        self.header.key_id
    }

    pub fn certifying_id(&self) -> [u8; 16] {
        self.header.certifying_id
    }

    pub fn modulus_bits(&self) -> u32 {
        self.header.modulus_bits.get()
    }

    /// RSA-PSS with SHA-256 for 2048-bit keys and SHA-384 above.
    pub fn signature_algorithm(&self) -> Algorithm {
        if self.modulus_bits() <= 2048 {
            Algorithm::RsaSha256
        } else {
            Algorithm::RsaSha384
        }
    }

    /// Header, exponent and modulus: the bytes covered by the signature.
    pub fn body(&self) -> Vec<u8> {
        let mut body = self.header.as_bytes().to_vec();
        body.extend_from_slice(&self.pub_exp);
        body.extend_from_slice(&self.modulus);
        body
    }

    pub fn public_key(&self) -> Result<RsaPublicKey, ChainError> {
        RsaPublicKey::new(
            BigUint::from_bytes_le(&self.modulus),
            BigUint::from_bytes_le(&self.pub_exp),
        )
        .map_err(|e| ChainError::InvalidKey(e.to_string()))
    }

    pub fn subject_key(&self) -> Result<SubjectKey, ChainError> {
        Ok(SubjectKey {
            algorithm: self.signature_algorithm(),
            key: PublicKey::Rsa(self.public_key()?),
        })
    }

    pub fn signed_data(&self) -> SignedData {
        let signatures = if self.signature.iter().all(|&b| b == 0) {
            Vec::new()
        } else {
            vec![SignatureSlot {
                signer: Usage::ARK.to_string(),
                algorithm: self.signature_algorithm(),
                value: SignatureValue::LittleEndian(self.signature.clone()),
            }]
        };
        SignedData { message: self.body(), signatures }
    }
}

impl Codec for AmdCertificate {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let header = utils::read_record::<AmdCertificateHeader>(bytes)?;
        if header.version.get() != AMD_CERT_VERSION {
            return Err(FormatError::UnknownVersion(header.version.get()));
        }
        let usage = Usage::from_raw(header.key_usage.get())?;
        if usage != Usage::ARK && usage != Usage::ASK {
            return Err(FormatError::UnknownUsage(usage.0));
        }

        let modulus_bits = header.modulus_bits.get();
        if !AMD_CERT_MODULUS_BITS.contains(&modulus_bits) {
            return Err(FormatError::InvalidField {
                field: "modulus_bits",
                reason: format!("{modulus_bits} is not a supported RSA size"),
            });
        }
        let pub_exp_bits = header.pub_exp_bits.get();
        if pub_exp_bits == 0 || pub_exp_bits % 8 != 0 || pub_exp_bits > modulus_bits {
            return Err(FormatError::InvalidField {
                field: "pub_exp_bits",
                reason: format!("{pub_exp_bits} bits"),
            });
        }

        let exp_len = (pub_exp_bits / 8) as usize;
        let mod_len = (modulus_bits / 8) as usize;
        let needed = exp_len + 2 * mod_len;
        if bytes.len() < needed {
            return Err(FormatError::Truncated {
                expected: std::mem::size_of::<AmdCertificateHeader>() + needed,
                actual: std::mem::size_of::<AmdCertificateHeader>() + bytes.len(),
            });
        }

        let pub_exp = utils::read_bytes(bytes, exp_len).unwrap_or_default().to_vec();
        let modulus = utils::read_bytes(bytes, mod_len).unwrap_or_default().to_vec();
        let signature = utils::read_bytes(bytes, mod_len).unwrap_or_default().to_vec();

        Ok(AmdCertificate {
            header,
            pub_exp,
            modulus,
            signature,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.pub_exp);
        out.extend_from_slice(&self.modulus);
        out.extend_from_slice(&self.signature);
    }
}
