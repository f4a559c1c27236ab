use p384::elliptic_curve::sec1::ToEncodedPoint;
use rsa::{BigUint, RsaPublicKey};
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use super::{Algorithm, KeyFamily, PublicKey, SignatureSlot, SignatureValue, SignedData, SubjectKey, Usage};
use crate::codec::Codec;
use crate::constants::{
    CURVE_P256, CURVE_P384, ECC_PARAM_LEN, RSA_PARAM_LEN, SEV_CERT_BODY_LEN, SEV_CERT_VERSION,
    SEV_PUBKEY_LEN, SEV_SIG_LEN,
};
use crate::error::{ChainError, FormatError};
use crate::utils::{self, be_to_le, crypto::sign_p384_prehash, le_to_be, zero_padded};

/// Platform certificate in the SEV API layout (OCA, PEK, PDH, CEK and the guest owner's DH key).
///
/// The first `0x414` bytes (everything up to the first signature) are signed.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct SevCertificate {
    pub version: little_endian::U32,
    pub api_major: u8,
    pub api_minor: u8,
    pub reserved: little_endian::U16,
    pub pubkey_usage: little_endian::U32,
    pub pubkey_algo: little_endian::U32,
    pub pubkey: [u8; SEV_PUBKEY_LEN],
    pub sig1_usage: little_endian::U32,
    pub sig1_algo: little_endian::U32,
    pub sig1: [u8; SEV_SIG_LEN],
    pub sig2_usage: little_endian::U32,
    pub sig2_algo: little_endian::U32,
    pub sig2: [u8; SEV_SIG_LEN],
}

impl SevCertificate {
    /// An unsigned certificate carrying a P-384 key.
    pub fn new_p384(
        usage: Usage,
        algorithm: Algorithm,
        api_major: u8,
        api_minor: u8,
        key: &p384::PublicKey,
    ) -> Self {
        let mut cert = SevCertificate::new_zeroed();
        cert.version = SEV_CERT_VERSION.into();
        cert.api_major = api_major;
        cert.api_minor = api_minor;
        cert.pubkey_usage = usage.0.into();
        cert.pubkey_algo = algorithm.raw().into();

        let point = key.to_encoded_point(false);
        let xy = &point.as_bytes()[1..];
        cert.pubkey[..4].copy_from_slice(&CURVE_P384.to_le_bytes());
        be_to_le(&xy[..48], &mut cert.pubkey[4..4 + ECC_PARAM_LEN]);
        be_to_le(&xy[48..], &mut cert.pubkey[4 + ECC_PARAM_LEN..4 + 2 * ECC_PARAM_LEN]);
        cert.clear_signatures();
        cert
    }

    pub fn usage(&self) -> Usage {
        Usage(self.pubkey_usage.get())
    }

    pub fn algorithm(&self) -> Result<Algorithm, FormatError> {
        Algorithm::from_raw(self.pubkey_algo.get())
    }

    /// The signed portion of the certificate.
    pub fn body(&self) -> &[u8] {
        &self.as_bytes()[..SEV_CERT_BODY_LEN]
    }

    pub fn public_key(&self) -> Result<PublicKey, ChainError> {
        let algorithm = self.algorithm()?;
        let mut field = &self.pubkey[..];
        let selector = utils::read_record::<little_endian::U32>(&mut field)?.get();

        if algorithm.family() == KeyFamily::Rsa {
            let bytes = (selector / 8) as usize;
            let pub_exp = &field[..RSA_PARAM_LEN];
            let modulus = &field[RSA_PARAM_LEN..2 * RSA_PARAM_LEN];
            if bytes == 0 || bytes > RSA_PARAM_LEN || !zero_padded(modulus, bytes) {
                return Err(ChainError::InvalidKey(format!("RSA modulus of {selector} bits")));
            }
            let key = RsaPublicKey::new(
                BigUint::from_bytes_le(&modulus[..bytes]),
                BigUint::from_bytes_le(pub_exp),
            )
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
            return Ok(PublicKey::Rsa(key));
        }

        let coordinate = match selector {
            CURVE_P256 => 32,
            CURVE_P384 => 48,
            other => return Err(FormatError::UnsupportedCurve(other).into()),
        };
        let qx = &field[..ECC_PARAM_LEN];
        let qy = &field[ECC_PARAM_LEN..2 * ECC_PARAM_LEN];
        if !zero_padded(qx, coordinate) || !zero_padded(qy, coordinate) {
            return Err(ChainError::InvalidKey("non-zero ECC coordinate padding".into()));
        }

        let mut sec1 = vec![0x04];
        sec1.extend(le_to_be(qx, coordinate));
        sec1.extend(le_to_be(qy, coordinate));
        let key = if selector == CURVE_P256 {
            p256::PublicKey::from_sec1_bytes(&sec1).map(PublicKey::P256)
        } else {
            p384::PublicKey::from_sec1_bytes(&sec1).map(PublicKey::P384)
        };
        key.map_err(|e| ChainError::InvalidKey(e.to_string()))
    }

    pub fn subject_key(&self) -> Result<SubjectKey, ChainError> {
        Ok(SubjectKey {
            algorithm: self.algorithm()?,
            key: self.public_key()?,
        })
    }

    /// Populated signature slots as `(usage, algorithm, field)`.
    pub fn signatures(&self) -> Vec<(Usage, Algorithm, &[u8])> {
        [
            (self.sig1_usage.get(), self.sig1_algo.get(), &self.sig1[..]),
            (self.sig2_usage.get(), self.sig2_algo.get(), &self.sig2[..]),
        ]
        .into_iter()
        .filter_map(|(usage, algo, sig)| {
            let algorithm = Algorithm::from_raw(algo).ok()?;
            (Usage(usage) != Usage::INVALID).then_some((Usage(usage), algorithm, sig))
        })
        .collect()
    }

    pub fn is_signed(&self) -> bool {
        !self.signatures().is_empty()
    }

    pub fn signed_data(&self) -> SignedData {
        SignedData {
            message: self.body().to_vec(),
            signatures: self
                .signatures()
                .into_iter()
                .map(|(usage, algorithm, sig)| SignatureSlot {
                    signer: usage.to_string(),
                    algorithm,
                    value: SignatureValue::LittleEndian(sig.to_vec()),
                })
                .collect(),
        }
    }

    /// Whether both certificates carry the same key with the same algorithm.
    pub fn same_key(&self, other: &SevCertificate) -> bool {
        self.pubkey_algo == other.pubkey_algo && self.pubkey == other.pubkey
    }

    pub fn clear_signatures(&mut self) {
        for slot in 0..2 {
            self.write_signature(slot, Usage::INVALID, 0, &[]);
        }
    }

    /// Sign the body with a P-384 key into signature slot `slot` (0 or 1).
    pub fn sign_p384(
        &mut self,
        slot: usize,
        signer: Usage,
        algorithm: Algorithm,
        key: &p384::ecdsa::SigningKey,
    ) -> Result<(), ChainError> {
        if algorithm.family() != KeyFamily::Ecdsa {
            return Err(ChainError::InvalidKey(format!("{algorithm:?} cannot sign with a P-384 key")));
        }
        let digest = algorithm.hash().digest(self.body());
        let (r, s) = sign_p384_prehash(key, &digest).map_err(ChainError::InvalidKey)?;

        let mut value = [0u8; SEV_SIG_LEN];
        be_to_le(&r, &mut value[..ECC_PARAM_LEN]);
        be_to_le(&s, &mut value[ECC_PARAM_LEN..2 * ECC_PARAM_LEN]);
        self.write_signature(slot, signer, algorithm.raw(), &value);
        Ok(())
    }

    /// Store a little-endian signature field into slot `slot` (0 or 1).
    pub fn write_signature(&mut self, slot: usize, signer: Usage, algorithm: u32, value: &[u8]) {
        let (usage, algo, sig) = if slot == 0 {
            (&mut self.sig1_usage, &mut self.sig1_algo, &mut self.sig1)
        } else {
            (&mut self.sig2_usage, &mut self.sig2_algo, &mut self.sig2)
        };
        *usage = signer.0.into();
        *algo = algorithm.into();
        sig.fill(0);
        let len = value.len().min(SEV_SIG_LEN);
        sig[..len].copy_from_slice(&value[..len]);
    }

    fn validate(&self) -> Result<(), FormatError> {
        if self.version.get() != SEV_CERT_VERSION {
            return Err(FormatError::UnknownVersion(self.version.get()));
        }
        Usage::from_raw(self.pubkey_usage.get())?;
        let algorithm = self.algorithm()?;

        let selector = u32::from_le_bytes([self.pubkey[0], self.pubkey[1], self.pubkey[2], self.pubkey[3]]);
        match algorithm.family() {
            KeyFamily::Rsa if selector == 0 || selector % 8 != 0 || selector as usize > RSA_PARAM_LEN * 8 => {
                return Err(FormatError::InvalidField {
                    field: "modulus_bits",
                    reason: format!("{selector} is not a supported RSA size"),
                });
            }
            KeyFamily::Ecdsa | KeyFamily::Ecdh if selector != CURVE_P256 && selector != CURVE_P384 => {
                return Err(FormatError::UnsupportedCurve(selector));
            }
            _ => {}
        }

        for (usage, algo) in [
            (self.sig1_usage.get(), self.sig1_algo.get()),
            (self.sig2_usage.get(), self.sig2_algo.get()),
        ] {
            Usage::from_raw(usage)?;
            if algo != 0 {
                Algorithm::from_raw(algo)?;
            }
        }
        Ok(())
    }
}

impl Codec for SevCertificate {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let cert = utils::read_record::<SevCertificate>(bytes)?;
        cert.validate()?;
        Ok(cert)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}
