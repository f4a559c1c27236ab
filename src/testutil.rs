//! Synthetic platforms for tests. Key generation is slow, so each fixture is built once.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use p384::pkcs8::EncodePublicKey;
use rand_core::OsRng;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384};
use x509_cert::certificate::{Certificate as X509Inner, TbsCertificate, Version};
use x509_cert::der::asn1::{BitString, ObjectIdentifier, OctetString, UtcTime};
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use zerocopy::{AsBytes, FromZeroes};

use crate::chain::{generate_oca, PlatformChain, VcekChain};
use crate::codec::decode;
use crate::constants::{
    AMD_CERT_VERSION, ECC_PARAM_LEN, GUEST_REPORT_SIGNED_LEN, LEGACY_REPORT_SIGNED_LEN,
    OID_RSASSA_PSS, OID_VCEK_BL_SPL, OID_VCEK_HW_ID, OID_VCEK_SNP_SPL, OID_VCEK_TEE_SPL,
    OID_VCEK_UCODE_SPL,
};
use crate::types::cert::{
    AmdCertificate, AmdCertificateHeader, Algorithm, SevCertificate, Usage, X509Certificate,
};
use crate::types::report::{GuestReport, LegacyAttestationReport, TcbVersion};
use crate::utils::be_to_le;
use crate::utils::crypto::sign_p384_prehash;
use crate::utils::hash::{sha256sum, sha384sum};

pub const API_MAJOR: u8 = 0;
pub const API_MINOR: u8 = 24;

/// Validity window of the synthetic X.509 chain, in seconds since the epoch.
pub const NOT_BEFORE: u64 = 1_700_000_000;
pub const NOT_AFTER: u64 = 2_000_000_000;

pub const CHIP_ID: [u8; 64] = [0x5c; 64];

pub fn snp_tcb() -> TcbVersion {
    TcbVersion { bootloader: 3, tee: 0, snp: 14, microcode: 209 }
}

pub struct Platform {
    pub ark_key: RsaPrivateKey,
    pub ask_key: RsaPrivateKey,
    pub pek_key: p384::ecdsa::SigningKey,
    pub pdh_key: p384::SecretKey,
    pub ark: AmdCertificate,
    pub ask: AmdCertificate,
    pub cek: SevCertificate,
    pub oca: SevCertificate,
    pub pek: SevCertificate,
    pub pdh: SevCertificate,
    pub chain: PlatformChain,
}

pub struct SnpPlatform {
    pub vcek_key: p384::ecdsa::SigningKey,
    pub ark: X509Certificate,
    pub ask: X509Certificate,
    pub vcek: X509Certificate,
    pub chain: VcekChain,
}

fn pss_sign(key: &RsaPrivateKey, sha384: bool, data: &[u8]) -> Vec<u8> {
    if sha384 {
        BlindedSigningKey::<Sha384>::new(key.clone())
            .sign_with_rng(&mut OsRng, data)
            .to_vec()
    } else {
        BlindedSigningKey::<Sha256>::new(key.clone())
            .sign_with_rng(&mut OsRng, data)
            .to_vec()
    }
}

fn le_field(be: &[u8], len: usize) -> Vec<u8> {
    let mut field = vec![0u8; len];
    be_to_le(be, &mut field);
    field
}

fn amd_cert(
    usage: Usage,
    key_id: [u8; 16],
    certifying_id: [u8; 16],
    public: &RsaPublicKey,
    signer: &RsaPrivateKey,
) -> AmdCertificate {
    let mod_len = public.size();
    let mut header = AmdCertificateHeader::new_zeroed();
    header.version = AMD_CERT_VERSION.into();
    header.key_id = key_id;
    header.certifying_id = certifying_id;
    header.key_usage = usage.0.into();
    header.pub_exp_bits = 32u32.into();
    header.modulus_bits = ((mod_len * 8) as u32).into();

    let mut cert = AmdCertificate {
        header,
        pub_exp: le_field(&public.e().to_bytes_be(), 4),
        modulus: le_field(&public.n().to_bytes_be(), mod_len),
        signature: vec![0; mod_len],
    };
    let signature = pss_sign(signer, false, &cert.body());
    cert.signature = le_field(&signature, mod_len);
    cert
}

fn build_platform() -> Platform {
    let ark_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let ask_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let ark_id = [0xa1; 16];
    let ask_id = [0xa2; 16];
    let ark = amd_cert(Usage::ARK, ark_id, ark_id, &ark_key.to_public_key(), &ark_key);
    let ask = amd_cert(Usage::ASK, ask_id, ark_id, &ask_key.to_public_key(), &ark_key);

    let cek_key = p384::ecdsa::SigningKey::random(&mut OsRng);
    let mut cek = SevCertificate::new_p384(
        Usage::CEK,
        Algorithm::EcdsaSha256,
        API_MAJOR,
        API_MINOR,
        &p384::PublicKey::from(cek_key.verifying_key()),
    );
    let cek_sig = pss_sign(&ask_key, false, cek.body());
    cek.write_signature(0, Usage::ASK, Algorithm::RsaSha256.raw(), &le_field(&cek_sig, cek_sig.len()));

    let oca_key = p384::ecdsa::SigningKey::random(&mut OsRng);
    let oca = generate_oca(&oca_key, API_MAJOR, API_MINOR).unwrap();

    let pek_key = p384::ecdsa::SigningKey::random(&mut OsRng);
    let mut pek = SevCertificate::new_p384(
        Usage::PEK,
        Algorithm::EcdsaSha256,
        API_MAJOR,
        API_MINOR,
        &p384::PublicKey::from(pek_key.verifying_key()),
    );
    pek.sign_p384(0, Usage::OCA, Algorithm::EcdsaSha256, &oca_key).unwrap();
    pek.sign_p384(1, Usage::CEK, Algorithm::EcdsaSha256, &cek_key).unwrap();

    let pdh_key = p384::SecretKey::random(&mut OsRng);
    let mut pdh = SevCertificate::new_p384(
        Usage::PDH,
        Algorithm::EcdhSha256,
        API_MAJOR,
        API_MINOR,
        &pdh_key.public_key(),
    );
    pdh.sign_p384(0, Usage::PEK, Algorithm::EcdsaSha256, &pek_key).unwrap();

    let chain = PlatformChain {
        pdh: pdh.clone(),
        pek: pek.clone(),
        oca: oca.clone(),
        cek: cek.clone(),
        ask: ask.clone(),
        ark: ark.clone(),
    };

    Platform {
        ark_key,
        ask_key,
        pek_key,
        pdh_key,
        ark,
        ask,
        cek,
        oca,
        pek,
        pdh,
        chain,
    }
}

/// A legacy platform: RSA ARK and ASK, P-384 CEK, OCA, PEK and PDH.
pub fn platform() -> &'static Platform {
    static PLATFORM: OnceLock<Platform> = OnceLock::new();
    PLATFORM.get_or_init(build_platform)
}

/// An owner key for taking ownership of the platform.
pub fn owner_key() -> &'static p384::ecdsa::SigningKey {
    static OWNER: OnceLock<p384::ecdsa::SigningKey> = OnceLock::new();
    OWNER.get_or_init(|| p384::ecdsa::SigningKey::random(&mut OsRng))
}

fn oid(dotted: &str) -> ObjectIdentifier {
    ObjectIdentifier::new_unwrap(dotted)
}

fn utc(secs: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap())
}

fn extension(id: &str, value: Vec<u8>) -> Extension {
    Extension {
        extn_id: oid(id),
        critical: false,
        extn_value: OctetString::new(value).unwrap(),
    }
}

/// An X.509 certificate signed with RSASSA-PSS over SHA-384.
fn x509_cert(
    serial: u8,
    subject: &str,
    issuer: &str,
    spki_der: &[u8],
    signer: &RsaPrivateKey,
    extensions: Option<Vec<Extension>>,
) -> X509Certificate {
    let pss = AlgorithmIdentifierOwned { oid: oid(OID_RSASSA_PSS), parameters: None };
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[serial]).unwrap(),
        signature: pss.clone(),
        issuer: Name::from_str(issuer).unwrap(),
        validity: Validity { not_before: utc(NOT_BEFORE), not_after: utc(NOT_AFTER) },
        subject: Name::from_str(subject).unwrap(),
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(spki_der).unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions,
    };
    let signature = pss_sign(signer, true, &tbs.to_der().unwrap());
    let cert = X509Inner {
        tbs_certificate: tbs,
        signature_algorithm: pss,
        signature: BitString::from_bytes(&signature).unwrap(),
    };
    decode(&cert.to_der().unwrap()).unwrap()
}

fn build_snp_platform() -> SnpPlatform {
    const ARK: &str = "CN=ARK-Milan,O=Advanced Micro Devices,C=US";
    const ASK: &str = "CN=SEV-Milan,O=Advanced Micro Devices,C=US";
    const VCEK: &str = "CN=SEV-VCEK,O=Advanced Micro Devices,C=US";

    // Reuses the legacy RSA keys.
    let legacy = platform();
    let ark_spki = legacy.ark_key.to_public_key().to_public_key_der().unwrap();
    let ask_spki = legacy.ask_key.to_public_key().to_public_key_der().unwrap();

    let vcek_key = p384::ecdsa::SigningKey::random(&mut OsRng);
    let vcek_spki = p384::PublicKey::from(vcek_key.verifying_key())
        .to_public_key_der()
        .unwrap();

    let tcb = snp_tcb();
    let spl = |v: u8| asn1::write_single(&u64::from(v)).unwrap();
    let vcek_extensions = vec![
        extension(OID_VCEK_BL_SPL, spl(tcb.bootloader)),
        extension(OID_VCEK_TEE_SPL, spl(tcb.tee)),
        extension(OID_VCEK_SNP_SPL, spl(tcb.snp)),
        extension(OID_VCEK_UCODE_SPL, spl(tcb.microcode)),
        extension(OID_VCEK_HW_ID, CHIP_ID.to_vec()),
    ];

    let ark = x509_cert(1, ARK, ARK, ark_spki.as_bytes(), &legacy.ark_key, None);
    let ask = x509_cert(2, ASK, ARK, ask_spki.as_bytes(), &legacy.ark_key, None);
    let vcek = x509_cert(3, VCEK, ASK, vcek_spki.as_bytes(), &legacy.ask_key, Some(vcek_extensions));

    let chain = VcekChain { ark: ark.clone(), ask: ask.clone(), vcek: vcek.clone() };
    SnpPlatform { vcek_key, ark, ask, vcek, chain }
}

/// An SEV-SNP chain: X.509 ARK, ASK and a VCEK for [`CHIP_ID`] at [`snp_tcb`].
pub fn snp_platform() -> &'static SnpPlatform {
    static SNP: OnceLock<SnpPlatform> = OnceLock::new();
    SNP.get_or_init(build_snp_platform)
}

/// `r[72] | s[72]` little-endian, the layout of SEV report signatures.
fn ecdsa_le_signature(key: &p384::ecdsa::SigningKey, digest: &[u8], field: &mut [u8]) {
    let (r, s) = sign_p384_prehash(key, digest).unwrap();
    be_to_le(&r, &mut field[..ECC_PARAM_LEN]);
    be_to_le(&s, &mut field[ECC_PARAM_LEN..2 * ECC_PARAM_LEN]);
}

/// A legacy attestation report signed by the platform's PEK.
pub fn legacy_report(mnonce: [u8; 16], launch_digest: [u8; 32], policy: u32) -> LegacyAttestationReport {
    let mut report = LegacyAttestationReport::new_zeroed();
    report.mnonce = mnonce;
    report.launch_digest = launch_digest;
    report.policy = policy.into();
    report.sig_usage = Usage::PEK.0.into();
    report.sig_algo = Algorithm::EcdsaSha256.raw().into();

    let digest = sha256sum(&report.as_bytes()[..LEGACY_REPORT_SIGNED_LEN]);
    let mut sig = [0u8; 144];
    ecdsa_le_signature(&platform().pek_key, &digest, &mut sig);
    report.sig1 = sig;
    report
}

/// A guest report signed by the synthetic VCEK.
pub fn guest_report(reported_tcb: TcbVersion, chip_id: [u8; 64]) -> GuestReport {
    let mut report = GuestReport::new_zeroed();
    report.version = 2u32.into();
    report.policy = 0x1_0000u64.into();
    report.signature_algo = 1u32.into();
    report.current_tcb = u64::from(reported_tcb).into();
    report.reported_tcb = u64::from(reported_tcb).into();
    report.report_data = [0xab; 64];
    report.measurement = [0x6d; 48];
    report.chip_id = chip_id;
    report.current_major = 1;
    report.current_minor = 55;

    let digest = sha384sum(&report.as_bytes()[..GUEST_REPORT_SIGNED_LEN]);
    let mut sig = [0u8; 512];
    ecdsa_le_signature(&snp_platform().vcek_key, &digest, &mut sig);
    report.signature = sig;
    report
}
