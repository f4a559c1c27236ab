// AMD SEV API 0.24 (publication #55766) and SEV-SNP ABI 1.55 (publication #56860).

pub const SEV_CERT_VERSION: u32 = 1;
pub const SEV_CERT_LEN: usize = 0x824;
pub const SEV_CERT_BODY_LEN: usize = 0x414;
pub const SEV_PUBKEY_LEN: usize = 0x404;
pub const SEV_SIG_LEN: usize = 0x200;

pub const AMD_CERT_VERSION: u32 = 1;
pub const AMD_CERT_HEADER_LEN: usize = 64;
pub const AMD_CERT_MODULUS_BITS: [u32; 2] = [2048, 4096];

pub const ECC_PARAM_LEN: usize = 72;
pub const RSA_PARAM_LEN: usize = 512;

pub const CURVE_P256: u32 = 1;
pub const CURVE_P384: u32 = 2;

pub const LEGACY_REPORT_LEN: usize = 0xD0;
pub const LEGACY_REPORT_SIGNED_LEN: usize = 0x34;

pub const GUEST_REPORT_LEN: usize = 0x4A0;
pub const GUEST_REPORT_SIGNED_LEN: usize = 0x2A0;
pub const GUEST_REPORT_VERSIONS: [u32; 2] = [2, 3];
pub const GUEST_REPORT_SIG_ECDSA_P384_SHA384: u32 = 1;

pub const MEAS_CTX_LAUNCH: u8 = 0x04;
pub const DIGEST_LEN: usize = 32;
pub const MEASURE_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;
pub const KEY_LEN: usize = 16;

pub const SECRET_HEADER_LEN: usize = 52;
pub const SECRET_MAC_CTX: u8 = 0x01;
pub const SECRET_ENTRY_HEADER_LEN: usize = 20;
pub const SECRET_TABLE_HEADER_LEN: usize = 20;
pub const CIPHER_BLOCK_LEN: usize = 16;

/// GUID heading the secret table consumed by guest firmware.
pub const SECRET_TABLE_GUID: u128 = 0x1e74f542_71dd_4d66_963e_ef4287ff173b;

pub const KDF_MASTER_SECRET_LABEL: &[u8] = b"sev-master-secret";
pub const KDF_KEK_LABEL: &[u8] = b"sev-kek";
pub const KDF_KIK_LABEL: &[u8] = b"sev-kik";
pub const KDF_TEK_LABEL: &[u8] = b"sev-tek";
pub const KDF_TIK_LABEL: &[u8] = b"sev-tik";

// X.509 object identifiers used by the SNP chain.
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_RSASSA_PSS: &str = "1.2.840.113549.1.1.10";
pub const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const OID_ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
pub const OID_ECDSA_SHA384: &str = "1.2.840.10045.4.3.3";
pub const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
pub const OID_SECP384R1: &str = "1.3.132.0.34";

pub const OID_VCEK_BL_SPL: &str = "1.3.6.1.4.1.3704.1.3.1";
pub const OID_VCEK_TEE_SPL: &str = "1.3.6.1.4.1.3704.1.3.2";
pub const OID_VCEK_SNP_SPL: &str = "1.3.6.1.4.1.3704.1.3.3";
pub const OID_VCEK_UCODE_SPL: &str = "1.3.6.1.4.1.3704.1.3.8";
pub const OID_VCEK_HW_ID: &str = "1.3.6.1.4.1.3704.1.4";
