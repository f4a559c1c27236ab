use std::fmt;

use serde::{Deserialize, Serialize};
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use super::cert::{Algorithm, SignatureSlot, SignatureValue, SignedData, Usage};
use super::launch::LegacyGuestPolicy;
use crate::codec::Codec;
use crate::constants::{
    GUEST_REPORT_SIGNED_LEN, GUEST_REPORT_SIG_ECDSA_P384_SHA384, GUEST_REPORT_VERSIONS,
    LEGACY_REPORT_SIGNED_LEN,
};
use crate::error::FormatError;
use crate::utils;

/// Answer of the legacy SEV `ATTESTATION` command, signed by the PEK.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct LegacyAttestationReport {
    pub mnonce: [u8; 16],
    pub launch_digest: [u8; 32],
    pub policy: little_endian::U32,
    pub sig_usage: little_endian::U32,
    pub sig_algo: little_endian::U32,
    pub reserved: little_endian::U32,
    pub sig1: [u8; 144],
}

impl LegacyAttestationReport {
    pub fn policy(&self) -> LegacyGuestPolicy {
        LegacyGuestPolicy::from(self.policy.get())
    }

    pub fn signed_data(&self) -> Result<SignedData, FormatError> {
        Ok(SignedData {
            message: self.as_bytes()[..LEGACY_REPORT_SIGNED_LEN].to_vec(),
            signatures: vec![SignatureSlot {
                signer: Usage(self.sig_usage.get()).to_string(),
                algorithm: Algorithm::from_raw(self.sig_algo.get())?,
                value: SignatureValue::LittleEndian(self.sig1.to_vec()),
            }],
        })
    }
}

impl Codec for LegacyAttestationReport {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let report = utils::read_record::<LegacyAttestationReport>(bytes)?;
        Usage::from_raw(report.sig_usage.get())?;
        Algorithm::from_raw(report.sig_algo.get())?;
        Ok(report)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

/// Security patch levels of the components making up the SEV-SNP TCB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TcbVersion {
    pub bootloader: u8,
    pub tee: u8,
    pub snp: u8,
    pub microcode: u8,
}

impl TcbVersion {
    /// Every component is at least the minimum's. Not a total order.
    pub fn meets(&self, minimum: &TcbVersion) -> bool {
        self.bootloader >= minimum.bootloader
            && self.tee >= minimum.tee
            && self.snp >= minimum.snp
            && self.microcode >= minimum.microcode
    }
}

impl From<u64> for TcbVersion {
    fn from(raw: u64) -> Self {
        let bytes = raw.to_le_bytes();
        TcbVersion {
            bootloader: bytes[0],
            tee: bytes[1],
            snp: bytes[6],
            microcode: bytes[7],
        }
    }
}

impl From<TcbVersion> for u64 {
    fn from(tcb: TcbVersion) -> Self {
        u64::from_le_bytes([tcb.bootloader, tcb.tee, 0, 0, 0, 0, tcb.snp, tcb.microcode])
    }
}

impl fmt::Display for TcbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bl:{} tee:{} snp:{} ucode:{}",
            self.bootloader, self.tee, self.snp, self.microcode
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// SEV-SNP guest policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestPolicy(pub u64);

impl GuestPolicy {
    pub fn abi_minor(&self) -> u8 {
        self.0 as u8
    }

    pub fn abi_major(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn smt_allowed(&self) -> bool {
        self.0 & (1 << 16) != 0
    }

    pub fn migrate_ma_allowed(&self) -> bool {
        self.0 & (1 << 18) != 0
    }

    pub fn debug_allowed(&self) -> bool {
        self.0 & (1 << 19) != 0
    }

    pub fn single_socket_required(&self) -> bool {
        self.0 & (1 << 20) != 0
    }
}

/// SEV-SNP attestation report returned by `MSG_REPORT_REQ`.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct GuestReport {
    pub version: little_endian::U32,
    pub guest_svn: little_endian::U32,
    pub policy: little_endian::U64,
    pub family_id: [u8; 16],
    pub image_id: [u8; 16],
    pub vmpl: little_endian::U32,
    pub signature_algo: little_endian::U32,
    pub current_tcb: little_endian::U64,
    pub platform_info: little_endian::U64,
    pub author_key_en: little_endian::U32,
    pub reserved_0: little_endian::U32,
    pub report_data: [u8; 64],
    pub measurement: [u8; 48],
    pub host_data: [u8; 32],
    pub id_key_digest: [u8; 48],
    pub author_key_digest: [u8; 48],
    pub report_id: [u8; 32],
    pub report_id_ma: [u8; 32],
    pub reported_tcb: little_endian::U64,
    pub reserved_1: [u8; 24],
    pub chip_id: [u8; 64],
    pub committed_tcb: little_endian::U64,
    pub current_build: u8,
    pub current_minor: u8,
    pub current_major: u8,
    pub reserved_2: u8,
    pub committed_build: u8,
    pub committed_minor: u8,
    pub committed_major: u8,
    pub reserved_3: u8,
    pub launch_tcb: little_endian::U64,
    pub reserved_4: [u8; 168],
    pub signature: [u8; 512],
}

impl GuestReport {
    pub fn policy(&self) -> GuestPolicy {
        GuestPolicy(self.policy.get())
    }

    pub fn reported_tcb(&self) -> TcbVersion {
        self.reported_tcb.get().into()
    }

    pub fn current_tcb(&self) -> TcbVersion {
        self.current_tcb.get().into()
    }

    pub fn firmware(&self) -> FirmwareVersion {
        FirmwareVersion {
            major: self.current_major,
            minor: self.current_minor,
            build: self.current_build,
        }
    }

    pub fn signed_data(&self) -> SignedData {
        SignedData {
            message: self.as_bytes()[..GUEST_REPORT_SIGNED_LEN].to_vec(),
            signatures: vec![SignatureSlot {
                signer: "VCEK".to_string(),
                algorithm: Algorithm::EcdsaSha384,
                value: SignatureValue::LittleEndian(self.signature.to_vec()),
            }],
        }
    }
}

impl Codec for GuestReport {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let report = utils::read_record::<GuestReport>(bytes)?;
        if !GUEST_REPORT_VERSIONS.contains(&report.version.get()) {
            return Err(FormatError::UnknownVersion(report.version.get()));
        }
        if report.signature_algo.get() != GUEST_REPORT_SIG_ECDSA_P384_SHA384 {
            return Err(FormatError::UnsupportedAlgorithm(report.signature_algo.get()));
        }
        Ok(report)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}
