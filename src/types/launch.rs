use bitflags::bitflags;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::codec::Codec;
use crate::error::FormatError;
use crate::utils;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct PolicyFlags: u16 {
        const NO_DEBUG        = 0b00000001;
        const NO_KEY_SHARING  = 0b00000010;
        const ENCRYPTED_STATE = 0b00000100;
        const NO_SEND         = 0b00001000;
        const DOMAIN          = 0b00010000;
        const SEV             = 0b00100000;
    }
}

/// Minimum firmware API version a guest policy requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
}

/// Guest policy of a legacy SEV launch: flags in the low half, minimum firmware in the high half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LegacyGuestPolicy {
    pub flags: PolicyFlags,
    pub minfw: ApiVersion,
}

impl LegacyGuestPolicy {
    pub fn debug_allowed(&self) -> bool {
        !self.flags.contains(PolicyFlags::NO_DEBUG)
    }
}

impl From<u32> for LegacyGuestPolicy {
    fn from(raw: u32) -> Self {
        LegacyGuestPolicy {
            flags: PolicyFlags::from_bits_retain(raw as u16),
            minfw: ApiVersion {
                major: (raw >> 16) as u8,
                minor: (raw >> 24) as u8,
            },
        }
    }
}

impl From<LegacyGuestPolicy> for u32 {
    fn from(policy: LegacyGuestPolicy) -> Self {
        u32::from(policy.flags.bits())
            | u32::from(policy.minfw.major) << 16
            | u32::from(policy.minfw.minor) << 24
    }
}

/// Session parameters handed to `LAUNCH_START`.
///
/// `wrap_tk` holds the TEK and TIK encrypted under the KEK, authenticated by
/// `wrap_mac` under the KIK. `policy_mac` binds the guest policy to the TIK.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct SessionRecord {
    pub nonce: [u8; 16],
    pub wrap_tk: [u8; 32],
    pub wrap_iv: [u8; 16],
    pub wrap_mac: [u8; 32],
    pub policy_mac: [u8; 32],
}

impl Codec for SessionRecord {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        utils::read_record(bytes)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}
