use std::fmt;

use zerocopy::{AsBytes, FromBytes, FromZeroes};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::Codec;
use crate::constants::{DIGEST_LEN, KEY_LEN, MEASURE_LEN, NONCE_LEN};
use crate::error::FormatError;
use crate::utils::{self, hex_array};

/// Inputs of the launch measurement.
///
/// `tik` is secret: it is wiped on drop and never shown by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MeasurementContext {
    pub meas_ctx: u8,
    pub api_major: u8,
    pub api_minor: u8,
    pub build_id: u8,
    pub policy: u32,
    pub digest: [u8; DIGEST_LEN],
    pub mnonce: [u8; NONCE_LEN],
    pub tik: [u8; KEY_LEN],
}

impl MeasurementContext {
    /// Assemble a context from hex fields as they arrive on a command line.
    ///
    /// Every field must decode to exactly its declared size. A leading `0x` is
    /// accepted and the policy is read as a big-endian number.
    #[allow(clippy::too_many_arguments)]
    pub fn from_hex_fields(
        meas_ctx: &str,
        api_major: &str,
        api_minor: &str,
        build_id: &str,
        policy: &str,
        digest: &str,
        mnonce: &str,
        tik: &str,
    ) -> Result<Self, FormatError> {
        let [meas_ctx] = hex_array::<1>("meas_ctx", meas_ctx)?;
        let [api_major] = hex_array::<1>("api_major", api_major)?;
        let [api_minor] = hex_array::<1>("api_minor", api_minor)?;
        let [build_id] = hex_array::<1>("build_id", build_id)?;
        Ok(MeasurementContext {
            meas_ctx,
            api_major,
            api_minor,
            build_id,
            policy: u32::from_be_bytes(hex_array::<4>("policy", policy)?),
            digest: hex_array("digest", digest)?,
            mnonce: hex_array("mnonce", mnonce)?,
            tik: hex_array("tik", tik)?,
        })
    }
}

impl fmt::Debug for MeasurementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementContext")
            .field("meas_ctx", &self.meas_ctx)
            .field("api_major", &self.api_major)
            .field("api_minor", &self.api_minor)
            .field("build_id", &self.build_id)
            .field("policy", &format_args!("{:#010x}", self.policy))
            .field("digest", &hex::encode(self.digest))
            .field("mnonce", &hex::encode(self.mnonce))
            .field("tik", &"<redacted>")
            .finish()
    }
}

/// Result of `LAUNCH_MEASURE`: the measurement and the nonce the firmware mixed into it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct LaunchMeasurement {
    pub measure: [u8; MEASURE_LEN],
    pub mnonce: [u8; NONCE_LEN],
}

impl Codec for LaunchMeasurement {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        utils::read_record(bytes)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn parses_command_line_fields() {
        let ctx = MeasurementContext::from_hex_fields(
            "04",
            "00",
            "17",
            "0f",
            "0x00000001",
            &"00".repeat(32),
            &"00".repeat(16),
            &"00".repeat(16),
        )
        .unwrap();
        assert_eq!(ctx.meas_ctx, 0x04);
        assert_eq!(ctx.api_minor, 0x17);
        assert_eq!(ctx.build_id, 0x0f);
        assert_eq!(ctx.policy, 1);
    }

    #[test]
    fn wrong_sized_fields_are_rejected() {
        let short_digest = MeasurementContext::from_hex_fields(
            "04", "00", "17", "0f", "00000001", "abcd", &"00".repeat(16), &"00".repeat(16),
        );
        assert!(matches!(
            short_digest,
            Err(FormatError::InvalidField { field: "digest", .. })
        ));

        let long_ctx = MeasurementContext::from_hex_fields(
            "0404", "00", "17", "0f", "00000001", &"00".repeat(32), &"00".repeat(16),
            &"00".repeat(16),
        );
        assert!(matches!(long_ctx, Err(FormatError::InvalidField { field: "meas_ctx", .. })));
    }

    #[test]
    fn launch_measurement_is_measure_then_mnonce() {
        let measured = LaunchMeasurement { measure: [0xde; MEASURE_LEN], mnonce: [0x07; NONCE_LEN] };
        let bytes = encode(&measured);
        assert_eq!(bytes.len(), MEASURE_LEN + NONCE_LEN);
        assert_eq!(&bytes[MEASURE_LEN..], &[0x07; NONCE_LEN]);
        assert_eq!(decode::<LaunchMeasurement>(&bytes).unwrap(), measured);
        assert!(matches!(
            decode::<LaunchMeasurement>(&bytes[..MEASURE_LEN]),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn debug_hides_tik() {
        let ctx = MeasurementContext::from_hex_fields(
            "04", "00", "17", "0f", "00000001", &"00".repeat(32), &"00".repeat(16),
            &"ab".repeat(16),
        )
        .unwrap();
        let shown = format!("{ctx:?}");
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("abab"));
    }
}
