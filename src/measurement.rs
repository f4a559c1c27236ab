//! Launch measurement: HMAC-SHA256 keyed by the TIK over the launch parameters.

use crate::constants::MEASURE_LEN;
use crate::error::MeasurementError;
use crate::types::measurement::{LaunchMeasurement, MeasurementContext};
use crate::utils::crypto::ct_eq;
use crate::utils::hash::hmac_sha256;

/// `HMAC(tik, meas_ctx | api_major | api_minor | build_id | policy | digest | mnonce)`,
/// with the policy as a little-endian u32.
pub fn compute_measurement(ctx: &MeasurementContext) -> [u8; MEASURE_LEN] {
    hmac_sha256(
        &ctx.tik,
        &[
            &[ctx.meas_ctx, ctx.api_major, ctx.api_minor, ctx.build_id],
            &ctx.policy.to_le_bytes(),
            &ctx.digest,
            &ctx.mnonce,
        ],
    )
}

/// Recompute the measurement and compare it with `expected` in constant time.
pub fn verify_measurement(ctx: &MeasurementContext, expected: &[u8]) -> Result<(), MeasurementError> {
    let computed = compute_measurement(ctx);
    if ct_eq(&computed, expected) {
        Ok(())
    } else {
        Err(MeasurementError::Mismatch)
    }
}

/// Check a `LAUNCH_MEASURE` result. The firmware's nonce must be the one in `ctx`.
pub fn verify_launch_measurement(
    ctx: &MeasurementContext,
    launch: &LaunchMeasurement,
) -> Result<(), MeasurementError> {
    let nonce_ok = ct_eq(&ctx.mnonce, &launch.mnonce);
    let measure_ok = verify_measurement(ctx, &launch.measure).is_ok();
    if nonce_ok && measure_ok {
        Ok(())
    } else {
        Err(MeasurementError::Mismatch)
    }
}
