pub mod chain;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod launch;
pub mod measurement;
pub mod report;
pub mod repetition;
pub mod secret;
pub mod trust_store;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testutil;

use tracing::info;

use chain::{PlatformChain, VcekChain};
use codec::decode;
use config::AcceptancePolicy;
pub use error::{Error, Result};
use report::{ExpectedMeasurement, ReportValidator, SignerTrust};
use trust_store::TrustStore;
use types::report::{GuestReport, LegacyAttestationReport};
use types::VerifiedReport;

/// Validate a legacy SEV attestation report.
///
/// `chain` is the platform's exported certificate set (PDH, PEK, OCA, CEK,
/// ASK, ARK). The report must be signed by a PEK that chains to a root of
/// `store` through the CEK.
pub fn validate_attestation(
    report: &[u8],
    chain: &[u8],
    store: &TrustStore,
    expected: &ExpectedMeasurement,
    policy: &AcceptancePolicy,
) -> Result<VerifiedReport> {
    // 1. Parse the report and the platform certificates.
    let report: LegacyAttestationReport = decode(report)?;
    let chain: PlatformChain = decode(chain)?;

    // 2. Trust the PEK through ARK, ASK and CEK, then check the report signature,
    //    the launch measurement and the owner's policy.
    let path = chain.pek_path();
    let verified = ReportValidator::new(report).validate(
        SignerTrust::Store { store, chain: &path },
        expected,
        policy,
    )?;

    info!(policy = verified.policy, "attestation report accepted");
    Ok(verified)
}

/// Validate an SEV-SNP guest report.
///
/// `vcek_chain` holds the DER ARK, ASK and VCEK certificates in that order.
pub fn validate_guest_report(
    report: &[u8],
    vcek_chain: &[u8],
    store: &TrustStore,
    expected: &ExpectedMeasurement,
    policy: &AcceptancePolicy,
) -> Result<VerifiedReport> {
    // 1. Parse the report and the VCEK chain.
    let report: GuestReport = decode(report)?;
    let chain: VcekChain = decode(vcek_chain)?;

    // 2. Trust the VCEK, check the report signature and that the VCEK was
    //    issued for the reporting chip at the reported TCB.
    // 3. Check the measurement and the owner's policy.
    let certificates = chain.certificates();
    let verified = ReportValidator::new(report).validate(
        SignerTrust::Store { store, chain: &certificates },
        expected,
        policy,
    )?;

    info!(tcb = ?verified.tcb, "guest report accepted");
    Ok(verified)
}
