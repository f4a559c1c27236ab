//! Staged validation of attestation reports.
//!
//! A [`ReportValidator`] moves a parsed report through
//! `Parsed -> ChainVerified -> SignatureVerified -> MeasurementVerified -> Accepted`.
//! The first failing stage moves it to `Rejected` and no later stage runs.

use tracing::{debug, info, warn};

use crate::chain::{verify_chain, verify_signed};
use crate::config::AcceptancePolicy;
use crate::error::{ChainError, FormatError, PolicyViolation, RejectReason};
use crate::measurement::compute_measurement;
use crate::trust_store::{TrustAnchor, TrustStore};
use crate::types::cert::{Certificate, SignedData};
use crate::types::measurement::MeasurementContext;
use crate::types::report::{FirmwareVersion, GuestReport, LegacyAttestationReport};
use crate::types::{ReportKind, VerifiedReport};
use crate::utils::crypto::ct_eq;

/// A signed report format the validator understands.
pub trait AttestationEvidence {
    fn kind(&self) -> ReportKind;

    /// The signed bytes and the report's signature.
    fn signed_data(&self) -> Result<SignedData, FormatError>;

    /// The launch digest the report attests to.
    fn measurement(&self) -> &[u8];

    /// The firmware nonce the measurement was computed with, if the report carries it.
    fn measurement_nonce(&self) -> Option<&[u8]> {
        None
    }

    /// Check that the report belongs to the platform `signer` was issued for.
    fn check_signer(&self, signer: &Certificate) -> Result<(), RejectReason>;

    /// Check the report's fields against the owner's policy.
    fn check_policy(&self, policy: &AcceptancePolicy, signer: &Certificate) -> Result<(), PolicyViolation>;

    fn summary(&self) -> VerifiedReport;
}

fn check_expected_policy(policy: &AcceptancePolicy, actual: u64) -> Result<(), PolicyViolation> {
    match policy.expected_policy {
        Some(expected) if expected != actual => Err(PolicyViolation::PolicyMismatch { expected, actual }),
        _ => Ok(()),
    }
}

impl AttestationEvidence for LegacyAttestationReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Legacy
    }

    fn signed_data(&self) -> Result<SignedData, FormatError> {
        LegacyAttestationReport::signed_data(self)
    }

    fn measurement(&self) -> &[u8] {
        &self.launch_digest
    }

    fn measurement_nonce(&self) -> Option<&[u8]> {
        Some(&self.mnonce)
    }

    /// Legacy reports name no platform, the PEK signature is the whole binding.
    fn check_signer(&self, _signer: &Certificate) -> Result<(), RejectReason> {
        Ok(())
    }

    fn check_policy(&self, policy: &AcceptancePolicy, signer: &Certificate) -> Result<(), PolicyViolation> {
        if self.policy().debug_allowed() && !policy.allow_debug {
            return Err(PolicyViolation::DebugAllowed);
        }
        check_expected_policy(policy, u64::from(self.policy.get()))?;

        // Only the API version of the signing PEK is known here, so the build is not compared.
        if let Some(minimum) = policy.minimum_firmware {
            let reported = signer
                .as_sev()
                .map(|pek| (pek.api_major, pek.api_minor));
            if reported.map_or(true, |api| api < (minimum.major, minimum.minor)) {
                return Err(PolicyViolation::FirmwareBelowMinimum {
                    reported: reported.map_or("unknown".to_string(), |(major, minor)| {
                        format!("{major}.{minor}")
                    }),
                    minimum: format!("{}.{}", minimum.major, minimum.minor),
                });
            }
        }
        Ok(())
    }

    fn summary(&self) -> VerifiedReport {
        VerifiedReport {
            kind: ReportKind::Legacy,
            measurement: self.launch_digest.to_vec(),
            policy: u64::from(self.policy.get()),
            tcb: None,
            firmware: None,
            report_data: Vec::new(),
        }
    }
}

impl AttestationEvidence for GuestReport {
    fn kind(&self) -> ReportKind {
        ReportKind::GuestReport
    }

    fn signed_data(&self) -> Result<SignedData, FormatError> {
        Ok(GuestReport::signed_data(self))
    }

    fn measurement(&self) -> &[u8] {
        &self.measurement
    }

    /// The VCEK must have been issued for this chip at the reported TCB.
    /// Extensions missing from the certificate are not compared.
    fn check_signer(&self, signer: &Certificate) -> Result<(), RejectReason> {
        let Some(vcek) = signer.as_x509() else {
            return Err(RejectReason::Policy(PolicyViolation::ChipIdMismatch));
        };
        let extensions = vcek
            .vcek_extensions()
            .map_err(|e| RejectReason::Chain(ChainError::Format(e)))?;

        if let Some(hw_id) = extensions.hw_id {
            if !ct_eq(&hw_id, &self.chip_id) {
                return Err(RejectReason::Policy(PolicyViolation::ChipIdMismatch));
            }
        }
        if let Some(tcb) = extensions.tcb() {
            if tcb != self.reported_tcb() {
                return Err(RejectReason::Policy(PolicyViolation::SignerTcbMismatch));
            }
        }
        Ok(())
    }

    fn check_policy(&self, policy: &AcceptancePolicy, _signer: &Certificate) -> Result<(), PolicyViolation> {
        if self.policy().debug_allowed() && !policy.allow_debug {
            return Err(PolicyViolation::DebugAllowed);
        }
        check_expected_policy(policy, self.policy.get())?;

        if let Some(maximum) = policy.maximum_vmpl {
            let actual = self.vmpl.get();
            if actual > maximum {
                return Err(PolicyViolation::VmplTooHigh { actual, maximum });
            }
        }
        if let Some(minimum) = policy.minimum_tcb {
            let reported = self.reported_tcb();
            if !reported.meets(&minimum) {
                return Err(PolicyViolation::TcbBelowMinimum {
                    reported: reported.to_string(),
                    minimum: minimum.to_string(),
                });
            }
        }
        if let Some(minimum) = policy.minimum_firmware {
            let reported: FirmwareVersion = self.firmware();
            if reported < minimum {
                return Err(PolicyViolation::FirmwareBelowMinimum {
                    reported: reported.to_string(),
                    minimum: minimum.to_string(),
                });
            }
        }
        Ok(())
    }

    fn summary(&self) -> VerifiedReport {
        VerifiedReport {
            kind: ReportKind::GuestReport,
            measurement: self.measurement.to_vec(),
            policy: self.policy.get(),
            tcb: Some(self.reported_tcb()),
            firmware: Some(self.firmware()),
            report_data: self.report_data.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportState {
    Parsed,
    ChainVerified,
    SignatureVerified,
    MeasurementVerified,
    Accepted,
    Rejected(RejectReason),
}

impl ReportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportState::Accepted | ReportState::Rejected(_))
    }
}

/// Where the report signer's trust comes from.
#[derive(Debug, Clone, Copy)]
pub enum SignerTrust<'a> {
    /// A root-first chain ending at the signer, checked against one pinned root.
    Chain {
        chain: &'a [Certificate],
        pinned_root: &'a TrustAnchor,
    },
    /// A root-first chain ending at the signer, rooted in any anchor of the store.
    Store {
        store: &'a TrustStore,
        chain: &'a [Certificate],
    },
    /// A signer the caller already trusts. Only the chain stage is replaced,
    /// the signature and measurement are still checked.
    PreTrusted(&'a Certificate),
}

/// The measurement a report must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedMeasurement {
    /// A digest the owner computed ahead of time.
    Digest(Vec<u8>),
    /// Recompute the launch measurement from its inputs.
    Launch(MeasurementContext),
}

pub struct ReportValidator<R> {
    report: R,
    state: ReportState,
    signer: Option<Certificate>,
}

impl<R: AttestationEvidence> ReportValidator<R> {
    pub fn new(report: R) -> Self {
        ReportValidator { report, state: ReportState::Parsed, signer: None }
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    pub fn report(&self) -> &R {
        &self.report
    }

    /// The verified signer, once the chain stage passed.
    pub fn signer(&self) -> Option<&Certificate> {
        self.signer.as_ref()
    }

    fn in_state(&self, expected: ReportState, stage: &str) -> bool {
        if self.state == expected {
            return true;
        }
        debug!(stage, state = ?self.state, "stage called out of order, ignoring");
        false
    }

    fn reject(&mut self, reason: RejectReason) -> &ReportState {
        warn!(kind = ?self.report.kind(), %reason, "report rejected");
        self.state = ReportState::Rejected(reason);
        &self.state
    }

    fn advance(&mut self, next: ReportState) -> &ReportState {
        debug!(kind = ?self.report.kind(), state = ?next, "report advanced");
        self.state = next;
        &self.state
    }

    /// Establish the signer certificate.
    pub fn verify_signer(&mut self, trust: SignerTrust<'_>) -> &ReportState {
        if !self.in_state(ReportState::Parsed, "signer") {
            return &self.state;
        }

        let signer = match trust {
            SignerTrust::Chain { chain, pinned_root } => verify_chain(chain, pinned_root)
                .and_then(|()| chain.last().cloned().ok_or(ChainError::Empty)),
            SignerTrust::Store { store, chain } => store.verify_chain_leaf(chain).map(|leaf| leaf.cert),
            SignerTrust::PreTrusted(cert) => {
                warn!(signer = %cert.label(), "skipping chain verification for a pre-trusted signer");
                Ok(cert.clone())
            }
        };

        match signer {
            Ok(signer) => {
                self.signer = Some(signer);
                self.advance(ReportState::ChainVerified)
            }
            Err(e) => self.reject(RejectReason::Chain(e)),
        }
    }

    /// Check the report signature under the signer's key, then bind the signer to the report.
    pub fn verify_signature(&mut self) -> &ReportState {
        if !self.in_state(ReportState::ChainVerified, "signature") {
            return &self.state;
        }
        let Some(signer) = self.signer.clone() else {
            return self.reject(RejectReason::Chain(ChainError::Empty));
        };

        let verified = signer.subject_key().and_then(|key| {
            let data = self.report.signed_data()?;
            verify_signed(&key, &data)
        });
        if let Err(e) = verified {
            return self.reject(RejectReason::BadSignature(e));
        }
        if let Err(reason) = self.report.check_signer(&signer) {
            return self.reject(reason);
        }
        self.advance(ReportState::SignatureVerified)
    }

    pub fn verify_measurement(&mut self, expected: &ExpectedMeasurement) -> &ReportState {
        if !self.in_state(ReportState::SignatureVerified, "measurement") {
            return &self.state;
        }

        let matches = match expected {
            ExpectedMeasurement::Digest(digest) => ct_eq(self.report.measurement(), digest),
            ExpectedMeasurement::Launch(ctx) => {
                let nonce_ok = self
                    .report
                    .measurement_nonce()
                    .map_or(true, |nonce| ct_eq(nonce, &ctx.mnonce));
                nonce_ok && ct_eq(self.report.measurement(), &compute_measurement(ctx))
            }
        };

        if matches {
            self.advance(ReportState::MeasurementVerified)
        } else {
            self.reject(RejectReason::MeasurementMismatch)
        }
    }

    pub fn accept(&mut self, policy: &AcceptancePolicy) -> &ReportState {
        if !self.in_state(ReportState::MeasurementVerified, "policy") {
            return &self.state;
        }
        let Some(signer) = self.signer.as_ref() else {
            return self.reject(RejectReason::Chain(ChainError::Empty));
        };

        match self.report.check_policy(policy, signer) {
            Ok(()) => {
                info!(kind = ?self.report.kind(), "report accepted");
                self.advance(ReportState::Accepted)
            }
            Err(violation) => self.reject(RejectReason::Policy(violation)),
        }
    }

    /// The verdict once the validator reached a terminal state.
    pub fn verdict(&self) -> Option<Result<VerifiedReport, RejectReason>> {
        match &self.state {
            ReportState::Accepted => Some(Ok(self.report.summary())),
            ReportState::Rejected(reason) => Some(Err(reason.clone())),
            _ => None,
        }
    }

    /// Run every stage in order.
    pub fn validate(
        mut self,
        trust: SignerTrust<'_>,
        expected: &ExpectedMeasurement,
        policy: &AcceptancePolicy,
    ) -> Result<VerifiedReport, RejectReason> {
        self.verify_signer(trust);
        self.verify_signature();
        self.verify_measurement(expected);
        self.accept(policy);
        match self.verdict() {
            Some(verdict) => verdict,
            None => Err(RejectReason::Chain(ChainError::Empty)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::types::report::TcbVersion;

    fn legacy_context() -> MeasurementContext {
        MeasurementContext {
            meas_ctx: 0x04,
            api_major: 0,
            api_minor: 24,
            build_id: 15,
            policy: 0x0001,
            digest: [0x42; 32],
            mnonce: [0x17; 16],
            tik: [0x99; 16],
        }
    }

    fn legacy_report(ctx: &MeasurementContext) -> LegacyAttestationReport {
        testutil::legacy_report(ctx.mnonce, compute_measurement(ctx), ctx.policy)
    }

    #[test]
    fn legacy_report_walks_every_stage() {
        let platform = testutil::platform();
        let path = platform.chain.pek_path();
        let root = TrustAnchor::Certificate(platform.ark.clone().into());
        let ctx = legacy_context();

        let mut validator = ReportValidator::new(legacy_report(&ctx));
        assert_eq!(
            validator.verify_signer(SignerTrust::Chain { chain: &path, pinned_root: &root }),
            &ReportState::ChainVerified
        );
        assert_eq!(validator.verify_signature(), &ReportState::SignatureVerified);
        assert_eq!(
            validator.verify_measurement(&ExpectedMeasurement::Launch(ctx.clone())),
            &ReportState::MeasurementVerified
        );
        assert_eq!(validator.accept(&AcceptancePolicy::default()), &ReportState::Accepted);

        let verified = validator.verdict().unwrap().unwrap();
        assert_eq!(verified.kind, ReportKind::Legacy);
        assert_eq!(verified.measurement, compute_measurement(&ctx).to_vec());
    }

    #[test]
    fn valid_signature_with_wrong_measurement_is_rejected() {
        let pek = Certificate::Sev(testutil::platform().pek.clone());
        let ctx = legacy_context();
        let mut other = ctx.clone();
        other.digest[0] ^= 1;

        let verdict = ReportValidator::new(legacy_report(&ctx)).validate(
            SignerTrust::PreTrusted(&pek),
            &ExpectedMeasurement::Launch(other),
            &AcceptancePolicy::default(),
        );
        assert_eq!(verdict, Err(RejectReason::MeasurementMismatch));
    }

    #[test]
    fn pre_trusted_signer_still_checks_signature() {
        // The CEK is trusted here but did not sign the report.
        let cek = Certificate::Sev(testutil::platform().cek.clone());
        let ctx = legacy_context();

        let mut validator = ReportValidator::new(legacy_report(&ctx));
        validator.verify_signer(SignerTrust::PreTrusted(&cek));
        assert!(matches!(
            validator.verify_signature(),
            ReportState::Rejected(RejectReason::BadSignature(ChainError::BadSignature { .. }))
        ));
    }

    #[test]
    fn stages_cannot_be_skipped() {
        let ctx = legacy_context();
        let mut validator = ReportValidator::new(legacy_report(&ctx));

        assert_eq!(validator.verify_signature(), &ReportState::Parsed);
        assert_eq!(
            validator.verify_measurement(&ExpectedMeasurement::Launch(ctx)),
            &ReportState::Parsed
        );
        assert_eq!(validator.accept(&AcceptancePolicy::default()), &ReportState::Parsed);
        assert!(validator.verdict().is_none());
    }

    #[test]
    fn broken_chain_rejects_before_signature() {
        let platform = testutil::platform();
        let path = platform.chain.pek_path();
        let root = TrustAnchor::Fingerprint([0; 32]);
        let ctx = legacy_context();

        let mut validator = ReportValidator::new(legacy_report(&ctx));
        validator.verify_signer(SignerTrust::Chain { chain: &path, pinned_root: &root });
        assert_eq!(validator.state(), &ReportState::Rejected(RejectReason::Chain(ChainError::UntrustedRoot)));

        // Terminal states do not move.
        assert_eq!(
            validator.verify_signature(),
            &ReportState::Rejected(RejectReason::Chain(ChainError::UntrustedRoot))
        );
    }

    #[test]
    fn legacy_debug_policy_is_refused() {
        let pek = Certificate::Sev(testutil::platform().pek.clone());
        let mut ctx = legacy_context();
        ctx.policy = 0;
        let report = legacy_report(&ctx);

        let strict = AcceptancePolicy::default();
        assert_eq!(
            ReportValidator::new(report).validate(
                SignerTrust::PreTrusted(&pek),
                &ExpectedMeasurement::Launch(ctx.clone()),
                &strict,
            ),
            Err(RejectReason::Policy(PolicyViolation::DebugAllowed))
        );

        let lenient = AcceptancePolicy {
            allow_debug: true,
            minimum_firmware: Some(FirmwareVersion { major: 1, minor: 0, build: 0 }),
            ..Default::default()
        };
        assert!(matches!(
            ReportValidator::new(report).validate(
                SignerTrust::PreTrusted(&pek),
                &ExpectedMeasurement::Launch(ctx),
                &lenient,
            ),
            Err(RejectReason::Policy(PolicyViolation::FirmwareBelowMinimum { .. }))
        ));
    }

    #[test]
    fn guest_report_accepted_through_vcek_chain() {
        let snp = testutil::snp_platform();
        let chain = snp.chain.certificates();
        let root = TrustAnchor::Certificate(snp.ark.clone().into());
        let report = testutil::guest_report(testutil::snp_tcb(), testutil::CHIP_ID);

        let policy = AcceptancePolicy {
            minimum_tcb: Some(testutil::snp_tcb()),
            maximum_vmpl: Some(0),
            ..Default::default()
        };
        let verified = ReportValidator::new(report.clone())
            .validate(
                SignerTrust::Chain { chain: &chain, pinned_root: &root },
                &ExpectedMeasurement::Digest(report.measurement.to_vec()),
                &policy,
            )
            .unwrap();
        assert_eq!(verified.kind, ReportKind::GuestReport);
        assert_eq!(verified.tcb, Some(testutil::snp_tcb()));
        assert_eq!(verified.report_data, report.report_data.to_vec());
    }

    #[test]
    fn guest_report_must_match_vcek() {
        let snp = testutil::snp_platform();
        let vcek = Certificate::X509(snp.vcek.clone());
        let expected = |r: &GuestReport| ExpectedMeasurement::Digest(r.measurement.to_vec());

        let other_chip = testutil::guest_report(testutil::snp_tcb(), [0xee; 64]);
        assert_eq!(
            ReportValidator::new(other_chip.clone()).validate(
                SignerTrust::PreTrusted(&vcek),
                &expected(&other_chip),
                &AcceptancePolicy::default(),
            ),
            Err(RejectReason::Policy(PolicyViolation::ChipIdMismatch))
        );

        let older = TcbVersion { snp: 1, ..testutil::snp_tcb() };
        let other_tcb = testutil::guest_report(older, testutil::CHIP_ID);
        assert_eq!(
            ReportValidator::new(other_tcb.clone()).validate(
                SignerTrust::PreTrusted(&vcek),
                &expected(&other_tcb),
                &AcceptancePolicy::default(),
            ),
            Err(RejectReason::Policy(PolicyViolation::SignerTcbMismatch))
        );
    }

    #[test]
    fn guest_report_policy_limits() {
        let snp = testutil::snp_platform();
        let vcek = Certificate::X509(snp.vcek.clone());
        let report = testutil::guest_report(testutil::snp_tcb(), testutil::CHIP_ID);
        let expected = ExpectedMeasurement::Digest(report.measurement.to_vec());
        let run = |policy: AcceptancePolicy| {
            ReportValidator::new(report.clone()).validate(SignerTrust::PreTrusted(&vcek), &expected, &policy)
        };

        let higher = TcbVersion { microcode: 0xff, ..testutil::snp_tcb() };
        assert!(matches!(
            run(AcceptancePolicy { minimum_tcb: Some(higher), ..Default::default() }),
            Err(RejectReason::Policy(PolicyViolation::TcbBelowMinimum { .. }))
        ));
        assert_eq!(
            run(AcceptancePolicy { expected_policy: Some(0x30000), ..Default::default() }),
            Err(RejectReason::Policy(PolicyViolation::PolicyMismatch {
                expected: 0x30000,
                actual: report.policy.get(),
            }))
        );
        assert!(matches!(
            run(AcceptancePolicy {
                minimum_firmware: Some(FirmwareVersion { major: 9, minor: 0, build: 0 }),
                ..Default::default()
            }),
            Err(RejectReason::Policy(PolicyViolation::FirmwareBelowMinimum { .. }))
        ));
    }
}
