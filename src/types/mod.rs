pub mod cert;
pub mod launch;
pub mod measurement;
pub mod report;
pub mod secret;

use serde::{Deserialize, Serialize};

use self::report::{FirmwareVersion, TcbVersion};

/// Report format a verdict was reached on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    /// Legacy SEV `ATTESTATION` report signed by the PEK.
    Legacy,
    /// SEV-SNP guest report signed by the VCEK.
    GuestReport,
}

/// Summary of an accepted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedReport {
    pub kind: ReportKind,
    #[serde(with = "hex")]
    pub measurement: Vec<u8>,
    pub policy: u64,
    pub tcb: Option<TcbVersion>,
    pub firmware: Option<FirmwareVersion>,
    #[serde(with = "hex")]
    pub report_data: Vec<u8>,
}
