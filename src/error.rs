use thiserror::Error;

use crate::types::cert::Algorithm;

/// Malformed or truncated binary input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("buffer truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unknown record version {0:#x}")]
    UnknownVersion(u32),

    #[error("unsupported algorithm id {0:#x}")]
    UnsupportedAlgorithm(u32),

    #[error("unknown key usage {0:#x}")]
    UnknownUsage(u32),

    #[error("unsupported elliptic curve id {0:#x}")]
    UnsupportedCurve(u32),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("malformed DER: {0}")]
    Der(String),
}

/// A broken or untrusted link in a certificate chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("certificate chain is empty")]
    Empty,

    #[error("root certificate does not match the pinned trust anchor")]
    UntrustedRoot,

    #[error("certificate chain is expired")]
    Expired,

    #[error("no signature uses the issuer's declared algorithm {expected:?}")]
    AlgorithmMismatch { expected: Algorithm },

    #[error("signature by {signer} does not verify")]
    BadSignature { signer: String },

    #[error("certificate carries no signature")]
    Unsigned,

    #[error("issuer key cannot be used: {0}")]
    InvalidKey(String),

    #[error("certifying id does not match the issuer key id")]
    IssuerMismatch,

    #[error("signed certificate does not carry the platform's current key")]
    KeyMismatch,

    #[error("link {index} failed: {source}")]
    LinkFailed {
        index: usize,
        #[source]
        source: Box<ChainError>,
    },
}

/// The recomputed measurement does not match. Carries no detail on purpose.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementError {
    #[error("launch measurement mismatch")]
    Mismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret package failed authentication")]
    AuthenticationFailed,

    #[error("payload length {0} is not a multiple of the cipher block size")]
    Unaligned(usize),

    #[error("unsupported secret header flags {0:#x}")]
    UnsupportedFlags(u32),

    #[error("secret table exceeds the maximum transport length")]
    TooLarge,

    #[error(transparent)]
    Format(#[from] FormatError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("launch nonce must not be zero")]
    ZeroNonce,

    #[error("launch nonce was already used")]
    NonceReused,

    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("launch blob failed authentication")]
    AuthenticationFailed,
}

/// Report or platform fields outside of what the owner accepts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("guest policy allows debugging")]
    DebugAllowed,

    #[error("reported TCB {reported} is below the minimum {minimum}")]
    TcbBelowMinimum { reported: String, minimum: String },

    #[error("firmware {reported} is below the minimum {minimum}")]
    FirmwareBelowMinimum { reported: String, minimum: String },

    #[error("guest policy {actual:#x} does not match the expected {expected:#x}")]
    PolicyMismatch { expected: u64, actual: u64 },

    #[error("report VMPL {actual} exceeds the maximum {maximum}")]
    VmplTooHigh { actual: u32, maximum: u32 },

    #[error("report chip id does not match the signing certificate")]
    ChipIdMismatch,

    #[error("reported TCB does not match the signing certificate")]
    SignerTcbMismatch,
}

/// Why a report ended in the `Rejected` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("signer chain rejected: {0}")]
    Chain(ChainError),

    #[error("report signature rejected: {0}")]
    BadSignature(ChainError),

    #[error("report measurement does not match the expected value")]
    MeasurementMismatch,

    #[error("report violates the acceptance policy: {0}")]
    Policy(PolicyViolation),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pinned root fingerprint: {0}")]
    Fingerprint(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Rejected(#[from] RejectReason),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Legacy numeric status codes used at the process boundary.
///
/// `0` is success, `0xFFFF` means "not supported / malformed" and the rest
/// follow the SEV firmware status numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Success = 0x00,
    InvalidConfig = 0x03,
    InvalidLength = 0x04,
    InvalidCertificate = 0x06,
    PolicyFailure = 0x07,
    BadSignature = 0x0A,
    BadMeasurement = 0x0B,
    Unsupported = 0xFFFF,
}

impl Status {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<&ChainError> for Status {
    fn from(err: &ChainError) -> Self {
        match err {
            ChainError::Format(_) => Status::Unsupported,
            ChainError::BadSignature { .. } => Status::BadSignature,
            ChainError::LinkFailed { source, .. } => Status::from(source.as_ref()),
            _ => Status::InvalidCertificate,
        }
    }
}

impl Error {
    /// Numeric status for callers that still speak the legacy convention.
    pub fn status(&self) -> Status {
        match self {
            Error::Format(_) => Status::Unsupported,
            Error::Chain(e) => Status::from(e),
            Error::Measurement(_) => Status::BadMeasurement,
            Error::Secret(SecretError::AuthenticationFailed) => Status::BadSignature,
            Error::Secret(SecretError::Format(_)) => Status::Unsupported,
            Error::Secret(_) => Status::InvalidLength,
            Error::Launch(LaunchError::AuthenticationFailed) => Status::BadSignature,
            Error::Launch(_) => Status::InvalidConfig,
            Error::Rejected(RejectReason::Chain(e)) => Status::from(e),
            Error::Rejected(RejectReason::BadSignature(_)) => Status::BadSignature,
            Error::Rejected(RejectReason::MeasurementMismatch) => Status::BadMeasurement,
            Error::Rejected(RejectReason::Policy(_)) => Status::PolicyFailure,
            Error::Config(_) => Status::InvalidConfig,
        }
    }
}

/// Collapse a result into the legacy numeric status.
pub fn status_of<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => Status::Success.code(),
        Err(e) => e.status().code(),
    }
}
