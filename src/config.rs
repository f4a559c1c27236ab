use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::report::ExpectedMeasurement;
use crate::trust_store::{TrustAnchor, TrustStore};
use crate::types::report::{FirmwareVersion, TcbVersion};
use crate::utils::hex_array;

/// What a guest owner accepts in a report once its signature and measurement check out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptancePolicy {
    /// Accept guests whose policy permits debugging.
    pub allow_debug: bool,
    /// Every TCB component must be at least this (SNP only).
    pub minimum_tcb: Option<TcbVersion>,
    /// Lowest firmware accepted. Legacy reports only carry major and minor.
    pub minimum_firmware: Option<FirmwareVersion>,
    /// The guest policy must be exactly this.
    pub expected_policy: Option<u64>,
    /// Highest VMPL a report may come from (SNP only).
    pub maximum_vmpl: Option<u32>,
}

/// Owner configuration loaded from JSON.
///
/// ```json
/// {
///   "pinned_roots": ["<sha256 of the ARK SubjectPublicKeyInfo>"],
///   "expected_measurement": "<hex>",
///   "policy": { "allow_debug": false, "maximum_vmpl": 0 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub pinned_roots: Vec<String>,
    #[serde(with = "hex", default)]
    pub expected_measurement: Vec<u8>,
    #[serde(default)]
    pub policy: AcceptancePolicy,
}

impl ValidationConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// A trust store pinning every configured root.
    pub fn trust_store(&self, current_time: Option<SystemTime>) -> Result<TrustStore, ConfigError> {
        let anchors = self
            .pinned_roots
            .iter()
            .map(|root| {
                hex_array::<32>("pinned root", root)
                    .map(TrustAnchor::Fingerprint)
                    .map_err(|e| ConfigError::Fingerprint(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TrustStore::new(current_time, anchors))
    }

    pub fn expected_measurement(&self) -> Option<ExpectedMeasurement> {
        if self.expected_measurement.is_empty() {
            None
        } else {
            Some(ExpectedMeasurement::Digest(self.expected_measurement.clone()))
        }
    }
}
