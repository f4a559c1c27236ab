use std::time::SystemTime;

use tracing::debug;

use crate::chain::verify_chain;
use crate::error::ChainError;
use crate::types::cert::{Certificate, SubjectKey};

/// A pinned root of trust: either a full certificate or the SHA-256
/// fingerprint of its DER SubjectPublicKeyInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustAnchor {
    Certificate(Certificate),
    Fingerprint([u8; 32]),
}

impl TrustAnchor {
    pub fn fingerprint(&self) -> Result<[u8; 32], ChainError> {
        match self {
            TrustAnchor::Certificate(cert) => cert.key_fingerprint(),
            TrustAnchor::Fingerprint(fingerprint) => Ok(*fingerprint),
        }
    }

    /// Whether `cert` carries the pinned key.
    pub fn matches(&self, cert: &Certificate) -> Result<bool, ChainError> {
        Ok(self.fingerprint()? == cert.key_fingerprint()?)
    }
}

/// A verified certificate and its parsed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedIdentity {
    pub cert: Certificate,
    pub key: SubjectKey,
}

/// TrustStore holds the roots an owner accepts, such as the ARKs of several
/// processor generations, and resolves chains against them.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    /// Accepted roots.
    pub anchors: Vec<TrustAnchor>,
    /// When set, X.509 members of a chain must be valid at this time.
    pub current_time: Option<SystemTime>,
}

impl TrustStore {
    /// Creates a new trust store with the given anchors
    ///
    /// # Parameters
    /// * `current_time` - Time reference for validity checks, `None` to skip them
    /// * `anchors` - Initial set of trusted roots
    pub fn new(current_time: Option<SystemTime>, anchors: Vec<TrustAnchor>) -> Self {
        Self { anchors, current_time }
    }

    pub fn push(&mut self, anchor: TrustAnchor) {
        self.anchors.push(anchor);
    }

    /// Verify the leaf of a root-first chain is rooted in the trust store.
    ///
    /// # Parameters
    /// * `chain` - The certificate chain to verify, root first.
    pub fn verify_chain_leaf(&self, chain: &[Certificate]) -> Result<TrustedIdentity, ChainError> {
        // If the chain is empty, it is not valid
        let (root, leaf) = match (chain.first(), chain.last()) {
            (Some(root), Some(leaf)) => (root, leaf),
            _ => return Err(ChainError::Empty),
        };

        // If any certificate is expired, the chain is not valid
        if let Some(now) = self.current_time {
            if chain
                .iter()
                .filter_map(Certificate::as_x509)
                .any(|cert| !cert.valid_at(now))
            {
                return Err(ChainError::Expired);
            }
        }

        let anchor = self.find_anchor(root)?;
        verify_chain(chain, anchor)?;

        debug!(leaf = %leaf.label(), "chain leaf is trusted");
        Ok(TrustedIdentity {
            cert: leaf.clone(),
            key: leaf.subject_key()?,
        })
    }

    /// Find the anchor pinning the key of `root`
    fn find_anchor(&self, root: &Certificate) -> Result<&TrustAnchor, ChainError> {
        for anchor in &self.anchors {
            if anchor.matches(root)? {
                return Ok(anchor);
            }
        }
        Err(ChainError::UntrustedRoot)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil;

    #[test]
    fn resolves_leaf_from_any_matching_anchor() {
        let platform = testutil::platform();
        let ark: Certificate = platform.ark.clone().into();
        let store = TrustStore::new(
            None,
            vec![
                TrustAnchor::Fingerprint([0x11; 32]),
                TrustAnchor::Fingerprint(ark.key_fingerprint().unwrap()),
            ],
        );

        let path = platform.chain.vendor_path();
        let leaf = store.verify_chain_leaf(&path[..4]).unwrap();
        assert_eq!(leaf.cert, Certificate::Sev(platform.pek.clone()));
    }

    #[test]
    fn unknown_root_is_rejected() {
        let store = TrustStore::new(None, vec![TrustAnchor::Fingerprint([0; 32])]);
        let path = testutil::platform().chain.vendor_path();
        assert_eq!(store.verify_chain_leaf(&path), Err(ChainError::UntrustedRoot));
        assert_eq!(store.verify_chain_leaf(&[]), Err(ChainError::Empty));
    }

    #[test]
    fn expired_x509_members_are_rejected() {
        let snp = testutil::snp_platform();
        let anchor = TrustAnchor::Certificate(snp.ark.clone().into());
        let chain = snp.chain.certificates();

        let inside = SystemTime::UNIX_EPOCH + Duration::from_secs(testutil::NOT_BEFORE + 60);
        let store = TrustStore::new(Some(inside), vec![anchor.clone()]);
        assert!(store.verify_chain_leaf(&chain).is_ok());

        let after = SystemTime::UNIX_EPOCH + Duration::from_secs(testutil::NOT_AFTER + 60);
        let store = TrustStore::new(Some(after), vec![anchor]);
        assert_eq!(store.verify_chain_leaf(&chain), Err(ChainError::Expired));
    }
}
