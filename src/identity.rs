use tracing::info;

use crate::chain::{import_signed_cert, PlatformChain};
use crate::error::ChainError;
use crate::types::cert::{AmdCertificate, SevCertificate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The firmware generated its own OCA.
    SelfOwned,
    /// The PEK was signed by an owner's OCA.
    ExternallyOwned,
}

/// The certificates a platform currently presents.
///
/// There is no global copy of this state: callers own it and pass it by
/// `&mut` to the operations that change it. Concurrent imports must be
/// serialized by the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentity {
    pek: SevCertificate,
    pdh: SevCertificate,
    oca: SevCertificate,
    cek: SevCertificate,
    ownership: Ownership,
}

impl PlatformIdentity {
    pub fn new(pek: SevCertificate, pdh: SevCertificate, oca: SevCertificate, cek: SevCertificate) -> Self {
        PlatformIdentity { pek, pdh, oca, cek, ownership: Ownership::SelfOwned }
    }

    pub fn pek(&self) -> &SevCertificate {
        &self.pek
    }

    pub fn pdh(&self) -> &SevCertificate {
        &self.pdh
    }

    pub fn oca(&self) -> &SevCertificate {
        &self.oca
    }

    pub fn cek(&self) -> &SevCertificate {
        &self.cek
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// The current PEK stripped of its signatures, for an owner to sign.
    pub fn pek_csr(&self) -> SevCertificate {
        let mut csr = self.pek.clone();
        csr.clear_signatures();
        csr
    }

    /// Replace the PEK with one signed by an external OCA.
    ///
    /// The signed certificate must carry the platform's current PEK key.
    pub fn import_pek(&mut self, signed_pek: &SevCertificate, oca: &SevCertificate) -> Result<(), ChainError> {
        if !signed_pek.same_key(&self.pek) {
            return Err(ChainError::KeyMismatch);
        }
        let pek = import_signed_cert(signed_pek, oca)?;

        self.pek = pek;
        self.oca = oca.clone();
        self.ownership = Ownership::ExternallyOwned;
        info!("platform is now externally owned");
        Ok(())
    }

    /// Assemble the exportable chain with the vendor certificates.
    pub fn export_chain(&self, ask: AmdCertificate, ark: AmdCertificate) -> PlatformChain {
        PlatformChain {
            pdh: self.pdh.clone(),
            pek: self.pek.clone(),
            oca: self.oca.clone(),
            cek: self.cek.clone(),
            ask,
            ark,
        }
    }
}
