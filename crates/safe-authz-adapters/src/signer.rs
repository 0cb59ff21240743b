use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use safe_authz_core::{PortError, Signature, SignerPort};

/// Device key held in memory.
#[derive(Debug, Clone)]
pub struct LocalSignerAdapter {
    signer: PrivateKeySigner,
}

impl LocalSignerAdapter {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn from_hex(private_key: &str) -> Result<Self, PortError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid private key: {e}")))?;
        Ok(Self::new(signer))
    }

    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }
}

impl SignerPort for LocalSignerAdapter {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign(&self, digest: &B256) -> Result<Signature, PortError> {
        let signature = self
            .signer
            .sign_hash_sync(digest)
            .map_err(|e| PortError::Transport(format!("local signing failed: {e}")))?;
        Ok(Signature::from_primitive(&signature))
    }
}
