use serde::{Deserialize, Serialize};

use super::keys::SecretKey;

/// Object identifier of the Ed25519 signature algorithm.
pub const ED25519_ALGORITHM_OID: &str = "1.3.101.112";

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signer {key_id} failed: {reason}")]
    Failed { key_id: String, reason: String },
}

/// Identity of the key that produced a signature, as published to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub verification_key_id: String,
    pub verification_key_version: String,
    pub signature_algorithm: String,
}

/// Produces detached signatures for archive payloads.
///
/// Implementations must be deterministic about *which* key they use; the
/// same instance is shared read-only across worker threads.
pub trait Signer: Send + Sync {
    fn signature_info(&self) -> &SignatureInfo;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// Ed25519 signer backed by an in-memory secret key.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    key: SecretKey,
    info: SignatureInfo,
}

impl Ed25519Signer {
    pub fn new(key: SecretKey, key_id: impl Into<String>, key_version: impl Into<String>) -> Self {
        Self {
            key,
            info: SignatureInfo {
                verification_key_id: key_id.into(),
                verification_key_version: key_version.into(),
                signature_algorithm: ED25519_ALGORITHM_OID.to_string(),
            },
        }
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }
}

impl Signer for Ed25519Signer {
    fn signature_info(&self) -> &SignatureInfo {
        &self.info
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_signature_verifies_with_public_key() {
        let key = SecretKey::generate().unwrap();
        let public = key.public();
        let signer = Ed25519Signer::new(key, "262", "v1");

        let signature = signer.sign(b"payload").unwrap();
        let signature = ed25519_dalek::Signature::from_slice(&signature).unwrap();

        assert!(public.verify(b"payload", &signature).is_ok());
        assert_eq!(signer.signature_info().signature_algorithm, ED25519_ALGORITHM_OID);
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = Ed25519Signer::new(SecretKey::from([9u8; 32]), "262", "v1");
        assert_eq!(signer.sign(b"abc").unwrap(), signer.sign(b"abc").unwrap());
    }
}
