use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";
const PUBLIC_KEY_TAG: &str = "PUBLIC KEY";

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to parse PEM: {0}")]
    Pem(#[from] pem::PemError),
    #[error("invalid PEM tag, expected {expected}, got {actual}")]
    Tag {
        expected: &'static str,
        actual: String,
    },
    #[error("invalid key size, expected {expected}, got {actual}")]
    Size { expected: usize, actual: usize },
    #[error("invalid public key: {0}")]
    InvalidPublicKey(#[from] ed25519_dalek::SignatureError),
    #[error("failed to generate random bytes: {0}")]
    Random(String),
}

/// Verification half of a signing keypair.
///
/// Clients are provisioned with this key out of band and use it to check
/// every downloaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::Size {
            expected: PUBLIC_KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(VerifyingKey::from_bytes(&bytes)?))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Encode public key in PEM format with tag "PUBLIC KEY".
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PUBLIC_KEY_TAG, self.to_bytes()))
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let contents = parse_pem(pem_str, PUBLIC_KEY_TAG, PUBLIC_KEY_SIZE)?;
        Self::from_bytes(&contents)
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }
}

/// Signing half of a keypair.
///
/// # Examples
///
/// ```ignore
/// let secret_key = SecretKey::generate()?;
/// std::fs::write("signing.pem", secret_key.to_pem())?;
///
/// let pem = std::fs::read_to_string("signing.pem")?;
/// let recovered = SecretKey::from_pem(&pem)?;
/// ```
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public().to_hex()).finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&secret))
    }
}

impl SecretKey {
    /// Generate a new random secret key using the OS RNG
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Random(e.to_string()))?;
        Ok(Self::from(bytes))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Encode secret key in PEM format with tag "PRIVATE KEY".
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PRIVATE_KEY_TAG, self.to_bytes()))
    }

    /// Parse a secret key from PEM format
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The PEM string is malformed
    /// - The PEM tag is not "PRIVATE KEY"
    /// - The key size is incorrect
    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let contents = parse_pem(pem_str, PRIVATE_KEY_TAG, PRIVATE_KEY_SIZE)?;
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        bytes.copy_from_slice(&contents);
        Ok(Self::from(bytes))
    }

    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

fn parse_pem(pem_str: &str, tag: &'static str, size: usize) -> Result<Vec<u8>, CryptoError> {
    let pem = pem::parse(pem_str)?;
    if pem.tag() != tag {
        return Err(CryptoError::Tag {
            expected: tag,
            actual: pem.tag().to_string(),
        });
    }
    let contents = pem.into_contents();
    if contents.len() != size {
        return Err(CryptoError::Size {
            expected: size,
            actual: contents.len(),
        });
    }
    Ok(contents)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pem_serialization() {
        let private_key = SecretKey::generate().unwrap();

        let pem = private_key.to_pem();
        let recovered_private = SecretKey::from_pem(&pem).unwrap();
        assert_eq!(private_key.to_bytes(), recovered_private.to_bytes());

        let public_pem = private_key.public().to_pem();
        let recovered_public = PublicKey::from_pem(&public_pem).unwrap();
        assert_eq!(recovered_public, private_key.public());
    }

    #[test]
    fn test_pem_tag_mismatch() {
        let private_key = SecretKey::generate().unwrap();
        let result = PublicKey::from_pem(&private_key.to_pem());
        assert!(matches!(result, Err(CryptoError::Tag { .. })));
    }

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::generate().unwrap();
        let public_key = secret_key.public();
        let message = b"hello, world!";

        let signature = secret_key.sign(message);
        assert!(public_key.verify(message, &signature).is_ok());

        // Verify fails with wrong message
        assert!(public_key.verify(b"hello, world?", &signature).is_err());

        // Verify fails with wrong key
        let other_key = SecretKey::generate().unwrap().public();
        assert!(other_key.verify(message, &signature).is_err());
    }
}
