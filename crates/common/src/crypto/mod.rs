//! Signing primitives for distribution archives.
//!
//! - **Key material**: Ed25519 keypairs persisted as PEM (`SecretKey`/`PublicKey`)
//! - **Signer**: the pluggable capability handed to the signing decorator
//!
//! Signers are passed explicitly through the tree builder. Each call is
//! independent given an immutable key, so archives may be signed in parallel.

mod keys;
mod signer;

pub use ed25519_dalek::Signature;
pub use keys::{CryptoError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use signer::{Ed25519Signer, SignatureInfo, Signer, SigningError, ED25519_ALGORITHM_OID};
