use std::path::PathBuf;

use clap::Args;
use common::crypto::{CryptoError, SecretKey};

pub const PRIVATE_KEY_FILE: &str = "private.pem";
pub const PUBLIC_KEY_FILE: &str = "public.pem";

/// Generate an Ed25519 signing key pair as PEM files.
#[derive(Args, Debug, Clone)]
pub struct Keygen {
    /// Directory receiving private.pem and public.pem
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error("{0:?} already exists, pass --force to overwrite")]
    Exists(PathBuf),
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Keygen {
    type Error = KeygenError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let private_path = self.out_dir.join(PRIVATE_KEY_FILE);
        let public_path = self.out_dir.join(PUBLIC_KEY_FILE);
        if !self.force {
            for path in [&private_path, &public_path] {
                if path.exists() {
                    return Err(KeygenError::Exists(path.clone()));
                }
            }
        }

        let key = SecretKey::generate()?;
        let write = |path: &PathBuf, contents: String| {
            std::fs::write(path, contents).map_err(|source| KeygenError::Io {
                path: path.clone(),
                source,
            })
        };
        std::fs::create_dir_all(&self.out_dir).map_err(|source| KeygenError::Io {
            path: self.out_dir.clone(),
            source,
        })?;
        write(&private_path, key.to_pem())?;
        write(&public_path, key.public().to_pem())?;

        Ok(format!(
            "wrote {} and {}\npublic key: {}",
            private_path.display(),
            public_path.display(),
            key.public().to_hex()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};

    fn keygen(out_dir: &std::path::Path, force: bool) -> Keygen {
        Keygen {
            out_dir: out_dir.to_path_buf(),
            force,
        }
    }

    #[tokio::test]
    async fn test_keygen_writes_matching_pair() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(dir.path().join("unused.toml"));
        keygen(dir.path(), false).execute(&ctx).await.unwrap();

        let private = std::fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        let public = std::fs::read_to_string(dir.path().join(PUBLIC_KEY_FILE)).unwrap();
        let secret = SecretKey::from_pem(&private).unwrap();
        assert_eq!(secret.public().to_pem(), public);
    }

    #[tokio::test]
    async fn test_keygen_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(dir.path().join("unused.toml"));
        keygen(dir.path(), false).execute(&ctx).await.unwrap();
        let first = std::fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap();

        let err = keygen(dir.path(), false).execute(&ctx).await.unwrap_err();
        assert!(matches!(err, KeygenError::Exists(_)));

        keygen(dir.path(), true).execute(&ctx).await.unwrap();
        let second = std::fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        assert_ne!(first, second);
    }
}
