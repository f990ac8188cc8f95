use std::path::PathBuf;

use clap::Args;
use common::crypto::{CryptoError, PublicKey};
use common::export::{verify_archive, verify_signature, ExportCodec, ExportError};
use tekdist::ConfigError;

/// Check the signature of every archive in a local tree: key exports and
/// the app configuration.
#[derive(Args, Debug, Clone)]
pub struct Verify {
    /// PEM public key matching the signing key
    #[arg(long)]
    pub public_key: PathBuf,

    /// Tree root (defaults to output_dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyOpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("failed to walk tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{failed} of {total} archives failed verification:\n{details}")]
    Failed {
        failed: usize,
        total: usize,
        details: String,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Verify {
    type Error = VerifyOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.load_config()?;
        let read = |path: &PathBuf| {
            std::fs::read(path).map_err(|source| VerifyOpError::Io {
                path: path.clone(),
                source,
            })
        };

        let pem = String::from_utf8_lossy(&read(&self.public_key)?).into_owned();
        let public_key = PublicKey::from_pem(&pem)?;
        let codec = ExportCodec::new(config.export.clone())?;

        let root = self.dir.clone().unwrap_or_else(|| config.output_dir.clone());
        let paths = &config.assembly.paths;
        let keys_dir = root.join(paths.country_prefix());
        let config_dir = root.join(paths.configuration_prefix());

        let mut total = 0;
        let mut failures = Vec::new();
        for dir in [&keys_dir, &config_dir] {
            // a tree without app configuration has no configuration directory
            if dir == &config_dir && !dir.exists() {
                continue;
            }
            for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() || entry.file_name() == paths.index.as_str() {
                    continue;
                }
                total += 1;
                let bytes = read(&entry.path().to_path_buf())?;
                let result = if dir == &keys_dir {
                    verify_archive(&bytes, &codec, &public_key).map(|_| ())
                } else {
                    verify_signature(&bytes, codec.config(), &public_key).map(|_| ())
                };
                if let Err(e) = result {
                    failures.push(format!("  {}: {e}", entry.path().display()));
                }
            }
        }

        if failures.is_empty() {
            Ok(format!("verified {total} archives below {}", root.display()))
        } else {
            Err(VerifyOpError::Failed {
                failed: failures.len(),
                total,
                details: failures.join("\n"),
            })
        }
    }
}
