//! Discovery of the locally materialized tree.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::error::{Result, StoreError};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Hex MD5 of `bytes`, comparable with S3 single-part ETags.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// A file of the local tree, addressed by its remote key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub key: String,
    pub path: PathBuf,
    pub content_hash: String,
    /// Number of directories between the tree root and the file.
    pub depth: usize,
    pub is_index: bool,
    pub content_type: &'static str,
}

impl LocalFile {
    /// Key prefix of the directory holding this file, with trailing `/`.
    pub fn directory_prefix(&self) -> &str {
        match self.key.rfind('/') {
            Some(i) => &self.key[..=i],
            None => "",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalTree {
    root: PathBuf,
    files: Vec<LocalFile>,
}

impl LocalTree {
    /// Walk `root`, hashing every file. Keys are `prefix` joined with the
    /// path relative to `root`; files named `index_name` are index files.
    pub fn scan(root: &Path, prefix: &str, index_name: &str) -> Result<Self> {
        let prefix = prefix.trim_matches('/');
        let mut files = Vec::new();

        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let relative_key = segments.join("/");
            let key = if prefix.is_empty() {
                relative_key
            } else {
                format!("{prefix}/{relative_key}")
            };

            let bytes = std::fs::read(entry.path()).map_err(StoreError::io(entry.path()))?;
            let is_index = entry.file_name() == index_name;
            let content_type = if is_index {
                "application/json"
            } else if bytes.starts_with(ZIP_MAGIC) {
                "application/zip"
            } else {
                "application/octet-stream"
            };

            files.push(LocalFile {
                key,
                path: entry.path().to_path_buf(),
                content_hash: content_hash(&bytes),
                depth: segments.len().saturating_sub(1),
                is_index,
                content_type,
            });
        }

        tracing::debug!(root = %root.display(), files = files.len(), "scanned local tree");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[LocalFile] {
        &self.files
    }
}
