//! Shared fixtures for distribution tree integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use common::assembly::{AssemblyConfig, TreeBuilder};
use common::bundler::{BundleSet, BundlingConfig, KeyBundler};
use common::crypto::{Ed25519Signer, PublicKey, SecretKey, Signer};
use common::diagnosis_key::{interval_number, DiagnosisKey};
use common::export::{ExportCodec, ExportConfig};
use tempfile::TempDir;

pub const PADDING_SEED: &str = "5e1d2c3b4a69788796a5b4c3d2e1f00f";

/// Distribution date used across tests; yesterday is 2021-01-02.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 3).unwrap()
}

pub fn yesterday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 2).unwrap()
}

/// A key whose rolling start is `hour:00` UTC on `date`.
pub fn key(byte: u8, country: &str, date: NaiveDate, hour: u32) -> DiagnosisKey {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap());
    DiagnosisKey::new([byte; 16], interval_number(start), 144, 3, country).unwrap()
}

pub fn signer() -> (Arc<dyn Signer>, PublicKey) {
    let secret = SecretKey::from([7u8; 32]);
    let public = secret.public();
    (Arc::new(Ed25519Signer::new(secret, "262", "v1")), public)
}

pub fn codec(config: ExportConfig) -> Arc<ExportCodec> {
    Arc::new(ExportCodec::new(config).unwrap())
}

pub fn bundle(config: BundlingConfig, keys: Vec<DiagnosisKey>) -> BundleSet {
    KeyBundler::new(config, today()).unwrap().bundle(keys).unwrap()
}

/// Bundle, build and materialize into a fresh temp dir.
pub async fn build_tree(
    bundling: BundlingConfig,
    export: ExportConfig,
    keys: Vec<DiagnosisKey>,
    app_config: Option<Vec<u8>>,
) -> (TempDir, PathBuf) {
    let (signer, _) = signer();
    let builder =
        TreeBuilder::new(AssemblyConfig::default(), codec(export), signer, today()).unwrap();
    let root = builder
        .build(bundle(bundling, keys), app_config)
        .await
        .unwrap();

    let temp = TempDir::new().unwrap();
    let path = builder.materialize(root, temp.path()).await.unwrap();
    (temp, path)
}

/// Every file below `root`, as (relative path, bytes), sorted by path.
pub fn files(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut out: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

pub fn read_index(path: &Path) -> Vec<serde_json::Value> {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}
