//! Canonical binary export of key bundles.
//!
//! An export file is a fixed-width text header followed by a protobuf
//! `TemporaryExposureKeyExport`. Keys are sorted by raw key bytes before
//! encoding, which makes the output a pure function of the bundle; signatures
//! therefore stay stable across rebuilds.

mod codec;
pub mod proto;
mod verify;

pub use codec::{DecodedExport, ExportBatch, ExportCodec, ExportConfig, ExportError, ExportedKey};
pub use verify::{verify_archive, verify_signature, SignedPayload, VerifiedArchive, VerifyError};
