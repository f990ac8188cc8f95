/**
 * Turning raw diagnosis keys into a signed, indexed distribution tree.
 *  - The key value and its time bucketing
 *  - Privacy-preserving bundling policy
 *  - Canonical export encoding and signing
 *  - A generic structure tree with decorators
 */
pub mod assembly;
/**
 * Partitions keys into per-package, per-date and
 *  per-hour buckets under a minimum size floor,
 *  topping buckets up with padding.
 */
pub mod bundler;
/**
 * Signing key material and the pluggable
 *  signer handed to signing decorators.
 */
pub mod crypto;
pub mod diagnosis_key;
/**
 * Binary export format: header + protobuf,
 *  plus archive verification.
 */
pub mod export;
/**
 * Files, directories and archives that write
 *  themselves to disk, plus indexing/signing
 *  decorators.
 */
pub mod structure;

pub mod prelude {
    pub use crate::assembly::{AssemblyConfig, AssemblyError, TreeBuilder};
    pub use crate::bundler::{BundleSet, BundlingConfig, KeyBundle, KeyBundler, PaddingPolicy};
    pub use crate::crypto::{Ed25519Signer, PublicKey, SecretKey, SignatureInfo, Signer};
    pub use crate::diagnosis_key::{DiagnosisKey, DiagnosisKeyRecord, ReportType};
    pub use crate::export::{ExportCodec, ExportConfig};
    pub use crate::structure::{Node, StructureError};
}
