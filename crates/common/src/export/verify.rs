use std::io::{Cursor, Read};

use prost::Message;

use crate::crypto::{PublicKey, Signature, SignatureInfo};

use super::codec::{DecodedExport, ExportCodec, ExportConfig, ExportError};
use super::proto;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("archive could not be read: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive entry could not be read: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed signature list: {0}")]
    SignatureList(#[from] prost::DecodeError),
    #[error("export payload invalid: {0}")]
    Export(#[from] ExportError),
    #[error("archive carries no signature")]
    Unsigned,
    #[error("signature for key {key_id} does not verify")]
    BadSignature { key_id: String },
    #[error("signature batch {signed} does not match export batch {exported}")]
    BatchMismatch { signed: u32, exported: u32 },
}

/// Payload of a signed archive whose signature checked out.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    pub payload: Vec<u8>,
    pub signature_info: SignatureInfo,
    pub batch_num: u32,
    pub batch_size: u32,
}

/// A signed export archive whose signature checked out.
#[derive(Debug, Clone)]
pub struct VerifiedArchive {
    pub export: DecodedExport,
    pub signature_info: SignatureInfo,
}

/// Open a sealed archive and check its detached signature over the exact
/// payload bytes. The payload itself is not interpreted, so this covers the
/// app configuration archive as well as key exports.
pub fn verify_signature(
    archive: &[u8],
    config: &ExportConfig,
    public_key: &PublicKey,
) -> Result<SignedPayload, VerifyError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let payload = read_entry(&mut zip, &config.payload_entry)?;
    let signatures = read_entry(&mut zip, &config.signature_entry)?;

    let list = proto::TekSignatureList::decode(signatures.as_slice())?;
    let signature = list.signatures.into_iter().next().ok_or(VerifyError::Unsigned)?;

    let info: SignatureInfo = signature.signature_info.unwrap_or_default().into();
    let bad = || VerifyError::BadSignature {
        key_id: info.verification_key_id.clone(),
    };
    let bytes = signature.signature.ok_or(VerifyError::Unsigned)?;
    let parsed = Signature::from_slice(&bytes).map_err(|_| bad())?;
    public_key.verify(&payload, &parsed).map_err(|_| bad())?;

    Ok(SignedPayload {
        payload,
        signature_info: info,
        batch_num: signature.batch_num.unwrap_or(1).max(0) as u32,
        batch_size: signature.batch_size.unwrap_or(1).max(0) as u32,
    })
}

/// [`verify_signature`], then decode the payload as an export and check
/// that the signed batch matches the exported one.
pub fn verify_archive(
    archive: &[u8],
    codec: &ExportCodec,
    public_key: &PublicKey,
) -> Result<VerifiedArchive, VerifyError> {
    let signed = verify_signature(archive, codec.config(), public_key)?;
    let export = codec.decode(&signed.payload)?;
    if signed.batch_num != export.batch_num {
        return Err(VerifyError::BatchMismatch {
            signed: signed.batch_num,
            exported: export.batch_num,
        });
    }

    Ok(VerifiedArchive {
        export,
        signature_info: signed.signature_info,
    })
}

fn read_entry(
    zip: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, VerifyError> {
    let mut entry = zip.by_name(name)?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}
