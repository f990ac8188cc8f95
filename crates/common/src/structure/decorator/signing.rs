use std::sync::Arc;

use crate::crypto::Signer;
use crate::export::ExportCodec;
use crate::structure::{Archive, ArchiveEntry, StructureError};

/// Signs the payload entry of the wrapped archive and appends the detached
/// signature entry before the archive is sealed.
pub struct SigningDecorator<A> {
    inner: A,
    signer: Arc<dyn Signer>,
    codec: Arc<ExportCodec>,
    batch_num: u32,
    batch_size: u32,
}

impl<A: Archive> SigningDecorator<A> {
    pub fn new(inner: A, signer: Arc<dyn Signer>, codec: Arc<ExportCodec>) -> Self {
        Self {
            inner,
            signer,
            codec,
            batch_num: 1,
            batch_size: 1,
        }
    }

    /// Position of the wrapped export within a split bundle.
    pub fn with_batch(mut self, batch_num: u32, batch_size: u32) -> Self {
        self.batch_num = batch_num;
        self.batch_size = batch_size;
        self
    }
}

impl<A: Archive> Archive for SigningDecorator<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn entries(&self) -> Result<Vec<ArchiveEntry>, StructureError> {
        let config = self.codec.config();
        let mut entries = self.inner.entries()?;

        let payload = entries
            .iter()
            .find(|e| e.name == config.payload_entry)
            .ok_or_else(|| StructureError::MissingEntry {
                archive: self.name().to_string(),
                entry: config.payload_entry.clone(),
            })?;

        let signature = self.signer.sign(&payload.bytes)?;
        let list = self.codec.signature_list(
            self.signer.signature_info(),
            self.batch_num,
            self.batch_size,
            signature,
        );
        entries.push(ArchiveEntry::new(config.signature_entry.clone(), list));

        tracing::trace!(archive = self.name(), "signed archive payload");
        Ok(entries)
    }
}
