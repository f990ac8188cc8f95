use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use super::{check_unique, io_error, Archive, StructureError};

/// A named blob inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// An archive holding a fixed set of in-memory entries.
#[derive(Debug, Clone)]
pub struct EntryArchive {
    name: String,
    entries: Vec<ArchiveEntry>,
}

impl EntryArchive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<(), StructureError> {
        let entry = ArchiveEntry::new(name, bytes);
        if self.entries.iter().any(|e| e.name == entry.name) {
            return Err(StructureError::DuplicateChild {
                parent: self.name.clone(),
                name: entry.name,
            });
        }
        self.entries.push(entry);
        Ok(())
    }
}

impl Archive for EntryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> Result<Vec<ArchiveEntry>, StructureError> {
        Ok(self.entries.clone())
    }
}

/// Seal entries into a zip container.
///
/// Entries are stored uncompressed with a fixed timestamp and permissions so
/// the container bytes depend on nothing but the entries.
pub fn seal(archive: &str, entries: &[ArchiveEntry]) -> Result<Vec<u8>, StructureError> {
    check_unique(archive, entries.iter().map(|e| e.name.as_str()))?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        writer.start_file(entry.name.as_str(), options)?;
        writer
            .write_all(&entry.bytes)
            .map_err(io_error(Path::new(archive)))?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_seal_is_deterministic() {
        let entries = vec![
            ArchiveEntry::new("export.bin", vec![1, 2, 3]),
            ArchiveEntry::new("export.sig", vec![4, 5]),
        ];
        let a = seal("export.zip", &entries).unwrap();
        let b = seal("export.zip", &entries).unwrap();
        assert_eq!(a, b);

        let mut zip = zip::ZipArchive::new(Cursor::new(a)).unwrap();
        let mut bytes = Vec::new();
        zip.by_name("export.sig").unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![4, 5]);
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut archive = EntryArchive::new("export.zip");
        archive.add("export.bin", vec![]).unwrap();
        assert!(archive.add("export.bin", vec![1]).is_err());

        let entries = vec![ArchiveEntry::new("a", vec![]), ArchiveEntry::new("a", vec![])];
        assert!(matches!(
            seal("x.zip", &entries),
            Err(StructureError::DuplicateChild { .. })
        ));
    }
}
