use std::path::Path;

use crate::structure::{io_error, Container, Node, StructureError};

/// How child names are rendered in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// JSON array of strings, e.g. `["DE","FR"]`.
    Strings,
    /// JSON array of integers, e.g. `[0,5,13]`; every child name must parse.
    Integers,
}

/// Writes an index file listing the wrapped container's children once they
/// have been materialized.
pub struct IndexingDecorator<C> {
    inner: C,
    index_name: String,
    format: IndexFormat,
}

impl<C: Container> IndexingDecorator<C> {
    pub fn new(inner: C, index_name: impl Into<String>, format: IndexFormat) -> Self {
        Self {
            inner,
            index_name: index_name.into(),
            format,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Serialized index over the current children.
    pub fn render(&self) -> Result<Vec<u8>, StructureError> {
        let names: Vec<&str> = self.inner.children().iter().map(Node::name).collect();
        if names.contains(&self.index_name.as_str()) {
            return Err(StructureError::DuplicateChild {
                parent: self.inner.name().to_string(),
                name: self.index_name.clone(),
            });
        }

        let bytes = match self.format {
            IndexFormat::Strings => serde_json::to_vec(&names)?,
            IndexFormat::Integers => {
                let values = names
                    .iter()
                    .map(|name| {
                        name.parse::<u64>()
                            .map_err(|_| StructureError::InvalidIndexEntry {
                                name: name.to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_vec(&values)?
            }
        };
        Ok(bytes)
    }
}

impl<C: Container> Container for IndexingDecorator<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn children(&self) -> &[Node] {
        self.inner.children()
    }

    fn finish(&self, dir: &Path) -> Result<(), StructureError> {
        let path = dir.join(&self.index_name);
        std::fs::write(&path, self.render()?).map_err(io_error(&path))?;
        self.inner.finish(dir)
    }
}
