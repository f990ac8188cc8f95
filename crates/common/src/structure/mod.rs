//! Generic composite of files, directories and archives that knows how to
//! write itself to disk.
//!
//! A [`Node`] exclusively owns its children, so the tree can never contain
//! cycles or shared subtrees. Containers materialize depth first: children
//! are written before the container's own `finish` step runs, which is where
//! decorators hook in their behavior (e.g. writing an index). Archives are
//! sealed from their entries at materialization time, after any signing
//! decorator has appended its signature entry.

mod archive;
pub mod decorator;
mod directory;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;

use crate::crypto::SigningError;

pub use archive::{seal, ArchiveEntry, EntryArchive};
pub use decorator::{IndexFormat, IndexingDecorator, SigningDecorator};
pub use directory::Directory;

#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("duplicate child {name:?} in {parent:?}")]
    DuplicateChild { parent: String, name: String },
    #[error("archive {archive:?} has no entry {entry:?}")]
    MissingEntry { archive: String, entry: String },
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("failed to seal archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to serialize index: {0}")]
    Index(#[from] serde_json::Error),
    #[error("child {name:?} cannot be listed in an integer index")]
    InvalidIndexEntry { name: String },
    #[error("materialization worker failed: {0}")]
    Worker(String),
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StructureError + '_ {
    move |source| StructureError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A directory-like node: a name plus an ordered list of uniquely named
/// children.
pub trait Container: Send + Sync {
    fn name(&self) -> &str;

    fn children(&self) -> &[Node];

    /// Called once every child has been materialized into `dir`.
    fn finish(&self, _dir: &Path) -> Result<(), StructureError> {
        Ok(())
    }
}

/// A node written to disk as a single sealed container file.
pub trait Archive: Send + Sync {
    fn name(&self) -> &str;

    /// Final entries of the archive, in the order they are sealed.
    fn entries(&self) -> Result<Vec<ArchiveEntry>, StructureError>;
}

/// A plain file with in-memory contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    bytes: Vec<u8>,
}

impl File {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub enum Node {
    File(File),
    Directory(Box<dyn Container>),
    Archive(Box<dyn Archive>),
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::File(file) => f.debug_tuple("File").field(&file.name).finish(),
            Node::Directory(dir) => f
                .debug_struct("Directory")
                .field("name", &dir.name())
                .field("children", &dir.children())
                .finish(),
            Node::Archive(archive) => f.debug_tuple("Archive").field(&archive.name()).finish(),
        }
    }
}

impl From<File> for Node {
    fn from(file: File) -> Self {
        Node::File(file)
    }
}

impl Node {
    pub fn directory(container: impl Container + 'static) -> Self {
        Node::Directory(Box::new(container))
    }

    pub fn archive(archive: impl Archive + 'static) -> Self {
        Node::Archive(Box::new(archive))
    }

    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => &file.name,
            Node::Directory(dir) => dir.name(),
            Node::Archive(archive) => archive.name(),
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Directory(dir) => dir.children(),
            _ => &[],
        }
    }

    /// Follow a path of child positions down from this node.
    pub fn descend(&self, positions: &[usize]) -> Option<&Node> {
        positions
            .iter()
            .try_fold(self, |node, &i| node.children().get(i))
    }

    /// Relative paths of this node and every declared descendant, pre-order.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.collect_paths(Path::new(""), &mut out);
        out
    }

    fn collect_paths(&self, parent: &Path, out: &mut Vec<PathBuf>) {
        let path = parent.join(self.name());
        out.push(path.clone());
        for child in self.children() {
            child.collect_paths(&path, out);
        }
    }

    /// Write this node (and everything below it) into `parent`.
    pub fn materialize(&self, parent: &Path) -> Result<PathBuf, StructureError> {
        let path = parent.join(self.name());
        match self {
            Node::File(file) => {
                std::fs::write(&path, &file.bytes).map_err(io_error(&path))?;
            }
            Node::Directory(dir) => {
                std::fs::create_dir_all(&path).map_err(io_error(&path))?;
                for child in dir.children() {
                    child.materialize(&path)?;
                }
                dir.finish(&path)?;
            }
            Node::Archive(archive) => {
                let bytes = seal(archive.name(), &archive.entries()?)?;
                std::fs::write(&path, bytes).map_err(io_error(&path))?;
            }
        }
        Ok(path)
    }
}

/// Ensure the names yielded are unique within `parent`.
pub(crate) fn check_unique<'a>(
    parent: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), StructureError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(StructureError::DuplicateChild {
                parent: parent.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Materialize `root` into `parent`, handing every subtree found at `depth`
/// to a blocking worker, at most `workers` at a time.
///
/// Containers above `depth` are created up front and finished only after
/// all of their subtrees are written, deepest first, so the children-before-self
/// rule holds exactly as in [`Node::materialize`].
pub async fn materialize_concurrently(
    root: Arc<Node>,
    parent: PathBuf,
    depth: usize,
    workers: usize,
) -> Result<PathBuf, StructureError> {
    let mut jobs: Vec<(Vec<usize>, PathBuf)> = Vec::new();
    let mut containers: Vec<(Vec<usize>, PathBuf)> = Vec::new();
    plan(&root, Vec::new(), &parent, depth, &mut jobs, &mut containers)?;

    tracing::debug!(
        subtrees = jobs.len(),
        containers = containers.len(),
        workers,
        "materializing tree"
    );

    let results: Vec<Result<(), StructureError>> = futures::stream::iter(jobs)
        .map(|(positions, job_parent)| {
            let root = root.clone();
            async move {
                tokio::task::spawn_blocking(move || match root.descend(&positions) {
                    Some(node) => node.materialize(&job_parent).map(|_| ()),
                    None => Err(StructureError::Worker(format!(
                        "no node at {positions:?}"
                    ))),
                })
                .await
                .map_err(|e| StructureError::Worker(e.to_string()))?
            }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;
    // wait for every worker before failing, so nothing writes after we return
    results.into_iter().collect::<Result<Vec<()>, _>>()?;

    for (positions, path) in &containers {
        if let Some(Node::Directory(dir)) = root.descend(positions) {
            dir.finish(path)?;
        }
    }

    Ok(parent.join(root.name()))
}

fn plan(
    node: &Node,
    positions: Vec<usize>,
    parent: &Path,
    depth: usize,
    jobs: &mut Vec<(Vec<usize>, PathBuf)>,
    containers: &mut Vec<(Vec<usize>, PathBuf)>,
) -> Result<(), StructureError> {
    let dir = match node {
        Node::Directory(dir) if positions.len() < depth => dir,
        _ => {
            jobs.push((positions, parent.to_path_buf()));
            return Ok(());
        }
    };

    let path = parent.join(dir.name());
    std::fs::create_dir_all(&path).map_err(io_error(&path))?;
    for (i, child) in dir.children().iter().enumerate() {
        let mut child_positions = positions.clone();
        child_positions.push(i);
        plan(child, child_positions, &path, depth, jobs, containers)?;
    }
    // post-order: nested containers precede their parent
    containers.push((positions, path));
    Ok(())
}
