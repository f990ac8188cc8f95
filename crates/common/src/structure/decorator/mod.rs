//! Wrappers that add behavior to a node without touching its internals.
//!
//! Decorators implement the same trait as the node they wrap and delegate
//! to it, so they stack: `IndexingDecorator<IndexingDecorator<Directory>>`
//! is as valid as a bare `Directory`.

mod indexing;
mod signing;

pub use indexing::{IndexFormat, IndexingDecorator};
pub use signing::SigningDecorator;
