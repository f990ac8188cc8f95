use super::{Container, Node, StructureError};

/// A plain directory owning an ordered list of children.
///
/// Children keep insertion order; builders insert them already sorted.
#[derive(Debug)]
pub struct Directory {
    name: String,
    children: Vec<Node>,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Attach a child, failing if the name is already taken.
    pub fn add(&mut self, child: Node) -> Result<(), StructureError> {
        if self.children.iter().any(|c| c.name() == child.name()) {
            return Err(StructureError::DuplicateChild {
                parent: self.name.clone(),
                name: child.name().to_string(),
            });
        }
        self.children.push(child);
        Ok(())
    }

    pub fn with_child(mut self, child: Node) -> Result<Self, StructureError> {
        self.add(child)?;
        Ok(self)
    }
}

impl Container for Directory {
    fn name(&self) -> &str {
        &self.name
    }

    fn children(&self) -> &[Node] {
        &self.children
    }
}
