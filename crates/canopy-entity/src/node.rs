//! Typed references to folders and files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which table a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "node_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A folder.
    Folder,
    /// A file (leaf).
    File,
}

impl NodeType {
    /// Return the type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::File => "file",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = canopy_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "folder" => Ok(Self::Folder),
            "file" => Ok(Self::File),
            _ => Err(canopy_core::AppError::validation(format!(
                "Invalid node type: '{s}'"
            ))),
        }
    }
}

/// A reference to either a folder or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum NodeRef {
    /// A folder by ID.
    Folder(Uuid),
    /// A file by ID.
    File(Uuid),
}

impl NodeRef {
    /// Build a reference from a stored (type, id) pair.
    pub fn new(node_type: NodeType, id: Uuid) -> Self {
        match node_type {
            NodeType::Folder => Self::Folder(id),
            NodeType::File => Self::File(id),
        }
    }

    /// The referenced ID.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Folder(id) | Self::File(id) => *id,
        }
    }

    /// The referenced table.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Folder(_) => NodeType::Folder,
            Self::File(_) => NodeType::File,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_type(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ref_roundtrip() {
        let id = Uuid::new_v4();
        let node = NodeRef::new(NodeType::File, id);
        assert_eq!(node, NodeRef::File(id));
        assert_eq!(node.id(), id);
        assert_eq!(node.to_string(), format!("file:{id}"));
    }

    #[test]
    fn test_node_type_from_str() {
        assert_eq!("FOLDER".parse::<NodeType>().unwrap(), NodeType::Folder);
        assert!("link".parse::<NodeType>().is_err());
    }
}
