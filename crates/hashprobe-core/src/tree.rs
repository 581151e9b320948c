/// Directory tree reconstructed from flat path lists
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::recovery::parent_dir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryNode {
    pub subdirs: BTreeSet<String>,
    pub files: BTreeSet<String>,
}

/// Directories keyed by normalized path, each with its immediate children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryTree {
    nodes: BTreeMap<String, DirectoryNode>,
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from normalized file paths
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = DirectoryTree::new();
        for path in paths {
            tree.insert_file(path.as_ref());
        }
        tree
    }

    /// Register a file and every ancestor directory
    pub fn insert_file(&mut self, path: &str) {
        let name = base_name(path);
        if name.is_empty() {
            return;
        }
        let mut dir = parent_dir(path);
        self.nodes
            .entry(dir.to_string())
            .or_default()
            .files
            .insert(name.to_string());

        while dir != "/" {
            let parent = parent_dir(dir);
            self.nodes
                .entry(parent.to_string())
                .or_default()
                .subdirs
                .insert(base_name(dir).to_string());
            dir = parent;
        }
    }

    pub fn node(&self, dir: &str) -> Option<&DirectoryNode> {
        self.nodes.get(dir)
    }

    pub fn directories(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn directory_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn file_count(&self) -> usize {
        self.nodes.values().map(|n| n.files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_from_paths() {
        let tree = DirectoryTree::from_paths(["/def/city.sii", "/def/world/prefab.sii", "/version.sii"]);
        let root = tree.node("/").unwrap();
        assert!(root.subdirs.contains("def"));
        assert!(root.files.contains("version.sii"));

        let def = tree.node("/def").unwrap();
        assert!(def.subdirs.contains("world"));
        assert!(def.files.contains("city.sii"));
        assert_eq!(tree.directory_count(), 3);
        assert_eq!(tree.file_count(), 3);
    }
}
