//! The directory tree stored inside a machine record.
//!
//! On disk the tree keeps its untagged JSON shape: an object is a directory,
//! the string `"command"` marks an executable and any other string is a
//! content reference. In memory every node carries an explicit variant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use hackshell_types::error::{Result, ShellError};

use crate::path;

/// Leaf value marking an executable in `/bin`.
pub const COMMAND_MARKER: &str = "command";

/// Children of a directory, sorted by name.
pub type Directory = BTreeMap<String, Node>;

/// A node of the virtual tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawNode")]
pub enum Node {
    Directory(Directory),
    /// Content reference, relative to the machine directory.
    File(String),
    /// Executable whose body cannot be read.
    Command,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNode {
    Dir(BTreeMap<String, RawNode>),
    Leaf(String),
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        match raw {
            RawNode::Dir(children) => Node::Directory(
                children
                    .into_iter()
                    .map(|(name, child)| (name, Node::from(child)))
                    .collect(),
            ),
            RawNode::Leaf(s) if s == COMMAND_MARKER => Node::Command,
            RawNode::Leaf(s) => Node::File(s),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Directory(children) => children.serialize(serializer),
            Node::File(content_ref) => serializer.serialize_str(content_ref),
            Node::Command => serializer.serialize_str(COMMAND_MARKER),
        }
    }
}

impl Node {
    pub fn empty_dir() -> Self {
        Node::Directory(Directory::new())
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_entry(&self) -> Entry<'_> {
        match self {
            Node::Directory(children) => Entry::Directory(children),
            Node::File(content_ref) => Entry::File(content_ref),
            Node::Command => Entry::Command,
        }
    }
}

/// Borrowed view of a node, including the root which has no [`Node`] of its
/// own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    Directory(&'a Directory),
    File(&'a str),
    Command,
}

impl Entry<'_> {
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }
}

/// A file found while walking a subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Absolute segments of the file.
    pub segments: Vec<String>,
    pub content_ref: String,
}

/// The root directory of a machine. The root is a directory by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    root: Directory,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: Directory) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Walk directory segments. Fails the moment a segment is missing or a
    /// non-directory is crossed.
    pub fn navigate<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Directory> {
        let mut current = &self.root;
        for seg in segments {
            match current.get(seg.as_ref()) {
                Some(Node::Directory(children)) => current = children,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn navigate_mut<S: AsRef<str>>(&mut self, segments: &[S]) -> Option<&mut Directory> {
        let mut current = &mut self.root;
        for seg in segments {
            match current.get_mut(seg.as_ref()) {
                Some(Node::Directory(children)) => current = children,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Look up the node at `segments`. The empty sequence is the root
    /// directory itself.
    pub fn lookup<S: AsRef<str>>(&self, segments: &[S]) -> Option<Entry<'_>> {
        let Some((last, parent)) = segments.split_last() else {
            return Some(Entry::Directory(&self.root));
        };
        self.navigate(parent)?
            .get(last.as_ref())
            .map(Node::as_entry)
    }

    pub fn exists<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        self.lookup(segments).is_some()
    }

    pub fn is_dir<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        self.lookup(segments).is_some_and(|e| e.is_dir())
    }

    /// Create every missing directory along `segments` and return the last
    /// one. Fails if a non-directory is in the way.
    pub fn ensure_dir<S: AsRef<str>>(&mut self, segments: &[S]) -> Result<&mut Directory> {
        let mut current = &mut self.root;
        for (depth, seg) in segments.iter().enumerate() {
            let node = current
                .entry(seg.as_ref().to_string())
                .or_insert_with(Node::empty_dir);
            match node {
                Node::Directory(children) => current = children,
                _ => {
                    return Err(ShellError::NotDirectory(path::display(
                        &segments[..=depth],
                    )));
                },
            }
        }
        Ok(current)
    }
}

/// Collect every file below `dir`, whose own absolute segments are `prefix`.
/// Command markers are skipped since they have no payload.
pub fn files_under(dir: &Directory, prefix: &[String]) -> Vec<FileRef> {
    let mut out = Vec::new();
    collect_files(dir, &mut prefix.to_vec(), &mut out);
    out
}

fn collect_files(dir: &Directory, prefix: &mut Vec<String>, out: &mut Vec<FileRef>) {
    for (name, node) in dir {
        prefix.push(name.clone());
        match node {
            Node::Directory(children) => collect_files(children, prefix, out),
            Node::File(content_ref) => out.push(FileRef {
                segments: prefix.clone(),
                content_ref: content_ref.clone(),
            }),
            Node::Command => {},
        }
        prefix.pop();
    }
}
