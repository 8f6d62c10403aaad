//! Transactional filesystem accessor over one machine record.
//!
//! [`MachineFs`] loads a record once, applies an operation to the in-memory
//! tree and flushes the whole record back through the store. Payloads are
//! written before the record that references them and old payloads are
//! deleted only after the record is saved, so a failed flush never leaves
//! the tree pointing at missing content.

use std::collections::BTreeMap;

use hackshell_types::error::{Result, ShellError};

use crate::key;
use crate::machine::Machine;
use crate::node::{Directory, Entry, FileTree, Node, files_under};
use crate::path;
use crate::store::MachineStore;

/// A loaded machine plus the store it flushes to.
pub struct MachineFs<'a> {
    store: &'a dyn MachineStore,
    id: String,
    machine: Machine,
}

/// Whether a reference points at a payload this accessor owns.
fn owned_payload(content_ref: &str) -> bool {
    content_ref.starts_with(key::FILES_DIR) && content_ref[key::FILES_DIR.len()..].starts_with('/')
}

impl<'a> MachineFs<'a> {
    /// Load `id` from `store`, falling back to the empty skeleton.
    pub fn open(store: &'a dyn MachineStore, id: &str) -> Self {
        let machine = store.load(id);
        Self::from_machine(store, id, machine)
    }

    pub fn from_machine(store: &'a dyn MachineStore, id: &str, machine: Machine) -> Self {
        Self {
            store,
            id: id.to_string(),
            machine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn tree(&self) -> &FileTree {
        &self.machine.file_system
    }

    /// Save the whole record.
    pub fn flush(&self) -> Result<()> {
        self.store.save(&self.id, &self.machine)
    }

    pub fn navigate(&self, segments: &[String]) -> Option<&Directory> {
        self.machine.file_system.navigate(segments)
    }

    pub fn lookup(&self, segments: &[String]) -> Option<Entry<'_>> {
        self.machine.file_system.lookup(segments)
    }

    /// Directory at `segments`, with type-aware errors.
    pub fn dir(&self, segments: &[String]) -> Result<&Directory> {
        match self.lookup(segments) {
            Some(Entry::Directory(children)) => Ok(children),
            Some(_) => Err(ShellError::NotDirectory(path::display(segments))),
            None => Err(ShellError::NotFound(path::display(segments))),
        }
    }

    /// Read the text of the file at `segments`.
    pub fn read(&self, segments: &[String]) -> Result<String> {
        let shown = path::display(segments);
        match self.lookup(segments) {
            None => Err(ShellError::NotFound(shown)),
            Some(Entry::Directory(_)) => Err(ShellError::IsDirectory(shown)),
            Some(Entry::Command) => Err(ShellError::Unauthorized(format!(
                "cannot view the contents of {shown}"
            ))),
            Some(Entry::File(content_ref)) => self
                .store
                .read_content(&self.id, content_ref)
                .map_err(|e| match e {
                    ShellError::PhysicalFileMissing(_) => ShellError::PhysicalFileMissing(shown),
                    other => other,
                }),
        }
    }

    /// Create or overwrite the file at `segments`.
    pub fn write(&mut self, segments: &[String], content: &str) -> Result<()> {
        let (parent, name) =
            path::split_last(segments).ok_or_else(|| ShellError::IsDirectory("/".to_string()))?;
        let dir = self
            .machine
            .file_system
            .navigate(parent)
            .ok_or_else(|| ShellError::NotFound(path::display(parent)))?;
        let previous = match dir.get(name) {
            Some(Node::Directory(_)) => {
                return Err(ShellError::IsDirectory(path::display(segments)));
            },
            Some(Node::Command) => {
                return Err(ShellError::Unauthorized(format!(
                    "{} is an executable",
                    path::display(segments)
                )));
            },
            Some(Node::File(old)) => Some(old.clone()),
            None => None,
        };

        let new_ref = key::content_ref(parent, name);
        self.store.write_content(&self.id, &new_ref, content)?;
        if let Some(dir) = self.machine.file_system.navigate_mut(parent) {
            dir.insert(name.to_string(), Node::File(new_ref.clone()));
        }
        self.flush()?;

        if let Some(old) = previous.filter(|old| *old != new_ref && owned_payload(old)) {
            self.discard_payload(&old);
        }
        Ok(())
    }

    /// Create an empty file unless something already exists there.
    /// Returns whether a file was created.
    pub fn touch(&mut self, segments: &[String]) -> Result<bool> {
        if segments.is_empty() || self.machine.file_system.exists(segments) {
            return Ok(false);
        }
        self.write(segments, "")?;
        Ok(true)
    }

    /// Create an empty directory.
    pub fn mkdir(&mut self, segments: &[String]) -> Result<()> {
        if self.machine.file_system.exists(segments) {
            return Err(ShellError::AlreadyExists(path::display(segments)));
        }
        let (parent, name) =
            path::split_last(segments).ok_or_else(|| ShellError::AlreadyExists("/".to_string()))?;
        let dir = self
            .machine
            .file_system
            .navigate_mut(parent)
            .ok_or_else(|| ShellError::NotFound(path::display(parent)))?;
        dir.insert(name.to_string(), Node::empty_dir());
        self.flush()
    }

    /// Remove a file or directory. Populated directories need `recursive`.
    pub fn remove(&mut self, segments: &[String], recursive: bool) -> Result<()> {
        let shown = path::display(segments);
        let (parent, name) = path::split_last(segments)
            .ok_or_else(|| ShellError::Unauthorized("cannot remove the root directory".into()))?;
        let dir = self
            .machine
            .file_system
            .navigate_mut(parent)
            .ok_or_else(|| ShellError::NotFound(shown.clone()))?;
        let doomed: Vec<String> = match dir.get(name) {
            None => return Err(ShellError::NotFound(shown)),
            Some(Node::Directory(children)) if !children.is_empty() && !recursive => {
                return Err(ShellError::NotEmpty(shown));
            },
            Some(Node::Directory(children)) => files_under(children, segments)
                .into_iter()
                .map(|f| f.content_ref)
                .collect(),
            Some(Node::File(content_ref)) => vec![content_ref.clone()],
            Some(Node::Command) => Vec::new(),
        };
        dir.remove(name);
        self.flush()?;
        for content_ref in &doomed {
            self.discard_payload(content_ref);
        }
        Ok(())
    }

    /// Move `src` to `dest`. An existing directory at `dest` receives the
    /// source under its own name; anything else is a rename target.
    /// Returns the final segments of the moved node.
    pub fn move_entry(&mut self, src: &[String], dest: &[String]) -> Result<Vec<String>> {
        let target = self.plan_transfer(src, dest)?;
        if target.segments == src {
            return Ok(target.segments);
        }

        // Relocate payloads first; nothing in the tree changes until they exist.
        let node = self.node_at(src)?.clone();
        let relocated = self.copy_payloads(&node, src, &target.segments)?;

        let (src_parent, src_name) = path::split_last(src)
            .ok_or_else(|| ShellError::Unauthorized("cannot move the root directory".into()))?;
        let mut node = self
            .machine
            .file_system
            .navigate_mut(src_parent)
            .and_then(|dir| dir.remove(src_name))
            .ok_or_else(|| ShellError::NotFound(path::display(src)))?;
        relink(&mut node, &relocated);
        let replaced = self.insert_at(&target.segments, node)?;
        self.flush()?;

        for old in relocated.keys().filter(|r| owned_payload(r)) {
            self.discard_payload(old);
        }
        if let Some(old) =
            replaced.filter(|old| owned_payload(old) && !relocated.values().any(|new| new == old))
        {
            self.discard_payload(&old);
        }
        Ok(target.segments)
    }

    /// Copy `src` to `dest` with the same destination rules as
    /// [`MachineFs::move_entry`]. Directories need `recursive`.
    pub fn copy_entry(
        &mut self,
        src: &[String],
        dest: &[String],
        recursive: bool,
    ) -> Result<Vec<String>> {
        let target = self.plan_transfer(src, dest)?;
        let node = self.node_at(src)?.clone();
        if node.is_dir() && !recursive {
            return Err(ShellError::IsDirectory(path::display(src)));
        }
        if target.segments == src {
            return Err(ShellError::AlreadyExists(path::display(src)));
        }
        let mut node = node;
        let copied = self.copy_payloads(&node, src, &target.segments)?;
        relink(&mut node, &copied);
        let replaced = self.insert_at(&target.segments, node)?;
        self.flush()?;
        if let Some(old) =
            replaced.filter(|old| owned_payload(old) && !copied.values().any(|new| new == old))
        {
            self.discard_payload(&old);
        }
        Ok(target.segments)
    }

    fn node_at(&self, segments: &[String]) -> Result<&Node> {
        let (parent, name) = path::split_last(segments)
            .ok_or_else(|| ShellError::Unauthorized("cannot transfer the root directory".into()))?;
        self.machine
            .file_system
            .navigate(parent)
            .and_then(|dir| dir.get(name))
            .ok_or_else(|| ShellError::NotFound(path::display(segments)))
    }

    /// Work out where a move or copy lands and reject collisions.
    fn plan_transfer(&self, src: &[String], dest: &[String]) -> Result<Transfer> {
        let src_node = self.node_at(src)?;
        let src_name = src.last().cloned().unwrap_or_default();

        let into_dir = self.machine.file_system.is_dir(dest);
        let segments = if into_dir {
            let mut s = dest.to_vec();
            s.push(src_name);
            s
        } else {
            let (parent, _) = path::split_last(dest)
                .ok_or_else(|| ShellError::NotFound(path::display(dest)))?;
            if !self.machine.file_system.is_dir(parent) {
                return Err(ShellError::NotFound(path::display(parent)));
            }
            dest.to_vec()
        };

        if segments == src {
            return Ok(Transfer { segments });
        }
        if src_node.is_dir() && path::is_within(&segments, src) {
            return Err(ShellError::Command(format!(
                "cannot move {} into itself",
                path::display(src)
            )));
        }
        match self.machine.file_system.lookup(&segments) {
            Some(_) if into_dir => Err(ShellError::AlreadyExists(path::display(&segments))),
            Some(Entry::Directory(_)) => Err(ShellError::IsDirectory(path::display(&segments))),
            Some(_) if src_node.is_dir() => {
                Err(ShellError::NotDirectory(path::display(&segments)))
            },
            _ => Ok(Transfer { segments }),
        }
    }

    /// Write a copy of every payload below `node` under keys derived from
    /// `to`. Returns old ref to new ref for each copied payload.
    fn copy_payloads(
        &self,
        node: &Node,
        from: &[String],
        to: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let files = match node {
            Node::File(content_ref) => vec![crate::node::FileRef {
                segments: from.to_vec(),
                content_ref: content_ref.clone(),
            }],
            Node::Directory(children) => files_under(children, from),
            Node::Command => Vec::new(),
        };
        let mut mapping = BTreeMap::new();
        for file in files {
            let mut new_segments = to.to_vec();
            new_segments.extend_from_slice(&file.segments[from.len()..]);
            let Some(new_ref) = key::content_ref_for(&new_segments) else {
                continue;
            };
            if new_ref == file.content_ref {
                continue;
            }
            match self.store.read_content(&self.id, &file.content_ref) {
                Ok(text) => {
                    self.store.write_content(&self.id, &new_ref, &text)?;
                    mapping.insert(file.content_ref, new_ref);
                },
                Err(ShellError::PhysicalFileMissing(_)) => {
                    log::warn!(
                        "{}: payload {} is missing, leaving reference as is",
                        path::display(&file.segments),
                        file.content_ref
                    );
                },
                Err(e) => return Err(e),
            }
        }
        Ok(mapping)
    }

    /// Insert `node` at `segments`, returning the content ref of a file it
    /// replaced.
    fn insert_at(&mut self, segments: &[String], node: Node) -> Result<Option<String>> {
        let (parent, name) = path::split_last(segments)
            .ok_or_else(|| ShellError::AlreadyExists("/".to_string()))?;
        let dir = self
            .machine
            .file_system
            .navigate_mut(parent)
            .ok_or_else(|| ShellError::NotFound(path::display(parent)))?;
        Ok(match dir.insert(name.to_string(), node) {
            Some(Node::File(old)) => Some(old),
            _ => None,
        })
    }

    /// Delete a payload after the record no longer references it. Failure
    /// only leaks storage, so it is logged rather than returned.
    fn discard_payload(&self, content_ref: &str) {
        if let Err(e) = self.store.delete_content(&self.id, content_ref) {
            log::warn!("machine {}: could not delete {content_ref}: {e}", self.id);
        }
    }
}

struct Transfer {
    segments: Vec<String>,
}

/// Rewrite file references in a subtree according to `mapping`.
fn relink(node: &mut Node, mapping: &BTreeMap<String, String>) {
    match node {
        Node::File(content_ref) => {
            if let Some(new_ref) = mapping.get(content_ref) {
                *content_ref = new_ref.clone();
            }
        },
        Node::Directory(children) => {
            for child in children.values_mut() {
                relink(child, mapping);
            }
        },
        Node::Command => {},
    }
}
