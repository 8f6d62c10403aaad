//! Persistence for machine records and their payloads.
//!
//! A record is always read and written whole. Callers treat
//! load-mutate-save as a critical section; nothing here detects a concurrent
//! writer, so the last save wins.

use std::fs;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use hackshell_types::error::{Result, ShellError};

use crate::machine::Machine;

/// Repository of machine records and their content payloads.
///
/// Content references are paths relative to the machine directory, such as
/// `files/<key>` or `logs/commands_2024-01-01.log`.
pub trait MachineStore {
    /// Whether a record exists for `id`.
    fn exists(&self, id: &str) -> bool;

    /// Load a record, failing on a missing or malformed document.
    fn try_load(&self, id: &str) -> Result<Machine>;

    /// Overwrite the whole record.
    fn save(&self, id: &str, machine: &Machine) -> Result<()>;

    fn read_content(&self, id: &str, content_ref: &str) -> Result<String>;
    fn write_content(&self, id: &str, content_ref: &str, text: &str) -> Result<()>;
    fn append_content(&self, id: &str, content_ref: &str, text: &str) -> Result<()>;
    fn delete_content(&self, id: &str, content_ref: &str) -> Result<()>;

    /// Size in bytes of a payload, `None` when absent.
    fn content_len(&self, id: &str, content_ref: &str) -> Option<u64>;

    /// Ids of every stored machine, sorted.
    fn list_machines(&self) -> Vec<String>;

    /// Load a record, falling back to [`Machine::skeleton`] with a warning.
    fn load(&self, id: &str) -> Machine {
        match self.try_load(id) {
            Ok(machine) => machine,
            Err(e) => {
                log::warn!("machine {id}: {e}; using an empty skeleton");
                Machine::skeleton()
            },
        }
    }
}

/// Reject content references that could escape the machine directory.
pub fn check_ref(content_ref: &str) -> Result<()> {
    let path = Path::new(content_ref);
    let safe = !content_ref.is_empty()
        && !content_ref.contains('\\')
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(ShellError::Unauthorized(format!(
            "content reference escapes machine directory: {content_ref}"
        )))
    }
}

/// Reject machine ids that are not a single path component.
pub fn check_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && !id.contains(['/', '\\'])
        && id != "."
        && id != "..";
    if ok {
        Ok(())
    } else {
        Err(ShellError::NotFound(format!("machine {id}")))
    }
}

/// Records on the local disk under `<root>/<id>/<id>.json`, with payloads
/// under `<root>/<id>/files/` and journal files under `<root>/<id>/logs/`.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn machine_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.machine_dir(id).join(format!("{id}.json"))
    }

    fn content_path(&self, id: &str, content_ref: &str) -> Result<PathBuf> {
        check_id(id)?;
        check_ref(content_ref)?;
        Ok(self.machine_dir(id).join(content_ref))
    }
}

/// Pretty JSON with four-space indentation.
fn to_pretty_json(machine: &Machine) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    machine.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl MachineStore for DiskStore {
    fn exists(&self, id: &str) -> bool {
        check_id(id).is_ok() && self.record_path(id).is_file()
    }

    fn try_load(&self, id: &str) -> Result<Machine> {
        check_id(id)?;
        let path = self.record_path(id);
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ShellError::NotFound(path.display().to_string()),
            _ => ShellError::Io(e),
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, id: &str, machine: &Machine) -> Result<()> {
        check_id(id)?;
        let path = self.record_path(id);
        ensure_parent(&path)?;
        let bytes = to_pretty_json(machine)?;
        // Write beside the record and rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        log::debug!("saved machine {id} ({} bytes)", bytes.len());
        Ok(())
    }

    fn read_content(&self, id: &str, content_ref: &str) -> Result<String> {
        let path = self.content_path(id, content_ref)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ShellError::PhysicalFileMissing(content_ref.to_string()),
            _ => ShellError::Io(e),
        })
    }

    fn write_content(&self, id: &str, content_ref: &str, text: &str) -> Result<()> {
        let path = self.content_path(id, content_ref)?;
        ensure_parent(&path)?;
        fs::write(path, text)?;
        Ok(())
    }

    fn append_content(&self, id: &str, content_ref: &str, text: &str) -> Result<()> {
        let path = self.content_path(id, content_ref)?;
        ensure_parent(&path)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    fn delete_content(&self, id: &str, content_ref: &str) -> Result<()> {
        let path = self.content_path(id, content_ref)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn content_len(&self, id: &str, content_ref: &str) -> Option<u64> {
        let path = self.content_path(id, content_ref).ok()?;
        fs::metadata(path).ok().map(|m| m.len())
    }

    fn list_machines(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|id| self.exists(id))
            .collect();
        ids.sort();
        ids
    }
}
