//! In-memory machine store.
//!
//! Useful for unit tests and ephemeral sessions. Records are kept as JSON
//! text so loads go through the same deserialization as the disk store, and
//! payloads live in a `BTreeMap` keyed by `(machine id, content ref)`.

use std::cell::RefCell;
use std::collections::BTreeMap;

use hackshell_types::error::{Result, ShellError};

use crate::machine::Machine;
use crate::store::{MachineStore, check_id, check_ref};

/// A fully in-memory [`MachineStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RefCell<BTreeMap<String, String>>,
    payloads: RefCell<BTreeMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw record text as-is, bypassing serialization.
    pub fn insert_raw(&self, id: &str, json: &str) {
        self.records
            .borrow_mut()
            .insert(id.to_string(), json.to_string());
    }

    /// Number of payloads stored for `id`.
    pub fn payload_count(&self, id: &str) -> usize {
        self.payloads
            .borrow()
            .keys()
            .filter(|(owner, _)| owner == id)
            .count()
    }

    /// Content references stored for `id`, sorted.
    pub fn payload_refs(&self, id: &str) -> Vec<String> {
        self.payloads
            .borrow()
            .keys()
            .filter(|(owner, _)| owner == id)
            .map(|(_, content_ref)| content_ref.clone())
            .collect()
    }

    fn key(id: &str, content_ref: &str) -> Result<(String, String)> {
        check_id(id)?;
        check_ref(content_ref)?;
        Ok((id.to_string(), content_ref.to_string()))
    }
}

impl MachineStore for MemoryStore {
    fn exists(&self, id: &str) -> bool {
        self.records.borrow().contains_key(id)
    }

    fn try_load(&self, id: &str) -> Result<Machine> {
        let records = self.records.borrow();
        let text = records
            .get(id)
            .ok_or_else(|| ShellError::NotFound(format!("machine {id}")))?;
        Ok(serde_json::from_str(text)?)
    }

    fn save(&self, id: &str, machine: &Machine) -> Result<()> {
        check_id(id)?;
        let text = serde_json::to_string(machine)?;
        self.records.borrow_mut().insert(id.to_string(), text);
        Ok(())
    }

    fn read_content(&self, id: &str, content_ref: &str) -> Result<String> {
        let key = Self::key(id, content_ref)?;
        self.payloads
            .borrow()
            .get(&key)
            .cloned()
            .ok_or_else(|| ShellError::PhysicalFileMissing(content_ref.to_string()))
    }

    fn write_content(&self, id: &str, content_ref: &str, text: &str) -> Result<()> {
        let key = Self::key(id, content_ref)?;
        self.payloads.borrow_mut().insert(key, text.to_string());
        Ok(())
    }

    fn append_content(&self, id: &str, content_ref: &str, text: &str) -> Result<()> {
        let key = Self::key(id, content_ref)?;
        self.payloads
            .borrow_mut()
            .entry(key)
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn delete_content(&self, id: &str, content_ref: &str) -> Result<()> {
        let key = Self::key(id, content_ref)?;
        self.payloads.borrow_mut().remove(&key);
        Ok(())
    }

    fn content_len(&self, id: &str, content_ref: &str) -> Option<u64> {
        let key = Self::key(id, content_ref).ok()?;
        self.payloads.borrow().get(&key).map(|t| t.len() as u64)
    }

    fn list_machines(&self) -> Vec<String> {
        self.records.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_machine_is_skeleton() {
        let store = MemoryStore::new();
        assert!(!store.exists("nowhere"));
        assert_eq!(store.load("nowhere"), Machine::skeleton());
    }

    #[test]
    fn malformed_record_is_skeleton() {
        let store = MemoryStore::new();
        store.insert_raw("bad", "{\"file_system\": 7}");
        assert!(store.exists("bad"));
        assert!(store.try_load("bad").is_err());
        assert_eq!(store.load("bad"), Machine::skeleton());
    }

    #[test]
    fn save_and_load() {
        let store = MemoryStore::new();
        let m = Machine::new("local", "127.0.0.1");
        store.save("local", &m).unwrap();
        assert_eq!(store.load("local"), m);
        assert_eq!(store.list_machines(), vec!["local"]);
    }

    #[test]
    fn payloads_are_per_machine() {
        let store = MemoryStore::new();
        store.write_content("a", "files/x", "1").unwrap();
        store.write_content("b", "files/x", "2").unwrap();
        assert_eq!(store.read_content("a", "files/x").unwrap(), "1");
        assert_eq!(store.payload_count("a"), 1);
        store.delete_content("a", "files/x").unwrap();
        assert_eq!(store.payload_count("a"), 0);
        assert_eq!(store.payload_count("b"), 1);
    }

    #[test]
    fn append_creates_then_extends() {
        let store = MemoryStore::new();
        store.append_content("m", "logs/x.log", "a\n").unwrap();
        store.append_content("m", "logs/x.log", "b\n").unwrap();
        assert_eq!(store.read_content("m", "logs/x.log").unwrap(), "a\nb\n");
        assert_eq!(store.content_len("m", "logs/x.log"), Some(4));
    }

    #[test]
    fn missing_payload() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_content("m", "files/none"),
            Err(ShellError::PhysicalFileMissing(_))
        ));
    }
}
