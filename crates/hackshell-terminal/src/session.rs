//! The logged-in user on one machine.

use hackshell_vfs::{MachineMeta, MachineStore, UserRecord, path};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub machine_id: String,
    pub user: String,
    pub is_root: bool,
    pub cwd: String,
    /// Metadata snapshot, refreshed after every command.
    pub meta: MachineMeta,
}

impl Session {
    pub fn new(machine_id: &str, user: &str, is_root: bool, cwd: &str, meta: MachineMeta) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            user: user.to_string(),
            is_root,
            cwd: cwd.to_string(),
            meta,
        }
    }

    /// Open a session on `machine_id`, loading its metadata from `store`.
    pub fn open(store: &dyn MachineStore, machine_id: &str, user: &str, is_root: bool, cwd: &str) -> Self {
        let meta = store.load(machine_id).meta_data;
        Self::new(machine_id, user, is_root, cwd, meta)
    }

    pub fn user_record(&self) -> Option<&UserRecord> {
        self.meta.users.get(&self.user)
    }

    /// The user's recorded home, or `/home/<user>`.
    pub fn home(&self) -> String {
        match self.user_record() {
            Some(record) if !record.home.is_empty() => path::resolve_display(&record.home, "/"),
            _ => format!("/home/{}", self.user),
        }
    }

    /// Display name of the machine, falling back to its id.
    pub fn host(&self) -> &str {
        if self.meta.name.is_empty() {
            &self.machine_id
        } else {
            &self.meta.name
        }
    }

    /// `user@machine:cwd$ `
    pub fn prompt(&self) -> String {
        format!("{}@{}:{}$ ", self.user, self.host(), self.cwd)
    }

    /// Reload metadata so user changes take effect immediately.
    pub fn refresh(&mut self, store: &dyn MachineStore) {
        self.meta = store.load(&self.machine_id).meta_data;
        if let Some(record) = self.meta.users.get(&self.user) {
            self.is_root = record.is_root;
        }
    }
}
