//! Machine records: one virtual host with its tree and metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::{FileTree, Node};

/// Capability tags carried in a user's permission set.
pub mod capability {
    /// Unrestricted access.
    pub const ALL: &str = "all";
    /// Access to other users' home directories.
    pub const HOME: &str = "home";
    /// Access to `/home/public` and `/home/shared`.
    pub const PUBLIC: &str = "public";
    /// Access to `/bin`.
    pub const BIN: &str = "bin";
    /// Access to `/var`.
    pub const VAR: &str = "var";
}

/// The persisted unit: a filesystem tree plus host metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub file_system: FileTree,
    pub meta_data: MachineMeta,
}

/// Host metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,
    /// Host-wide password used by ssh for users without a record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Keys this version does not know about, kept across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An account on a machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    /// Hashed (or legacy plaintext) password.
    pub password: String,
    pub home: String,
    pub shell: String,
    pub group: String,
    pub is_root: bool,
    pub uid: u32,
    pub gid: u32,
    pub permissions: Vec<String>,
}

impl UserRecord {
    pub fn has_capability(&self, tag: &str) -> bool {
        self.permissions.iter().any(|p| p == tag)
    }

    /// The default superuser created on first login.
    pub fn root(password_hash: String) -> Self {
        Self {
            password: password_hash,
            home: "/root".to_string(),
            shell: "/bin/bash".to_string(),
            group: "root".to_string(),
            is_root: true,
            uid: 0,
            gid: 0,
            permissions: vec![capability::ALL.to_string()],
        }
    }

    /// A regular account as created by `useradd`.
    pub fn regular(username: &str, password_hash: String, id: u32, root: bool) -> Self {
        let (group, permissions) = if root {
            ("root", vec![capability::ALL.to_string()])
        } else {
            (
                "users",
                vec![capability::HOME.to_string(), capability::PUBLIC.to_string()],
            )
        };
        Self {
            password: password_hash,
            home: format!("/home/{username}"),
            shell: "/bin/bash".to_string(),
            group: group.to_string(),
            is_root: root,
            uid: id,
            gid: id,
            permissions,
        }
    }
}

impl Machine {
    pub fn new(name: &str, ip: &str) -> Self {
        Self {
            file_system: FileTree::new(),
            meta_data: MachineMeta {
                name: name.to_string(),
                ip: ip.to_string(),
                ..MachineMeta::default()
            },
        }
    }

    /// Record returned when a machine file is missing or unreadable.
    pub fn skeleton() -> Self {
        let mut machine = Self::new("unknown", "0.0.0.0");
        let mut root = crate::node::Directory::new();
        root.insert("bin".to_string(), Node::empty_dir());
        machine.file_system = FileTree::from_root(root);
        machine
    }

    pub fn user(&self, name: &str) -> Option<&UserRecord> {
        self.meta_data.users.get(name)
    }

    pub fn has_port(&self, port: u16) -> bool {
        self.meta_data.ports.contains(&port)
    }

    /// Whether `/bin` lists `name` as an executable.
    pub fn has_command(&self, name: &str) -> bool {
        matches!(
            self.file_system.navigate(&["bin"]).and_then(|bin| bin.get(name)),
            Some(Node::Command)
        )
    }

    /// Names of every executable in `/bin`, sorted.
    pub fn commands(&self) -> Vec<&str> {
        self.file_system
            .navigate(&["bin"])
            .map(|bin| {
                bin.iter()
                    .filter(|(_, node)| matches!(node, Node::Command))
                    .map(|(name, _)| name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
