//! In-game audit journal.
//!
//! Entries are appended to one physical file per (category, local day) under
//! the machine's `logs/` directory. Each category file is linked into the
//! virtual tree as `/var/log/<category>.log` so players can `cat` it.

use std::fmt;

use chrono::{Local, NaiveDate};
use rand::Rng;

use hackshell_types::config::LogConfig;
use hackshell_types::error::Result;

use crate::node::Node;
use crate::store::MachineStore;

/// Directory (relative to the machine directory) holding journal files.
pub const LOGS_DIR: &str = "logs";

/// Virtual directory the journal links its files into.
pub const VIRTUAL_LOG_DIR: [&str; 2] = ["var", "log"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    System,
    Commands,
    Auth,
    Network,
    Files,
}

impl LogCategory {
    pub const ALL: [LogCategory; 5] = [
        LogCategory::System,
        LogCategory::Commands,
        LogCategory::Auth,
        LogCategory::Network,
        LogCategory::Files,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LogCategory::System => "system",
            LogCategory::Commands => "commands",
            LogCategory::Auth => "auth",
            LogCategory::Network => "network",
            LogCategory::Files => "files",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical file for `category` on `date`, relative to the machine directory.
pub fn file_ref(category: LogCategory, date: NaiveDate) -> String {
    format!("{LOGS_DIR}/{}_{}.log", category.name(), date.format("%Y-%m-%d"))
}

fn status(success: bool) -> &'static str {
    if success { "SUCCESS" } else { "FAILED" }
}

/// Appends audit entries for one machine.
pub struct Journal<'a> {
    store: &'a dyn MachineStore,
    machine_id: String,
    limits: LogConfig,
}

impl<'a> Journal<'a> {
    pub fn new(store: &'a dyn MachineStore, machine_id: &str, limits: LogConfig) -> Self {
        Self {
            store,
            machine_id: machine_id.to_string(),
            limits,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Append `message` to `category`. Failures are reported through
    /// `log::warn!` and never reach the caller.
    pub fn log(&self, category: LogCategory, message: &str) {
        let now = Local::now();
        let entry = format!("[{}] {message}\n", now.format("%Y-%m-%d %H:%M:%S"));
        if let Err(e) = self.append(category, now.date_naive(), &entry) {
            log::warn!("journal {}/{category}: {e}", self.machine_id);
        }
    }

    /// Append preformatted text to the category file for `date`.
    pub fn append(&self, category: LogCategory, date: NaiveDate, text: &str) -> Result<()> {
        // A journal never brings a machine into existence.
        if !self.store.exists(&self.machine_id) {
            return Ok(());
        }
        let content_ref = file_ref(category, date);
        self.rotate(&content_ref)?;
        self.store
            .append_content(&self.machine_id, &content_ref, text)?;
        self.link(category, &content_ref)
    }

    /// Truncate a file that grew past the size limit to its newest lines.
    /// Returns whether the file was rewritten.
    pub fn rotate(&self, content_ref: &str) -> Result<bool> {
        let size = self
            .store
            .content_len(&self.machine_id, content_ref)
            .unwrap_or(0);
        if size <= self.limits.max_bytes() {
            return Ok(false);
        }
        let text = self.store.read_content(&self.machine_id, content_ref)?;
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() <= self.limits.max_entries {
            return Ok(false);
        }
        let mut kept = lines[lines.len() - self.limits.max_entries..].join("\n");
        kept.push('\n');
        self.store
            .write_content(&self.machine_id, content_ref, &kept)?;
        log::debug!("rotated {}/{content_ref}", self.machine_id);
        Ok(true)
    }

    /// Point `/var/log/<category>.log` at `content_ref`, saving only when the
    /// reference changes.
    fn link(&self, category: LogCategory, content_ref: &str) -> Result<()> {
        let mut machine = self.store.load(&self.machine_id);
        let name = format!("{}.log", category.name());
        let dir = machine.file_system.ensure_dir(&VIRTUAL_LOG_DIR)?;
        if matches!(dir.get(&name), Some(Node::File(current)) if current == content_ref) {
            return Ok(());
        }
        dir.insert(name, Node::File(content_ref.to_string()));
        self.store.save(&self.machine_id, &machine)
    }

    pub fn log_command(&self, user: &str, command: &str, pwd: &str, success: bool) {
        self.log(
            LogCategory::Commands,
            &format!(
                "USER[{user}] PWD[{pwd}] CMD[{command}] STATUS[{}]",
                status(success)
            ),
        );
    }

    pub fn log_login(&self, user: &str, success: bool, source: Option<&str>) {
        let from = source.map(|ip| format!(" from {ip}")).unwrap_or_default();
        self.log(
            LogCategory::Auth,
            &format!("LOGIN USER[{user}] STATUS[{}]{from}", status(success)),
        );
    }

    pub fn log_auth(&self, user: &str, action: &str, success: bool) {
        self.log(
            LogCategory::Auth,
            &format!("{action} USER[{user}] STATUS[{}]", status(success)),
        );
    }

    pub fn log_system(&self, event: &str, details: &str) {
        self.log(
            LogCategory::System,
            &format!("EVENT[{event}] DETAILS[{details}]"),
        );
    }

    pub fn log_file_activity(&self, user: &str, path: &str, action: &str) {
        self.log(
            LogCategory::Files,
            &format!("USER[{user}] FILE[{path}] ACTION[{action}]"),
        );
    }

    /// Record network activity. Scans additionally leave firewall-style
    /// lines, one per probed port.
    pub fn log_network(&self, source_ip: &str, dest_ip: &str, event: &str, ports: &[u16]) {
        let details = if ports.is_empty() {
            String::from("-")
        } else {
            ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        self.log(
            LogCategory::Network,
            &format!("EVENT[{event}] SOURCE[{source_ip}] DEST[{dest_ip}] PORTS[{details}]"),
        );
        if event == "SCAN" {
            let mut rng = rand::thread_rng();
            for port in ports.iter().take(5) {
                let spt: u16 = rng.gen_range(32000..65000);
                self.log(
                    LogCategory::Network,
                    &format!(
                        "kernel: [UFW BLOCK] IN=eth0 SRC={source_ip} DST={dest_ip} PROTO=TCP SPT={spt} DPT={port} SYN"
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::memory::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.save("local", &Machine::new("local", "127.0.0.1")).unwrap();
        store
    }

    fn today_ref(category: LogCategory) -> String {
        file_ref(category, Local::now().date_naive())
    }

    #[test]
    fn file_ref_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(file_ref(LogCategory::Auth, date), "logs/auth_2024-03-09.log");
    }

    #[test]
    fn command_entry_is_linked_into_var_log() {
        let store = store();
        let journal = Journal::new(&store, "local", LogConfig::default());
        journal.log_command("alice", "ls -a", "/home", true);

        let text = store
            .read_content("local", &today_ref(LogCategory::Commands))
            .unwrap();
        assert!(text.starts_with('['));
        assert!(text.trim_end().ends_with("USER[alice] PWD[/home] CMD[ls -a] STATUS[SUCCESS]"));

        let machine = store.load("local");
        let linked = machine
            .file_system
            .lookup(&["var", "log", "commands.log"])
            .unwrap();
        assert_eq!(
            linked,
            crate::node::Entry::File(&today_ref(LogCategory::Commands))
        );
    }

    #[test]
    fn entries_accumulate() {
        let store = store();
        let journal = Journal::new(&store, "local", LogConfig::default());
        journal.log_system("BOOT", "ok");
        journal.log_system("DIRECTORY_CHANGE", "/home -> /tmp");
        let text = store
            .read_content("local", &today_ref(LogCategory::System))
            .unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("EVENT[DIRECTORY_CHANGE] DETAILS[/home -> /tmp]"));
    }

    #[test]
    fn rotation_keeps_newest_lines() {
        let store = store();
        let limits = LogConfig {
            max_size_kb: 0,
            max_entries: 3,
        };
        let journal = Journal::new(&store, "local", limits);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for i in 0..6 {
            journal
                .append(LogCategory::Files, date, &format!("line {i}\n"))
                .unwrap();
        }
        let text = store
            .read_content("local", &file_ref(LogCategory::Files, date))
            .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() <= 4, "{lines:?}");
        assert_eq!(lines.last(), Some(&"line 5"));
        assert!(!text.contains("line 0"));
    }

    #[test]
    fn unknown_machine_is_not_created() {
        let store = MemoryStore::new();
        let journal = Journal::new(&store, "10.9.9.9", LogConfig::default());
        journal.log_login("root", false, None);
        assert!(!store.exists("10.9.9.9"));
        assert_eq!(store.payload_count("10.9.9.9"), 0);
    }

    #[test]
    fn scan_leaves_firewall_lines() {
        let store = store();
        let journal = Journal::new(&store, "local", LogConfig::default());
        journal.log_network("192.168.1.5", "127.0.0.1", "SCAN", &[22, 80]);
        let text = store
            .read_content("local", &today_ref(LogCategory::Network))
            .unwrap();
        assert!(text.contains("EVENT[SCAN] SOURCE[192.168.1.5] DEST[127.0.0.1] PORTS[22,80]"));
        assert_eq!(text.matches("UFW BLOCK").count(), 2);
    }
}
