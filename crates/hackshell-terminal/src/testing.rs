//! Shared fixtures for the command tests.

use dialoguer::console::strip_ansi_codes;
use hackshell_types::config::ShellConfig;
use hackshell_vfs::password::hash_password;
use hackshell_vfs::{Machine, MachineFs, MachineStore, MemoryStore, Node, UserRecord, path};

use crate::commands::providers;
use crate::interpreter::CommandRegistry;
use crate::prompt::ScriptedPrompt;
use crate::session::Session;
use crate::shell::Shell;

pub const ROOT_PW: &str = "toor";
pub const ALICE_PW: &str = "wonderland";
pub const TARGET_IP: &str = "10.10.10.10";

fn machine(name: &str, ip: &str, dirs: &[&str], commands: &[&str]) -> Machine {
    let mut machine = Machine::new(name, ip);
    let tree = &mut machine.file_system;
    for dir in dirs {
        tree.ensure_dir(&path::resolve(dir, "/")).unwrap();
    }
    let bin = tree.ensure_dir(&["bin"]).unwrap();
    for name in commands {
        bin.insert(name.to_string(), Node::Command);
    }
    machine
}

fn write(store: &dyn MachineStore, id: &str, file: &str, text: &str) {
    MachineFs::open(store, id)
        .write(&path::resolve(file, "/"), text)
        .unwrap();
}

/// `local` (devbox, 192.168.1.5) with root and alice, and the web host at
/// [`TARGET_IP`] with a single `admin` account.
pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    let registry = CommandRegistry::with_providers(providers());
    let names: Vec<&str> = registry
        .list_commands()
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let mut local = machine(
        "devbox",
        "192.168.1.5",
        &["/home/alice", "/home/public", "/root", "/var/log", "/tmp"],
        &names,
    );
    let users = &mut local.meta_data.users;
    users.insert("root".to_string(), UserRecord::root(hash_password(ROOT_PW)));
    users.insert(
        "alice".to_string(),
        UserRecord::regular("alice", hash_password(ALICE_PW), 1000, false),
    );
    store.save("local", &local).unwrap();
    write(&store, "local", "/home/alice/notes.txt", "buy milk\nfind the flag");
    write(&store, "local", "/root/secret.txt", "root only");

    let mut target = machine("webserver", TARGET_IP, &["/home/admin", "/var/log"], &names);
    target.meta_data.ports = vec![22, 80, 443];
    target.meta_data.users.insert(
        "admin".to_string(),
        UserRecord::regular("admin", hash_password("admin123"), 1000, false),
    );
    store.save(TARGET_IP, &target).unwrap();
    store
}

/// A shell logged into `local` as `user`, answering prompts from `answers`.
pub fn shell(user: &str, answers: &[&str]) -> Shell {
    let store = store();
    let is_root = user == "root";
    let cwd = if is_root { "/root".to_string() } else { format!("/home/{user}") };
    let session = Session::open(&store, "local", user, is_root, &cwd);
    Shell::new(
        CommandRegistry::with_providers(providers()),
        session,
        Box::new(store),
        ShellConfig::default(),
        Box::new(ScriptedPrompt::new(answers.iter().copied())),
    )
}

/// Run a line that must succeed; returns its output without colors.
pub fn run(sh: &mut Shell, line: &str) -> String {
    let out = sh.execute(line);
    assert!(out.errors.is_empty(), "`{line}` failed: {:?}", out.errors);
    strip_ansi_codes(&out.text).into_owned()
}

/// Run a line that must fail; returns its error messages without colors.
pub fn fail(sh: &mut Shell, line: &str) -> String {
    let out = sh.execute(line);
    assert!(!out.errors.is_empty(), "`{line}` unexpectedly succeeded: {}", out.text);
    strip_ansi_codes(&out.errors.join("\n")).into_owned()
}
