//! Advisory access checks for path-affecting commands.
//!
//! The shell consults the gate before dispatch; [`MachineFs`] itself does
//! not enforce it.
//!
//! [`MachineFs`]: hackshell_vfs::MachineFs

use hackshell_vfs::machine::capability;
use hackshell_vfs::path::{self, is_within};
use hackshell_vfs::{Directory, Node, UserRecord};

/// Commands whose path arguments are checked before dispatch.
pub const GATED_COMMANDS: &[&str] = &[
    "cat", "ls", "cd", "rm", "mkdir", "touch", "mv", "cp", "grep",
];

const PUBLIC_DIRS: [&str; 2] = ["public", "shared"];

/// Whether `user` may touch the absolute `path`.
///
/// Rules apply in order: root or `all` passes, `/root` is closed, `/bin`
/// and `/var` need their capability, and below `/home` a user always
/// reaches their own home, the shared directories need `public` and
/// anything else needs `home`. Every other path is open.
pub fn check_access(path: &str, user: &str, record: Option<&UserRecord>, is_root: bool) -> bool {
    let has = |tag: &str| record.is_some_and(|r| r.has_capability(tag));
    if is_root || record.is_some_and(|r| r.is_root) || has(capability::ALL) {
        return true;
    }
    let segments = path::resolve(path, "/");

    if is_within(&segments, &["root"]) {
        return false;
    }
    if is_within(&segments, &["bin"]) {
        return has(capability::BIN);
    }
    if is_within(&segments, &["var"]) {
        return has(capability::VAR);
    }
    // `/home` itself is open; only paths below it are gated.
    if segments.len() > 1 && segments[0] == "home" {
        let own_home = match record {
            Some(r) if !r.home.is_empty() => path::resolve(&r.home, "/"),
            _ => vec!["home".to_string(), user.to_string()],
        };
        if !own_home.is_empty() && is_within(&segments, &own_home) {
            return true;
        }
        if PUBLIC_DIRS.contains(&segments[1].as_str()) {
            return has(capability::PUBLIC);
        }
        return has(capability::HOME);
    }
    true
}

/// First path strictly below `dir` (found at `segments`) that `allowed`
/// rejects, in tree order.
pub fn first_denied(
    dir: &Directory,
    segments: &[String],
    allowed: &dyn Fn(&str) -> bool,
) -> Option<String> {
    for (name, node) in dir {
        let mut child = segments.to_vec();
        child.push(name.clone());
        let shown = path::display(&child);
        if !allowed(&shown) {
            return Some(shown);
        }
        if let Node::Directory(children) = node {
            if let Some(denied) = first_denied(children, &child, allowed) {
                return Some(denied);
            }
        }
    }
    None
}

/// Arguments of `command` that name paths the gate must check.
///
/// Every non-flag argument counts, except the pattern of `grep`.
pub fn gated_targets<'a>(command: &str, args: &[&'a str]) -> Vec<&'a str> {
    if !GATED_COMMANDS.contains(&command) {
        return Vec::new();
    }
    let mut targets: Vec<&str> = args
        .iter()
        .copied()
        .filter(|a| !a.is_empty() && (!a.starts_with('-') || *a == "-"))
        .collect();
    if command == "grep" && !targets.is_empty() {
        targets.remove(0);
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(name: &str) -> UserRecord {
        UserRecord::regular(name, String::new(), 1000, false)
    }

    fn with_caps(name: &str, caps: &[&str]) -> UserRecord {
        let mut r = regular(name);
        r.permissions = caps.iter().map(|c| c.to_string()).collect();
        r
    }

    #[test]
    fn root_and_all_pass_everywhere() {
        let all = with_caps("ops", &["all"]);
        for p in ["/root/secret", "/bin/ls", "/var/log/auth.log", "/home/bob/x"] {
            assert!(check_access(p, "root", None, true));
            assert!(check_access(p, "ops", Some(&all), false));
        }
    }

    #[test]
    fn root_home_is_closed() {
        let alice = regular("alice");
        assert!(!check_access("/root", "alice", Some(&alice), false));
        assert!(!check_access("/root/notes.txt", "alice", Some(&alice), false));
        assert!(check_access("/rootkit", "alice", Some(&alice), false));
    }

    #[test]
    fn bin_and_var_need_capabilities() {
        let alice = regular("alice");
        assert!(!check_access("/bin/ls", "alice", Some(&alice), false));
        assert!(!check_access("/var/log", "alice", Some(&alice), false));
        let ops = with_caps("ops", &["bin", "var"]);
        assert!(check_access("/bin/ls", "ops", Some(&ops), false));
        assert!(check_access("/var/log/system.log", "ops", Some(&ops), false));
    }

    #[test]
    fn own_home_without_home_capability() {
        let carol = with_caps("carol", &[]);
        assert!(check_access("/home/carol", "carol", Some(&carol), false));
        assert!(check_access("/home/carol/notes.txt", "carol", Some(&carol), false));
        assert!(!check_access("/home/dave/notes.txt", "carol", Some(&carol), false));
        assert!(!check_access("/home/carolyn", "carol", Some(&carol), false));
    }

    #[test]
    fn other_homes_need_home_capability() {
        let alice = regular("alice");
        assert!(check_access("/home/bob/diary", "alice", Some(&alice), false));
    }

    #[test]
    fn public_dirs_need_public() {
        let carol = with_caps("carol", &["home"]);
        assert!(!check_access("/home/public/readme", "carol", Some(&carol), false));
        assert!(!check_access("/home/shared", "carol", Some(&carol), false));
        let alice = regular("alice");
        assert!(check_access("/home/public/readme", "alice", Some(&alice), false));
    }

    #[test]
    fn home_root_and_other_paths_are_open() {
        let carol = with_caps("carol", &[]);
        assert!(check_access("/home", "carol", Some(&carol), false));
        assert!(check_access("/tmp/x", "carol", Some(&carol), false));
        assert!(check_access("/", "carol", Some(&carol), false));
    }

    #[test]
    fn missing_record_uses_default_home() {
        assert!(check_access("/home/guest/a", "guest", None, false));
        assert!(!check_access("/home/other/a", "guest", None, false));
        assert!(!check_access("/bin", "guest", None, false));
    }

    #[test]
    fn targets_skip_flags_and_grep_pattern() {
        assert_eq!(gated_targets("rm", &["-r", "a", "b"]), vec!["a", "b"]);
        assert_eq!(gated_targets("mv", &["src", "dst"]), vec!["src", "dst"]);
        assert_eq!(gated_targets("grep", &["-i", "pat", "f1"]), vec!["f1"]);
        assert!(gated_targets("grep", &["pat"]).is_empty());
        assert!(gated_targets("echo", &["/root/x"]).is_empty());
    }

    #[test]
    fn first_denied_walks_below_the_start() {
        let mut tree = Directory::new();
        let mut home = Directory::new();
        home.insert("alice".to_string(), Node::Directory(Directory::new()));
        home.insert("zed".to_string(), Node::File("home/zed".to_string()));
        tree.insert("home".to_string(), Node::Directory(home));
        let mut root = Directory::new();
        root.insert("key".to_string(), Node::File("root/key".to_string()));
        tree.insert("root".to_string(), Node::Directory(root));

        let alice = regular("alice");
        let gate = |p: &str| check_access(p, "alice", Some(&alice), false);
        assert_eq!(first_denied(&tree, &[], &gate), Some("/root".to_string()));
        let at = vec!["home".to_string()];
        let home = match tree.get("home") {
            Some(Node::Directory(d)) => d,
            _ => unreachable!(),
        };
        assert_eq!(first_denied(home, &at, &gate), None);
        let loner = with_caps("alice", &[]);
        let gate = |p: &str| check_access(p, "alice", Some(&loner), false);
        assert_eq!(first_denied(home, &at, &gate), Some("/home/zed".to_string()));
    }
}
