//! Built-in filesystem commands.

use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::{Directory, Node, path};

use crate::interpreter::{
    Command, CommandOutput, CommandRegistry, Environment, Provider, parse_flags,
};
use crate::style;

/// Every command group, in registration order.
pub fn providers() -> Vec<(&'static str, Provider)> {
    vec![
        ("filesystem", register_builtins as Provider),
        ("text", crate::text_commands::register_text_commands as Provider),
        ("users", crate::user_commands::register_user_commands as Provider),
        ("network", crate::network_commands::register_network_commands as Provider),
        ("system", crate::system_commands::register_system_commands as Provider),
    ]
}

/// Register the filesystem commands into a registry.
pub fn register_builtins(reg: &mut CommandRegistry) -> Result<()> {
    reg.register(Box::new(LsCmd));
    reg.register(Box::new(CdCmd));
    reg.register(Box::new(PwdCmd));
    reg.register(Box::new(CatCmd));
    reg.register(Box::new(MkdirCmd));
    reg.register(Box::new(RmCmd));
    reg.register(Box::new(TouchCmd));
    reg.register(Box::new(MvCmd));
    reg.register(Box::new(CpCmd));
    Ok(())
}

/// Run `op` on each argument's resolved path, stopping at the first
/// failure, then journal the paths that succeeded. The journal runs last
/// because it saves the record the operations just flushed.
fn apply_each(
    env: &Environment<'_>,
    args: &[&str],
    action: &str,
    mut op: impl FnMut(&[String]) -> Result<()>,
) -> Result<CommandOutput> {
    let mut done = Vec::new();
    let mut outcome = Ok(());
    for arg in args {
        let segments = env.resolve(arg);
        if let Err(e) = op(&segments) {
            outcome = Err(e);
            break;
        }
        done.push(path::display(&segments));
    }
    let journal = env.journal();
    for shown in &done {
        journal.log_file_activity(env.user(), shown, action);
    }
    outcome.map(|()| CommandOutput::None)
}

fn usage(cmd: &dyn Command) -> ShellError {
    ShellError::Command(format!("usage: {}", cmd.usage()))
}

// ---------------------------------------------------------------------------
// ls
// ---------------------------------------------------------------------------

struct LsCmd;
impl Command for LsCmd {
    fn name(&self) -> &str {
        "ls"
    }
    fn description(&self) -> &str {
        "List directory contents"
    }
    fn usage(&self) -> &str {
        "ls [-a] [-r] [path]"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let flags = parse_flags(args, "ar")?;
        let target = env.resolve(flags.positional.first().copied().unwrap_or("."));
        let fs = env.fs();
        let dir = fs.dir(&target)?;
        let plain = env.plain();
        let mut listing = Listing {
            all: flags.has('a'),
            recursive: flags.has('r'),
            plain,
            gate: &|shown: &str| env.can_access(shown),
            lines: Vec::new(),
        };
        listing.walk(dir, &mut target.clone(), 0);
        let lines = listing.lines;
        if lines.is_empty() && !plain {
            return Ok(CommandOutput::Text("Directory is empty".to_string()));
        }
        Ok(CommandOutput::Text(lines.join("\n")))
    }
}

struct Listing<'g> {
    all: bool,
    recursive: bool,
    plain: bool,
    /// Directories the gate closes are listed but not entered.
    gate: &'g dyn Fn(&str) -> bool,
    lines: Vec<String>,
}

impl Listing<'_> {
    fn walk(&mut self, dir: &Directory, at: &mut Vec<String>, depth: usize) {
        let indent = "  ".repeat(depth);
        for (name, node) in dir {
            if !self.all && name.starts_with('.') {
                continue;
            }
            let shown = match node {
                Node::Directory(_) if self.plain => name.clone(),
                Node::Directory(_) => style::directory(&format!("{name}/"), false),
                Node::Command => style::executable(name, self.plain),
                Node::File(_) => name.clone(),
            };
            self.lines.push(format!("{indent}{shown}"));
            let Node::Directory(children) = node else {
                continue;
            };
            at.push(name.clone());
            if self.recursive && (self.gate)(&path::display(at.as_slice())) {
                self.walk(children, at, depth + 1);
            }
            at.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// cd / pwd
// ---------------------------------------------------------------------------

struct CdCmd;
impl Command for CdCmd {
    fn name(&self) -> &str {
        "cd"
    }
    fn description(&self) -> &str {
        "Change directory"
    }
    fn usage(&self) -> &str {
        "cd [path]"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let target = match args {
            [] => path::resolve(&env.session.home(), "/"),
            [dir] => env.resolve(dir),
            _ => return Err(ShellError::Command("too many arguments".to_string())),
        };
        env.fs().dir(&target)?;
        env.cwd = path::display(&target);
        Ok(CommandOutput::None)
    }
}

struct PwdCmd;
impl Command for PwdCmd {
    fn name(&self) -> &str {
        "pwd"
    }
    fn description(&self) -> &str {
        "Print working directory"
    }
    fn usage(&self) -> &str {
        "pwd"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(env.cwd.clone()))
    }
}

// ---------------------------------------------------------------------------
// cat
// ---------------------------------------------------------------------------

struct CatCmd;
impl Command for CatCmd {
    fn name(&self) -> &str {
        "cat"
    }
    fn description(&self) -> &str {
        "Print file contents"
    }
    fn usage(&self) -> &str {
        "cat <file>..."
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        if args.is_empty() {
            return match env.stdin() {
                Some(input) => Ok(CommandOutput::Text(input.to_string())),
                None => Err(usage(self)),
            };
        }
        let fs = env.fs();
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let text = fs.read(&env.resolve(arg))?;
            let text = text.strip_suffix('\n').unwrap_or(&text).to_string();
            parts.push(text);
        }
        Ok(CommandOutput::Text(parts.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// mkdir / rm / touch
// ---------------------------------------------------------------------------

struct MkdirCmd;
impl Command for MkdirCmd {
    fn name(&self) -> &str {
        "mkdir"
    }
    fn description(&self) -> &str {
        "Create directories"
    }
    fn usage(&self) -> &str {
        "mkdir <dir>..."
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        if args.is_empty() {
            return Err(usage(self));
        }
        let mut fs = env.fs();
        apply_each(env, args, "MKDIR", |segments| fs.mkdir(segments))
    }
}

struct RmCmd;
impl Command for RmCmd {
    fn name(&self) -> &str {
        "rm"
    }
    fn description(&self) -> &str {
        "Remove files or directories"
    }
    fn usage(&self) -> &str {
        "rm [-r] [-f] <path>..."
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let flags = parse_flags(args, "rf")?;
        if flags.positional.is_empty() {
            return Err(usage(self));
        }
        let (recursive, force) = (flags.has('r'), flags.has('f'));
        let env = &*env;
        let mut fs = env.fs();
        apply_each(env, &flags.positional, "DELETE", |segments| {
            env.check_subtree(&fs, segments)?;
            match fs.remove(segments, recursive) {
                Err(ShellError::NotFound(_)) if force => Ok(()),
                other => other,
            }
        })
    }
}

struct TouchCmd;
impl Command for TouchCmd {
    fn name(&self) -> &str {
        "touch"
    }
    fn description(&self) -> &str {
        "Create empty files"
    }
    fn usage(&self) -> &str {
        "touch <file>..."
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        if args.is_empty() {
            return Err(usage(self));
        }
        let mut fs = env.fs();
        apply_each(env, args, "CREATE", |segments| fs.touch(segments).map(|_| ()))
    }
}

// ---------------------------------------------------------------------------
// mv / cp
// ---------------------------------------------------------------------------

struct MvCmd;
impl Command for MvCmd {
    fn name(&self) -> &str {
        "mv"
    }
    fn description(&self) -> &str {
        "Move or rename a file or directory"
    }
    fn usage(&self) -> &str {
        "mv <src> <dest>"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let [src, dest] = args else {
            return Err(usage(self));
        };
        let (src, dest) = (env.resolve(src), env.resolve(dest));
        let mut fs = env.fs();
        env.check_subtree(&fs, &src)?;
        let landed = fs.move_entry(&src, &dest)?;
        env.journal().log_file_activity(
            env.user(),
            &format!("{} -> {}", path::display(&src), path::display(&landed)),
            "MOVE",
        );
        Ok(CommandOutput::None)
    }
}

struct CpCmd;
impl Command for CpCmd {
    fn name(&self) -> &str {
        "cp"
    }
    fn description(&self) -> &str {
        "Copy a file or directory"
    }
    fn usage(&self) -> &str {
        "cp [-r] <src> <dest>"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let flags = parse_flags(args, "r")?;
        let [src, dest] = flags.positional.as_slice() else {
            return Err(usage(self));
        };
        let (src, dest) = (env.resolve(src), env.resolve(dest));
        let mut fs = env.fs();
        env.check_subtree(&fs, &src)?;
        let landed = fs.copy_entry(&src, &dest, flags.has('r'))?;
        env.journal().log_file_activity(
            env.user(),
            &format!("{} -> {}", path::display(&src), path::display(&landed)),
            "COPY",
        );
        Ok(CommandOutput::None)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{fail, run, shell};
    use hackshell_vfs::MachineFs;

    #[test]
    fn ls_lists_sorted_with_markers() {
        let mut sh = shell("root", &[]);
        let out = run(&mut sh, "ls /home");
        assert_eq!(out, "alice/\npublic/");
        let out = run(&mut sh, "ls /bin");
        assert!(out.lines().any(|l| l == "ls"));
    }

    #[test]
    fn ls_hidden_and_empty() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "mkdir /tmp/box");
        assert_eq!(run(&mut sh, "ls /tmp/box"), "Directory is empty");
        run(&mut sh, "touch /tmp/box/.secret");
        assert_eq!(run(&mut sh, "ls /tmp/box"), "Directory is empty");
        assert_eq!(run(&mut sh, "ls -a /tmp/box"), ".secret");
    }

    #[test]
    fn ls_recursive_indents() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "mkdir /tmp/a /tmp/a/b");
        run(&mut sh, "touch /tmp/a/b/c.txt");
        assert_eq!(run(&mut sh, "ls -r /tmp"), "a/\n  b/\n    c.txt");
    }

    #[test]
    fn ls_recursive_stops_at_closed_directories() {
        let mut sh = shell("alice", &[]);
        let out = run(&mut sh, "ls -r /");
        assert!(out.lines().any(|l| l == "root/"), "{out}");
        assert!(out.contains("notes.txt"), "{out}");
        assert!(!out.contains("secret.txt"), "{out}");
        assert!(!out.lines().any(|l| l.trim() == "ls"), "{out}");
    }

    #[test]
    fn ls_piped_is_plain() {
        let mut sh = shell("root", &[]);
        let out = sh.execute("ls /home | cat");
        assert!(out.errors.is_empty());
        assert_eq!(out.text, "alice\npublic");
    }

    #[test]
    fn cd_and_pwd() {
        let mut sh = shell("alice", &[]);
        assert_eq!(run(&mut sh, "pwd"), "/home/alice");
        run(&mut sh, "cd ..");
        assert_eq!(run(&mut sh, "pwd"), "/home");
        run(&mut sh, "cd");
        assert_eq!(sh.session().cwd, "/home/alice");
        assert!(fail(&mut sh, "cd nowhere").contains("not found"));
        assert!(fail(&mut sh, "cd notes.txt").contains("not a directory"));
        assert_eq!(sh.session().cwd, "/home/alice");
    }

    #[test]
    fn cat_reads_and_refuses_markers() {
        let mut sh = shell("root", &[]);
        assert_eq!(run(&mut sh, "cat /home/alice/notes.txt"), "buy milk\nfind the flag");
        let err = fail(&mut sh, "cat /bin/ls");
        assert!(err.contains("cannot view the contents of /bin/ls"), "{err}");
        assert!(fail(&mut sh, "cat /home").contains("is a directory"));
    }

    #[test]
    fn mkdir_twice_fails() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "mkdir /tmp/x");
        assert!(fail(&mut sh, "mkdir /tmp/x").contains("already exists"));
        assert!(fail(&mut sh, "mkdir /nope/x").contains("not found"));
    }

    #[test]
    fn rm_needs_recursive_for_populated_dirs() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "mkdir /tmp/d");
        run(&mut sh, "echo data > /tmp/d/f");
        assert!(fail(&mut sh, "rm /tmp/d").contains("not empty"));
        run(&mut sh, "rm -r /tmp/d");
        assert!(fail(&mut sh, "ls /tmp/d").contains("not found"));
        run(&mut sh, "rm -f /tmp/ghost");
    }

    #[test]
    fn touch_keeps_content() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "touch /home/alice/notes.txt");
        assert_eq!(run(&mut sh, "cat /home/alice/notes.txt"), "buy milk\nfind the flag");
        run(&mut sh, "touch /tmp/new.txt");
        assert_eq!(run(&mut sh, "cat /tmp/new.txt"), "");
    }

    #[test]
    fn mv_and_cp() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "mkdir /tmp/dst");
        run(&mut sh, "cp /home/alice/notes.txt /tmp/copy.txt");
        run(&mut sh, "mv /tmp/copy.txt /tmp/dst");
        assert_eq!(run(&mut sh, "ls /tmp/dst"), "copy.txt");
        assert_eq!(run(&mut sh, "cat /tmp/dst/copy.txt"), "buy milk\nfind the flag");
        assert!(fail(&mut sh, "cp /tmp/dst /tmp/dst2").contains("is a directory"));
        run(&mut sh, "cp -r /tmp/dst /tmp/dst2");
        assert_eq!(run(&mut sh, "cat /tmp/dst2/copy.txt"), "buy milk\nfind the flag");
        assert!(fail(&mut sh, "mv /tmp/dst").contains("usage"));
    }

    #[test]
    fn recursive_changes_refuse_closed_descendants() {
        let mut sh = shell("alice", &[]);
        assert!(fail(&mut sh, "cp -r / /tmp/all").contains("permission denied"));
        assert!(fail(&mut sh, "rm -r /").contains("permission denied"));
        assert!(fail(&mut sh, "mv / /tmp/all").contains("permission denied"));
        assert_eq!(run(&mut sh, "ls /tmp"), "Directory is empty");
        let fs = MachineFs::open(sh.store(), "local");
        let secret = fs.read(&hackshell_vfs::path::resolve("/root/secret.txt", "/"));
        assert_eq!(secret.unwrap(), "root only");
    }

    #[test]
    fn recursive_copy_of_open_trees_still_works() {
        let mut sh = shell("alice", &[]);
        run(&mut sh, "cp -r /home /tmp/h");
        assert_eq!(run(&mut sh, "cat /tmp/h/alice/notes.txt"), "buy milk\nfind the flag");
    }

    #[test]
    fn file_activity_is_journaled() {
        let mut sh = shell("root", &[]);
        run(&mut sh, "mkdir /tmp/j");
        let log = run(&mut sh, "cat /var/log/files.log");
        assert!(log.contains("USER[root] FILE[/tmp/j] ACTION[MKDIR]"), "{log}");
        let fs = MachineFs::open(sh.store(), "local");
        assert!(fs.tree().is_dir(&["tmp", "j"]));
    }
}
