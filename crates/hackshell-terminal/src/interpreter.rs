//! Command trait, registry, and line parsing.
//!
//! The [`Shell`](crate::shell::Shell) owns a [`CommandRegistry`] and hands
//! every handler an [`Environment`] describing the session, the store and
//! the handler's position in a pipeline.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use hackshell_types::config::ShellConfig;
use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::node::Entry;
use hackshell_vfs::{Journal, MachineFs, MachineStore, path};

use crate::permission;
use crate::prompt::Prompt;
use crate::session::Session;

/// Output produced by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Plain text lines.
    Text(String),
    /// Command produced no visible output.
    None,
    /// Signal to the shell to open a session on another machine.
    Connect {
        machine_id: String,
        user: String,
        is_root: bool,
    },
}

/// Per-stage pipeline signals.
///
/// A default context means "not part of a pipeline".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipeContext {
    /// This stage received input from an earlier stage.
    pub received: bool,
    /// This stage's output feeds a later stage or a file.
    pub forwarding: bool,
    /// Captured output of the previous stage.
    pub input: String,
}

impl PipeContext {
    /// Context for stage `index` of `total`.
    pub fn stage(index: usize, total: usize, input: String) -> Self {
        Self {
            received: index > 0,
            forwarding: index + 1 < total,
            input,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything a command may touch while it runs.
pub struct Environment<'a> {
    /// Working directory on entry; the shell adopts its value on return.
    pub cwd: String,
    pub session: &'a Session,
    pub store: &'a dyn MachineStore,
    pub config: &'a ShellConfig,
    /// Interactive input for passwords and confirmations.
    pub prompt: &'a mut dyn Prompt,
    pub pipe: PipeContext,
    /// Effective root flag for this stage (the session flag or `sudo`).
    pub is_root: bool,
}

impl<'a> Environment<'a> {
    pub fn machine_id(&self) -> &str {
        &self.session.machine_id
    }

    pub fn user(&self) -> &str {
        &self.session.user
    }

    /// Resolve `path` against the working directory.
    pub fn resolve(&self, path: &str) -> Vec<String> {
        path::resolve(path, &self.cwd)
    }

    /// Load the current machine for one transaction.
    pub fn fs(&self) -> MachineFs<'a> {
        MachineFs::open(self.store, &self.session.machine_id)
    }

    /// Audit journal of the current machine.
    pub fn journal(&self) -> Journal<'a> {
        self.journal_for(&self.session.machine_id)
    }

    pub fn journal_for(&self, machine_id: &str) -> Journal<'a> {
        Journal::new(self.store, machine_id, self.config.log)
    }

    /// Whether the access gate lets this stage reach the absolute `shown`.
    pub fn can_access(&self, shown: &str) -> bool {
        permission::check_access(
            shown,
            &self.session.user,
            self.session.user_record(),
            self.is_root,
        )
    }

    /// Fail with `Unauthorized` if anything below the directory at
    /// `segments` is closed to this stage. Files and missing paths pass.
    pub fn check_subtree(&self, fs: &MachineFs<'_>, segments: &[String]) -> Result<()> {
        let Some(Entry::Directory(dir)) = fs.lookup(segments) else {
            return Ok(());
        };
        match permission::first_denied(dir, segments, &|shown: &str| self.can_access(shown)) {
            Some(denied) => Err(ShellError::Unauthorized(denied)),
            None => Ok(()),
        }
    }

    /// Piped input, if this stage received any.
    pub fn stdin(&self) -> Option<&str> {
        self.pipe.received.then_some(self.pipe.input.as_str())
    }

    /// Whether output should be plain, undecorated text.
    pub fn plain(&self) -> bool {
        self.pipe.forwarding
    }
}

/// A single executable command.
pub trait Command {
    /// The command name (what the user types).
    fn name(&self) -> &str;

    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Usage string (e.g. "ls \[-a\] \[path\]").
    fn usage(&self) -> &str;

    /// Command category for grouping in `help` output.
    fn category(&self) -> &str {
        "general"
    }

    /// Execute the command with the given arguments and environment.
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput>;
}

/// Registers one group of commands.
pub type Provider = fn(&mut CommandRegistry) -> Result<()>;

/// Outcome of [`CommandRegistry::reload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub count: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub errors: Vec<String>,
}

impl fmt::Display for ReloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "{error}")?;
        }
        write!(f, "Reloaded {} commands", self.count)?;
        if !self.added.is_empty() {
            write!(f, "\n  added: {}", self.added.join(", "))?;
        }
        if !self.removed.is_empty() {
            write!(f, "\n  removed: {}", self.removed.join(", "))?;
        }
        Ok(())
    }
}

/// Registry of available commands.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
    providers: Vec<(&'static str, Provider)>,
}

impl CommandRegistry {
    /// Create an empty command registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            providers: Vec::new(),
        }
    }

    /// Build a registry from named providers, run in order.
    pub fn with_providers(providers: Vec<(&'static str, Provider)>) -> Self {
        let mut reg = Self {
            commands: HashMap::new(),
            providers,
        };
        let report = reg.reload();
        for error in &report.errors {
            log::warn!("{error}");
        }
        reg
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Drop every binding and re-run the providers. A failing provider is
    /// reported and the rest still run.
    pub fn reload(&mut self) -> ReloadReport {
        let before: BTreeSet<String> = self.commands.keys().cloned().collect();
        self.commands.clear();
        let mut errors = Vec::new();
        let providers = self.providers.clone();
        for (name, provider) in providers {
            if let Err(e) = provider(self) {
                errors.push(format!("Error loading {name}: {e}"));
            }
        }
        let after: BTreeSet<String> = self.commands.keys().cloned().collect();
        log::debug!("registry reloaded: {} commands", after.len());
        ReloadReport {
            count: after.len(),
            added: after.difference(&before).cloned().collect(),
            removed: before.difference(&after).cloned().collect(),
            errors,
        }
    }

    /// Return a sorted list of (name, description) pairs.
    pub fn list_commands(&self) -> Vec<(&str, &str)> {
        let mut cmds: Vec<(&str, &str)> = self
            .commands
            .values()
            .map(|c| (c.name(), c.description()))
            .collect();
        cmds.sort_by_key(|(name, _)| *name);
        cmds
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tokenizer: handles single quotes, double quotes, and backslash escapes.
// ---------------------------------------------------------------------------

/// Tokenize a command line respecting quotes and backslash escapes.
///
/// - Single-quoted strings preserve all characters literally.
/// - Inside double quotes only `\"` and `\\` are escapes; other
///   backslashes stay, so `"a\nb"` reaches the command as written.
/// - Backslash escapes the next character outside of quotes.
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    // Distinguishes `""` (an empty token) from no token at all.
    let mut quoted = false;

    while let Some(ch) = chars.next() {
        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                current.push(ch);
            }
        } else if in_double {
            match ch {
                '"' => in_double = false,
                '\\' => match chars.peek() {
                    Some(&next) if next == '"' || next == '\\' => {
                        chars.next();
                        current.push(next);
                    },
                    _ => current.push('\\'),
                },
                _ => current.push(ch),
            }
        } else {
            match ch {
                '\'' => {
                    in_single = true;
                    quoted = true;
                },
                '"' => {
                    in_double = true;
                    quoted = true;
                },
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                },
                c if c.is_whitespace() => {
                    if !current.is_empty() || quoted {
                        tokens.push(std::mem::take(&mut current));
                    }
                    quoted = false;
                },
                _ => current.push(ch),
            }
        }
    }

    if in_single {
        return Err(ShellError::Parse("unterminated single quote".to_string()));
    }
    if in_double {
        return Err(ShellError::Parse("unterminated double quote".to_string()));
    }

    if !current.is_empty() || quoted {
        tokens.push(current);
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Pipe splitting
// ---------------------------------------------------------------------------

/// Split on unquoted `|`. A blank line yields no stages; an empty stage
/// anywhere in a pipeline is a parse error.
pub fn split_pipes(input: &str) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        if in_single {
            current.push(ch);
            if ch == '\'' {
                in_single = false;
            }
            continue;
        }
        if in_double {
            current.push(ch);
            if ch == '"' {
                in_double = false;
            } else if ch == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                in_single = true;
                current.push(ch);
            },
            '"' => {
                in_double = true;
                current.push(ch);
            },
            '\\' => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            },
            '|' => {
                segments.push(std::mem::take(&mut current));
            },
            _ => current.push(ch),
        }
    }
    segments.push(current);

    let stages: Vec<String> = segments.iter().map(|s| s.trim().to_string()).collect();
    if let [only] = stages.as_slice() {
        if only.is_empty() {
            return Ok(Vec::new());
        }
    }
    if stages.iter().any(String::is_empty) {
        return Err(ShellError::Parse(
            "syntax error: empty command in pipeline".to_string(),
        ));
    }
    Ok(stages)
}

// ---------------------------------------------------------------------------
// Redirection parsing
// ---------------------------------------------------------------------------

/// Target of `>` or `>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub append: bool,
}

/// Split a trailing `>`/`>>` off a stage. The target is tokenized, so it
/// may be quoted.
pub fn parse_redirect(input: &str) -> Result<(&str, Option<Redirect>)> {
    let bytes = input.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;
    let mut last_redirect: Option<(usize, bool)> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if in_single {
            if b == b'\'' {
                in_single = false;
            }
        } else if in_double {
            if b == b'"' {
                in_double = false;
            } else if b == b'\\' {
                i += 1;
            }
        } else {
            match b {
                b'\'' => in_single = true,
                b'"' => in_double = true,
                b'\\' => i += 1,
                b'>' => {
                    if last_redirect.is_some() {
                        return Err(ShellError::Parse(
                            "syntax error: more than one redirect".to_string(),
                        ));
                    }
                    if i + 1 < bytes.len() && bytes[i + 1] == b'>' {
                        last_redirect = Some((i, true));
                        i += 1;
                    } else {
                        last_redirect = Some((i, false));
                    }
                },
                _ => {},
            }
        }
        i += 1;
    }

    let Some((pos, append)) = last_redirect else {
        return Ok((input, None));
    };
    let skip = if append { 2 } else { 1 };
    let target = tokenize(&input[pos + skip..])?;
    match target.as_slice() {
        [path] if !path.is_empty() => Ok((
            input[..pos].trim_end(),
            Some(Redirect {
                path: path.clone(),
                append,
            }),
        )),
        [] | [_] => Err(ShellError::Parse(
            "syntax error: expected a file after '>'".to_string(),
        )),
        _ => Err(ShellError::Parse(
            "syntax error: one file expected after '>'".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Flag parsing
// ---------------------------------------------------------------------------

/// Short flags seen on a command line plus its positional arguments.
#[derive(Debug, Default)]
pub struct Flags<'a> {
    set: BTreeSet<char>,
    pub positional: Vec<&'a str>,
}

impl Flags<'_> {
    pub fn has(&self, flag: char) -> bool {
        self.set.contains(&flag)
    }
}

/// Split `args` into short flags from `known` and positional arguments.
/// Bundles like `-rf` are accepted; `--` ends flag parsing.
pub fn parse_flags<'a>(args: &[&'a str], known: &str) -> Result<Flags<'a>> {
    let mut flags = Flags::default();
    let mut only_positional = false;
    for &arg in args {
        if only_positional || arg == "-" || !arg.starts_with('-') {
            flags.positional.push(arg);
            continue;
        }
        if arg == "--" {
            only_positional = true;
            continue;
        }
        for c in arg[1..].chars() {
            if !known.contains(c) {
                return Err(ShellError::Command(format!("invalid option -- '{c}'")));
            }
            flags.set.insert(c);
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCmd;
    impl Command for EchoCmd {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Print arguments"
        }
        fn usage(&self) -> &str {
            "echo [text...]"
        }
        fn execute(&self, args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
            Ok(CommandOutput::Text(args.join(" ")))
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
        fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
            Ok(CommandOutput::Text(env.cwd.clone()))
        }
    }

    fn both(reg: &mut CommandRegistry) -> Result<()> {
        reg.register(Box::new(EchoCmd));
        reg.register(Box::new(PwdCmd));
        Ok(())
    }

    fn echo_only(reg: &mut CommandRegistry) -> Result<()> {
        reg.register(Box::new(EchoCmd));
        Ok(())
    }

    fn broken(_reg: &mut CommandRegistry) -> Result<()> {
        Err(ShellError::Command("syntax error in module".to_string()))
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = CommandRegistry::new();
        reg.register(Box::new(EchoCmd));
        assert!(reg.contains("echo"));
        assert!(!reg.contains("ls"));
        assert_eq!(reg.get("echo").map(|c| c.usage()), Some("echo [text...]"));
        assert_eq!(reg.get("echo").map(|c| c.category()), Some("general"));
    }

    #[test]
    fn list_commands_sorted() {
        let reg = CommandRegistry::with_providers(vec![("core", both)]);
        let names: Vec<&str> = reg.list_commands().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["echo", "pwd"]);
    }

    #[test]
    fn reload_reports_changes_and_errors() {
        let mut reg = CommandRegistry::with_providers(vec![("core", both)]);
        reg.providers = vec![("core", echo_only), ("extra", broken)];
        let report = reg.reload();
        assert_eq!(report.count, 1);
        assert!(report.added.is_empty());
        assert_eq!(report.removed, vec!["pwd".to_string()]);
        assert_eq!(
            report.errors,
            vec!["Error loading extra: syntax error in module".to_string()]
        );
        let text = report.to_string();
        assert!(text.contains("Reloaded 1 commands"));
        assert!(text.contains("removed: pwd"));
    }

    #[test]
    fn pipe_context_positions() {
        assert!(PipeContext::default().is_idle());
        let first = PipeContext::stage(0, 3, String::new());
        assert!(!first.received && first.forwarding);
        let middle = PipeContext::stage(1, 3, "x".into());
        assert!(middle.received && middle.forwarding);
        let last = PipeContext::stage(2, 3, "y".into());
        assert!(last.received && !last.forwarding);
        assert!(PipeContext::stage(0, 1, String::new()).is_idle());
    }

    #[test]
    fn tokenize_simple() {
        assert_eq!(tokenize("ls -a  /home").unwrap(), vec!["ls", "-a", "/home"]);
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn tokenize_quotes() {
        assert_eq!(
            tokenize("echo 'hello world' \"a b\"").unwrap(),
            vec!["echo", "hello world", "a b"]
        );
        assert_eq!(tokenize("echo \"\"").unwrap(), vec!["echo", ""]);
        assert_eq!(tokenize("a\"b c\"d").unwrap(), vec!["ab cd"]);
    }

    #[test]
    fn tokenize_escapes() {
        assert_eq!(tokenize(r"echo a\ b").unwrap(), vec!["echo", "a b"]);
        assert_eq!(tokenize(r#"echo "say \"hi\"""#).unwrap(), vec!["echo", "say \"hi\""]);
        assert_eq!(tokenize(r#"echo "a\nb""#).unwrap(), vec!["echo", r"a\nb"]);
        assert_eq!(tokenize(r"echo 'x\y'").unwrap(), vec!["echo", r"x\y"]);
    }

    #[test]
    fn tokenize_unterminated() {
        assert!(matches!(tokenize("echo 'oops"), Err(ShellError::Parse(_))));
        assert!(matches!(tokenize("echo \"oops"), Err(ShellError::Parse(_))));
    }

    #[test]
    fn split_pipes_respects_quotes() {
        assert_eq!(split_pipes("ls | grep a").unwrap(), vec!["ls", "grep a"]);
        assert_eq!(split_pipes("echo 'a|b' | cat").unwrap(), vec!["echo 'a|b'", "cat"]);
        assert_eq!(split_pipes("echo \"x | y\"").unwrap(), vec!["echo \"x | y\""]);
        assert_eq!(split_pipes(r"echo a\|b").unwrap(), vec![r"echo a\|b"]);
        assert!(split_pipes("  ").unwrap().is_empty());
    }

    #[test]
    fn split_pipes_rejects_empty_stages() {
        for line in ["a || b", "a |", "| a", "a |  | b"] {
            assert!(
                matches!(split_pipes(line), Err(ShellError::Parse(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn parse_redirect_variants() {
        let (cmd, r) = parse_redirect("echo hi > out.txt").unwrap();
        assert_eq!(cmd, "echo hi");
        assert_eq!(
            r,
            Some(Redirect {
                path: "out.txt".into(),
                append: false
            })
        );

        let (cmd, r) = parse_redirect("echo hi >> 'my log.txt'").unwrap();
        assert_eq!(cmd, "echo hi");
        assert_eq!(
            r,
            Some(Redirect {
                path: "my log.txt".into(),
                append: true
            })
        );

        let (cmd, r) = parse_redirect("echo 'a > b'").unwrap();
        assert_eq!(cmd, "echo 'a > b'");
        assert!(r.is_none());
    }

    #[test]
    fn parse_redirect_needs_one_target() {
        assert!(matches!(parse_redirect("echo hi >"), Err(ShellError::Parse(_))));
        assert!(matches!(parse_redirect("echo hi > a b"), Err(ShellError::Parse(_))));
    }

    #[test]
    fn parse_redirect_rejects_a_second_operator() {
        assert!(matches!(parse_redirect("echo a > b > c"), Err(ShellError::Parse(_))));
        assert!(matches!(parse_redirect("echo a >> b > c"), Err(ShellError::Parse(_))));
        let (cmd, r) = parse_redirect("echo 'x > y' > c").unwrap();
        assert_eq!(cmd, "echo 'x > y'");
        assert_eq!(r.map(|r| r.path), Some("c".to_string()));
    }

    #[test]
    fn flags_and_positionals() {
        let f = parse_flags(&["-rf", "a", "-", "--", "-b"], "rf").unwrap();
        assert!(f.has('r') && f.has('f'));
        assert_eq!(f.positional, vec!["a", "-", "-b"]);
        assert!(parse_flags(&["-x"], "a").is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn plain_words_tokenize_to_themselves(words in proptest::collection::vec("[a-z0-9./_-]{1,8}", 0..6)) {
                let line = words.join(" ");
                prop_assert_eq!(tokenize(&line).unwrap(), words);
            }

            #[test]
            fn single_quoting_preserves_text(text in "[^']{0,20}") {
                let tokens = tokenize(&format!("echo '{text}'")).unwrap();
                prop_assert_eq!(tokens, vec!["echo".to_string(), text]);
            }

            #[test]
            fn quoted_pipes_never_split(text in "[a-z| ]{0,20}") {
                let stages = split_pipes(&format!("echo '{text}' | cat")).unwrap();
                prop_assert_eq!(stages.len(), 2);
            }
        }
    }
}
