//! The command executor.
//!
//! [`Shell::execute`] runs one input line: it splits the line into pipeline
//! stages on unquoted `|`, runs each stage with its own [`PipeContext`] and
//! feeds the captured output of one stage into the next. A failing stage
//! is reported and the next stage receives empty input. The whole line is
//! journaled once.

use hackshell_types::config::ShellConfig;
use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::password::verify_password;
use hackshell_vfs::{Journal, MachineFs, MachineStore, path};

use crate::interpreter::{
    CommandOutput, CommandRegistry, Environment, PipeContext, Redirect, parse_redirect,
    split_pipes, tokenize,
};
use crate::permission;
use crate::prompt::Prompt;
use crate::session::Session;
use crate::style;

/// Commands the shell handles itself: (name, description, usage).
const SHELL_BUILTINS: [(&str, &str, &str); 4] = [
    ("exit", "Close the current connection or leave the shell", "exit"),
    ("help", "List available commands", "help [command]"),
    ("reload", "Rebuild the command registry", "reload"),
    ("sudo", "Run a command as root", "sudo <command> [args...]"),
];

/// Result of one input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Output of the last stage.
    pub text: String,
    /// One message per failed stage.
    pub errors: Vec<String>,
    /// The outermost session asked to leave.
    pub exit: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Prefix an error with the stage's command name.
fn describe_error(stage: &str, error: &ShellError) -> String {
    match error {
        ShellError::UnknownCommand(_) | ShellError::Parse(_) => error.to_string(),
        _ => {
            let name = stage.split_whitespace().next().unwrap_or(stage);
            format!("{name}: {error}")
        },
    }
}

pub struct Shell {
    registry: CommandRegistry,
    session: Session,
    store: Box<dyn MachineStore>,
    config: ShellConfig,
    prompt: Box<dyn Prompt>,
    /// Signals of the stage currently running. Idle between lines.
    pipe: PipeContext,
    /// Sessions suspended by `ssh`, innermost last.
    connections: Vec<Session>,
    exit_requested: bool,
}

impl Shell {
    pub fn new(
        registry: CommandRegistry,
        session: Session,
        store: Box<dyn MachineStore>,
        config: ShellConfig,
        prompt: Box<dyn Prompt>,
    ) -> Self {
        Self {
            registry,
            session,
            store,
            config,
            prompt,
            pipe: PipeContext::default(),
            connections: Vec::new(),
            exit_requested: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &dyn MachineStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn pipe(&self) -> &PipeContext {
        &self.pipe
    }

    /// Number of suspended sessions below the current one.
    pub fn depth(&self) -> usize {
        self.connections.len()
    }

    fn journal(&self) -> Journal<'_> {
        Journal::new(self.store.as_ref(), &self.session.machine_id, self.config.log)
    }

    /// Run one input line.
    pub fn execute(&mut self, line: &str) -> RunOutput {
        let line = line.trim();
        if line.is_empty() {
            return RunOutput::default();
        }
        let machine_id = self.session.machine_id.clone();
        let user = self.session.user.clone();
        let cwd_before = self.session.cwd.clone();

        let saved = std::mem::take(&mut self.pipe);
        let mut out = self.run_line(line);
        self.pipe = saved;
        out.exit = std::mem::take(&mut self.exit_requested);

        // Journal on the machine the line was typed on, even after ssh/exit.
        let journal = Journal::new(self.store.as_ref(), &machine_id, self.config.log);
        journal.log_command(&user, line, &cwd_before, out.success());
        if self.session.machine_id == machine_id && self.session.cwd != cwd_before {
            journal.log_system(
                "DIRECTORY_CHANGE",
                &format!("{user}: {cwd_before} -> {}", self.session.cwd),
            );
        }
        self.session.refresh(self.store.as_ref());
        out
    }

    fn run_line(&mut self, line: &str) -> RunOutput {
        let mut out = RunOutput::default();
        let stages = match split_pipes(line) {
            Ok(stages) => stages,
            Err(e) => {
                out.errors.push(describe_error(line, &e));
                return out;
            },
        };
        let total = stages.len();
        let mut carried = String::new();
        for (index, stage) in stages.iter().enumerate() {
            self.pipe = PipeContext::stage(index, total, std::mem::take(&mut carried));
            log::debug!("stage {}/{total}: {stage}", index + 1);
            match self.run_stage(stage) {
                Ok(text) => carried = text,
                Err(e) => {
                    log::debug!("stage failed: {e}");
                    out.errors.push(describe_error(stage, &e));
                },
            }
        }
        out.text = carried;
        out
    }

    fn run_stage(&mut self, stage: &str) -> Result<String> {
        let (command, redirect) = parse_redirect(stage)?;
        let tokens = tokenize(command)?;
        if redirect.is_some() {
            // Output headed for a file is plain text.
            self.pipe.forwarding = true;
        }
        let text = if tokens.is_empty() {
            String::new()
        } else {
            self.dispatch(&tokens, self.session.is_root)?
        };
        match redirect {
            Some(redirect) => {
                self.write_redirect(&redirect, &text)?;
                Ok(String::new())
            },
            None => Ok(text),
        }
    }

    fn dispatch(&mut self, tokens: &[String], elevated: bool) -> Result<String> {
        let name = tokens[0].as_str();
        let args: Vec<&str> = tokens[1..].iter().map(String::as_str).collect();
        match name {
            "exit" => return Ok(self.exit()),
            "help" => return self.help(&args),
            "reload" => return Ok(self.registry.reload().to_string()),
            "sudo" => return self.sudo(&tokens[1..]),
            _ => {},
        }

        let machine = self.store.load(&self.session.machine_id);
        let Some(cmd) = self
            .registry
            .get(name)
            .filter(|_| machine.has_command(name))
        else {
            return Err(ShellError::UnknownCommand(name.to_string()));
        };
        if !elevated {
            for target in permission::gated_targets(name, &args) {
                self.check_access(&path::resolve_display(target, &self.session.cwd))?;
            }
        }

        let mut env = Environment {
            cwd: self.session.cwd.clone(),
            session: &self.session,
            store: self.store.as_ref(),
            config: &self.config,
            prompt: self.prompt.as_mut(),
            pipe: self.pipe.clone(),
            is_root: elevated,
        };
        let result = cmd.execute(&args, &mut env);
        let cwd = env.cwd;
        self.session.cwd = cwd;

        match result? {
            CommandOutput::Text(text) => Ok(text),
            CommandOutput::None => Ok(String::new()),
            CommandOutput::Connect {
                machine_id,
                user,
                is_root,
            } => Ok(self.connect(&machine_id, &user, is_root)),
        }
    }

    fn check_access(&self, shown: &str) -> Result<()> {
        let allowed = permission::check_access(
            shown,
            &self.session.user,
            self.session.user_record(),
            self.session.is_root,
        );
        if allowed {
            Ok(())
        } else {
            Err(ShellError::Unauthorized(shown.to_string()))
        }
    }

    fn write_redirect(&self, redirect: &Redirect, text: &str) -> Result<()> {
        let segments = path::resolve(&redirect.path, &self.session.cwd);
        let shown = path::display(&segments);
        self.check_access(&shown)?;
        let mut fs = MachineFs::open(self.store.as_ref(), &self.session.machine_id);
        let content = if redirect.append {
            match fs.read(&segments) {
                Ok(existing) if !existing.is_empty() && !existing.ends_with('\n') => {
                    format!("{existing}\n{text}")
                },
                Ok(existing) => format!("{existing}{text}"),
                Err(ShellError::NotFound(_)) => text.to_string(),
                Err(e) => return Err(e),
            }
        } else {
            text.to_string()
        };
        fs.write(&segments, &content)?;
        let action = if redirect.append { "APPEND" } else { "WRITE" };
        self.journal()
            .log_file_activity(&self.session.user, &shown, action);
        Ok(())
    }

    fn help(&self, args: &[&str]) -> Result<String> {
        let machine = self.store.load(&self.session.machine_id);
        if let Some(&name) = args.first() {
            if let Some((name, description, usage)) =
                SHELL_BUILTINS.iter().find(|(n, ..)| *n == name)
            {
                return Ok(format!("{name} (shell)\n  {description}\n  Usage: {usage}"));
            }
            return match self.registry.get(name).filter(|_| machine.has_command(name)) {
                Some(cmd) => Ok(format!(
                    "{} ({})\n  {}\n  Usage: {}",
                    cmd.name(),
                    cmd.category(),
                    cmd.description(),
                    cmd.usage()
                )),
                None => Err(ShellError::UnknownCommand(name.to_string())),
            };
        }

        let plain = self.pipe.forwarding;
        let mut entries: Vec<(&str, &str)> = self
            .registry
            .list_commands()
            .into_iter()
            .filter(|(name, _)| machine.has_command(name))
            .collect();
        entries.extend(SHELL_BUILTINS.iter().map(|(name, desc, _)| (*name, *desc)));
        entries.sort_by_key(|(name, _)| *name);

        let mut lines = Vec::with_capacity(entries.len() + 3);
        if !plain {
            lines.push(style::header(
                &format!("Available commands ({}):", entries.len()),
                false,
            ));
        }
        for (name, desc) in &entries {
            let padded = format!("{name:10}");
            lines.push(format!(
                "  {} {desc}",
                style::paint(&padded, plain, |s| s.cyan())
            ));
        }
        if !plain {
            lines.push(String::new());
            lines.push("Type 'help <command>' for details.".to_string());
        }
        Ok(lines.join("\n"))
    }

    fn sudo(&mut self, args: &[String]) -> Result<String> {
        if args.is_empty() {
            return Err(ShellError::Command(
                "usage: sudo <command> [args...]".to_string(),
            ));
        }
        if !self.session.is_root {
            let user = self.session.user.clone();
            let stored = self
                .session
                .user_record()
                .map(|r| r.password.clone())
                .unwrap_or_default();
            let attempts = self.config.sudo_attempts.max(1);
            let mut granted = false;
            for attempt in 1..=attempts {
                let Some(answer) = self
                    .prompt
                    .read_secret(&format!("[sudo] password for {user}: "))
                else {
                    break;
                };
                if verify_password(&answer, &stored) {
                    granted = true;
                    break;
                }
                self.journal().log_auth(&user, "SUDO", false);
                if attempt < attempts {
                    self.prompt.message("Sorry, try again.");
                }
            }
            if !granted {
                return Err(ShellError::AuthFailure(format!(
                    "{attempts} incorrect password attempts"
                )));
            }
            self.journal().log_auth(&user, "SUDO", true);
        }
        self.dispatch(args, true)
    }

    /// Suspend the current session and open one on `machine_id`.
    fn connect(&mut self, machine_id: &str, user: &str, is_root: bool) -> String {
        let next = Session::open(self.store.as_ref(), machine_id, user, is_root, "/home");
        let previous = std::mem::replace(&mut self.session, next);
        self.connections.push(previous);
        log::info!("connected to {machine_id} as {user}");
        format!("Connected to {} ({machine_id})", self.session.host())
    }

    /// Return to the previous session. Returns the host that was left, or
    /// `None` at the outermost session.
    pub fn disconnect(&mut self) -> Option<String> {
        let previous = self.connections.pop()?;
        let remote = std::mem::replace(&mut self.session, previous);
        let (source, dest) = (self.session.meta.ip.clone(), remote.meta.ip.clone());
        Journal::new(self.store.as_ref(), &remote.machine_id, self.config.log)
            .log_network(&source, &dest, "DISCONNECT", &[22]);
        self.journal()
            .log_network(&source, &dest, "DISCONNECT", &[22]);
        log::info!("disconnected from {}", remote.machine_id);
        Some(remote.host().to_string())
    }

    fn exit(&mut self) -> String {
        match self.disconnect() {
            Some(host) => format!("Connection to {host} closed."),
            None => {
                self.exit_requested = true;
                "logout".to_string()
            },
        }
    }
}
