//! Text commands: echo, grep.

use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::node::{Entry, files_under};
use hackshell_vfs::path;
use regex::{Captures, RegexBuilder};

use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment, parse_flags};
use crate::style;

pub fn register_text_commands(reg: &mut CommandRegistry) -> Result<()> {
    reg.register(Box::new(EchoCmd));
    reg.register(Box::new(GrepCmd));
    Ok(())
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

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
    fn category(&self) -> &str {
        "text"
    }
    fn execute(&self, args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        let text = args.join(" ").replace("\\n", "\n").replace("\\t", "\t");
        Ok(CommandOutput::Text(text))
    }
}

// ---------------------------------------------------------------------------
// grep
// ---------------------------------------------------------------------------

struct GrepCmd;
impl Command for GrepCmd {
    fn name(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Search for a regular expression"
    }
    fn usage(&self) -> &str {
        "grep [-i] [-n] [-r] [-v] [-c] <pattern> [path...]"
    }
    fn category(&self) -> &str {
        "text"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let flags = parse_flags(args, "inrvc")?;
        let Some((pattern, paths)) = flags.positional.split_first() else {
            return Err(ShellError::Command(format!("usage: {}", self.usage())));
        };
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.has('i'))
            .build()
            .map_err(|e| ShellError::Command(format!("invalid pattern: {e}")))?;
        let (invert, count_only, numbered) = (flags.has('v'), flags.has('c'), flags.has('n'));
        let plain = env.plain();

        let sources = if paths.is_empty() {
            match env.stdin() {
                Some(input) => vec![(None, input.to_string())],
                None => return Err(ShellError::Command(format!("usage: {}", self.usage()))),
            }
        } else {
            collect_sources(env, paths, flags.has('r'))?
        };
        let labelled = paths.len() > 1 || flags.has('r');

        let mut lines = Vec::new();
        let (mut total, mut files_hit) = (0usize, 0usize);
        for (label, text) in &sources {
            let prefix = match (labelled, label) {
                (true, Some(label)) => format!("{}:", style::paint(label, plain, |s| s.magenta())),
                _ => String::new(),
            };
            let mut hits = 0;
            for (i, line) in text.lines().enumerate() {
                if regex.is_match(line) == invert {
                    continue;
                }
                hits += 1;
                if count_only {
                    continue;
                }
                let number = if numbered { format!("{}:", i + 1) } else { String::new() };
                let body = if plain || invert {
                    line.to_string()
                } else {
                    regex
                        .replace_all(line, |caps: &Captures<'_>| style::highlight(&caps[0], false))
                        .into_owned()
                };
                lines.push(format!("{prefix}{number}{body}"));
            }
            if count_only {
                lines.push(format!("{prefix}{hits}"));
            }
            total += hits;
            if hits > 0 {
                files_hit += 1;
            }
        }
        if labelled && !plain && !count_only {
            lines.push(String::new());
            lines.push(style::warning(
                &format!("{total} matches in {files_hit} files"),
                false,
            ));
        }
        Ok(CommandOutput::Text(lines.join("\n")))
    }
}

/// Read each path, walking directories when `recursive` is set.
/// Files inside a directory walk that are unreadable or closed to the
/// user are skipped.
fn collect_sources(
    env: &Environment<'_>,
    paths: &[&str],
    recursive: bool,
) -> Result<Vec<(Option<String>, String)>> {
    let fs = env.fs();
    let mut sources = Vec::new();
    for arg in paths {
        let segments = env.resolve(arg);
        let shown = path::display(&segments);
        match fs.lookup(&segments) {
            Some(Entry::Directory(dir)) => {
                if !recursive {
                    return Err(ShellError::IsDirectory(shown));
                }
                for file in files_under(dir, &segments) {
                    let label = path::display(&file.segments);
                    if !env.can_access(&label) {
                        log::debug!("grep: {label} is closed to {}", env.user());
                        continue;
                    }
                    match fs.read(&file.segments) {
                        Ok(text) => sources.push((Some(label), text)),
                        Err(e) => log::debug!("grep: skipping {}: {e}", file.content_ref),
                    }
                }
            },
            _ => sources.push((Some(shown), fs.read(&segments)?)),
        }
    }
    Ok(sources)
}
