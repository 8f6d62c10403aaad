//! System commands: logs.

use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::journal::VIRTUAL_LOG_DIR;
use hackshell_vfs::{Node, path};

use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};
use crate::style;

pub fn register_system_commands(reg: &mut CommandRegistry) -> Result<()> {
    reg.register(Box::new(LogsCmd));
    Ok(())
}

const DEFAULT_LINES: usize = 10;

/// Parse `[-n N] [name]` in any order.
fn parse_logs_args<'a>(args: &[&'a str]) -> Result<(Option<&'a str>, usize)> {
    let mut name = None;
    let mut lines = DEFAULT_LINES;
    let mut iter = args.iter();
    while let Some(&arg) = iter.next() {
        if arg == "-n" {
            let value = iter
                .next()
                .ok_or_else(|| ShellError::Command("-n needs a line count".to_string()))?;
            lines = value
                .parse()
                .map_err(|_| ShellError::Command(format!("invalid line count: {value}")))?;
        } else if name.is_none() {
            name = Some(arg);
        } else {
            return Err(ShellError::Command("usage: logs [name] [-n N]".to_string()));
        }
    }
    Ok((name, lines))
}

struct LogsCmd;
impl Command for LogsCmd {
    fn name(&self) -> &str {
        "logs"
    }
    fn description(&self) -> &str {
        "Show system logs"
    }
    fn usage(&self) -> &str {
        "logs [name] [-n N]"
    }
    fn category(&self) -> &str {
        "system"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let (name, count) = parse_logs_args(args)?;
        let fs = env.fs();
        let log_dir: Vec<String> = VIRTUAL_LOG_DIR.iter().map(|s| s.to_string()).collect();
        let Some(dir) = fs.navigate(&log_dir) else {
            return Ok(CommandOutput::Text("No logs found".to_string()));
        };

        let Some(name) = name else {
            let plain = env.plain();
            let names: Vec<String> = dir
                .iter()
                .map(|(name, node)| match node {
                    Node::Directory(_) => style::directory(&format!("{name}/"), plain),
                    _ => name.clone(),
                })
                .collect();
            if names.is_empty() {
                return Ok(CommandOutput::Text("No logs found".to_string()));
            }
            return Ok(CommandOutput::Text(names.join("\n")));
        };

        let file = [name.to_string(), format!("{name}.log")]
            .into_iter()
            .find(|candidate| matches!(dir.get(candidate), Some(Node::File(_))))
            .ok_or_else(|| ShellError::NotFound(format!("log {name}")))?;
        let mut segments = log_dir;
        segments.push(file);
        let text = fs.read(&segments)?;
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(count);
        let mut out = lines[start..].join("\n");
        if !env.plain() && start > 0 {
            out = format!(
                "{}\n{out}",
                style::header(
                    &format!("{} (last {count} of {} lines)", path::display(&segments), lines.len()),
                    false
                )
            );
        }
        Ok(CommandOutput::Text(out))
    }
}
