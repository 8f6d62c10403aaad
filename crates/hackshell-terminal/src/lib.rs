//! Command interpreter and shell for hackshell.
//!
//! The terminal is a registry-based dispatch system. Commands implement the
//! `Command` trait and are registered by name through providers. The
//! [`Shell`] splits input lines into pipeline stages, checks each stage
//! against the machine's `/bin` and the permission gate, dispatches
//! `execute()` and journals the line.

pub mod auth;
mod commands;
mod interpreter;
pub mod network_commands;
pub mod permission;
mod prompt;
mod session;
mod shell;
pub mod style;
pub mod system_commands;
pub mod text_commands;
pub mod user_commands;

#[cfg(test)]
mod testing;

/// Every built-in command provider, in registration order.
pub use commands::providers;
/// Register the filesystem commands (ls, cd, cat, ...) into a registry.
pub use commands::register_builtins;
/// A single executable command trait.
pub use interpreter::Command;
/// Output produced by a command (text, nothing, or a connection request).
pub use interpreter::CommandOutput;
/// Registry of available commands with dispatch and reload.
pub use interpreter::CommandRegistry;
/// Shared environment passed to every command.
pub use interpreter::Environment;
/// Pipeline position signals for the running stage.
pub use interpreter::PipeContext;
/// Summary of a registry reload.
pub use interpreter::ReloadReport;
/// Interactive input used by login, ssh, sudo and account commands.
pub use prompt::{Prompt, ScriptedPrompt};
/// The logged-in user on one machine.
pub use session::Session;
/// Pipeline executor and connection stack.
pub use shell::{RunOutput, Shell};
