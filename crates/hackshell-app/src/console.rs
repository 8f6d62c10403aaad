//! Terminal-backed prompts.

use std::fmt;

use dialoguer::theme::Theme;
use dialoguer::{Confirm, Input, Password};
use hackshell_terminal::Prompt;

/// Prints prompts exactly as given. The shell's prompts carry their own
/// separators (`login: `, `user@host:/home$ `).
pub struct BareTheme;

impl Theme for BareTheme {
    fn format_prompt(&self, f: &mut dyn fmt::Write, prompt: &str) -> fmt::Result {
        write!(f, "{prompt}")
    }

    fn format_input_prompt(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
        _default: Option<&str>,
    ) -> fmt::Result {
        write!(f, "{prompt}")
    }

    fn format_input_prompt_selection(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
        sel: &str,
    ) -> fmt::Result {
        write!(f, "{prompt}{sel}")
    }

    fn format_password_prompt(&self, f: &mut dyn fmt::Write, prompt: &str) -> fmt::Result {
        write!(f, "{prompt}")
    }

    fn format_password_prompt_selection(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
    ) -> fmt::Result {
        write!(f, "{prompt}")
    }

    fn format_confirm_prompt(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
        _default: Option<bool>,
    ) -> fmt::Result {
        write!(f, "{prompt}")
    }

    fn format_confirm_prompt_selection(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
        selection: Option<bool>,
    ) -> fmt::Result {
        let answer = match selection {
            Some(true) => "y",
            Some(false) => "n",
            None => "",
        };
        write!(f, "{prompt}{answer}")
    }
}

/// Reads from the controlling terminal. A closed or failed terminal reads
/// as end of input.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        Input::<String>::with_theme(&BareTheme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| log::debug!("input closed: {e}"))
            .ok()
    }

    fn read_secret(&mut self, prompt: &str) -> Option<String> {
        Password::with_theme(&BareTheme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| log::debug!("input closed: {e}"))
            .ok()
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        Confirm::with_theme(&BareTheme)
            .with_prompt(prompt)
            .default(false)
            .show_default(false)
            .interact()
            .unwrap_or(false)
    }

    fn message(&mut self, text: &str) {
        println!("{text}");
    }
}
